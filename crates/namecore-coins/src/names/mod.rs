//! Name-registry types and the delta tracked by cache views.

mod delta;
mod iter;

pub use delta::NameDelta;
pub use iter::{EmptyNameIterator, NameIterator};

use bitcoin::{OutPoint, ScriptBuf};
use serde::{Deserialize, Serialize};

/// A registered name: an opaque byte string.
pub type Name = Vec<u8>;

/// Current state of a registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameData {
    /// The value currently associated with the name.
    value: Vec<u8>,
    /// Block height of the transaction that last updated the name. Drives
    /// the expiration index.
    height: u32,
    /// Outpoint of the name operation that produced this state.
    prevout: OutPoint,
    /// Script owning the name, i.e. entitled to update it.
    addr: ScriptBuf,
}

impl NameData {
    /// Creates the record produced by a name operation.
    pub fn new(value: Vec<u8>, height: u32, prevout: OutPoint, addr: ScriptBuf) -> Self {
        Self {
            value,
            height,
            prevout,
            addr,
        }
    }

    /// The value currently associated with the name.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Block height of the last update.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Outpoint of the name operation that produced this state.
    pub fn prevout(&self) -> &OutPoint {
        &self.prevout
    }

    /// Script owning the name.
    pub fn address(&self) -> &ScriptBuf {
        &self.addr
    }
}

/// Ordered record of a name's superseded values, oldest first.
///
/// Going forward in time, each update pushes the overwritten record; going
/// backward (block disconnect), each undo pops it again. The replay must be
/// consistent: popping checks the removed record against the data being
/// restored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameHistory(Vec<NameData>);

impl NameHistory {
    /// Whether no superseded values are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of superseded values recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Records `data` as the most recently superseded value.
    pub fn push(&mut self, data: NameData) {
        self.0.push(data);
    }

    /// Removes the most recently superseded value.
    ///
    /// `expected` is the record being restored by the undo; it must match
    /// what was recorded when going forward. Panics on an empty history or
    /// a mismatch, both of which mean the replay diverged from the chain.
    pub fn pop(&mut self, expected: &NameData) {
        let top = self
            .0
            .pop()
            .unwrap_or_else(|| panic!("name history empty while undoing an update"));
        assert!(
            top == *expected,
            "name history does not match the record being restored"
        );
    }

    /// The superseded records, oldest first.
    pub fn entries(&self) -> &[NameData] {
        &self.0
    }
}

/// One entry of the height-keyed expiration index.
///
/// Ordered by height first so that all names expiring at one height form a
/// contiguous range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpireEntry {
    /// Height the indexed name data was created at.
    pub height: u32,
    /// The indexed name.
    pub name: Name,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn data(value: &[u8], height: u32) -> NameData {
        NameData::new(
            value.to_vec(),
            height,
            OutPoint {
                txid: bitcoin::Txid::all_zeros(),
                vout: 0,
            },
            ScriptBuf::new(),
        )
    }

    #[test]
    fn history_pop_checks_restored_record() {
        let mut history = NameHistory::default();
        history.push(data(b"d/old", 100));
        history.pop(&data(b"d/old", 100));
        assert!(history.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn history_pop_rejects_mismatch() {
        let mut history = NameHistory::default();
        history.push(data(b"d/old", 100));
        history.pop(&data(b"d/other", 100));
    }

    #[test]
    #[should_panic(expected = "empty")]
    fn history_pop_rejects_empty() {
        let mut history = NameHistory::default();
        history.pop(&data(b"d/old", 100));
    }

    #[test]
    fn expire_entries_sort_by_height_first() {
        let a = ExpireEntry {
            height: 1,
            name: b"zz".to_vec(),
        };
        let b = ExpireEntry {
            height: 2,
            name: b"aa".to_vec(),
        };
        assert!(a < b);
    }
}
