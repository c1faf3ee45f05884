//! The [`Coin`] type and script-level classification helpers.

use bitcoin::{Amount, Script, TxOut};
use serde::{Deserialize, Serialize};

/// Maximum allowed weight for a block.
const MAX_BLOCK_WEIGHT: u32 = 4_000_000;

/// Factor by which non-witness serialized bytes count towards block weight.
const WITNESS_SCALE_FACTOR: u32 = 4;

/// Serialized size of the smallest possible transaction output: an 8-byte
/// value plus one byte of script length.
const MIN_TXOUT_SIZE: u32 = 9;

/// Weight of the smallest possible transaction output.
const MIN_TRANSACTION_OUTPUT_WEIGHT: u32 = WITNESS_SCALE_FACTOR * MIN_TXOUT_SIZE;

/// Upper bound on the number of outputs a single block can create.
pub const MAX_OUTPUTS_PER_BLOCK: u32 = MAX_BLOCK_WEIGHT / MIN_TRANSACTION_OUTPUT_WEIGHT;

/// Scripts larger than this can never be spent.
const MAX_SCRIPT_SIZE: usize = 10_000;

/// Whether a locking script can provably never be spent.
///
/// Such outputs are pruned from the UTXO set at creation instead of being
/// carried forever.
pub fn is_unspendable(script: &Script) -> bool {
    script.is_op_return() || script.len() > MAX_SCRIPT_SIZE
}

/// An unspent transaction output together with metadata about its creation.
///
/// A coin is either live (it holds the output) or spent. Spending clears the
/// output in place; a spent coin inside a cache acts as a tombstone that
/// propagates spentness towards the database on flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// The output itself, or `None` once the coin has been spent.
    output: Option<TxOut>,
    /// Block height at which the containing transaction was included.
    height: u32,
    /// Whether the coin comes from a coinbase transaction.
    is_coinbase: bool,
}

impl Coin {
    /// Creates a live coin.
    pub fn new(output: TxOut, height: u32, is_coinbase: bool) -> Self {
        Self {
            output: Some(output),
            height,
            is_coinbase,
        }
    }

    /// The spent, empty coin.
    pub const fn empty() -> Self {
        Self {
            output: None,
            height: 0,
            is_coinbase: false,
        }
    }

    /// Whether the coin has been spent.
    pub fn is_spent(&self) -> bool {
        self.output.is_none()
    }

    /// Whether the coin comes from a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    /// Block height at which the coin was created.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The output, unless the coin has been spent.
    pub fn output(&self) -> Option<&TxOut> {
        self.output.as_ref()
    }

    /// The locking script, unless the coin has been spent.
    pub fn script_pubkey(&self) -> Option<&Script> {
        self.output.as_ref().map(|out| out.script_pubkey.as_script())
    }

    /// The output value, unless the coin has been spent.
    pub fn value(&self) -> Option<Amount> {
        self.output.as_ref().map(|out| out.value)
    }

    /// Marks the coin as spent, returning the previous contents.
    pub fn take(&mut self) -> Coin {
        std::mem::take(self)
    }

    /// Heap bytes attributable to this coin, i.e. the locking script
    /// payload. The fixed-size part of the coin is accounted by its owner.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.output
            .as_ref()
            .map_or(0, |out| out.script_pubkey.len())
    }
}

impl Default for Coin {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::ScriptBuf;

    fn txout(value: u64, script: ScriptBuf) -> TxOut {
        TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }
    }

    #[test]
    fn take_leaves_a_spent_coin() {
        let mut coin = Coin::new(txout(50, ScriptBuf::from_bytes(vec![0x51])), 7, true);
        assert!(!coin.is_spent());

        let taken = coin.take();
        assert!(coin.is_spent());
        assert_eq!(coin.dynamic_memory_usage(), 0);
        assert!(taken.is_coinbase());
        assert_eq!(taken.height(), 7);
        assert_eq!(taken.value(), Some(Amount::from_sat(50)));
    }

    #[test]
    fn op_return_is_unspendable() {
        let script = ScriptBuf::from_bytes(vec![0x6a, 0x01, 0xaa]);
        assert!(is_unspendable(&script));
        assert!(!is_unspendable(&ScriptBuf::from_bytes(vec![0x51])));
    }

    #[test]
    fn oversized_script_is_unspendable() {
        let script = ScriptBuf::from_bytes(vec![0x51; MAX_SCRIPT_SIZE + 1]);
        assert!(is_unspendable(&script));
    }
}
