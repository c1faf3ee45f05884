//! Forward-only iteration over the name registry.

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::iter::Peekable;

use super::{Name, NameData};
use crate::Result;

/// Forward-only, single-pass iteration over names in ascending key order.
pub trait NameIterator {
    /// Advances the iterator, returning the next name and its current data.
    fn next_name(&mut self) -> Result<Option<(Name, NameData)>>;
}

/// Iterator over no names at all; the default for views without a registry.
pub struct EmptyNameIterator;

impl NameIterator for EmptyNameIterator {
    fn next_name(&mut self) -> Result<Option<(Name, NameData)>> {
        Ok(None)
    }
}

/// Composes a parent iterator with a delta's local edits.
///
/// Yields the parent's names in key order, skipping locally deleted ones
/// and substituting locally modified data. Names present only locally are
/// interleaved at their sorted position.
pub(crate) struct MergingNameIterator<'a> {
    base: Box<dyn NameIterator + 'a>,
    changes: Peekable<btree_map::Iter<'a, Name, NameData>>,
    deleted: &'a BTreeSet<Name>,
    /// Next parent item already pulled but not yet yielded.
    pending: Option<(Name, NameData)>,
}

impl<'a> MergingNameIterator<'a> {
    pub(crate) fn new(
        base: Box<dyn NameIterator + 'a>,
        changes: &'a BTreeMap<Name, NameData>,
        deleted: &'a BTreeSet<Name>,
    ) -> Self {
        Self {
            base,
            changes: changes.iter().peekable(),
            deleted,
            pending: None,
        }
    }

    /// Pulls parent items until one survives the local deletions.
    fn refill(&mut self) -> Result<()> {
        while self.pending.is_none() {
            match self.base.next_name()? {
                Some((name, data)) => {
                    if self.deleted.contains(&name) {
                        continue;
                    }
                    self.pending = Some((name, data));
                }
                None => break,
            }
        }
        Ok(())
    }
}

impl NameIterator for MergingNameIterator<'_> {
    fn next_name(&mut self) -> Result<Option<(Name, NameData)>> {
        self.refill()?;

        let take_change = match (self.changes.peek(), &self.pending) {
            (Some((change_name, _)), Some((base_name, _))) => *change_name <= base_name,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if take_change {
            let (name, data) = self.changes.next().expect("peeked above");
            // A local change shadows the parent's record for the same name.
            if let Some((base_name, _)) = &self.pending {
                if base_name == name {
                    self.pending = None;
                }
            }
            return Ok(Some((name.clone(), data.clone())));
        }

        Ok(self.pending.take())
    }
}
