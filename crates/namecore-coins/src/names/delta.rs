//! Accumulated name-registry changes relative to a parent view.

use std::collections::{BTreeMap, BTreeSet};

use super::iter::{MergingNameIterator, NameIterator};
use super::{ExpireEntry, Name, NameData, NameHistory};

/// The set of name changes a cache view carries on top of its parent.
///
/// This is a delta, never a read-through cache: a name absent from every
/// field is simply "unchanged here", and queries for it fall through to the
/// parent. A name is never simultaneously in `entries` and `deleted`; the
/// mutators maintain that by construction.
#[derive(Debug, Clone, Default)]
pub struct NameDelta {
    /// Names created or updated, with their new data.
    entries: BTreeMap<Name, NameData>,
    /// Names removed entirely.
    deleted: BTreeSet<Name>,
    /// Replacement history stacks for names whose history changed.
    history: BTreeMap<Name, NameHistory>,
    /// Patch to the height-keyed expiration index; `true` adds the entry,
    /// `false` removes it.
    expire_index: BTreeMap<ExpireEntry, bool>,
}

impl NameDelta {
    /// Whether the delta carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.deleted.is_empty()
            && self.history.is_empty()
            && self.expire_index.is_empty()
    }

    /// The locally changed data for `name`, if any.
    pub fn get(&self, name: &[u8]) -> Option<&NameData> {
        self.entries.get(name)
    }

    /// Whether `name` is locally deleted.
    pub fn is_deleted(&self, name: &[u8]) -> bool {
        self.deleted.contains(name)
    }

    /// The locally patched history for `name`, if any.
    pub fn history(&self, name: &[u8]) -> Option<&NameHistory> {
        self.history.get(name)
    }

    /// Records `data` as the new state of `name`.
    pub fn set(&mut self, name: &[u8], data: NameData) {
        self.deleted.remove(name);
        self.entries.insert(name.to_vec(), data);
    }

    /// Records the deletion of `name`.
    pub fn remove(&mut self, name: &[u8]) {
        self.entries.remove(name);
        self.deleted.insert(name.to_vec());
    }

    /// Records `history` as the new history stack of `name`.
    pub fn set_history(&mut self, name: &[u8], history: NameHistory) {
        self.history.insert(name.to_vec(), history);
    }

    /// Adds `name` to the expiration index at `height`.
    pub fn add_expire_index(&mut self, name: &[u8], height: u32) {
        let entry = ExpireEntry {
            height,
            name: name.to_vec(),
        };
        self.expire_index.insert(entry, true);
    }

    /// Removes `name` from the expiration index at `height`.
    pub fn remove_expire_index(&mut self, name: &[u8], height: u32) {
        let entry = ExpireEntry {
            height,
            name: name.to_vec(),
        };
        self.expire_index.insert(entry, false);
    }

    /// Applies the local expiration-index patch for `height` to a set of
    /// names fetched from the parent.
    pub fn update_names_for_height(&self, height: u32, names: &mut BTreeSet<Name>) {
        let start = ExpireEntry {
            height,
            name: Name::new(),
        };
        for (entry, add) in self.expire_index.range(start..) {
            if entry.height != height {
                break;
            }
            if *add {
                names.insert(entry.name.clone());
            } else {
                names.remove(&entry.name);
            }
        }
    }

    /// Superimposes a child's delta onto this one, consuming it.
    ///
    /// Last writer wins within each field.
    pub fn apply(&mut self, child: NameDelta) {
        for (name, data) in child.entries {
            self.deleted.remove(&name);
            self.entries.insert(name, data);
        }
        for name in child.deleted {
            self.entries.remove(&name);
            self.deleted.insert(name);
        }
        for (name, history) in child.history {
            self.history.insert(name, history);
        }
        for (entry, add) in child.expire_index {
            self.expire_index.insert(entry, add);
        }
    }

    /// Composes the parent's name iterator with the local edits.
    pub fn iterate<'a>(&'a self, base: Box<dyn NameIterator + 'a>) -> Box<dyn NameIterator + 'a> {
        Box::new(MergingNameIterator::new(base, &self.entries, &self.deleted))
    }

    /// The locally changed names and their new data.
    pub fn entries(&self) -> impl Iterator<Item = (&Name, &NameData)> {
        self.entries.iter()
    }

    /// The locally deleted names.
    pub fn deleted(&self) -> impl Iterator<Item = &Name> {
        self.deleted.iter()
    }

    /// The locally patched history stacks.
    pub fn history_patches(&self) -> impl Iterator<Item = (&Name, &NameHistory)> {
        self.history.iter()
    }

    /// The expiration-index patch; `true` adds the entry, `false` removes it.
    pub fn expire_index_patches(&self) -> impl Iterator<Item = (&ExpireEntry, bool)> {
        self.expire_index.iter().map(|(entry, add)| (entry, *add))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;
    use bitcoin::ScriptBuf;

    fn data(value: &[u8], height: u32) -> NameData {
        NameData::new(
            value.to_vec(),
            height,
            bitcoin::OutPoint {
                txid: bitcoin::Txid::all_zeros(),
                vout: 0,
            },
            ScriptBuf::new(),
        )
    }

    #[test]
    fn set_clears_deletion_and_vice_versa() {
        let mut delta = NameDelta::default();
        delta.remove(b"d/name");
        assert!(delta.is_deleted(b"d/name"));

        delta.set(b"d/name", data(b"value", 10));
        assert!(!delta.is_deleted(b"d/name"));
        assert!(delta.get(b"d/name").is_some());

        delta.remove(b"d/name");
        assert!(delta.is_deleted(b"d/name"));
        assert!(delta.get(b"d/name").is_none());
    }

    #[test]
    fn expire_index_patch_applies_per_height() {
        let mut delta = NameDelta::default();
        delta.add_expire_index(b"d/a", 10);
        delta.add_expire_index(b"d/b", 11);
        delta.remove_expire_index(b"d/c", 10);

        let mut names: BTreeSet<Name> = [b"d/c".to_vec()].into();
        delta.update_names_for_height(10, &mut names);
        assert_eq!(names, [b"d/a".to_vec()].into());

        let mut names = BTreeSet::new();
        delta.update_names_for_height(11, &mut names);
        assert_eq!(names, [b"d/b".to_vec()].into());
    }

    #[test]
    fn apply_is_last_writer_wins() {
        let mut parent = NameDelta::default();
        parent.set(b"d/a", data(b"old", 5));
        parent.remove(b"d/b");

        let mut child = NameDelta::default();
        child.set(b"d/b", data(b"revived", 9));
        child.remove(b"d/a");
        child.add_expire_index(b"d/b", 9);

        parent.apply(child);
        assert!(parent.is_deleted(b"d/a"));
        assert!(parent.get(b"d/a").is_none());
        assert!(!parent.is_deleted(b"d/b"));
        assert_eq!(parent.get(b"d/b").unwrap().value(), b"revived");
    }
}
