//! Shared in-memory backing view for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, OutPoint};

use namecore_coins::{
    Coin, CoinsCursor, CoinsMap, CoinsView, Name, NameData, NameDelta, NameHistory, NameIterator,
    Result,
};

/// A backing view holding everything in plain maps.
///
/// Stores only live coins, like a persistent backing would, and applies
/// deltas the way the chain database does: spent entries delete, live
/// entries upsert, name changes and deletions are replayed in order.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCoinsView {
    pub coins: HashMap<OutPoint, Coin>,
    pub best_block: BlockHash,
    pub names: BTreeMap<Name, NameData>,
    pub histories: BTreeMap<Name, NameHistory>,
}

impl MemoryCoinsView {
    pub fn new() -> Self {
        Self {
            coins: HashMap::new(),
            best_block: BlockHash::all_zeros(),
            names: BTreeMap::new(),
            histories: BTreeMap::new(),
        }
    }
}

impl CoinsView for MemoryCoinsView {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        Ok(self.coins.get(outpoint).cloned())
    }

    fn best_block(&mut self) -> Result<BlockHash> {
        Ok(self.best_block)
    }

    fn head_blocks(&self) -> Result<Vec<BlockHash>> {
        if self.best_block == BlockHash::all_zeros() {
            Ok(Vec::new())
        } else {
            Ok(vec![self.best_block])
        }
    }

    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>> {
        Ok(self.names.get(name).cloned())
    }

    fn get_name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        Ok(self.histories.get(name).cloned())
    }

    fn get_names_for_height(&self, height: u32, names: &mut BTreeSet<Name>) -> Result<bool> {
        for (name, data) in &self.names {
            if data.height() == height {
                names.insert(name.clone());
            }
        }
        Ok(true)
    }

    fn iterate_names(&self) -> Box<dyn NameIterator + '_> {
        Box::new(MemoryNameIterator(self.names.iter()))
    }

    fn batch_write(
        &mut self,
        coins: CoinsMap,
        best_block: BlockHash,
        names: NameDelta,
    ) -> Result<()> {
        for (outpoint, entry) in coins {
            if !entry.dirty {
                continue;
            }
            if entry.coin.is_spent() {
                self.coins.remove(&outpoint);
            } else {
                self.coins.insert(outpoint, entry.coin);
            }
        }
        self.best_block = best_block;

        for (name, data) in names.entries() {
            self.names.insert(name.clone(), data.clone());
        }
        for name in names.deleted() {
            self.names.remove(name);
        }
        for (name, history) in names.history_patches() {
            if history.is_empty() {
                self.histories.remove(name);
            } else {
                self.histories.insert(name.clone(), history.clone());
            }
        }
        Ok(())
    }

    fn cursor(&self) -> Result<Option<Box<dyn CoinsCursor + '_>>> {
        let mut entries: Vec<_> = self
            .coins
            .iter()
            .map(|(outpoint, coin)| (*outpoint, coin.clone()))
            .collect();
        entries.sort_by_key(|(outpoint, _)| *outpoint);
        Ok(Some(Box::new(MemoryCursor {
            best_block: self.best_block,
            entries: entries.into_iter(),
        })))
    }

    fn estimate_size(&self) -> usize {
        self.coins
            .values()
            .map(|coin| 40 + coin.dynamic_memory_usage())
            .sum()
    }
}

struct MemoryNameIterator<'a>(std::collections::btree_map::Iter<'a, Name, NameData>);

impl NameIterator for MemoryNameIterator<'_> {
    fn next_name(&mut self) -> Result<Option<(Name, NameData)>> {
        Ok(self
            .0
            .next()
            .map(|(name, data)| (name.clone(), data.clone())))
    }
}

struct MemoryCursor {
    best_block: BlockHash,
    entries: std::vec::IntoIter<(OutPoint, Coin)>,
}

impl CoinsCursor for MemoryCursor {
    fn best_block(&self) -> BlockHash {
        self.best_block
    }

    fn next_coin(&mut self) -> Result<Option<(OutPoint, Coin)>> {
        Ok(self.entries.next())
    }
}
