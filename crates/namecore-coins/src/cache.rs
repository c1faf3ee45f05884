//! In-memory cache view layered over another coins view.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, OutPoint, Transaction, Txid};

use crate::coin::{is_unspendable, Coin, MAX_OUTPUTS_PER_BLOCK};
use crate::names::{Name, NameData, NameDelta, NameHistory, NameIterator};
use crate::view::{CoinsCursor, CoinsView};
use crate::Result;

/// A cached coin together with its cache-state flags.
///
/// The flags encode this layer's knowledge relative to its parent:
/// an entry that is neither dirty nor fresh is a pure read-through copy.
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    /// The cached coin; spent once this layer spent it (a tombstone).
    pub coin: Coin,
    /// The local value differs from the parent view's.
    pub dirty: bool,
    /// The parent view is known to hold no live coin at this outpoint.
    ///
    /// A fresh entry that gets spent can be erased outright instead of
    /// being written downward.
    pub fresh: bool,
}

/// The coin map owned by one cache view.
pub type CoinsMap = HashMap<OutPoint, CacheEntry>;

/// Configuration for a [`CoinsViewCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// Track the per-name stack of superseded values. Needed to serve
    /// historical name lookups and to rewind names on block disconnect.
    pub name_history: bool,
}

/// Approximate per-entry bookkeeping footprint of the coin map.
const MAP_ENTRY_OVERHEAD: usize = std::mem::size_of::<OutPoint>()
    + std::mem::size_of::<CacheEntry>()
    + std::mem::size_of::<usize>();

/// Shared sentinel returned when an outpoint has no coin anywhere.
static EMPTY_COIN: Coin = Coin::empty();

/// An in-memory overlay over another view.
///
/// Lookups that miss locally descend to the parent; mutations accumulate in
/// the local coin map and name delta until [`CoinsViewCache::flush`] pushes
/// them one level down. Discarding the cache discards the delta.
///
/// The cache borrows its parent exclusively for its whole lifetime, so the
/// stacking is strict: flushing is the only way state crosses layers.
pub struct CoinsViewCache<'a> {
    base: &'a mut dyn CoinsView,
    coins: CoinsMap,
    /// Hash of the tip the local state reflects; all zeros until latched
    /// from the parent or set explicitly.
    best_block: BlockHash,
    names: NameDelta,
    /// Running total of the heap bytes held by cached coins.
    cached_coins_usage: usize,
    options: CacheOptions,
}

impl<'a> CoinsViewCache<'a> {
    /// Creates an empty cache over `base` with default options.
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        Self::with_options(base, CacheOptions::default())
    }

    /// Creates an empty cache over `base`.
    pub fn with_options(base: &'a mut dyn CoinsView, options: CacheOptions) -> Self {
        Self {
            base,
            coins: CoinsMap::default(),
            best_block: BlockHash::all_zeros(),
            names: NameDelta::default(),
            cached_coins_usage: 0,
            options,
        }
    }

    /// Looks up `outpoint` locally, pulling it from the parent on a miss.
    ///
    /// A coin fetched from the parent is inserted with no flags. If the
    /// parent surfaced a spent entry (it is itself a cache holding a
    /// tombstone), the local entry is marked fresh instead: from this
    /// layer's viewpoint the parent has nothing live there.
    fn fetch_entry(&mut self, outpoint: &OutPoint) -> Result<Option<&mut CacheEntry>> {
        let Self {
            base,
            coins,
            cached_coins_usage,
            ..
        } = self;
        match coins.entry(*outpoint) {
            Entry::Occupied(entry) => Ok(Some(entry.into_mut())),
            Entry::Vacant(slot) => match base.fetch_coin(outpoint)? {
                Some(coin) => {
                    let fresh = coin.is_spent();
                    let entry = slot.insert(CacheEntry {
                        coin,
                        dirty: false,
                        fresh,
                    });
                    *cached_coins_usage += entry.coin.dynamic_memory_usage();
                    Ok(Some(entry))
                }
                None => Ok(None),
            },
        }
    }

    /// Returns a reference to the coin at `outpoint`, or to a shared empty
    /// coin when there is none anywhere in the chain of views.
    pub fn access_coin(&mut self, outpoint: &OutPoint) -> Result<&Coin> {
        match self.fetch_entry(outpoint)? {
            Some(entry) => Ok(&entry.coin),
            None => Ok(&EMPTY_COIN),
        }
    }

    /// Whether a live coin for `outpoint` is present in the local map,
    /// without consulting the parent.
    pub fn have_coin_in_cache(&self, outpoint: &OutPoint) -> bool {
        self.coins
            .get(outpoint)
            .is_some_and(|entry| !entry.coin.is_spent())
    }

    /// Adds a coin at `outpoint`.
    ///
    /// Unspendable outputs are silently skipped. Unless `possible_overwrite`
    /// is set, an existing live coin at the same outpoint aborts: consensus
    /// code must never overwrite a live coin without saying so.
    ///
    /// # Panics
    ///
    /// If `coin` is already spent, or on a forbidden overwrite.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin, possible_overwrite: bool) {
        match coin.script_pubkey() {
            None => panic!("attempted to add a spent coin"),
            Some(script) if is_unspendable(script) => return,
            Some(_) => {}
        }

        let entry = self.coins.entry(outpoint).or_default();
        self.cached_coins_usage -= entry.coin.dynamic_memory_usage();

        let mut fresh = false;
        if !possible_overwrite {
            assert!(
                entry.coin.is_spent(),
                "attempted to overwrite a live coin at {outpoint}"
            );
            // A spent-but-dirty entry is a spend the parent has not seen
            // yet; re-adding on top of it must not claim parent absence, or
            // a later spend would erase the entry and the spentness would
            // never reach the parent.
            fresh = !entry.dirty;
        }

        entry.coin = coin;
        entry.dirty = true;
        entry.fresh = entry.fresh || fresh;
        self.cached_coins_usage += entry.coin.dynamic_memory_usage();
        trace_coin("add", &outpoint, &entry.coin);
    }

    /// Inserts `coin` directly with the dirty flag, bypassing the
    /// unspendable-script filter and the freshness bookkeeping. An entry
    /// already present is left untouched, though the memory accounting is
    /// bumped regardless.
    ///
    /// This is a hook for tests and bulk state loading, not for validation
    /// code: misuse corrupts the cache invariants.
    pub fn emplace_coin_unchecked(&mut self, outpoint: OutPoint, coin: Coin) {
        self.cached_coins_usage += coin.dynamic_memory_usage();
        self.coins.entry(outpoint).or_insert(CacheEntry {
            coin,
            dirty: true,
            fresh: false,
        });
    }

    /// Spends the coin at `outpoint`, returning it.
    ///
    /// Returns `Ok(None)` when no entry exists anywhere. A fresh entry is
    /// erased outright; anything else becomes a dirty tombstone that will
    /// propagate the spend on flush. Spending an entry that is already a
    /// local tombstone succeeds and returns the (spent, empty) coin.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        if self.fetch_entry(outpoint)?.is_none() {
            return Ok(None);
        }
        let entry = self
            .coins
            .get_mut(outpoint)
            .expect("entry fetched just above");
        self.cached_coins_usage -= entry.coin.dynamic_memory_usage();
        trace_coin("spent", outpoint, &entry.coin);

        let fresh = entry.fresh;
        let coin = entry.coin.take();
        if fresh {
            self.coins.remove(outpoint);
        } else {
            entry.dirty = true;
        }
        Ok(Some(coin))
    }

    /// Pushes the accumulated coin and name deltas into the parent and
    /// clears all local state.
    ///
    /// Flushing a cache that was never written to (null best block, empty
    /// deltas) is a successful no-op, so that a cache constructed purely
    /// for mempool validation can always be flushed safely.
    pub fn flush(&mut self) -> Result<()> {
        if self.best_block == BlockHash::all_zeros()
            && self.coins.is_empty()
            && self.names.is_empty()
        {
            return Ok(());
        }
        let coins = std::mem::take(&mut self.coins);
        let names = std::mem::take(&mut self.names);
        let flushed = coins.len();
        self.cached_coins_usage = 0;
        self.base.batch_write(coins, self.best_block, names)?;
        tracing::debug!(target: "coins", coins = flushed, "flushed cache into parent view");
        Ok(())
    }

    /// Drops a pure read-through entry from the local map.
    ///
    /// Entries carrying any flag hold pending state and are retained.
    pub fn uncache(&mut self, outpoint: &OutPoint) {
        if let Some(entry) = self.coins.get(outpoint) {
            if !entry.dirty && !entry.fresh {
                self.cached_coins_usage -= entry.coin.dynamic_memory_usage();
                trace_coin("uncache", outpoint, &entry.coin);
                self.coins.remove(outpoint);
            }
        }
    }

    /// Number of coins held in the local map.
    pub fn cache_size(&self) -> usize {
        self.coins.len()
    }

    /// Direct read access to a cached entry, without read-through.
    pub fn cache_entry(&self, outpoint: &OutPoint) -> Option<&CacheEntry> {
        self.coins.get(outpoint)
    }

    /// Total heap footprint of the local map: per-entry bookkeeping plus
    /// the tracked coin payload bytes.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.coins.len() * MAP_ENTRY_OVERHEAD + self.cached_coins_usage
    }

    /// Whether every input of `tx` resolves to a live coin. Coinbase
    /// transactions have no inputs to resolve and always pass.
    pub fn have_inputs(&mut self, tx: &Transaction) -> Result<bool> {
        if !tx.is_coinbase() {
            for input in &tx.input {
                if !self.have_coin(&input.previous_output)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Destructively reinitializes the coin map, releasing memory the
    /// allocator retained across a large flush.
    ///
    /// # Panics
    ///
    /// If the map is not empty.
    pub fn reallocate_cache(&mut self) {
        assert!(
            self.coins.is_empty(),
            "cache must be flushed before reallocating"
        );
        self.coins = CoinsMap::default();
    }

    /// Sets the hash of the tip the local state reflects.
    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.best_block = hash;
    }

    /// Updates `name` to `data`.
    ///
    /// `undo` distinguishes replaying history backward (block disconnect)
    /// from ordinary forward updates: going forward the overwritten record
    /// is pushed onto the name's history, going backward the history is
    /// popped and checked against the record being restored.
    ///
    /// # Panics
    ///
    /// If `undo` is set and the name does not currently exist, or the
    /// popped history record does not match `data`.
    pub fn set_name(&mut self, name: &[u8], data: NameData, undo: bool) -> Result<()> {
        match self.get_name(name)? {
            Some(old) => {
                self.names.remove_expire_index(name, old.height());
                if self.options.name_history {
                    let mut history = self.get_name_history(name)?.unwrap_or_default();
                    if undo {
                        history.pop(&data);
                    } else {
                        history.push(old);
                    }
                    self.names.set_history(name, history);
                }
            }
            None => assert!(!undo, "attempted to undo a name that does not exist"),
        }

        let new_height = data.height();
        self.names.set(name, data);
        self.names.add_expire_index(name, new_height);
        Ok(())
    }

    /// Removes `name` from the registry.
    ///
    /// # Panics
    ///
    /// If the name does not currently exist, or it still carries recorded
    /// history (which must be unwound first).
    pub fn delete_name(&mut self, name: &[u8]) -> Result<()> {
        match self.get_name(name)? {
            Some(old) => self.names.remove_expire_index(name, old.height()),
            None => panic!("attempted to delete a name that does not exist"),
        }

        if self.options.name_history {
            let history = self.get_name_history(name)?;
            assert!(
                history.map_or(true, |h| h.is_empty()),
                "attempted to delete a name with recorded history"
            );
        }

        self.names.remove(name);
        Ok(())
    }
}

impl CoinsView for CoinsViewCache<'_> {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        Ok(self
            .fetch_entry(outpoint)?
            .filter(|entry| !entry.coin.is_spent())
            .map(|entry| entry.coin.clone()))
    }

    fn fetch_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        Ok(self.fetch_entry(outpoint)?.map(|entry| entry.coin.clone()))
    }

    fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool> {
        Ok(self
            .fetch_entry(outpoint)?
            .is_some_and(|entry| !entry.coin.is_spent()))
    }

    fn best_block(&mut self) -> Result<BlockHash> {
        if self.best_block == BlockHash::all_zeros() {
            self.best_block = self.base.best_block()?;
        }
        Ok(self.best_block)
    }

    fn head_blocks(&self) -> Result<Vec<BlockHash>> {
        self.base.head_blocks()
    }

    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>> {
        if self.names.is_deleted(name) {
            return Ok(None);
        }
        if let Some(data) = self.names.get(name) {
            return Ok(Some(data.clone()));
        }
        // Only changes are tracked here; untouched names are the parent's.
        self.base.get_name(name)
    }

    fn get_name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        if let Some(history) = self.names.history(name) {
            return Ok(Some(history.clone()));
        }
        self.base.get_name_history(name)
    }

    fn get_names_for_height(&self, height: u32, names: &mut BTreeSet<Name>) -> Result<bool> {
        // The parent is consulted first and short-circuits the query;
        // local edits only apply on top of a successful parent answer.
        if !self.base.get_names_for_height(height, names)? {
            return Ok(false);
        }
        self.names.update_names_for_height(height, names);
        Ok(true)
    }

    fn iterate_names(&self) -> Box<dyn NameIterator + '_> {
        self.names.iterate(self.base.iterate_names())
    }

    /// Merges a child cache's delta into this layer.
    ///
    /// Clean child entries are skipped; a fresh-and-spent child entry
    /// cancels against a missing or fresh local entry; everything else is
    /// moved in and marked dirty. The fresh flag never moves upward past an
    /// existing local entry: this layer may already have told its own
    /// parent about the coin.
    fn batch_write(
        &mut self,
        coins: CoinsMap,
        best_block: BlockHash,
        names: NameDelta,
    ) -> Result<()> {
        for (outpoint, child) in coins {
            if !child.dirty {
                continue;
            }
            match self.coins.entry(outpoint) {
                Entry::Vacant(slot) => {
                    if !(child.fresh && child.coin.is_spent()) {
                        // Parent absence may only be asserted here if the
                        // child asserted it.
                        let entry = slot.insert(CacheEntry {
                            coin: child.coin,
                            dirty: true,
                            fresh: child.fresh,
                        });
                        self.cached_coins_usage += entry.coin.dynamic_memory_usage();
                    }
                }
                Entry::Occupied(mut slot) => {
                    assert!(
                        !(child.fresh && !slot.get().coin.is_spent()),
                        "child cache claims parent absence for a live coin at {outpoint}"
                    );
                    if slot.get().fresh && child.coin.is_spent() {
                        // Fresh-then-spent cancels without a downward signal.
                        self.cached_coins_usage -= slot.get().coin.dynamic_memory_usage();
                        slot.remove();
                    } else {
                        let entry = slot.into_mut();
                        self.cached_coins_usage -= entry.coin.dynamic_memory_usage();
                        entry.coin = child.coin;
                        entry.dirty = true;
                        self.cached_coins_usage += entry.coin.dynamic_memory_usage();
                    }
                }
            }
        }
        self.best_block = best_block;
        self.names.apply(names);
        Ok(())
    }

    fn cursor(&self) -> Result<Option<Box<dyn CoinsCursor + '_>>> {
        self.base.cursor()
    }

    fn estimate_size(&self) -> usize {
        self.base.estimate_size()
    }

    fn validate_name_db(
        &mut self,
        interruption_point: &mut dyn FnMut() -> Result<()>,
    ) -> Result<bool> {
        self.base.validate_name_db(interruption_point)
    }
}

/// Adds all outputs of `tx` at `height` to `cache`.
///
/// When `check_for_overwrite` is set, each output is first probed so that an
/// existing live coin makes the add an explicit overwrite. Otherwise
/// overwrites are permitted exactly for coinbase transactions, which may
/// legitimately duplicate an earlier coinbase.
pub fn add_coins(
    cache: &mut CoinsViewCache<'_>,
    tx: &Transaction,
    height: u32,
    check_for_overwrite: bool,
) -> Result<()> {
    let is_coinbase = tx.is_coinbase();
    let txid = tx.compute_txid();
    for (index, output) in tx.output.iter().enumerate() {
        let outpoint = OutPoint {
            txid,
            vout: index as u32,
        };
        let overwrite = if check_for_overwrite {
            cache.have_coin(&outpoint)?
        } else {
            is_coinbase
        };
        cache.add_coin(outpoint, Coin::new(output.clone(), height, is_coinbase), overwrite);
    }
    Ok(())
}

/// Finds the first live output of `txid`, scanning output indices in order.
///
/// Serves lookups that identify a transaction without an output index, such
/// as the legacy duplicate-coinbase check. Returns the shared empty coin
/// when no output is live.
pub fn access_by_txid<'c>(view: &'c mut CoinsViewCache<'_>, txid: &Txid) -> Result<&'c Coin> {
    let mut found = None;
    for vout in 0..MAX_OUTPUTS_PER_BLOCK {
        let outpoint = OutPoint { txid: *txid, vout };
        if view.have_coin(&outpoint)? {
            found = Some(outpoint);
            break;
        }
    }
    match found {
        Some(outpoint) => view.access_coin(&outpoint),
        None => Ok(&EMPTY_COIN),
    }
}

fn trace_coin(action: &'static str, outpoint: &OutPoint, coin: &Coin) {
    tracing::trace!(
        target: "coins",
        txid = %outpoint.txid,
        vout = outpoint.vout,
        height = coin.height(),
        value = coin.value().map_or(0, |value| value.to_sat()),
        is_coinbase = coin.is_coinbase(),
        "{action}"
    );
}
