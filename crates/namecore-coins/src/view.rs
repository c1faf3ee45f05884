//! The abstract view contract implemented by backings and overlays.

use std::collections::BTreeSet;

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, OutPoint};

use crate::cache::CoinsMap;
use crate::coin::Coin;
use crate::names::{EmptyNameIterator, Name, NameData, NameDelta, NameHistory, NameIterator};
use crate::Result;

/// A view of the coin database and the name registry.
///
/// Views stack: an in-memory cache composes atop a persistent backing, atop
/// another cache, or atop an error-catching wrapper. Lookups that miss in an
/// overlay descend to the parent; writes accumulate in the topmost cache
/// until flushed.
///
/// Read methods take `&mut self` because a stacked cache's read path inserts
/// fetched entries into its local map. The defaults report "not found" /
/// empty; concrete backings override what they can answer.
pub trait CoinsView {
    /// Returns the live coin at `outpoint`, if any.
    ///
    /// Spent coins are reported as absent.
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        let _ = outpoint;
        Ok(None)
    }

    /// Reads the coin at `outpoint` exactly as this view stores it.
    ///
    /// Unlike [`CoinsView::get_coin`] this may surface a spent entry when
    /// the view is an in-memory cache holding a spend that has not been
    /// flushed yet. A stacked cache uses this during read-through so it can
    /// translate such a tombstone into a fresh local entry; everyone else
    /// should use [`CoinsView::get_coin`].
    fn fetch_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        self.get_coin(outpoint)
    }

    /// Whether a live coin exists at `outpoint`.
    fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool> {
        Ok(self.get_coin(outpoint)?.is_some())
    }

    /// Hash of the block up to which this view's state is current.
    ///
    /// All zeros when the view has no tip yet.
    fn best_block(&mut self) -> Result<BlockHash> {
        Ok(BlockHash::all_zeros())
    }

    /// Hashes of the blocks involved in the current state, newest first.
    ///
    /// Usually a single hash; two while a prior write was interrupted
    /// mid-commit.
    fn head_blocks(&self) -> Result<Vec<BlockHash>> {
        Ok(Vec::new())
    }

    /// Current data for a registered name, if any.
    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>> {
        let _ = name;
        Ok(None)
    }

    /// The stack of superseded values for a name, if any is tracked.
    fn get_name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        let _ = name;
        Ok(None)
    }

    /// Collects into `names` all names whose current data was created at
    /// `height`. Returns whether the view could answer the query.
    fn get_names_for_height(&self, height: u32, names: &mut BTreeSet<Name>) -> Result<bool> {
        let _ = (height, names);
        Ok(false)
    }

    /// Iterates all current names in ascending key order.
    ///
    /// The iterator is forward-only, single-pass and not restartable.
    fn iterate_names(&self) -> Box<dyn NameIterator + '_> {
        Box::new(EmptyNameIterator)
    }

    /// Atomically applies a coin delta, moves the best-block hash forward,
    /// and applies a name delta. Both deltas are consumed.
    fn batch_write(
        &mut self,
        coins: CoinsMap,
        best_block: BlockHash,
        names: NameDelta,
    ) -> Result<()>;

    /// A cursor over the view's coins for offline iteration, if supported.
    fn cursor(&self) -> Result<Option<Box<dyn CoinsCursor + '_>>> {
        Ok(None)
    }

    /// Estimated size in bytes of the underlying database.
    fn estimate_size(&self) -> usize {
        0
    }

    /// Exhaustively cross-checks the name registry against chain state.
    ///
    /// `interruption_point` is invoked periodically during the traversal
    /// and may return an error to abort it; the result is forwarded
    /// unchanged. The default is a no-op reporting `false`, not a failure;
    /// views backed by a persistent store are expected to override it.
    fn validate_name_db(
        &mut self,
        interruption_point: &mut dyn FnMut() -> Result<()>,
    ) -> Result<bool> {
        let _ = interruption_point;
        Ok(false)
    }
}

/// Forward-only cursor over the coins of a view.
pub trait CoinsCursor {
    /// Hash of the best block at the time the cursor was created.
    fn best_block(&self) -> BlockHash;

    /// Advances the cursor, returning the next outpoint/coin pair.
    fn next_coin(&mut self) -> Result<Option<(OutPoint, Coin)>>;
}
