//! Pass-through view that turns backing read faults into a process abort.

use std::collections::BTreeSet;

use bitcoin::{BlockHash, OutPoint};

use crate::cache::CoinsMap;
use crate::coin::Coin;
use crate::names::{Name, NameData, NameDelta, NameHistory, NameIterator};
use crate::view::{CoinsCursor, CoinsView};
use crate::Result;

type ReadErrCallback = Box<dyn Fn() + Send + Sync>;

/// Forwards all operations to a backing view, converting coin read faults
/// into process termination.
///
/// Reporting an I/O fault as "coin not found" would be taken by validation
/// as "unspent output absent" and silently corrupt consensus state, so
/// reads are all-or-abort: registered callbacks fire (to start shutdown
/// signaling), the fault is logged, and the process aborts.
pub struct CoinsViewErrorCatcher<'a> {
    base: &'a mut dyn CoinsView,
    read_err_callbacks: Vec<ReadErrCallback>,
}

impl<'a> CoinsViewErrorCatcher<'a> {
    /// Wraps `base`.
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        Self {
            base,
            read_err_callbacks: Vec::new(),
        }
    }

    /// Registers a callback invoked on a read fault, before the abort.
    pub fn add_read_err_callback<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.read_err_callbacks.push(Box::new(callback));
    }

    fn on_read_error(&self, err: &crate::Error) -> ! {
        for callback in &self.read_err_callbacks {
            callback();
        }
        tracing::error!(target: "coins", %err, "error reading from the coins database");
        // Returning an error upward could still be misread as a missing
        // coin somewhere; nothing can continue from here and all writes
        // are atomic, so exit immediately.
        std::process::abort();
    }
}

impl CoinsView for CoinsViewErrorCatcher<'_> {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>> {
        match self.base.get_coin(outpoint) {
            Ok(coin) => Ok(coin),
            Err(err) => self.on_read_error(&err),
        }
    }

    fn best_block(&mut self) -> Result<BlockHash> {
        self.base.best_block()
    }

    fn head_blocks(&self) -> Result<Vec<BlockHash>> {
        self.base.head_blocks()
    }

    fn get_name(&self, name: &[u8]) -> Result<Option<NameData>> {
        self.base.get_name(name)
    }

    fn get_name_history(&self, name: &[u8]) -> Result<Option<NameHistory>> {
        self.base.get_name_history(name)
    }

    fn get_names_for_height(&self, height: u32, names: &mut BTreeSet<Name>) -> Result<bool> {
        self.base.get_names_for_height(height, names)
    }

    fn iterate_names(&self) -> Box<dyn NameIterator + '_> {
        self.base.iterate_names()
    }

    fn batch_write(
        &mut self,
        coins: CoinsMap,
        best_block: BlockHash,
        names: NameDelta,
    ) -> Result<()> {
        self.base.batch_write(coins, best_block, names)
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
