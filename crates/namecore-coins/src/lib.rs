//! Layered views over the coin and name databases.
//!
//! This crate sits between in-memory transaction validation and the
//! persistent chain database. It provides a stackable chain of views of the
//! UTXO set and the name registry, so that speculative changes (connecting a
//! candidate block, validating a mempool transaction) can be applied,
//! flushed, or discarded atomically without touching durable storage.
//!
//! ## Architecture
//!
//! - [`CoinsView`]: the abstract view contract. Concrete backings (the chain
//!   database) implement it; everything else in this crate composes on top.
//! - [`CoinsViewCache`]: an in-memory overlay over any other view. Lookups
//!   that miss locally descend to the parent; writes accumulate locally and
//!   are pushed one level down on [`CoinsViewCache::flush`].
//! - [`CoinsViewErrorCatcher`]: a pass-through that turns backing read
//!   faults into an orderly process abort instead of a misleading
//!   "coin not found".
//!
//! Name-registry state is tracked as a pure delta ([`NameDelta`]) rather
//! than a read-through cache, because height-indexed and historical queries
//! must always see the parent's ground truth plus local edits.

mod cache;
mod coin;
mod error;
mod error_catcher;
mod names;
mod view;

pub use cache::{
    access_by_txid, add_coins, CacheEntry, CacheOptions, CoinsMap, CoinsViewCache,
};
pub use coin::{is_unspendable, Coin, MAX_OUTPUTS_PER_BLOCK};
pub use error::Error;
pub use error_catcher::CoinsViewErrorCatcher;
pub use names::{
    EmptyNameIterator, ExpireEntry, Name, NameData, NameDelta, NameHistory, NameIterator,
};
pub use view::{CoinsCursor, CoinsView};

/// Result type for view operations.
pub type Result<T> = std::result::Result<T, Error>;
