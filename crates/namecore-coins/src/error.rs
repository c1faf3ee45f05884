//! Error types for the view layer.

/// Errors that can surface from a chain of coin views.
///
/// Contract violations (overwriting a live coin, undoing a name that does
/// not exist, a child cache lying about parent absence) are not represented
/// here: they indicate prior corruption of the cache and abort immediately.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Read fault reported by the backing store.
    #[error("backing store read failed: {0}")]
    Backing(Box<dyn std::error::Error + Send + Sync>),

    /// A long-running traversal was interrupted by the caller.
    #[error("name database validation interrupted")]
    Interrupted,
}

impl Error {
    /// Wraps a backing-store fault.
    pub fn backing<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backing(Box::new(err))
    }
}
