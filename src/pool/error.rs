//! Error types returned by [`WriterPool`](crate::pool::WriterPool) operations.

use std::sync::Arc;

/// The opaque error reported by a [`WriterFactory`](crate::pool::WriterFactory)
/// when it fails to construct a writer.
///
/// Wrapped in an [`Arc`] so the same failure can be cheaply cloned and
/// re-reported, identically, to every thread racing on the same
/// freshly-inserted, still-poisoned entry.
#[derive(Debug)]
pub struct ConstructionError(pub anyhow::Error);

impl std::fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConstructionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for ConstructionError {
    fn from(e: anyhow::Error) -> Self {
        ConstructionError(e)
    }
}

/// Errors returned by the pool's public operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// The pool has been closed via [`WriterPool::close`](crate::pool::WriterPool::close);
    /// terminal, callers must not retry on the same pool.
    #[error("writer pool is closed")]
    PoolClosed,

    /// Another thread currently owns this journal's writer. Transient;
    /// retry after the owner releases it.
    #[error("writer is busy (held by another thread)")]
    WriterBusy,

    /// The journal name is administratively locked via
    /// [`WriterPool::lock`](crate::pool::WriterPool::lock).
    #[error("journal is administratively locked")]
    JournalLocked,

    /// The base factory failed to construct a writer for this name.
    #[error("failed to construct writer: {0}")]
    ConstructionFailed(Arc<ConstructionError>),

    /// Programmer error: an operation was attempted in a state the protocol
    /// forbids (e.g. `unlock` while a writer is still checked out).
    #[error("illegal pool state: {0}")]
    IllegalState(String),
}
