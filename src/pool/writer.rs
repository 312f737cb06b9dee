//! Interfaces the pool requires from, and provides to, its collaborators:
//! journal metadata, the base writer factory, and pooled writers themselves.
//!
//! None of these are implemented here beyond what the protocol needs — the
//! storage engine that physically builds writers, and the writer's on-disk
//! behavior, are external collaborators owned by the caller.

use std::sync::Arc;

use crate::pool::error::ConstructionError;

/// Metadata identifying the journal a writer should be constructed for.
///
/// Implementors typically carry schema, partitioning, and other catalog
/// information alongside the name; the pool only ever looks at [`name`](JournalMetadata::name).
pub trait JournalMetadata {
    /// The journal's unique name. Two pieces of metadata with the same name
    /// refer to the same cached entry.
    fn name(&self) -> &str;
}

/// Capability installed on a writer that redirects its `close()` to the pool.
///
/// A writer consults this (if installed) from its own close path: `true`
/// authorizes physical destruction, `false` means the pool wants to keep the
/// writer cached and the writer must remain usable as if `close()` had never
/// been called.
pub trait CloseInterceptor: Send + Sync {
    /// Ask whether `writer` may be physically closed right now.
    fn can_close(&self, writer: &dyn PooledWriter) -> bool;
}

/// What a writer must support to be managed by a [`WriterPool`](crate::pool::WriterPool).
///
/// The pool installs and detaches a [`CloseInterceptor`] on writers it owns;
/// it never calls `close()` on a writer itself (that's the caller's job —
/// closing is how a writer's ownership is returned to the pool).
pub trait PooledWriter: Send + Sync {
    /// The journal name this writer was constructed for.
    fn name(&self) -> &str;

    /// Install (or replace) the close interceptor. Called once, right after
    /// construction, before the writer is published into its entry.
    fn install_close_interceptor(&self, hook: Arc<dyn CloseInterceptor>);

    /// Detach the close interceptor. After this call the writer is
    /// self-owned again: its own `close()` must destroy the resource
    /// unconditionally.
    fn clear_close_interceptor(&self);

    /// Physically destroy the writer's underlying resource.
    ///
    /// Called directly by the pool itself — never through the intercepted,
    /// client-facing `close()` path — once the pool already holds exclusive
    /// ownership and has detached the interceptor: during administrative
    /// `lock()` and during sweep/shutdown reclamation of an idle writer.
    /// Errors are logged and swallowed by the caller, never propagated to an
    /// application thread.
    fn destroy(&self) -> Result<(), anyhow::Error>;
}

/// Physically constructs a writer from journal metadata. Supplied by the
/// underlying storage engine; construction may block on filesystem I/O.
pub trait WriterFactory<M: JournalMetadata, W: PooledWriter>: Send + Sync {
    /// Build a fresh writer for `metadata`. The caller is responsible for
    /// installing the close interceptor before the writer becomes visible
    /// to other threads.
    fn construct(&self, metadata: &M) -> Result<Arc<W>, ConstructionError>;
}
