//! # journal-writer-pool
//!
//! A caching pool of exclusive, single-writer handles for a columnar
//! journal storage engine.
//!
//! Opening a journal writer is expensive: filesystem setup, memory-mapping,
//! metadata bootstrap. This pool amortizes that cost by keeping recently
//! used writers alive across client sessions, while preserving the storage
//! engine's fundamental invariant — **at most one writer exists for a given
//! journal at any moment**.
//!
//! ## How it fits together
//!
//! - Call [`WriterPool::writer`] with journal metadata to get an exclusive,
//!   cached writer. The calling thread becomes that entry's owner.
//! - The client calls `close()` on the *writer itself*, not the pool. The
//!   writer consults the [`CloseInterceptor`] the pool installed on it; the
//!   pool decides whether to actually destroy the writer or just mark it
//!   idle and keep it cached.
//! - A scheduler thread the pool doesn't own drives [`WriterPool::run`]
//!   periodically to reclaim writers idle past the configured TTL.
//! - [`WriterPool::lock`] / [`WriterPool::unlock`] administratively exclude a
//!   journal name from caching, e.g. before a schema change or a drop.
//! - [`WriterPool::close`] latches the pool closed; writers currently
//!   checked out by other threads are destroyed when those threads
//!   eventually call `close()` on them.
//!
//! ## Usage example
//!
//! ```rust
//! use journal_writer_pool::{
//!     CloseInterceptor, JournalMetadata, PooledWriter, WriterFactory, WriterPool,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! struct Meta(String);
//! impl JournalMetadata for Meta {
//!     fn name(&self) -> &str { &self.0 }
//! }
//!
//! struct DemoWriter {
//!     name: String,
//!     hook: Mutex<Option<Arc<dyn CloseInterceptor>>>,
//! }
//! impl PooledWriter for DemoWriter {
//!     fn name(&self) -> &str { &self.name }
//!     fn install_close_interceptor(&self, hook: Arc<dyn CloseInterceptor>) {
//!         *self.hook.lock().unwrap() = Some(hook);
//!     }
//!     fn clear_close_interceptor(&self) {
//!         *self.hook.lock().unwrap() = None;
//!     }
//!     fn destroy(&self) -> Result<(), anyhow::Error> { Ok(()) }
//! }
//! impl DemoWriter {
//!     // The client-facing close path: ask the pool first.
//!     fn close(self: &Arc<Self>) {
//!         let hook = self.hook.lock().unwrap().clone();
//!         let should_destroy = hook.map(|h| h.can_close(self.as_ref())).unwrap_or(true);
//!         if should_destroy {
//!             let _ = self.destroy();
//!         }
//!     }
//! }
//!
//! struct DemoFactory;
//! impl WriterFactory<Meta, DemoWriter> for DemoFactory {
//!     fn construct(&self, metadata: &Meta) -> Result<Arc<DemoWriter>, journal_writer_pool::ConstructionError> {
//!         Ok(Arc::new(DemoWriter { name: metadata.0.clone(), hook: Mutex::new(None) }))
//!     }
//! }
//!
//! let pool = WriterPool::builder(DemoFactory).build();
//! let w = pool.writer(&Meta("t1".into())).unwrap();
//! w.close();
//! assert_eq!(pool.count_free_writers(), 1);
//! ```

pub mod pool;

pub use pool::{
    CloseInterceptor, ConstructionError, JournalMetadata, PoolError, PooledWriter, WriterFactory,
    WriterPool, WriterPoolBuilder, DEFAULT_INACTIVE_TTL,
};
