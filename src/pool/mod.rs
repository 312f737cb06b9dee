//! Caching writer pool: the acquire/release engine, lockout protocol, sweep
//! job and shutdown protocol described by the crate's design.
//!
//! See the crate root docs for a worked example. The short version: call
//! [`WriterPool::writer`] to get an exclusive, cached writer for a journal
//! name; call `close()` on the *writer* (not the pool) to return it to the
//! cache; call [`WriterPool::run`] periodically from a scheduler thread you
//! own to reclaim writers idle past the TTL; call [`WriterPool::close`] once,
//! at shutdown.

mod entry;
mod error;
mod table;
mod thread_id;
mod writer;

pub use error::{ConstructionError, PoolError};
pub use writer::{CloseInterceptor, JournalMetadata, PooledWriter, WriterFactory};

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use entry::Entry;
use table::EntryTable;

/// Default duration an idle cached writer survives before [`WriterPool::run`]
/// is allowed to reclaim it.
pub const DEFAULT_INACTIVE_TTL: Duration = Duration::from_secs(30 * 60);

/// Outcome of trying to claim an already-tracked entry for a caller of
/// [`WriterPool::writer`].
enum Claim<W> {
    /// The caller now exclusively owns this writer.
    Writer(Arc<W>),
    /// A terminal error; the caller's entry was not mutated.
    Err(PoolError),
    /// The entry a caller was holding turned out to be a dead husk — removed
    /// from the table by a concurrent sweep/unlock/shutdown after the caller
    /// looked it up but before it could be claimed. The caller should look
    /// `name` up again from scratch.
    Retry,
}

/// Outcome of trying to claim an already-tracked entry for a caller of
/// [`WriterPool::lock`].
enum LockClaim {
    Locked,
    Err(PoolError),
    Retry,
}

struct Shared<W: PooledWriter> {
    table: EntryTable<W>,
    closed: AtomicBool,
    epoch: Instant,
    inactive_ttl: Duration,
}

impl<W: PooledWriter + 'static> Shared<W> {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shared implementation of the periodic sweep and of the unconditional
    /// reclamation `close()` performs at shutdown, which is simply a sweep
    /// with every idle entry treated as already past its deadline.
    fn sweep_with_deadline(&self, deadline_nanos: u64) -> bool {
        let mut did_work = false;
        for entry in self.table.snapshot() {
            if entry.owner() == thread_id::FREE && entry.last_release_nanos() < deadline_nanos {
                did_work |= self.try_reclaim_idle(&entry);
            } else if entry.construction_error().is_some() {
                // Poisoned entries are garbage-collected unconditionally,
                // independent of TTL, so a failed name doesn't stay
                // unreachable indefinitely.
                self.table.remove(entry.name());
                did_work = true;
            }
        }
        did_work
    }

    fn try_reclaim_idle(&self, entry: &Arc<Entry<W>>) -> bool {
        let me = thread_id::current();
        if !entry.try_claim(me) {
            // Lost the race to another sweep pass or to a fresh acquirer.
            return false;
        }
        // SAFETY: we just won the `owner` CAS.
        if let Some(w) = unsafe { entry.writer() } {
            w.clear_close_interceptor();
            if let Err(err) = w.destroy() {
                tracing::warn!(name = entry.name(), %err, "error closing writer during sweep");
            }
            unsafe { entry.set_writer(None) };
        }
        // Tombstoned by the table itself. We deliberately do not try to put
        // `owner` back to FREE afterward: this entry is no longer reachable
        // from the table, so nothing should ever act on its ownership state
        // again. A thread that already holds an `Arc` to it from a lookup
        // that raced this removal must notice the tombstone and retry a
        // fresh lookup instead of trusting any further CAS against it.
        self.table.remove(entry.name());
        true
    }

    fn lock_existing(&self, entry: &Arc<Entry<W>>) -> LockClaim {
        if entry.is_removed() {
            return LockClaim::Retry;
        }
        let me = thread_id::current();
        let claimed = entry.try_claim(me) || entry.owner() == me;
        if !claimed {
            return LockClaim::Err(PoolError::WriterBusy);
        }
        if entry.is_removed() {
            // A concurrent sweep or shutdown tombstoned this entry between
            // our check above and winning ownership of it. It's a dead
            // object now; the caller needs a fresh entry to lock.
            return LockClaim::Retry;
        }
        // SAFETY: we hold `owner` (just claimed it, or already held it).
        if let Some(w) = unsafe { entry.writer() } {
            w.clear_close_interceptor();
            if let Err(err) = w.destroy() {
                tracing::warn!(name = entry.name(), %err, "error closing writer while locking journal");
            }
            unsafe { entry.set_writer(None) };
        }
        entry.set_locked(true);
        LockClaim::Locked
    }
}

/// Capability the pool installs on every writer it hands out. A writer's own
/// `close()` must call [`CloseInterceptor::can_close`] on this (if present)
/// before physically destroying itself.
struct CloseHook<W: PooledWriter> {
    shared: Arc<Shared<W>>,
}

impl<W: PooledWriter + 'static> CloseInterceptor for CloseHook<W> {
    fn can_close(&self, writer: &dyn PooledWriter) -> bool {
        let Some(entry) = self.shared.table.get(writer.name()) else {
            // No longer tracked (removed by unlock/sweep/shutdown): this
            // writer doesn't belong to the pool anymore, let it close itself.
            writer.clear_close_interceptor();
            return true;
        };
        let me = thread_id::current();
        if !entry.try_release(me) {
            tracing::warn!(
                name = writer.name(),
                "close() called by a thread that is not the recorded owner"
            );
            return false;
        }
        if !self.shared.is_closed() {
            entry.set_last_release_nanos(self.shared.now_nanos());
            return false;
        }
        // Shutdown race: exactly one of {this releasing thread, a concurrent
        // sweep} must win the re-claim and perform the physical destruction;
        // the other observes the loss and steps aside.
        if entry.try_reclaim(me) {
            writer.clear_close_interceptor();
            // SAFETY: we just re-won `owner`.
            unsafe { entry.set_writer(None) };
            self.shared.table.remove(writer.name());
            true
        } else {
            false
        }
    }
}

/// A caching pool of exclusive journal writers.
///
/// `M` is the journal metadata type, `W` the writer type, `F` the base
/// factory that physically constructs a `W` from an `M`. Construct one via
/// [`WriterPool::builder`].
pub struct WriterPool<M: JournalMetadata, W: PooledWriter + 'static, F: WriterFactory<M, W>> {
    shared: Arc<Shared<W>>,
    factory: F,
    _metadata: PhantomData<fn(&M)>,
}

impl<M: JournalMetadata, W: PooledWriter + 'static, F: WriterFactory<M, W>> WriterPool<M, W, F> {
    /// Starts building a pool around the given base writer factory.
    pub fn builder(factory: F) -> WriterPoolBuilder<M, W, F> {
        WriterPoolBuilder {
            factory,
            inactive_ttl: DEFAULT_INACTIVE_TTL,
            _metadata: PhantomData,
        }
    }

    /// Acquire an exclusive writer for `metadata`.
    ///
    /// A successful return means the calling thread now owns the entry; a
    /// failed return never mutates ownership.
    pub fn writer(&self, metadata: &M) -> Result<Arc<W>, PoolError> {
        if self.shared.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        let name = metadata.name();

        loop {
            let entry = match self.shared.table.get(name) {
                Some(entry) => entry,
                None => {
                    let fresh = Arc::new(Entry::new_pending_construction(name));
                    let (entry, inserted) = self.shared.table.insert_if_absent(name, fresh);
                    if inserted {
                        return self.construct_into(&entry, metadata);
                    }
                    entry
                }
            };

            match self.claim_existing(&entry) {
                Claim::Writer(w) => return Ok(w),
                Claim::Err(e) => return Err(e),
                // The entry we looked up was torn down by a concurrent
                // sweep/unlock/shutdown between our lookup and our claim
                // attempt. Look `name` up again; it may now be absent (we'll
                // build a fresh one) or already rebuilt by another thread.
                Claim::Retry => continue,
            }
        }
    }

    fn construct_into(&self, entry: &Arc<Entry<W>>, metadata: &M) -> Result<Arc<W>, PoolError> {
        match self.factory.construct(metadata) {
            Ok(writer) => {
                let hook: Arc<dyn CloseInterceptor> = Arc::new(CloseHook {
                    shared: self.shared.clone(),
                });
                writer.install_close_interceptor(hook);
                // SAFETY: we are the creator and hold `owner` (set at
                // Entry::new_pending_construction); no one else can observe
                // this entry's writer slot yet.
                unsafe { entry.set_writer(Some(writer.clone())) };
                entry.mark_resolved();
                tracing::debug!(name = entry.name(), owner = entry.owner(), "constructed writer");
                Ok(writer)
            }
            Err(err) => {
                let err = Arc::new(err);
                entry.set_construction_error(err.clone());
                entry.mark_resolved();
                Err(PoolError::ConstructionFailed(err))
            }
        }
    }

    fn claim_existing(&self, entry: &Arc<Entry<W>>) -> Claim<W> {
        if entry.is_removed() {
            return Claim::Retry;
        }
        // Checked up front (not just after a successful CAS) so that a
        // locked journal reports `JournalLocked` to *every* thread, not just
        // the one currently recorded as owner.
        if entry.is_locked() {
            return Claim::Err(PoolError::JournalLocked);
        }
        // A poisoned entry (construction failed for its creator) never
        // carries a writer; report the same error to every racing thread
        // that joined it, not just the creator retrying.
        if let Some(err) = entry.construction_error() {
            return Claim::Err(PoolError::ConstructionFailed(err));
        }
        let me = thread_id::current();
        if entry.try_claim(me) {
            if entry.is_removed() {
                // A concurrent sweep/shutdown tombstoned this entry between
                // our checks above and our CAS winning. The CAS we just won
                // was against a dead object; abandon it rather than trust
                // anything further about it.
                return Claim::Retry;
            }
            // Re-check: a concurrent `lock()` may have claimed ownership and
            // set `locked` between the check above and this CAS winning.
            if entry.is_locked() {
                entry.try_release(me);
                return Claim::Err(PoolError::JournalLocked);
            }
            // SAFETY: we just won `owner`.
            let writer = unsafe { entry.writer() }
                .expect("entry owned by this thread must carry a writer once unlocked");
            if self.shared.is_closed() {
                // Shutdown already ran; this thread's future close() must
                // destroy the writer instead of caching it.
                writer.clear_close_interceptor();
            }
            return Claim::Writer(writer);
        }

        // CAS failed: read owner exactly once.
        let owner = entry.owner();
        if owner == me {
            // Re-entrant acquire: still owned by us, nothing to mutate. The
            // locked and construction-error checks above already cover us
            // here too, since neither can change for an entry this thread
            // has owned continuously.
            // SAFETY: we (still) hold `owner`.
            let writer = unsafe { entry.writer() }
                .expect("re-entrant owner must already have a cached writer");
            if self.shared.is_closed() {
                writer.clear_close_interceptor();
            }
            return Claim::Writer(writer);
        }

        if entry.is_removed() {
            // Owned by a thread id that has already torn this entry down
            // (e.g. a sweep that finished destroying it); there is nothing
            // left to be busy about.
            return Claim::Retry;
        }

        if !entry.is_resolved() {
            // `owner` is still the entry's creator, and the creator hasn't
            // finished its call into the base factory yet. Reporting
            // `WriterBusy` here would be a lie about *why* the entry is
            // unavailable: the creator might be about to fail, in which case
            // every racing thread needs to see the same construction error,
            // not a transient busy signal. Wait for the creator to resolve
            // one way or the other, then re-evaluate from scratch.
            while !entry.is_resolved() {
                std::thread::yield_now();
            }
            return Claim::Retry;
        }

        Claim::Err(PoolError::WriterBusy)
    }

    /// Administratively reserve `name` so no writer can be issued from it.
    /// Fails with [`PoolError::PoolClosed`] or [`PoolError::WriterBusy`].
    pub fn lock(&self, name: &str) -> Result<(), PoolError> {
        if self.shared.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        loop {
            let entry = match self.shared.table.get(name) {
                Some(entry) => entry,
                None => {
                    let fresh = Arc::new(Entry::new_owned_by_creator(name));
                    fresh.set_locked(true);
                    let (entry, inserted) = self.shared.table.insert_if_absent(name, fresh);
                    if inserted {
                        return Ok(());
                    }
                    entry
                }
            };

            match self.shared.lock_existing(&entry) {
                LockClaim::Locked => return Ok(()),
                LockClaim::Err(e) => return Err(e),
                LockClaim::Retry => continue,
            }
        }
    }

    /// Release an administrative lock taken by the calling thread. A no-op
    /// if there is no such entry, or if the calling thread is not the
    /// recorded owner (defensive: a caller that never held the lock has no
    /// business tearing it down).
    pub fn unlock(&self, name: &str) -> Result<(), PoolError> {
        let Some(entry) = self.shared.table.get(name) else {
            return Ok(());
        };
        if entry.owner() != thread_id::current() {
            return Ok(());
        }
        // SAFETY: we are the recorded owner.
        if unsafe { entry.writer() }.is_some() {
            return Err(PoolError::IllegalState(format!(
                "unlock({name}): entry still carries a writer"
            )));
        }
        self.shared.table.remove(name);
        Ok(())
    }

    /// Run one sweep pass over all tracked entries, reclaiming writers idle
    /// past the configured TTL. Returns whether any entry was removed —
    /// callers may use this as a hint to schedule the next run sooner.
    pub fn run(&self) -> bool {
        let deadline = self.shared.now_nanos().saturating_sub(self.shared.inactive_ttl.as_nanos() as u64);
        self.shared.sweep_with_deadline(deadline)
    }

    /// Transition the pool into its terminal, closed state. No new acquires
    /// succeed afterward. Every idle writer reachable right now is reclaimed
    /// immediately; writers currently checked out by other threads are
    /// destroyed when those threads eventually call `close()` on them (via
    /// the close interceptor's shutdown branch).
    ///
    /// Does not block waiting for outstanding owners; poll
    /// [`WriterPool::count_free_writers`] for full quiescence.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.sweep_with_deadline(u64::MAX);
    }

    /// Number of journal names currently tracked by the pool.
    pub fn size(&self) -> usize {
        self.shared.table.len()
    }

    /// Number of tracked entries whose `owner` is currently `FREE`.
    pub fn count_free_writers(&self) -> usize {
        self.shared
            .table
            .snapshot()
            .into_iter()
            .filter(|e| e.owner() == thread_id::FREE)
            .count()
    }
}

/// Builder for [`WriterPool`].
pub struct WriterPoolBuilder<M: JournalMetadata, W: PooledWriter + 'static, F: WriterFactory<M, W>>
{
    factory: F,
    inactive_ttl: Duration,
    _metadata: PhantomData<fn(&M)>,
}

impl<M: JournalMetadata, W: PooledWriter + 'static, F: WriterFactory<M, W>>
    WriterPoolBuilder<M, W, F>
{
    /// Sets the idle TTL after which [`WriterPool::run`] may reclaim a
    /// cached writer. Defaults to [`DEFAULT_INACTIVE_TTL`].
    pub fn inactive_ttl(mut self, ttl: Duration) -> Self {
        self.inactive_ttl = ttl;
        self
    }

    /// Builds the pool.
    pub fn build(self) -> WriterPool<M, W, F> {
        WriterPool {
            shared: Arc::new(Shared {
                table: EntryTable::new(),
                closed: AtomicBool::new(false),
                epoch: Instant::now(),
                inactive_ttl: self.inactive_ttl,
            }),
            factory: self.factory,
            _metadata: PhantomData,
        }
    }
}
