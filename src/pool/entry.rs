//! Per-journal cache slot.
//!
//! `owner` is the sole synchronization edge for the `writer` slot: a thread
//! may read or write `writer` only while it holds `owner` (either as the
//! entry's creator, before the entry is ever published, or after winning a
//! CAS from [`thread_id::FREE`] to its own id). We use a native atomic field
//! for ownership tracking and `release`/`acquire` fences for the rest of the
//! entry's state.
//!
//! Once an entry is removed from the table it is a dead object: any CAS a
//! thread manages to win against it afterward is meaningless, because no
//! fresh lookup will ever find it again. `removed` is a tombstone callers
//! check before trusting a CAS result, so a thread racing a concurrent
//! reclamation never mistakes a detached `Entry` for a live one.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::pool::error::ConstructionError;
use crate::pool::thread_id::{self, FREE};
use crate::pool::writer::PooledWriter;

pub(crate) struct Entry<W: PooledWriter> {
    name: Box<str>,
    owner: AtomicI64,
    last_release_time_nanos: AtomicU64,
    locked: AtomicBool,
    // Tombstone set once this entry has been removed from the table (by
    // sweep, `unlock`, or shutdown). A thread holding a reference obtained
    // before the removal must check this before acting on anything it
    // subsequently observes on the entry.
    removed: AtomicBool,
    // True once construction has either published a writer or recorded a
    // construction error. False only during the narrow window between a
    // fresh entry's creation and its creator's call to the base factory
    // returning. Entries that never go through construction (e.g. ones
    // created directly by `lock`) start resolved.
    resolved: AtomicBool,
    // SAFETY: only ever read/written by the thread that currently holds
    // `owner` (see module docs). Never touched by a thread that lost or
    // hasn't attempted the CAS.
    writer: UnsafeCell<Option<Arc<W>>>,
    construction_error: OnceLock<Arc<ConstructionError>>,
}

// SAFETY: all interior-mutable state (`writer`) is guarded by the `owner`
// atomic as described above; `Arc<W>` is itself Send + Sync because
// `PooledWriter: Send + Sync`.
unsafe impl<W: PooledWriter> Send for Entry<W> {}
unsafe impl<W: PooledWriter> Sync for Entry<W> {}

impl<W: PooledWriter> Entry<W> {
    /// Creates a fresh entry, owned immediately by the calling thread (the
    /// "creator"), already resolved (no pending construction to wait on).
    /// Used by `lock`, where the creator sets `locked` itself and no base
    /// factory call is ever involved.
    pub(crate) fn new_owned_by_creator(name: &str) -> Self {
        Self::new_with_resolved(name, true)
    }

    /// Creates a fresh entry owned immediately by the calling thread, not yet
    /// resolved: the creator is about to call the base factory, and other
    /// threads racing on this name need to tell "still constructing" apart
    /// from "busy with an already-cached writer".
    pub(crate) fn new_pending_construction(name: &str) -> Self {
        Self::new_with_resolved(name, false)
    }

    fn new_with_resolved(name: &str, resolved: bool) -> Self {
        Entry {
            name: name.into(),
            owner: AtomicI64::new(thread_id::current()),
            last_release_time_nanos: AtomicU64::new(0),
            locked: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            resolved: AtomicBool::new(resolved),
            writer: UnsafeCell::new(None),
            construction_error: OnceLock::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn owner(&self) -> i64 {
        self.owner.load(Ordering::Acquire)
    }

    /// Attempt to claim ownership: FREE -> thread.
    pub(crate) fn try_claim(&self, thread: i64) -> bool {
        self.owner
            .compare_exchange(FREE, thread, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Attempt to release ownership: thread -> FREE.
    pub(crate) fn try_release(&self, thread: i64) -> bool {
        self.owner
            .compare_exchange(thread, FREE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Attempt to re-claim ownership after releasing: FREE -> thread. Used by
    /// the close interceptor's shutdown race, where exactly one of {the
    /// releasing owner, a concurrent sweep} must win the re-claim and perform
    /// the physical destruction.
    pub(crate) fn try_reclaim(&self, thread: i64) -> bool {
        self.try_claim(thread)
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Release);
    }

    /// Nanoseconds since the pool's epoch at the moment this entry was last
    /// released, for the sweep job's TTL comparison.
    pub(crate) fn last_release_nanos(&self) -> u64 {
        self.last_release_time_nanos.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_release_nanos(&self, nanos: u64) {
        self.last_release_time_nanos.store(nanos, Ordering::Release);
    }

    pub(crate) fn construction_error(&self) -> Option<Arc<ConstructionError>> {
        self.construction_error.get().cloned()
    }

    /// Records a construction failure. Idempotent: only the first caller's
    /// error sticks, so every racing thread that reads it back sees the one
    /// error the winner recorded, not a fresher retry's error.
    pub(crate) fn set_construction_error(&self, err: Arc<ConstructionError>) {
        let _ = self.construction_error.set(err);
    }

    /// True once this entry has been removed from the table. A CAS won
    /// against a removed entry is against a dead object and must not be
    /// trusted as a live claim.
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Marks this entry as removed. Called by the table exactly once, at the
    /// point of removal.
    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    /// True once construction has resolved (a writer was published, or a
    /// construction error was recorded).
    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }

    /// Marks construction as resolved. Called once by the creator, right
    /// after it publishes a writer or records a construction error.
    pub(crate) fn mark_resolved(&self) {
        self.resolved.store(true, Ordering::Release);
    }

    /// Reads the cached writer. SAFETY: caller must currently hold `owner`
    /// (as creator-before-publish or as the thread that won the CAS).
    pub(crate) unsafe fn writer(&self) -> Option<Arc<W>> {
        unsafe { (*self.writer.get()).clone() }
    }

    /// Publishes or clears the cached writer. SAFETY: same precondition as
    /// [`Entry::writer`].
    pub(crate) unsafe fn set_writer(&self, writer: Option<Arc<W>>) {
        unsafe {
            *self.writer.get() = writer;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::writer::CloseInterceptor;

    struct NoopWriter;
    impl PooledWriter for NoopWriter {
        fn name(&self) -> &str {
            "noop"
        }
        fn install_close_interceptor(&self, _hook: Arc<dyn CloseInterceptor>) {}
        fn clear_close_interceptor(&self) {}
        fn destroy(&self) -> Result<(), anyhow::Error> {
            Ok(())
        }
    }

    #[test]
    fn creator_owns_fresh_entry_immediately() {
        let entry: Entry<NoopWriter> = Entry::new_owned_by_creator("t1");
        assert_eq!(entry.owner(), thread_id::current());
        assert!(!entry.is_locked());
        assert!(entry.construction_error().is_none());
        assert!(!entry.is_removed());
        assert!(entry.is_resolved());
    }

    #[test]
    fn pending_construction_entry_starts_unresolved() {
        let entry: Entry<NoopWriter> = Entry::new_pending_construction("t1");
        assert!(!entry.is_resolved());
        entry.mark_resolved();
        assert!(entry.is_resolved());
    }

    #[test]
    fn try_claim_then_release_round_trips_through_free() {
        let entry: Entry<NoopWriter> = Entry::new_owned_by_creator("t1");
        let me = thread_id::current();
        // Already owned by us; FREE -> me only succeeds once the owner has
        // actually released back to FREE.
        assert!(!entry.try_claim(me));
        assert!(entry.try_release(me));
        assert_eq!(entry.owner(), FREE);
        assert!(entry.try_claim(me));
        assert_eq!(entry.owner(), me);
    }

    #[test]
    fn release_by_non_owner_fails_and_does_not_mutate() {
        let entry: Entry<NoopWriter> = Entry::new_owned_by_creator("t1");
        let me = thread_id::current();
        assert!(!entry.try_release(me + 1));
        assert_eq!(entry.owner(), me);
    }

    #[test]
    fn construction_error_sticks_to_first_writer() {
        let entry: Entry<NoopWriter> = Entry::new_owned_by_creator("t1");
        let first = Arc::new(ConstructionError::from(anyhow::anyhow!("boom")));
        let second = Arc::new(ConstructionError::from(anyhow::anyhow!("different")));
        entry.set_construction_error(first.clone());
        entry.set_construction_error(second);
        let seen = entry.construction_error().unwrap();
        assert!(Arc::ptr_eq(&seen, &first));
    }

    #[test]
    fn mark_removed_is_observable_via_is_removed() {
        let entry: Entry<NoopWriter> = Entry::new_owned_by_creator("t1");
        assert!(!entry.is_removed());
        entry.mark_removed();
        assert!(entry.is_removed());
    }
}
