//! Concurrent `name -> Entry` map.
//!
//! Backed by a `parking_lot::RwLock<FxHashMap<..>>` the way the teacher's
//! detector keeps its thread/lock bookkeeping in a `Mutex<FxHashMap<..>>`
//! (`core::detector::Detector`): a short-lived guard around a fast hasher,
//! never held across a factory call or I/O. This is a *sharded-away-from*
//! lock, not the central mutex the acquire/release hot path is built to
//! avoid — the hot path (re-entrant acquire, release, sweep skip) never
//! touches it, only the per-entry `owner` atomic does.

use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::pool::entry::Entry;
use crate::pool::writer::PooledWriter;

pub(crate) struct EntryTable<W: PooledWriter> {
    inner: RwLock<FxHashMap<Box<str>, Arc<Entry<W>>>>,
}

impl<W: PooledWriter> EntryTable<W> {
    pub(crate) fn new() -> Self {
        EntryTable {
            inner: RwLock::new(FxHashMap::default()),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<Entry<W>>> {
        self.inner.read().get(name).cloned()
    }

    /// Installs `entry` if no entry exists for its name yet. Returns the
    /// entry that is now in the table (either the one just inserted, or the
    /// one a concurrent caller beat us to) and whether *this* call won the
    /// race.
    pub(crate) fn insert_if_absent(
        &self,
        name: &str,
        entry: Arc<Entry<W>>,
    ) -> (Arc<Entry<W>>, bool) {
        let mut guard = self.inner.write();
        if let Some(existing) = guard.get(name) {
            return (existing.clone(), false);
        }
        guard.insert(name.into(), entry.clone());
        (entry, true)
    }

    /// Removes and tombstones the entry for `name`, if any. Tombstoning
    /// happens here, unconditionally, so every removal path (sweep, unlock,
    /// shutdown) invalidates any `Arc<Entry>` a concurrent thread may already
    /// be holding from a lookup that raced the removal.
    pub(crate) fn remove(&self, name: &str) -> Option<Arc<Entry<W>>> {
        let removed = self.inner.write().remove(name);
        if let Some(entry) = &removed {
            entry.mark_removed();
        }
        removed
    }

    /// A weakly-consistent snapshot of the entries currently tracked, safe to
    /// take concurrently with inserts/removes (it may miss a concurrent
    /// insert or include one that's since been removed).
    pub(crate) fn snapshot(&self) -> Vec<Arc<Entry<W>>> {
        self.inner.read().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.read().len()
    }
}
