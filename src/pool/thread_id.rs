//! Small integer thread identity, used as the `owner` value stored in each
//! [`Entry`](crate::pool::entry::Entry).
//!
//! Stable Rust exposes no portable small integer for [`std::thread::ThreadId`],
//! so we mint our own: a process-wide counter handed out once per OS thread
//! and cached in a thread-local for the rest of that thread's life. Two
//! threads never observe the same id, and no live thread is ever assigned the
//! [`FREE`] sentinel.

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel `owner` value meaning "no thread currently holds this entry".
pub const FREE: i64 = -1;

static NEXT_THREAD_ID: AtomicI64 = AtomicI64::new(0);

thread_local! {
    static THREAD_ID: Cell<Option<i64>> = const { Cell::new(None) };
}

/// Returns a stable, process-unique, non-negative id for the calling thread.
///
/// The id is assigned lazily on first call from a given thread and reused on
/// every subsequent call from that same thread.
pub fn current() -> i64 {
    THREAD_ID.with(|cell| {
        if let Some(id) = cell.get() {
            return id;
        }
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        cell.set(Some(id));
        id
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_per_thread() {
        let a = current();
        let b = current();
        assert_eq!(a, b);
    }

    #[test]
    fn ids_are_distinct_across_threads() {
        let a = current();
        let b = std::thread::spawn(current).join().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, FREE);
        assert_ne!(b, FREE);
    }
}
