// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Process-wide thread identity for the recursion bookkeeping.
//!
//! Identities are handed out from a global counter on first use and cached
//! in a thread-local slot. An id is never reused within a process run, so a
//! finished thread's id cannot collide with a live thread's holds.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::AccessError;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // 0 means "not assigned yet"; real ids start at 1.
    static SELF_ID: Cell<u64> = const { Cell::new(0) };
}

/// Opaque identity of a thread as seen by the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ThreadId(u64);

/// Identity of the calling thread.
///
/// Fails only when the thread-local slot is inaccessible, which happens if
/// the lock is used from a thread-local destructor during thread teardown.
pub(crate) fn current() -> Result<ThreadId, AccessError> {
    SELF_ID.try_with(|slot| {
        let existing = slot.get();
        if existing != 0 {
            return ThreadId(existing);
        }
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        slot.set(id);
        ThreadId(id)
    })
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn stable_within_a_thread() {
        let first = current().unwrap();
        let second = current().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn distinct_across_threads() {
        let own = current().unwrap();
        let mut seen = HashSet::new();
        seen.insert(own);

        let handles: Vec<_> = (0..4)
            .map(|_| thread::spawn(|| current().unwrap()))
            .collect();
        for handle in handles {
            assert!(seen.insert(handle.join().unwrap()), "thread id reused");
        }
    }
}
