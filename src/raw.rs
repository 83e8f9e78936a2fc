// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The raw acquisition protocol.
//!
//! All bookkeeping lives in one [`LockState`] behind a single internal
//! mutex; blocked threads park on one of two condition variables, one per
//! waiter class. Every wait re-tests its guard condition after waking, so
//! spurious wake-ups and wake-all races resolve themselves in the loop.

#[cfg(loom)]
use loom::sync::{Condvar, Mutex, MutexGuard};
#[cfg(not(loom))]
use std::sync::{Condvar, Mutex, MutexGuard};

use std::collections::HashMap;
use std::fmt;
use std::sync::PoisonError;

use crate::error::{HoldKind, LockError};
use crate::thread_id::{self, ThreadId};

/// Selects whether a lock tracks per-thread recursive holds.
///
/// The mode is fixed when the lock is constructed. A non-recursive lock
/// never resolves thread identities, so it cannot recognize its own
/// re-entry; a thread that re-requests access it already holds simply
/// counts as one more contender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecursionMode {
    #[default]
    NonRecursive,
    Recursive,
}

/// Reader-writer lock protocol without an owned value.
///
/// `read`/`write` block until the requested access is granted; each grant
/// must be paired with exactly one matching unlock from the same thread.
/// Writers are preferred: a waiting writer stops new readers from joining,
/// so a continuous stream of readers cannot starve it. When the lock goes
/// completely free, one waiting writer is woken if there is one, otherwise
/// all waiting readers are.
///
/// In [`RecursionMode::Recursive`] the same thread may nest read holds,
/// nest write holds, take read holds while it is the writer, and promote a
/// read hold to a write hold by waiting only for the *other* readers to
/// drain. Two threads both promoting at once deadlock against each other;
/// promotion does not give up the holds already owned.
pub struct RawRwLock {
    mode: RecursionMode,
    state: Mutex<LockState>,
    readers: Condvar,
    writers: Condvar,
}

impl RawRwLock {
    /// A non-recursive lock.
    pub fn new() -> RawRwLock {
        RawRwLock::with_mode(RecursionMode::NonRecursive)
    }

    pub fn with_mode(mode: RecursionMode) -> RawRwLock {
        RawRwLock {
            mode,
            state: Mutex::new(LockState::new()),
            readers: Condvar::new(),
            writers: Condvar::new(),
        }
    }

    pub fn mode(&self) -> RecursionMode {
        self.mode
    }

    /// Blocks the calling thread until a read hold is granted.
    pub fn read(&self) -> Result<(), LockError> {
        self.read_owner().map(|_| ())
    }

    pub(crate) fn read_owner(&self) -> Result<Option<ThreadId>, LockError> {
        let owner = self.current_owner()?;
        let mut state = self.lock_state();

        if let Some(id) = owner {
            // Re-acquiring a read hold this thread already has. Granted
            // even while writers wait, or re-entry would deadlock itself.
            if let Some(holds) = state.read_holds.get_mut(&id) {
                *holds += 1;
                state.active_readers += 1;
                return Ok(owner);
            }
            // The writer may always take read holds on the side.
            if state.current_writer == Some(id) {
                state.read_holds.insert(id, 1);
                state.active_readers += 1;
                return Ok(owner);
            }
        }

        // A waiting writer shuts out new readers just like an active one.
        while state.active_writers > 0 || state.waiting_writers > 0 {
            state.waiting_readers += 1;
            state = Self::wait(&self.readers, state);
            state.waiting_readers -= 1;
        }

        if let Some(id) = owner {
            state.read_holds.insert(id, 1);
        }
        state.active_readers += 1;
        Ok(owner)
    }

    /// Blocks the calling thread until the write hold is granted.
    pub fn write(&self) -> Result<(), LockError> {
        self.write_owner().map(|_| ())
    }

    pub(crate) fn write_owner(&self) -> Result<Option<ThreadId>, LockError> {
        let owner = self.current_owner()?;
        let mut state = self.lock_state();

        let mut own_reads = 0;
        if let Some(id) = owner {
            // Nested write hold by the current writer.
            if state.current_writer == Some(id) {
                state.active_writers += 1;
                return Ok(owner);
            }
            // Read holds this thread already has must not be waited on
            // below; a promotion waits only for the other readers.
            own_reads = state.read_holds.get(&id).copied().unwrap_or(0);
        }

        let upgrading = own_reads > 0;
        while state.active_writers > 0 || state.active_readers > own_reads {
            state.waiting_writers += 1;
            if upgrading {
                state.waiting_upgraders += 1;
            }
            state = Self::wait(&self.writers, state);
            if upgrading {
                state.waiting_upgraders -= 1;
            }
            state.waiting_writers -= 1;
        }

        state.current_writer = owner;
        state.active_writers += 1;
        Ok(owner)
    }

    /// Releases one read hold of the calling thread.
    pub fn read_unlock(&self) -> Result<(), LockError> {
        let owner = self.current_owner()?;
        self.read_unlock_as(owner)
    }

    pub(crate) fn read_unlock_as(&self, owner: Option<ThreadId>) -> Result<(), LockError> {
        let mut state = self.lock_state();

        if let Some(id) = owner {
            let Some(holds) = state.read_holds.get_mut(&id) else {
                return Err(LockError::UnmatchedRelease(HoldKind::Read));
            };
            *holds -= 1;
            if *holds == 0 {
                state.read_holds.remove(&id);
            }
        } else if state.active_readers == 0 {
            return Err(LockError::UnmatchedRelease(HoldKind::Read));
        }

        debug_assert!(state.active_readers > 0);
        state.active_readers -= 1;
        if state.active_readers == 0 && state.active_writers == 0 {
            self.wake(&state);
        } else if state.active_writers == 0 && state.waiting_upgraders > 0 {
            // A blocked promotion waits only for the other readers, so it
            // is never reached by the completely-free wake above. Let it
            // re-test now that a reader left; plain writers find their
            // condition still false and go back to sleep.
            self.writers.notify_all();
        }
        Ok(())
    }

    /// Releases one write hold of the calling thread.
    pub fn write_unlock(&self) -> Result<(), LockError> {
        let owner = self.current_owner()?;
        self.write_unlock_as(owner)
    }

    pub(crate) fn write_unlock_as(&self, owner: Option<ThreadId>) -> Result<(), LockError> {
        let mut state = self.lock_state();

        if owner.is_some() {
            if state.current_writer != owner {
                return Err(LockError::UnmatchedRelease(HoldKind::Write));
            }
        } else if state.active_writers == 0 {
            return Err(LockError::UnmatchedRelease(HoldKind::Write));
        }

        debug_assert!(state.active_writers > 0);
        state.active_writers -= 1;
        if state.active_writers == 0 {
            state.current_writer = None;
            // Read holds kept across a promotion may outlive the write
            // hold; the lock is only free once those drain too.
            if state.active_readers == 0 {
                self.wake(&state);
            }
        }
        Ok(())
    }

    /// Number of read holds currently granted. Nested holds of a single
    /// thread are counted separately.
    pub fn reader_count(&self) -> usize {
        self.lock_state().active_readers
    }

    /// Whether some thread currently holds write access.
    pub fn is_write_locked(&self) -> bool {
        self.lock_state().active_writers > 0
    }

    /// Wake policy at the instant the lock becomes completely free: one
    /// writer if any is waiting, otherwise every waiting reader.
    fn wake(&self, state: &LockState) {
        if state.waiting_writers > 0 {
            self.writers.notify_one();
        } else if state.waiting_readers > 0 {
            self.readers.notify_all();
        }
    }

    fn current_owner(&self) -> Result<Option<ThreadId>, LockError> {
        match self.mode {
            RecursionMode::Recursive => Ok(Some(thread_id::current()?)),
            RecursionMode::NonRecursive => Ok(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        // The state mutex is held only for a few counter updates; a panic
        // inside that window cannot leave them torn, so a poisoned guard
        // is still consistent and gets recovered.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(condvar: &Condvar, guard: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RawRwLock {
    fn default() -> RawRwLock {
        RawRwLock::new()
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RawRwLock")
            .field("mode", &self.mode)
            .field("active_readers", &state.active_readers)
            .field("active_writers", &state.active_writers)
            .field("waiting_readers", &state.waiting_readers)
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

struct LockState {
    active_readers: usize,
    active_writers: usize,
    current_writer: Option<ThreadId>,
    waiting_readers: usize,
    waiting_writers: usize,
    waiting_upgraders: usize,
    read_holds: HashMap<ThreadId, usize>,
}

impl LockState {
    fn new() -> LockState {
        LockState {
            active_readers: 0,
            active_writers: 0,
            current_writer: None,
            waiting_readers: 0,
            waiting_writers: 0,
            waiting_upgraders: 0,
            read_holds: HashMap::new(),
        }
    }
}
