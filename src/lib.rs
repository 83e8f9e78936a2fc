// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A reader-writer lock that prefers writers and can hand the same thread
//! nested and promoted holds.
//!
//! Any number of threads may read at once; writing is exclusive. Once a
//! writer starts waiting, new readers are shut out until it has had its
//! turn, so heavy read traffic cannot starve updates. When the lock goes
//! completely free it wakes one waiting writer if there is one, otherwise
//! all waiting readers.
//!
//! Two entry points share that protocol:
//!
//! * [`RwLock`] owns a value and hands out RAII guards, like
//!   [`std::sync::RwLock`] without poisoning. It is always non-recursive.
//! * [`RawRwLock`] owns nothing and adds [`RecursionMode::Recursive`]: a
//!   thread may nest read holds, nest write holds, read while writing and
//!   promote a read hold to a write hold by waiting only for the *other*
//!   readers. [`ReadLocker`] and [`WriteLocker`] scope raw holds so early
//!   returns cannot leak them.
//!
//! # Examples
//!
//! ```
//! use recursiverwlock::RwLock;
//!
//! let lock = RwLock::new(5);
//! {
//!     let value = lock.read();
//!     assert_eq!(*value, 5);
//! }
//! {
//!     let mut value = lock.write();
//!     *value += 1;
//! }
//! assert_eq!(lock.into_inner(), 6);
//! ```
//!
//! Recursive holds and promotion go through the raw lock:
//!
//! ```
//! use recursiverwlock::{RawRwLock, ReadLocker, RecursionMode, WriteLocker};
//!
//! let lock = RawRwLock::with_mode(RecursionMode::Recursive);
//! let outer = ReadLocker::new(&lock)?;
//! let nested = ReadLocker::new(&lock)?;
//! drop(nested);
//! // Promotes without giving up the outer read hold.
//! let exclusive = WriteLocker::new(&lock)?;
//! drop(exclusive);
//! drop(outer);
//! # Ok::<(), recursiverwlock::LockError>(())
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::thread_id::ThreadId;

pub use crate::error::{HoldKind, LockError};
pub use crate::raw::{RawRwLock, RecursionMode};

mod error;
mod raw;
mod thread_id;

/// Writer-preferring reader-writer lock around a value of type `T`.
///
/// The lock is non-recursive: a thread that already holds a guard and
/// requests another is an ordinary contender, and in particular a reader
/// that re-reads while a writer waits deadlocks against itself. Code that
/// needs same-thread nesting or promotion keeps its data elsewhere and
/// uses [`RawRwLock`] in [`RecursionMode::Recursive`].
pub struct RwLock<T> {
    raw: RawRwLock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(data: T) -> RwLock<T> {
        RwLock {
            raw: RawRwLock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Blocks until shared access is granted.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        // A non-recursive lock never resolves thread identities, so
        // acquisition has no failure path.
        let acquired = self.raw.read();
        debug_assert!(acquired.is_ok());
        RwLockReadGuard {
            lock: self,
            marker: PhantomData,
        }
    }

    /// Blocks until exclusive access is granted.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        let acquired = self.raw.write();
        debug_assert!(acquired.is_ok());
        RwLockWriteGuard {
            lock: self,
            marker: PhantomData,
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Exclusive access through `&mut self`, with no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Number of read guards currently outstanding.
    pub fn reader_count(&self) -> usize {
        self.raw.reader_count()
    }

    /// Whether a write guard is currently outstanding.
    pub fn is_write_locked(&self) -> bool {
        self.raw.is_write_locked()
    }
}

impl<T: Default> Default for RwLock<T> {
    fn default() -> RwLock<T> {
        RwLock::new(T::default())
    }
}

impl<T> From<T> for RwLock<T> {
    fn from(data: T) -> RwLock<T> {
        RwLock::new(data)
    }
}

impl<T> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reading the value here would block behind writers; only the
        // protocol counters are rendered.
        f.debug_struct("RwLock")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

/// Shared access to the value in an [`RwLock`]. Releases the hold on drop.
#[must_use]
pub struct RwLockReadGuard<'a, T: 'a> {
    lock: &'a RwLock<T>,
    marker: PhantomData<*const ()>,
}

unsafe impl<'a, T: Sync> Sync for RwLockReadGuard<'a, T> {}

impl<'a, T> Deref for RwLockReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> Drop for RwLockReadGuard<'a, T> {
    fn drop(&mut self) {
        let released = self.lock.raw.read_unlock_as(None);
        debug_assert!(released.is_ok());
    }
}

/// Exclusive access to the value in an [`RwLock`]. Releases the hold on
/// drop.
#[must_use]
pub struct RwLockWriteGuard<'a, T: 'a> {
    lock: &'a RwLock<T>,
    marker: PhantomData<*const ()>,
}

unsafe impl<'a, T: Sync> Sync for RwLockWriteGuard<'a, T> {}

impl<'a, T> Deref for RwLockWriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for RwLockWriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for RwLockWriteGuard<'a, T> {
    fn drop(&mut self) {
        let released = self.lock.raw.write_unlock_as(None);
        debug_assert!(released.is_ok());
    }
}

/// Scoped read hold on a [`RawRwLock`].
///
/// Construction blocks until the hold is granted; dropping releases it.
/// The hold is released on behalf of the thread that acquired it, so the
/// locker must not migrate to another thread (and cannot, it is `!Send`).
#[must_use]
pub struct ReadLocker<'a> {
    lock: &'a RawRwLock,
    owner: Option<ThreadId>,
    marker: PhantomData<*const ()>,
}

impl<'a> ReadLocker<'a> {
    pub fn new(lock: &'a RawRwLock) -> Result<ReadLocker<'a>, LockError> {
        let owner = lock.read_owner()?;
        Ok(ReadLocker {
            lock,
            owner,
            marker: PhantomData,
        })
    }
}

impl<'a> Drop for ReadLocker<'a> {
    fn drop(&mut self) {
        // The owner was captured at acquisition, so the release stays
        // valid even while thread-locals are being torn down.
        let released = self.lock.read_unlock_as(self.owner);
        debug_assert!(released.is_ok());
    }
}

/// Scoped write hold on a [`RawRwLock`]. The counterpart of
/// [`ReadLocker`].
#[must_use]
pub struct WriteLocker<'a> {
    lock: &'a RawRwLock,
    owner: Option<ThreadId>,
    marker: PhantomData<*const ()>,
}

impl<'a> WriteLocker<'a> {
    pub fn new(lock: &'a RawRwLock) -> Result<WriteLocker<'a>, LockError> {
        let owner = lock.write_owner()?;
        Ok(WriteLocker {
            lock,
            owner,
            marker: PhantomData,
        })
    }
}

impl<'a> Drop for WriteLocker<'a> {
    fn drop(&mut self) {
        let released = self.lock.write_unlock_as(self.owner);
        debug_assert!(released.is_ok());
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn smoke() {
        let lock = RwLock::new(());
        drop(lock.read());
        drop(lock.write());
        drop((lock.read(), lock.read()));
        drop(lock.write());
    }

    #[test]
    fn guards_move_the_data() {
        let lock = RwLock::new(10);
        {
            let value = lock.read();
            assert_eq!(*value, 10);
        }
        {
            let mut value = lock.write();
            *value += 5;
            assert_eq!(*value, 15);
        }
        assert_eq!(*lock.read(), 15);
    }

    #[test]
    fn guard_counts_are_visible() {
        let lock = RwLock::new(0u8);
        assert_eq!(lock.reader_count(), 0);
        let first = lock.read();
        let second = lock.read();
        assert_eq!(lock.reader_count(), 2);
        drop(first);
        drop(second);
        assert!(!lock.is_write_locked());
        let guard = lock.write();
        assert!(lock.is_write_locked());
        drop(guard);
    }

    #[test]
    fn into_inner() {
        #[derive(Eq, PartialEq, Debug)]
        struct NonCopy(i32);

        let lock = RwLock::new(NonCopy(10));
        assert_eq!(lock.into_inner(), NonCopy(10));
    }

    #[test]
    fn get_mut_needs_no_guard() {
        let mut lock = RwLock::new(String::from("a"));
        lock.get_mut().push('b');
        assert_eq!(&*lock.read(), "ab");
    }

    #[test]
    fn debug_does_not_block_on_a_writer() {
        let lock = RwLock::new(7);
        let guard = lock.write();
        let rendered = format!("{lock:?}");
        assert!(rendered.contains("RwLock"));
        drop(guard);
    }

    #[test]
    fn lockers_scope_raw_holds() {
        let lock = RawRwLock::with_mode(RecursionMode::Recursive);
        {
            let _outer = ReadLocker::new(&lock).unwrap();
            let _nested = ReadLocker::new(&lock).unwrap();
            assert_eq!(lock.reader_count(), 2);
        }
        assert_eq!(lock.reader_count(), 0);
        {
            let _writer = WriteLocker::new(&lock).unwrap();
            assert!(lock.is_write_locked());
        }
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn locker_promotes_inside_a_read_scope() {
        let lock = RawRwLock::with_mode(RecursionMode::Recursive);
        let _read = ReadLocker::new(&lock).unwrap();
        {
            let _write = WriteLocker::new(&lock).unwrap();
            assert!(lock.is_write_locked());
            assert_eq!(lock.reader_count(), 1);
        }
        assert!(!lock.is_write_locked());
        assert_eq!(lock.reader_count(), 1);
    }
}
