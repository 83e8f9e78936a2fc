// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::fmt;
use std::thread::AccessError;

use thiserror::Error;

/// The kind of hold a release operation was asked to give back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldKind {
    Read,
    Write,
}

impl fmt::Display for HoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HoldKind::Read => f.write_str("read"),
            HoldKind::Write => f.write_str("write"),
        }
    }
}

/// Errors reported by the lock operations.
///
/// Acquisition never fails for protocol reasons; it blocks instead. The
/// only failure on acquisition is [`LockError::IdentityUnavailable`], and
/// only in recursive mode. Release fails when the calling thread has no
/// matching hold; the lock state is left untouched in that case.
#[derive(Debug, Error)]
pub enum LockError {
    /// A release was called by a thread that does not currently have a
    /// matching hold of that kind. Never retried; the counters are checked
    /// before any mutation.
    #[error("released a {0} hold the calling thread does not have")]
    UnmatchedRelease(HoldKind),

    /// The calling thread's identity slot could not be read. This happens
    /// when a recursive-mode operation runs while the thread's local
    /// storage is being torn down. Propagated rather than defaulted, since
    /// a made-up identity would corrupt the recursion bookkeeping.
    #[error("calling thread identity is unavailable")]
    IdentityUnavailable(#[from] AccessError),
}
