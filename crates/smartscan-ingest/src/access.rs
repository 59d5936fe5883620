// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Safe file access: a readiness gate in front of every render, move or
// delete.  A file the scanner is still writing is held open and locked by
// the writer; we only touch files we can lock exclusively.
//
// On Unix `File::try_lock` is an advisory `flock`.  A writer that never
// takes the lock passes the gate while it is still writing, so there the
// gate only protects against cooperating writers.

use std::fs::{File, TryLockError};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, trace};

/// Outcome of a single exclusive-open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Ready,
    Busy,
    /// The file vanished; retrying cannot help.
    Gone,
}

fn attempt_exclusive_open(path: &Path) -> Attempt {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Attempt::Gone,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "open failed");
            return Attempt::Busy;
        }
    };

    // The lock is released when `file` drops at the end of this function.
    match file.try_lock() {
        Ok(()) => Attempt::Ready,
        Err(TryLockError::WouldBlock) => Attempt::Busy,
        Err(TryLockError::Error(e)) => {
            trace!(path = %path.display(), error = %e, "lock failed");
            Attempt::Busy
        }
    }
}

/// Try to open `path` exclusively up to `max_attempts` times, sleeping
/// `pause` between failed attempts.
///
/// Returns `true` once the file could be opened and locked.  Never reads
/// the file and never fails; "not ready" is reported as `false`.
pub async fn try_open(path: &Path, max_attempts: u32, pause: Duration) -> bool {
    for attempt in 1..=max_attempts {
        match attempt_exclusive_open(path) {
            Attempt::Ready => return true,
            Attempt::Gone => {
                debug!(path = %path.display(), "file disappeared before it could be opened");
                return false;
            }
            Attempt::Busy => {
                debug!(path = %path.display(), attempt, max_attempts, "file busy");
                if attempt < max_attempts {
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }
    false
}
