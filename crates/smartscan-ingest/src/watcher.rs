// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Filesystem watcher for the scan input directory.  Its only job is to cut
// the worker's idle wait short when a new file shows up.

use std::path::Path;
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use smartscan_core::error::{Result, SmartScanError};
use tokio::sync::Notify;
use tracing::{info, trace, warn};

/// Keeps a `notify` watcher alive on one directory.  Dropping it stops the
/// watch.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Watch `dir` (non-recursively) and signal `wake` on every file
    /// creation or rename into it.
    pub fn start(dir: impl AsRef<Path>, wake: Arc<Notify>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) if is_arrival(&event.kind) => {
                        trace!(paths = ?event.paths, "file arrived");
                        wake.notify_one();
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "filesystem watcher error"),
                }
            })
            .map_err(|e| SmartScanError::Watcher(e.to_string()))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| SmartScanError::Watcher(format!("{}: {e}", dir.display())))?;

        info!(path = %dir.display(), "watching scan directory");
        Ok(Self { _watcher: watcher })
    }
}

/// Creation, or a rename whose target is in the watched directory.
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both | RenameMode::Any))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::time::Duration;

    #[test]
    fn arrivals_are_creates_and_renames_in() {
        assert!(is_arrival(&EventKind::Create(CreateKind::File)));
        assert!(is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!is_arrival(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_arrival(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn missing_directory_is_a_watcher_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let result = DirectoryWatcher::start(tmp.path().join("absent"), Arc::new(Notify::new()));
        assert!(matches!(result, Err(SmartScanError::Watcher(_))));
    }

    #[tokio::test]
    async fn new_file_wakes_the_waiter() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let wake = Arc::new(Notify::new());
        let _watcher = DirectoryWatcher::start(tmp.path(), wake.clone()).expect("watch");

        std::fs::write(tmp.path().join("image_0.jpg"), b"jpeg").expect("write");

        tokio::time::timeout(Duration::from_secs(5), wake.notified())
            .await
            .expect("wake signal within timeout");
    }
}
