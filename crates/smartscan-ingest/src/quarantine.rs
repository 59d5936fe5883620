// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quarantine for files that are not scan pages.  They are moved to the
// holding area so they stop being rescanned every cycle; a file whose name
// is already present there is a stale duplicate and is deleted instead.

use std::path::{Path, PathBuf};

use smartscan_core::error::{Result, SmartScanError};
use tracing::{debug, info, instrument};

/// What quarantine did with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineAction {
    /// Moved into the holding area at this path.
    Moved(PathBuf),
    /// Same name already held; the watched copy was deleted.
    DeletedDuplicate,
}

/// Move `path` into `holding_dir`, or delete it if the holding area already
/// has a file with the same name.
///
/// The caller is expected to have confirmed the file is ready.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn quarantine(path: &Path, holding_dir: &Path) -> Result<QuarantineAction> {
    let name = path
        .file_name()
        .ok_or_else(|| SmartScanError::Config(format!("{} has no file name", path.display())))?;
    let target = holding_dir.join(name);

    if target.exists() {
        std::fs::remove_file(path)?;
        info!(held = %target.display(), "duplicate foreign file deleted");
        return Ok(QuarantineAction::DeletedDuplicate);
    }

    move_file(path, &target)?;
    info!(held = %target.display(), "foreign file moved to holding area");
    Ok(QuarantineAction::Moved(target))
}

/// Rename, falling back to copy + delete when the holding area sits on a
/// different filesystem.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!(error = %e, "rename crossed devices, copying instead");
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
