// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::{PaperSize, ServiceSettings};

/// Name of the optional configuration file inside the base directory.
pub const CONFIG_FILE: &str = "smartscan.json";

/// Static service configuration, fixed for the lifetime of a run.
///
/// The dynamic part (`settings`) only seeds the worker; afterwards it is
/// owned and updated by settings sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root under which `in/`, `out/`, `temp/` and `queue/` live.
    pub base_dir: PathBuf,
    /// Initial runtime settings.
    pub settings: ServiceSettings,
    /// Exclusive-open attempts before a file counts as not ready.
    pub open_attempts: u32,
    /// Paper size of rendered documents.
    pub paper_size: PaperSize,
    /// Fraction of the page width/height each scanned image occupies.
    pub image_scale: f32,
    /// Also write every rendered document to `out/result_<n>.pdf`.
    pub keep_local_copy: bool,
    /// Queue channel carrying rendered documents.
    pub artifact_channel: String,
    /// Queue channel carrying `ServiceSettings`.
    pub settings_channel: String,
    /// Upper bound on each queue receive.
    pub receive_wait_millis: u64,
    /// How often a pending receive re-checks the queue.
    pub queue_poll_interval_millis: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            settings: ServiceSettings::default(),
            open_attempts: 3,
            paper_size: PaperSize::A4,
            image_scale: 0.75,
            keep_local_copy: false,
            artifact_channel: "pdfQueue".into(),
            settings_channel: "settingsQueue".into(),
            receive_wait_millis: 500,
            queue_poll_interval_millis: 50,
        }
    }
}

impl ServiceConfig {
    /// Defaults rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Load `smartscan.json` from `base_dir`, falling back to defaults when
    /// the file is missing or unreadable.  `base_dir` always wins over any
    /// value stored in the file.
    pub fn load(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        let path = base_dir.join(CONFIG_FILE);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<ServiceConfig>(&data) {
                Ok(config) => {
                    debug!(path = %path.display(), "configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid configuration file, using defaults");
                    ServiceConfig::default()
                }
            },
            Err(_) => ServiceConfig::default(),
        };

        config.base_dir = base_dir.to_path_buf();
        config
    }

    /// Write the configuration to `smartscan.json` in the base directory.
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.base_dir.join(CONFIG_FILE), json)?;
        Ok(())
    }

    /// Directory the scanner drops page images into.
    pub fn in_dir(&self) -> PathBuf {
        self.base_dir.join("in")
    }

    /// Directory receiving documents drained from the queue.
    pub fn out_dir(&self) -> PathBuf {
        self.base_dir.join("out")
    }

    /// Holding area for quarantined files.
    pub fn holding_dir(&self) -> PathBuf {
        self.base_dir.join("temp")
    }

    /// Directory holding the local queue database.
    pub fn queue_dir(&self) -> PathBuf {
        self.base_dir.join("queue")
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_millis(self.receive_wait_millis)
    }

    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_millis.max(1))
    }

    /// Create every service directory that does not exist yet.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.in_dir(),
            self.out_dir(),
            self.holding_dir(),
            self.queue_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_behaviour() {
        let config = ServiceConfig::default();
        assert_eq!(config.open_attempts, 3);
        assert_eq!(config.settings.idle_timeout_millis, 5000);
        assert!((config.image_scale - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.artifact_channel, "pdfQueue");
    }

    #[test]
    fn ensure_directories_creates_layout() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = ServiceConfig::with_base_dir(tmp.path());
        config.ensure_directories().expect("create dirs");

        assert!(config.in_dir().is_dir());
        assert!(config.out_dir().is_dir());
        assert!(config.holding_dir().is_dir());
        assert!(config.queue_dir().is_dir());
    }

    #[test]
    fn load_round_trips_persisted_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut config = ServiceConfig::with_base_dir(tmp.path());
        config.keep_local_copy = true;
        config.settings = ServiceSettings::new(1234, "stop");
        config.persist().expect("persist");

        let loaded = ServiceConfig::load(tmp.path());
        assert!(loaded.keep_local_copy);
        assert_eq!(loaded.settings.idle_timeout_millis, 1234);
        assert_eq!(loaded.base_dir, tmp.path());
    }

    #[test]
    fn load_falls_back_on_invalid_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join(CONFIG_FILE), "{ broken").expect("write");

        let loaded = ServiceConfig::load(tmp.path());
        assert_eq!(loaded.open_attempts, 3);
        assert_eq!(loaded.base_dir, tmp.path());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join(CONFIG_FILE), r#"{"open_attempts":5}"#).expect("write");

        let loaded = ServiceConfig::load(tmp.path());
        assert_eq!(loaded.open_attempts, 5);
        assert_eq!(loaded.settings_channel, "settingsQueue");
    }
}
