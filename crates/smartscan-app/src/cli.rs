// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments.  Every flag can also come from a `SMARTSCAN_*`
// environment variable and overrides the value in `smartscan.json`.

use std::path::PathBuf;

use clap::Parser;
use smartscan_core::error::{Result, SmartScanError};
use smartscan_core::ServiceConfig;

/// SmartScan — groups scanned pages into PDF documents and publishes them.
#[derive(Parser, Debug)]
#[command(name = "smartscan", version, about)]
pub struct Cli {
    /// Base directory holding in/, out/, temp/ and queue/.
    #[arg(long, env = "SMARTSCAN_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `smartscan_ingest=trace`.  Overrides RUST_LOG.
    #[arg(long, env = "SMARTSCAN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Idle time in milliseconds after which an open document is closed.
    #[arg(long, env = "SMARTSCAN_IDLE_TIMEOUT_MS")]
    pub idle_timeout_ms: Option<u64>,

    /// Exclusive-open attempts before a file is skipped for the pass.
    #[arg(long, env = "SMARTSCAN_OPEN_ATTEMPTS")]
    pub open_attempts: Option<u32>,

    /// Also keep every rendered document as out/result_<n>.pdf.
    #[arg(long, env = "SMARTSCAN_KEEP_LOCAL_COPY")]
    pub keep_local_copy: bool,

    /// Write the effective configuration to smartscan.json and exit.
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut ServiceConfig) -> Result<()> {
        if let Some(millis) = self.idle_timeout_ms {
            config.settings.idle_timeout_millis = millis;
        }
        if let Some(attempts) = self.open_attempts {
            if attempts == 0 {
                return Err(SmartScanError::Config("open attempts must be at least 1".into()));
            }
            config.open_attempts = attempts;
        }
        if self.keep_local_copy {
            config.keep_local_copy = true;
        }
        config.settings.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("smartscan").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let mut config = ServiceConfig::default();
        parse(&[]).apply(&mut config).expect("apply");
        assert_eq!(config.settings.idle_timeout_millis, 5000);
        assert!(!config.keep_local_copy);
    }

    #[test]
    fn flags_override_config() {
        let mut config = ServiceConfig::default();
        parse(&["--idle-timeout-ms", "2000", "--open-attempts", "5", "--keep-local-copy"])
            .apply(&mut config)
            .expect("apply");
        assert_eq!(config.settings.idle_timeout_millis, 2000);
        assert_eq!(config.open_attempts, 5);
        assert!(config.keep_local_copy);
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = parse(&["--idle-timeout-ms", "0"]).apply(&mut config);
        assert!(matches!(err, Err(SmartScanError::InvalidSettings(_))));
    }

    #[test]
    fn zero_open_attempts_is_rejected() {
        let mut config = ServiceConfig::default();
        assert!(parse(&["--open-attempts", "0"]).apply(&mut config).is_err());
    }
}
