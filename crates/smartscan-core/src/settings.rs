// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Runtime settings exchanged between service instances over the settings
// channel.  The wire form is JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::InstanceId;
use crate::error::{Result, SmartScanError};

/// Idle timeout used when nothing else has been configured.
pub const DEFAULT_IDLE_TIMEOUT_MILLIS: u64 = 5000;

/// Added to the idle timeout when broadcasting settings at startup.
pub const BROADCAST_TIMEOUT_OFFSET_MILLIS: u64 = 1000;

/// Separates the break marker from the tag of the instance that published it.
const MARKER_TAG_SEPARATOR: char = '@';

/// Dynamic settings that can be changed while the service is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// How long the worker waits for a new page before closing the open
    /// document.  Also the pause between file-open attempts.
    pub idle_timeout_millis: u64,
    /// Document break token shared between instances.
    pub break_marker: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            idle_timeout_millis: DEFAULT_IDLE_TIMEOUT_MILLIS,
            break_marker: "break".into(),
        }
    }
}

impl ServiceSettings {
    pub fn new(idle_timeout_millis: u64, break_marker: impl Into<String>) -> Self {
        Self {
            idle_timeout_millis,
            break_marker: break_marker.into(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_millis)
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_millis == 0 {
            return Err(SmartScanError::InvalidSettings(
                "idle_timeout_millis must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Serialise for the settings channel.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse and validate a settings payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let settings: Self = serde_json::from_slice(payload)?;
        settings.validate()?;
        Ok(settings)
    }

    /// The break marker without any instance tag.  Only a trailing
    /// `@<instance tag>` is stripped; other `@` characters are kept.
    pub fn untagged_marker(&self) -> &str {
        match self.split_tag() {
            Some((marker, _)) => marker,
            None => &self.break_marker,
        }
    }

    /// Short id of the instance that broadcast these settings, if tagged.
    pub fn instance_tag(&self) -> Option<&str> {
        self.split_tag().map(|(_, tag)| tag)
    }

    /// Whether these settings were broadcast by `instance`.
    pub fn is_from(&self, instance: &InstanceId) -> bool {
        self.instance_tag() == Some(instance.short().as_str())
    }

    fn split_tag(&self) -> Option<(&str, &str)> {
        self.break_marker
            .rsplit_once(MARKER_TAG_SEPARATOR)
            .filter(|(_, tag)| is_instance_tag(tag))
    }

    /// Copy announced to other instances at startup: timeout bumped by a
    /// fixed offset, marker tagged with the publishing instance.  A tag left
    /// by an earlier broadcast is replaced, not stacked.
    pub fn for_broadcast(&self, instance: &InstanceId) -> Self {
        Self {
            idle_timeout_millis: self
                .idle_timeout_millis
                .saturating_add(BROADCAST_TIMEOUT_OFFSET_MILLIS),
            break_marker: format!(
                "{}{}{}",
                self.untagged_marker(),
                MARKER_TAG_SEPARATOR,
                instance.short()
            ),
        }
    }
}

/// Eight lowercase hex digits, the form of [`InstanceId::short`].
fn is_instance_tag(tag: &str) -> bool {
    tag.len() == 8 && tag.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
