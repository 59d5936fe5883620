// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the SmartScan ingestion pipeline.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one running service instance when broadcasting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, enough to tell instances apart in a tag.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a file found in the watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// A scanned page with its single-digit position in the document.
    Page(u8),
    /// Valid name that matches no page pattern. Quarantined.
    Foreign,
    /// Name that cannot be matched at all (empty or not UTF-8). Quarantined.
    Unrecognized,
}

impl FileClass {
    pub fn is_page(&self) -> bool {
        matches!(self, Self::Page(_))
    }
}

/// A file observed during one directory scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Bare file name (lossy if the name is not valid UTF-8).
    pub name: String,
    /// Full path inside the watched directory.
    pub path: PathBuf,
    /// First decimal digit of the name, if any.
    pub sequence_index: Option<u8>,
    /// Gate verdict for this name.
    pub class: FileClass,
}

/// Opaque envelope exchanged with the message transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub payload: Vec<u8>,
}

impl QueueMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Standard paper sizes used for rendered documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }
}

/// Lifecycle states of the scan service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Stopped,
    Running,
    Stopping,
}
