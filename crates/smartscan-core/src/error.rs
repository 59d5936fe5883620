// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for SmartScan.

use thiserror::Error;

/// Top-level error type for all SmartScan operations.
#[derive(Debug, Error)]
pub enum SmartScanError {
    // -- Ingestion --
    #[error("service lifecycle error: {0}")]
    Service(String),

    #[error("file watcher failed: {0}")]
    Watcher(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("configuration error: {0}")]
    Config(String),

    // -- Rendering --
    #[error("document rendering failed: {0}")]
    Render(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Transport --
    #[error("message queue error: {0}")]
    Queue(String),

    #[error("queue channel not found: {0}")]
    UnknownChannel(String),

    #[error("payload integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SmartScanError>;
