// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rendering seam between the ingestion worker and the document backend.

use std::path::PathBuf;

use smartscan_core::PaperSize;
use smartscan_core::error::Result;

/// Page geometry applied to every rendered page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub paper_size: PaperSize,
    /// Fraction of the page width and height the image is stretched to.
    pub image_scale: f32,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            image_scale: 0.75,
        }
    }
}

/// Accepts ordered page images and returns one serialized document.
///
/// Implementations are synchronous; async callers should run them on
/// `tokio::task::spawn_blocking`.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, pages: &[PathBuf]) -> Result<Vec<u8>>;
}
