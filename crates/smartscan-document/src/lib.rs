// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// smartscan-document — Turns an ordered list of scanned page images into one
// paginated PDF artifact.
//
// The ingestion worker only depends on the `DocumentRenderer` trait; the PDF
// implementation lives in `pdf::renderer`.

pub mod pdf;
pub mod renderer;

pub use pdf::renderer::PdfRenderer;
pub use renderer::{DocumentRenderer, PageLayout};
