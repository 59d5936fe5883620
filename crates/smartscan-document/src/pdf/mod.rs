// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — multi-page documents built from scanned images.

pub mod renderer;

pub use renderer::PdfRenderer;
