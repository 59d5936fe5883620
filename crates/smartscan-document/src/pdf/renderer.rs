// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF renderer — one page per scanned image using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::{Path, PathBuf};

use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use smartscan_core::error::{Result, SmartScanError};
use tracing::{debug, info, instrument, warn};

use crate::renderer::{DocumentRenderer, PageLayout};

/// Nominal scan resolution used to size the image XObject before scaling.
const SCAN_DPI: f32 = 150.0;

/// Builds a PDF with one page per scanned image, in the order given.
///
/// Each image is stretched to `image_scale` of the page width and height
/// and centred on the page.
pub struct PdfRenderer {
    layout: PageLayout,
    /// Title metadata embedded in the PDF /Info dictionary.
    title: String,
}

impl PdfRenderer {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            title: "SmartScan Document".into(),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Paper dimensions in printpdf's Mm units.
    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w_mm, h_mm) = self.layout.paper_size.dimensions_mm();
        (Mm(w_mm as f32), Mm(h_mm as f32))
    }

    /// Decode one page image into the RGB8 form printpdf embeds.
    fn load_page(path: &Path) -> Result<RawImage> {
        let bytes = std::fs::read(path)?;
        let decoded = ::image::load_from_memory(&bytes).map_err(|err| {
            SmartScanError::ImageError(format!("failed to decode {}: {}", path.display(), err))
        })?;

        let width = decoded.width() as usize;
        let height = decoded.height() as usize;
        let rgb = decoded.to_rgb8();

        Ok(RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width,
            height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        })
    }

    /// Transform that stretches an image to the scaled page box, centred.
    fn placement(&self, img_width: usize, img_height: usize) -> XObjectTransform {
        let (page_w, page_h) = self.page_dimensions();
        let page_w_pt = page_w.into_pt().0;
        let page_h_pt = page_h.into_pt().0;

        let target_w_pt = page_w_pt * self.layout.image_scale;
        let target_h_pt = page_h_pt * self.layout.image_scale;

        // Native size of the XObject at SCAN_DPI.
        let img_w_pt = (img_width.max(1) as f32) / SCAN_DPI * 72.0;
        let img_h_pt = (img_height.max(1) as f32) / SCAN_DPI * 72.0;

        XObjectTransform {
            translate_x: Some(Pt((page_w_pt - target_w_pt) / 2.0)),
            translate_y: Some(Pt((page_h_pt - target_h_pt) / 2.0)),
            scale_x: Some(target_w_pt / img_w_pt),
            scale_y: Some(target_h_pt / img_h_pt),
            dpi: Some(SCAN_DPI),
            rotate: None,
        }
    }
}

impl Default for PdfRenderer {
    fn default() -> Self {
        Self::new(PageLayout::default())
    }
}

impl DocumentRenderer for PdfRenderer {
    #[instrument(skip(self, pages), fields(page_count = pages.len()))]
    fn render(&self, pages: &[PathBuf]) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(SmartScanError::Render("document has no pages".into()));
        }

        let (page_w, page_h) = self.page_dimensions();
        info!(paper = ?self.layout.paper_size, title = %self.title, "Rendering scan document");

        let mut doc = PdfDocument::new(&self.title);
        let mut pdf_pages: Vec<PdfPage> = Vec::with_capacity(pages.len());

        for path in pages {
            let raw = Self::load_page(path)?;
            let transform = self.placement(raw.width, raw.height);
            let xobject_id = doc.add_image(&raw);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform,
            }];
            pdf_pages.push(PdfPage::new(page_w, page_h, ops));
            debug!(page = %path.display(), "Page placed");
        }

        doc.with_pages(pdf_pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            warn!(count = warnings.len(), "PDF serialisation produced warnings");
        }

        debug!(bytes = output.len(), "Document rendered");
        Ok(output)
    }
}
