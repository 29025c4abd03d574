//! Slide extraction: per-page text and, in vision mode, rendered page images.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not safe
//! to call from async contexts. `tokio::task::spawn_blocking` moves the work
//! onto a thread designed for blocking operations.
//!
//! ## Failure policy
//!
//! Opening the document is all-or-nothing: a PDF pdfium cannot load aborts
//! the run. Once it is open, every page yields exactly one [`SlideRecord`];
//! a page whose text cannot be read yields `""` and a warning instead of an
//! error, because downstream stages already tolerate empty slides.

use crate::config::{ExtractionMode, GenerationConfig};
use crate::error::FlashcardError;
use crate::output::SlideRecord;
use crate::pipeline::encode;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Extract every page of the slide deck in document order.
///
/// Returns exactly one record per page with indices `0..N`. Text-only mode
/// never populates [`SlideRecord::image`].
pub async fn extract_slides(
    pdf_path: &Path,
    config: &GenerationConfig,
) -> Result<Vec<SlideRecord>, FlashcardError> {
    let path = pdf_path.to_path_buf();
    let render = match config.mode {
        ExtractionMode::TextOnly => None,
        ExtractionMode::Vision => Some(RenderSettings {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        }),
    };

    tokio::task::spawn_blocking(move || extract_slides_blocking(&path, render))
        .await
        .map_err(|e| FlashcardError::Internal(format!("Extraction task panicked: {}", e)))?
}

#[derive(Debug, Clone, Copy)]
struct RenderSettings {
    dpi: u32,
    max_pixels: u32,
}

impl RenderSettings {
    /// Target pixel size for a page of `width_pt` × `height_pt` points,
    /// scaled to the DPI and capped on the longest edge.
    fn target_size(&self, width_pt: f32, height_pt: f32) -> (i32, i32) {
        let scale = self.dpi as f32 / 72.0;
        let mut w = (width_pt * scale).round().max(1.0);
        let mut h = (height_pt * scale).round().max(1.0);
        let longest = w.max(h);
        if longest > self.max_pixels as f32 {
            let shrink = self.max_pixels as f32 / longest;
            w = (w * shrink).round().max(1.0);
            h = (h * shrink).round().max(1.0);
        }
        (w as i32, h as i32)
    }
}

fn bind_pdfium() -> Result<Pdfium, FlashcardError> {
    pdfium_auto::bind_pdfium_silent()
        .map_err(|e| FlashcardError::PdfiumBindingFailed(e.to_string()))
}

/// Blocking implementation of slide extraction.
fn extract_slides_blocking(
    pdf_path: &Path,
    render: Option<RenderSettings>,
) -> Result<Vec<SlideRecord>, FlashcardError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            FlashcardError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        } else {
            FlashcardError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if total_pages == 0 {
        return Err(FlashcardError::NoSlideContent {
            path: pdf_path.to_path_buf(),
        });
    }

    let mut slides = Vec::with_capacity(total_pages);

    for (index, page) in pages.iter().enumerate() {
        let text = match page.text() {
            Ok(t) => normalise_page_text(&t.all()),
            Err(e) => {
                warn!("Slide {}: text extraction failed ({:?}); using empty text", index + 1, e);
                String::new()
            }
        };

        let mut slide = SlideRecord::new(index, text);

        if let Some(settings) = render {
            let (w, h) = settings.target_size(page.width().value, page.height().value);
            let render_config = PdfRenderConfig::new()
                .set_target_width(w)
                .set_maximum_height(h);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                FlashcardError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: format!("rasterisation failed for slide {}: {:?}", index + 1, e),
                }
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered slide {} → {}x{} px",
                index + 1,
                image.width(),
                image.height()
            );

            slide.image = Some(encode::encode_page(&image).map_err(|e| {
                FlashcardError::Internal(format!("Image encoding failed for slide {}: {e}", index + 1))
            })?);
        }

        slides.push(slide);
    }

    let empty = slides.iter().filter(|s| s.is_empty()).count();
    if empty > 0 {
        debug!("{} of {} slides have no embedded text", empty, total_pages);
    }

    Ok(slides)
}

/// Normalise line endings and trim the text pdfium returns for one page.
fn normalise_page_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
