//! Pipeline stages for PDF-to-ZIP conversion.
//!
//! Each submodule implements exactly one transformation step and is tested
//! on its own.
//!
//! ## Data Flow
//!
//! ```text
//! range ──▶ render ──▶ encode ──▶ package
//! (pages)   (pdfium)  (jpeg/png)  (zip)
//! ```
//!
//! 1. [`range`]  : turn `"1-3,5"` into ascending, distinct page numbers
//! 2. [`render`] : rasterise selected pages; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`] : JPEG/PNG-encode each `DynamicImage`
//! 4. [`package`]: bundle the encoded pages into one DEFLATE ZIP

pub mod encode;
pub mod package;
pub mod range;
pub mod render;

use crate::config::RenderOptions;
use crate::error::Pdf2ZipError;
use crate::progress::ProgressCallback;
use package::Archive;
use render::PageRasterizer;
use std::path::Path;
use std::sync::Arc;

/// Render every page in `options` and package the result.
///
/// Nothing is packaged unless every page rendered.
pub async fn render_to_archive(
    rasterizer: Arc<dyn PageRasterizer>,
    path: &Path,
    password: Option<&str>,
    options: &RenderOptions,
    max_pixels: u32,
    progress: Option<ProgressCallback>,
) -> Result<Archive, Pdf2ZipError> {
    let pages =
        render::render_document(rasterizer, path, password, options, max_pixels, progress).await?;
    package::package_pages(pages)
}
