//! Archive packaging: rendered pages → one in-memory ZIP.
//!
//! Members are written flat (no directories), DEFLATE-compressed, in exactly
//! the order they were rendered, under exactly the names the render stage
//! gave them. Packaging only ever sees a complete page set; a failed render
//! never reaches this stage.

use crate::error::Pdf2ZipError;
use crate::pipeline::render::RenderedPage;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Download name of every archive.
pub const ARCHIVE_FILE_NAME: &str = "converted_images.zip";

/// A finished archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub file_name: &'static str,
    /// Member names in archive order.
    pub members: Vec<String>,
    pub bytes: Vec<u8>,
}

/// Bundle `pages` into a ZIP, consuming them.
pub fn package_pages(pages: Vec<RenderedPage>) -> Result<Archive, Pdf2ZipError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut members = Vec::with_capacity(pages.len());

    for page in pages {
        zip.start_file(page.name.as_str(), options)
            .map_err(|e| Pdf2ZipError::PackagingFailed(format!("{}: {}", page.name, e)))?;
        zip.write_all(&page.bytes)
            .map_err(|e| Pdf2ZipError::PackagingFailed(format!("{}: {}", page.name, e)))?;
        members.push(page.name);
    }

    let bytes = zip
        .finish()
        .map_err(|e| Pdf2ZipError::PackagingFailed(e.to_string()))?
        .into_inner();

    debug!("Packaged {} pages → {} bytes", members.len(), bytes.len());

    Ok(Archive {
        file_name: ARCHIVE_FILE_NAME,
        members,
        bytes,
    })
}
