//! PDF rasterisation: render selected pages to encoded images.
//!
//! ## Why a trait?
//!
//! The conversion service only needs one capability from a PDF engine:
//! "open document D, then render page N at scale Z". [`PageRasterizer`]
//! captures exactly that, so the service and its tests do not depend on a
//! pdfium shared library being present. [`PdfiumRasterizer`] is the
//! production implementation.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto the blocking pool so the
//! async workers serving other requests never stall behind a large render.
//!
//! Pages within one document are rendered strictly in order; archive member
//! numbering depends on it.

use crate::config::{ImageEncoding, RenderOptions};
use crate::error::Pdf2ZipError;
use crate::pipeline::encode;
use crate::progress::{NoopRenderProgress, ProgressCallback, RenderProgress};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What a check needs to know about a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub password_protected: bool,
}

/// Receives each rendered page, in ascending page order.
pub type PageSink<'a> = dyn FnMut(usize, DynamicImage) -> Result<(), Pdf2ZipError> + 'a;

/// The "render page N of document D at scale Z" capability.
pub trait PageRasterizer: Send + Sync {
    /// Open the document and report its page count.
    ///
    /// Fails with [`Pdf2ZipError::PasswordRequired`] or
    /// [`Pdf2ZipError::WrongPassword`] when the credential does not open it.
    fn open(&self, path: &Path, password: Option<&str>) -> Result<usize, Pdf2ZipError>;

    /// Open the document once, then render each of `pages` (1-based) at
    /// `scale`, capped to `max_pixels` on the longest edge, handing every
    /// image to `sink` before the next page is touched.
    ///
    /// Authentication happens when the document is opened, so a bad
    /// password fails before any page is rendered.
    fn rasterize(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: &[usize],
        scale: f32,
        max_pixels: u32,
        sink: &mut PageSink<'_>,
    ) -> Result<(), Pdf2ZipError>;
}

/// A page rendered and encoded, ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Original 1-based page number in the document.
    pub page: usize,
    /// 1-based position in the selection.
    pub ordinal: usize,
    /// Archive member name, `page_<ordinal>.<ext>`.
    pub name: String,
    pub encoding: ImageEncoding,
    pub bytes: Vec<u8>,
}

/// Archive member name for the `ordinal`-th selected page.
pub fn page_name(ordinal: usize, encoding: ImageEncoding) -> String {
    format!("page_{}.{}", ordinal, encoding.extension())
}

/// Determine page count and whether a password is needed.
///
/// The document is first opened without a credential; only if that fails
/// for lack of one is `password` tried.
pub async fn inspect_document(
    rasterizer: Arc<dyn PageRasterizer>,
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2ZipError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        inspect_blocking(rasterizer.as_ref(), &path, password.as_deref())
    })
    .await
    .map_err(|e| Pdf2ZipError::Internal(format!("Inspect task panicked: {}", e)))?
}

fn inspect_blocking(
    rasterizer: &dyn PageRasterizer,
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentInfo, Pdf2ZipError> {
    match rasterizer.open(path, None) {
        Ok(page_count) => Ok(DocumentInfo {
            page_count,
            password_protected: false,
        }),
        Err(Pdf2ZipError::PasswordRequired) => {
            let password = password
                .filter(|p| !p.is_empty())
                .ok_or(Pdf2ZipError::PasswordRequired)?;
            let page_count = rasterizer.open(path, Some(password))?;
            Ok(DocumentInfo {
                page_count,
                password_protected: true,
            })
        }
        Err(e) => Err(e),
    }
}

/// Render and encode every page in `options`, all-or-nothing.
///
/// Runs inside `spawn_blocking`. Returns pages in selection order with dense
/// ordinals starting at 1.
pub async fn render_document(
    rasterizer: Arc<dyn PageRasterizer>,
    path: &Path,
    password: Option<&str>,
    options: &RenderOptions,
    max_pixels: u32,
    progress: Option<ProgressCallback>,
) -> Result<Vec<RenderedPage>, Pdf2ZipError> {
    let path = path.to_path_buf();
    let password = password.map(str::to_string);
    let options = options.clone();

    tokio::task::spawn_blocking(move || {
        let progress: &dyn RenderProgress = match progress.as_deref() {
            Some(cb) => cb,
            None => &NoopRenderProgress,
        };
        render_blocking(
            rasterizer.as_ref(),
            &path,
            password.as_deref(),
            &options,
            max_pixels,
            progress,
        )
    })
    .await
    .map_err(|e| Pdf2ZipError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_blocking(
    rasterizer: &dyn PageRasterizer,
    path: &Path,
    password: Option<&str>,
    options: &RenderOptions,
    max_pixels: u32,
    progress: &dyn RenderProgress,
) -> Result<Vec<RenderedPage>, Pdf2ZipError> {
    let total = options.pages.len();
    let encoding = options.encoding;
    let mut rendered: Vec<RenderedPage> = Vec::with_capacity(total);

    let mut sink = |page: usize, image: DynamicImage| -> Result<(), Pdf2ZipError> {
        if rendered.is_empty() {
            progress.on_render_start(total);
        }
        let ordinal = rendered.len() + 1;
        let bytes = encode::encode_page(&image, encoding).map_err(|e| {
            Pdf2ZipError::EncodeFailed {
                page,
                detail: e.to_string(),
            }
        })?;
        progress.on_page_rendered(ordinal, total, bytes.len());
        rendered.push(RenderedPage {
            page,
            ordinal,
            name: page_name(ordinal, encoding),
            encoding,
            bytes,
        });
        Ok(())
    };

    rasterizer.rasterize(
        path,
        password,
        &options.pages,
        options.scale(),
        max_pixels,
        &mut sink,
    )?;

    if rendered.len() != total {
        return Err(Pdf2ZipError::Internal(format!(
            "rasterizer produced {} of {} pages",
            rendered.len(),
            total
        )));
    }

    progress.on_render_complete(total);
    info!(pages = total, dpi = options.dpi, "Rendered document");
    Ok(rendered)
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`PageRasterizer`] backed by the pdfium library.
///
/// A fresh binding is made per call, on the blocking thread that uses it.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    /// Library file, or directory holding the platform library. `None`
    /// defers to `pdfium_auto` (`PDFIUM_LIB_PATH`, then the cache, then a
    /// download).
    lib_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(lib_path: Option<PathBuf>) -> Self {
        Self { lib_path }
    }

    /// Locate the library through `pdfium_auto`.
    pub fn from_env() -> Self {
        Self::default()
    }

    fn bind(&self) -> Result<Pdfium, Pdf2ZipError> {
        match &self.lib_path {
            Some(path) => pdfium_auto::bind_pdfium_from_path(path),
            None => pdfium_auto::bind_pdfium_silent(),
        }
        .map_err(|e| Pdf2ZipError::PdfiumBindingFailed(e.to_string()))
    }
}

fn map_load_error(e: PdfiumError, password: Option<&str>) -> Pdf2ZipError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            Pdf2ZipError::WrongPassword
        } else {
            Pdf2ZipError::PasswordRequired
        }
    } else {
        Pdf2ZipError::CorruptPdf { detail: err_str }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn open(&self, path: &Path, password: Option<&str>) -> Result<usize, Pdf2ZipError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| map_load_error(e, password))?;
        let page_count = document.pages().len() as usize;
        debug!("PDF opened: {} pages", page_count);
        Ok(page_count)
    }

    fn rasterize(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: &[usize],
        scale: f32,
        max_pixels: u32,
        sink: &mut PageSink<'_>,
    ) -> Result<(), Pdf2ZipError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(path, password)
            .map_err(|e| map_load_error(e, password))?;

        let doc_pages = document.pages();
        let total_pages = doc_pages.len() as usize;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        for &page_num in pages {
            if page_num == 0 || page_num > total_pages {
                return Err(Pdf2ZipError::RasterisationFailed {
                    page: page_num,
                    detail: format!("out of range (document has {} pages)", total_pages),
                });
            }

            let page = doc_pages
                .get((page_num - 1) as u16)
                .map_err(|e| Pdf2ZipError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2ZipError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );

            sink(page_num, image)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Treats any path as a document of `pages` pages, optionally locked.
    struct FakeRasterizer {
        pages: usize,
        password: Option<&'static str>,
        fail_on: Option<usize>,
        opens: AtomicUsize,
    }

    impl FakeRasterizer {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                password: None,
                fail_on: None,
                opens: AtomicUsize::new(0),
            }
        }

        fn check(&self, password: Option<&str>) -> Result<(), Pdf2ZipError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match (self.password, password) {
                (None, _) => Ok(()),
                (Some(_), None) => Err(Pdf2ZipError::PasswordRequired),
                (Some(want), Some(got)) if want == got => Ok(()),
                (Some(_), Some(_)) => Err(Pdf2ZipError::WrongPassword),
            }
        }
    }

    impl PageRasterizer for FakeRasterizer {
        fn open(&self, _path: &Path, password: Option<&str>) -> Result<usize, Pdf2ZipError> {
            self.check(password)?;
            Ok(self.pages)
        }

        fn rasterize(
            &self,
            _path: &Path,
            password: Option<&str>,
            pages: &[usize],
            scale: f32,
            _max_pixels: u32,
            sink: &mut PageSink<'_>,
        ) -> Result<(), Pdf2ZipError> {
            self.check(password)?;
            for &p in pages {
                if Some(p) == self.fail_on {
                    return Err(Pdf2ZipError::RasterisationFailed {
                        page: p,
                        detail: "boom".into(),
                    });
                }
                let side = (10.0 * scale) as u32;
                sink(p, DynamicImage::ImageRgb8(RgbImage::from_pixel(side, side, Rgb([p as u8, 0, 0]))))?;
            }
            Ok(())
        }
    }

    fn options(pages: Vec<usize>) -> RenderOptions {
        RenderOptions::new(144, ImageEncoding::Png, pages)
    }

    #[test]
    fn names_are_dense_ordinals() {
        let r = FakeRasterizer::new(10);
        let out = render_blocking(
            &r,
            Path::new("doc.pdf"),
            None,
            &options(vec![2, 5, 9]),
            1000,
            &NoopRenderProgress,
        )
        .unwrap();
        let names: Vec<_> = out.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["page_1.png", "page_2.png", "page_3.png"]);
        let originals: Vec<_> = out.iter().map(|p| p.page).collect();
        assert_eq!(originals, [2, 5, 9]);
    }

    #[test]
    fn scale_reaches_the_rasterizer() {
        let r = FakeRasterizer::new(1);
        let out = render_blocking(
            &r,
            Path::new("doc.pdf"),
            None,
            &options(vec![1]),
            1000,
            &NoopRenderProgress,
        )
        .unwrap();
        let img = image::load_from_memory(&out[0].bytes).unwrap();
        assert_eq!(img.width(), 20);
    }

    #[test]
    fn page_failure_aborts_everything() {
        let mut r = FakeRasterizer::new(5);
        r.fail_on = Some(3);
        let err = render_blocking(
            &r,
            Path::new("doc.pdf"),
            None,
            &options(vec![1, 2, 3, 4]),
            1000,
            &NoopRenderProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Pdf2ZipError::RasterisationFailed { page: 3, .. }));
    }

    #[test]
    fn wrong_password_fails_before_rendering() {
        let mut r = FakeRasterizer::new(3);
        r.password = Some("secret");
        let err = render_blocking(
            &r,
            Path::new("doc.pdf"),
            Some("nope"),
            &options(vec![1, 2, 3]),
            1000,
            &NoopRenderProgress,
        )
        .unwrap_err();
        assert!(matches!(err, Pdf2ZipError::WrongPassword));
        assert_eq!(r.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn inspect_detects_protection() {
        let mut r = FakeRasterizer::new(4);
        r.password = Some("secret");

        let info = inspect_blocking(&r, Path::new("doc.pdf"), Some("secret")).unwrap();
        assert_eq!(
            info,
            DocumentInfo {
                page_count: 4,
                password_protected: true
            }
        );

        let err = inspect_blocking(&r, Path::new("doc.pdf"), Some("")).unwrap_err();
        assert!(matches!(err, Pdf2ZipError::PasswordRequired));

        let err = inspect_blocking(&r, Path::new("doc.pdf"), Some("guess")).unwrap_err();
        assert!(matches!(err, Pdf2ZipError::WrongPassword));
    }

    #[test]
    fn inspect_unprotected_ignores_password() {
        let r = FakeRasterizer::new(2);
        let info = inspect_blocking(&r, Path::new("doc.pdf"), Some("whatever")).unwrap();
        assert!(!info.password_protected);
        assert_eq!(info.page_count, 2);
    }

    #[tokio::test]
    async fn render_document_runs_off_the_runtime() {
        let r: Arc<dyn PageRasterizer> = Arc::new(FakeRasterizer::new(3));
        let out = render_document(
            r,
            Path::new("doc.pdf"),
            None,
            &RenderOptions::new(72, ImageEncoding::Jpeg, vec![1, 2, 3]),
            1000,
            None,
        )
        .await
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].name, "page_3.jpg");
    }

    #[test]
    fn missing_explicit_library_is_a_binding_error() {
        let dir = tempfile::tempdir().unwrap();
        let r = PdfiumRasterizer::new(Some(dir.path().join("nowhere")));
        let err = r.open(Path::new("doc.pdf"), None).unwrap_err();
        assert!(matches!(err, Pdf2ZipError::PdfiumBindingFailed(_)), "{err:?}");
    }
}
