//! Shared fixtures: a rasterizer that reads its behaviour from the spooled
//! file, and a gateway that hands out predictable order ids.
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use pdf2zip::pipeline::render::PageSink;
use pdf2zip::{
    ConversionService, GatewayConfig, Order, PageRasterizer, PaymentGateway, PaymentVerifier,
    Pdf2ZipError, ServiceConfig,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SECRET: &str = "test_key_secret";
pub const KEY_ID: &str = "rzp_test_key";

/// Build the bytes of a fake PDF understood by [`StubRasterizer`].
///
/// The first line is the PDF magic, the second carries the directives, the
/// rest pads the file to `size_bytes`.
pub fn stub_pdf(pages: usize, password: Option<&str>, fail_page: Option<usize>, size_bytes: usize) -> Vec<u8> {
    let mut header = format!("%PDF-1.7\n%stub pages={pages}");
    if let Some(pw) = password {
        header.push_str(&format!(" password={pw}"));
    }
    if let Some(p) = fail_page {
        header.push_str(&format!(" fail_page={p}"));
    }
    header.push('\n');
    let mut bytes = header.into_bytes();
    if bytes.len() < size_bytes {
        bytes.resize(size_bytes, b'%');
    }
    bytes
}

#[derive(Debug, Default)]
struct Directives {
    pages: usize,
    password: Option<String>,
    fail_page: Option<usize>,
}

fn read_directives(path: &Path) -> Result<Directives, Pdf2ZipError> {
    let bytes = std::fs::read(path).map_err(|e| Pdf2ZipError::CorruptPdf {
        detail: e.to_string(),
    })?;
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]).to_string();
    let line = text
        .lines()
        .find(|l| l.starts_with("%stub"))
        .ok_or_else(|| Pdf2ZipError::CorruptPdf {
            detail: "no stub header".into(),
        })?;

    let mut d = Directives::default();
    for part in line.split_whitespace().skip(1) {
        match part.split_once('=') {
            Some(("pages", v)) => d.pages = v.parse().unwrap_or(0),
            Some(("password", v)) => d.password = Some(v.to_string()),
            Some(("fail_page", v)) => d.fail_page = v.parse().ok(),
            _ => {}
        }
    }
    Ok(d)
}

/// Rasterizer driven by the `%stub` header of the file it is given.
#[derive(Debug, Default)]
pub struct StubRasterizer {
    pub opened: AtomicUsize,
    pub rendered: AtomicUsize,
}

impl StubRasterizer {
    fn authenticate(d: &Directives, password: Option<&str>) -> Result<(), Pdf2ZipError> {
        match (&d.password, password) {
            (None, _) => Ok(()),
            (Some(_), None) => Err(Pdf2ZipError::PasswordRequired),
            (Some(expected), Some(given)) if expected == given => Ok(()),
            (Some(_), Some(_)) => Err(Pdf2ZipError::WrongPassword),
        }
    }
}

impl PageRasterizer for StubRasterizer {
    fn open(&self, path: &Path, password: Option<&str>) -> Result<usize, Pdf2ZipError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let d = read_directives(path)?;
        Self::authenticate(&d, password)?;
        Ok(d.pages)
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
        let d = read_directives(path)?;
        Self::authenticate(&d, password)?;
        let edge = ((20.0 * scale) as u32).min(max_pixels).max(1);
        for &page in pages {
            if d.fail_page == Some(page) {
                return Err(Pdf2ZipError::RasterisationFailed {
                    page,
                    detail: "stub failure".into(),
                });
            }
            self.rendered.fetch_add(1, Ordering::SeqCst);
            let shade = (page * 10 % 255) as u8;
            let img = RgbaImage::from_pixel(edge, edge, Rgba([shade, 0, 0, 255]));
            sink(page, DynamicImage::ImageRgba8(img))?;
        }
        Ok(())
    }
}

/// Gateway that numbers its orders and can be told to fail.
#[derive(Debug, Default)]
pub struct FakeGateway {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        KEY_ID
    }

    async fn create_order(&self, amount: u64, currency: &str) -> Result<Order, Pdf2ZipError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(Pdf2ZipError::GatewayFailed("HTTP 500: upstream".into()));
        }
        Ok(Order {
            id: format!("order_test_{n}"),
            amount,
            currency: currency.to_string(),
        })
    }
}

pub struct Harness {
    pub service: Arc<ConversionService>,
    pub rasterizer: Arc<StubRasterizer>,
    pub gateway: Option<Arc<FakeGateway>>,
    pub spool: tempfile::TempDir,
}

impl Harness {
    /// Files currently spooled.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.spool.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

pub fn config_in(spool: &Path) -> ServiceConfig {
    ServiceConfig::builder()
        .spool_dir(spool)
        .gateway(GatewayConfig::new(KEY_ID, SECRET))
        .build()
        .unwrap()
}

pub fn harness() -> Harness {
    harness_with(Some(FakeGateway::default()))
}

pub fn harness_with(gateway: Option<FakeGateway>) -> Harness {
    let spool = tempfile::tempdir().unwrap();
    let rasterizer = Arc::new(StubRasterizer::default());
    let gateway = gateway.map(Arc::new);
    let service = ConversionService::with_parts(
        config_in(spool.path()),
        rasterizer.clone(),
        PaymentVerifier::new(Some(SECRET)),
        gateway.clone().map(|g| g as Arc<dyn PaymentGateway>),
    );
    Harness {
        service: Arc::new(service),
        rasterizer,
        gateway,
        spool,
    }
}

pub fn sign(order_id: &str, payment_id: &str) -> String {
    PaymentVerifier::new(Some(SECRET))
        .sign(order_id, payment_id)
        .unwrap()
}
