//! Configuration types for the conversion service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Per-request rendering choices live in
//! [`RenderOptions`], which has no `Default`: the request layer decides what
//! is filled in, and the pipeline only ever sees fully specified options.

use crate::error::Pdf2ZipError;
use crate::gate::{AccessGate, Charge, FreeTierLimits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// One mebibyte, the unit free-tier size limits are expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Configuration for the access-gated conversion service.
///
/// # Example
/// ```rust
/// use pdf2zip::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .free_max_pages(25)
///     .free_max_mb(25)
///     .default_dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.free_max_pages, 25);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// DPI used when a request does not name one. Default: 150.
    pub default_dpi: u32,

    /// Highest DPI a request may ask for. Default: 600.
    pub max_dpi: u32,

    /// Longest rendered edge in pixels, whatever the DPI. Default: 10 000.
    ///
    /// A 600-DPI render of an A0 poster would otherwise allocate gigabytes.
    pub max_rendered_pixels: u32,

    /// Documents with more pages than this are chargeable. Default: 25.
    pub free_max_pages: usize,

    /// Documents larger than this many bytes are chargeable. Default: 25 MiB.
    pub free_max_bytes: u64,

    /// Fixed charge in minor currency units (paise). Default: 1000 (₹10).
    pub charge_amount: u64,

    /// ISO currency code for the charge. Default: "INR".
    pub currency: String,

    /// How long a checked document waits for its conversion. Default: 15 min.
    pub entry_ttl: Duration,

    /// Interval of the background expiry sweep. Default: 30 s.
    pub sweep_interval: Duration,

    /// Upload ceiling enforced before anything is spooled. Default: 200 MiB.
    pub max_upload_bytes: u64,

    /// Directory uploads are spooled into. Default: the system temp dir.
    pub spool_dir: Option<PathBuf>,

    /// Payment gateway credentials. `None` disables paid conversions.
    pub gateway: Option<GatewayConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_dpi: 150,
            max_dpi: 600,
            max_rendered_pixels: 10_000,
            free_max_pages: 25,
            free_max_bytes: 25 * MIB,
            charge_amount: 1000,
            currency: "INR".to_string(),
            entry_ttl: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(30),
            max_upload_bytes: 200 * MIB,
            spool_dir: None,
            gateway: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("default_dpi", &self.default_dpi)
            .field("max_dpi", &self.max_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("free_max_pages", &self.free_max_pages)
            .field("free_max_bytes", &self.free_max_bytes)
            .field("charge_amount", &self.charge_amount)
            .field("currency", &self.currency)
            .field("entry_ttl", &self.entry_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("spool_dir", &self.spool_dir)
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// The free-tier gate described by this configuration.
    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(
            FreeTierLimits {
                max_pages: self.free_max_pages,
                max_bytes: self.free_max_bytes,
            },
            Charge {
                amount: self.charge_amount,
                currency: self.currency.clone(),
            },
        )
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn default_dpi(mut self, dpi: u32) -> Self {
        self.config.default_dpi = dpi.max(1);
        self
    }

    pub fn max_dpi(mut self, dpi: u32) -> Self {
        self.config.max_dpi = dpi.max(72);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn free_max_pages(mut self, pages: usize) -> Self {
        self.config.free_max_pages = pages;
        self
    }

    pub fn free_max_bytes(mut self, bytes: u64) -> Self {
        self.config.free_max_bytes = bytes;
        self
    }

    pub fn free_max_mb(mut self, mb: u64) -> Self {
        self.config.free_max_bytes = mb.saturating_mul(MIB);
        self
    }

    pub fn charge_amount(mut self, amount: u64) -> Self {
        self.config.charge_amount = amount;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.config.currency = currency.into().to_uppercase();
        self
    }

    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.config.entry_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.spool_dir = Some(dir.into());
        self
    }

    pub fn gateway(mut self, gateway: GatewayConfig) -> Self {
        self.config.gateway = Some(gateway);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, Pdf2ZipError> {
        let c = &self.config;
        if c.default_dpi > c.max_dpi {
            return Err(Pdf2ZipError::InvalidConfig(format!(
                "default DPI {} exceeds max DPI {}",
                c.default_dpi, c.max_dpi
            )));
        }
        if c.entry_ttl.is_zero() {
            return Err(Pdf2ZipError::InvalidConfig(
                "entry TTL must be greater than zero".into(),
            ));
        }
        if c.sweep_interval.is_zero() {
            return Err(Pdf2ZipError::InvalidConfig(
                "sweep interval must be greater than zero".into(),
            ));
        }
        if c.charge_amount == 0 {
            return Err(Pdf2ZipError::InvalidConfig(
                "charge amount must be at least one minor unit".into(),
            ));
        }
        if c.currency.len() != 3 || !c.currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(Pdf2ZipError::InvalidConfig(format!(
                "currency must be a three-letter ISO code, got '{}'",
                c.currency
            )));
        }
        Ok(self.config)
    }
}

/// Payment gateway credentials and endpoint.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Public key id handed to the checkout client.
    pub key_id: String,
    /// Shared secret; signs payment proofs and authenticates API calls.
    pub key_secret: String,
    /// API base URL. Default: `https://api.razorpay.com`.
    pub api_base: String,
    /// Per-request timeout for order creation in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            api_base: "https://api.razorpay.com".to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Render options ───────────────────────────────────────────────────────

/// Image format each rendered page is encoded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageEncoding {
    /// Lossy, small. Alpha is flattened away.
    Jpeg,
    /// Lossless.
    Png,
}

impl ImageEncoding {
    /// File extension used in archive member names.
    pub fn extension(self) -> &'static str {
        match self {
            ImageEncoding::Jpeg => "jpg",
            ImageEncoding::Png => "png",
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            ImageEncoding::Jpeg => image::ImageFormat::Jpeg,
            ImageEncoding::Png => image::ImageFormat::Png,
        }
    }
}

impl FromStr for ImageEncoding {
    type Err = Pdf2ZipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Ok(ImageEncoding::Jpeg),
            "PNG" => Ok(ImageEncoding::Png),
            other => Err(Pdf2ZipError::InvalidField {
                field: "format",
                reason: format!("unsupported image format '{other}' (expected JPEG or PNG)"),
            }),
        }
    }
}

/// Fully specified options for one render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Target resolution in dots per inch.
    pub dpi: u32,
    /// Output image format.
    pub encoding: ImageEncoding,
    /// 1-based page numbers, ascending and distinct.
    pub pages: Vec<usize>,
}

impl RenderOptions {
    pub fn new(dpi: u32, encoding: ImageEncoding, pages: Vec<usize>) -> Self {
        Self {
            dpi,
            encoding,
            pages,
        }
    }

    /// Render scale relative to 72 DPI, never below native size.
    pub fn scale(&self) -> f32 {
        (self.dpi as f32 / 72.0).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_free_tier() {
        let c = ServiceConfig::default();
        assert_eq!(c.free_max_pages, 25);
        assert_eq!(c.free_max_bytes, 25 * MIB);
        assert_eq!(c.charge_amount, 1000);
        assert_eq!(c.currency, "INR");
        assert!(c.gateway.is_none());
    }

    #[test]
    fn gate_reflects_builder_limits() {
        let c = ServiceConfig::builder()
            .free_max_pages(10)
            .free_max_mb(5)
            .build()
            .unwrap();
        let limits = c.access_gate().limits();
        assert_eq!(limits.max_pages, 10);
        assert_eq!(limits.max_bytes, 5 * MIB);
    }

    #[test]
    fn builder_rejects_default_above_max() {
        let err = ServiceConfig::builder()
            .max_dpi(300)
            .default_dpi(400)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds max DPI"));
    }

    #[test]
    fn builder_rejects_bad_currency() {
        assert!(ServiceConfig::builder().currency("rupees").build().is_err());
        let c = ServiceConfig::builder().currency("usd").build().unwrap();
        assert_eq!(c.currency, "USD");
    }

    #[test]
    fn gateway_debug_redacts_secret() {
        let g = GatewayConfig::new("rzp_test_key", "very-secret");
        let dbg = format!("{:?}", g);
        assert!(dbg.contains("rzp_test_key"));
        assert!(!dbg.contains("very-secret"));
    }

    #[test]
    fn encoding_parses_case_insensitively() {
        assert_eq!("jpeg".parse::<ImageEncoding>().unwrap(), ImageEncoding::Jpeg);
        assert_eq!("JPG".parse::<ImageEncoding>().unwrap(), ImageEncoding::Jpeg);
        assert_eq!(" png ".parse::<ImageEncoding>().unwrap(), ImageEncoding::Png);
        assert!("gif".parse::<ImageEncoding>().is_err());
    }

    #[test]
    fn scale_is_clamped_to_native() {
        assert_eq!(RenderOptions::new(36, ImageEncoding::Png, vec![1]).scale(), 1.0);
        assert_eq!(RenderOptions::new(72, ImageEncoding::Png, vec![1]).scale(), 1.0);
        assert_eq!(RenderOptions::new(144, ImageEncoding::Png, vec![1]).scale(), 2.0);
    }
}
