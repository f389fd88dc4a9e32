//! The access-gated conversion flow: check → (pay) → convert.
//!
//! [`ConversionService::check`] spools and inspects an upload, decides
//! whether it is free, registers it in the [`ArtifactStore`] and, for a
//! chargeable document, creates the gateway order the client must pay.
//!
//! [`ConversionService::convert`] takes the token back, verifies payment
//! when needed, then claims the entry and renders it. Everything that can be
//! rejected up front (options, payment) is checked while the entry is still
//! `Pending`, so the client can retry. Once the entry is claimed, any failure
//! abandons it.

use crate::config::{ImageEncoding, RenderOptions, ServiceConfig};
use crate::error::{ErrorKind, Pdf2ZipError};
use crate::gate::{AccessGate, DocumentMetrics};
use crate::payment::{PaymentGateway, PaymentProof, PaymentVerifier, RazorpayGateway};
use crate::pipeline::package::Archive;
use crate::pipeline::range;
use crate::pipeline::render::{self, PageRasterizer};
use crate::store::{ArtifactStore, ArtifactToken, Document, EntryInputs};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempPath;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF";
/// The header may follow leading junk up to this offset.
const PDF_HEADER_WINDOW: usize = 1024;

/// An upload to check.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub document: Vec<u8>,
    pub password: Option<String>,
    /// Page-range expression; empty selects every page.
    pub range: String,
    /// `None` means JPEG.
    pub encoding: Option<ImageEncoding>,
    /// `None` means the configured default.
    pub dpi: Option<u32>,
    /// Reject the request if any range token is dropped.
    pub strict_range: bool,
}

/// Result of a check, as returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub token: ArtifactToken,
    pub pages: usize,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub selected_pages: usize,
    pub chargeable: bool,
    pub amount: u64,
    pub currency: String,
    /// Gateway order to pay, for chargeable documents.
    pub order_id: Option<String>,
    /// Public gateway key the checkout client needs.
    pub key_id: Option<String>,
    pub expires_in_secs: u64,
}

/// Options the convert step may change from what was checked.
#[derive(Debug, Clone, Default)]
pub struct ConvertOverrides {
    pub range: Option<String>,
    pub encoding: Option<ImageEncoding>,
    pub dpi: Option<u32>,
    pub password: Option<String>,
    pub strict_range: bool,
}

/// A conversion of a checked document.
#[derive(Debug, Clone, Default)]
pub struct ConvertRequest {
    pub token: String,
    pub proof: PaymentProof,
    pub overrides: ConvertOverrides,
}

/// Orchestrates the gate, the store, payments and the render pipeline.
pub struct ConversionService {
    config: ServiceConfig,
    gate: AccessGate,
    store: Arc<ArtifactStore>,
    rasterizer: Arc<dyn PageRasterizer>,
    verifier: PaymentVerifier,
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("verifier", &self.verifier)
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}

impl ConversionService {
    /// Build a service; a Razorpay client is created when the configuration
    /// carries gateway credentials.
    pub fn new(
        config: ServiceConfig,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Result<Self, Pdf2ZipError> {
        let gateway: Option<Arc<dyn PaymentGateway>> = match &config.gateway {
            Some(gw) => Some(Arc::new(RazorpayGateway::new(gw.clone())?)),
            None => None,
        };
        let verifier =
            PaymentVerifier::new(config.gateway.as_ref().map(|g| g.key_secret.as_str()));
        Ok(Self::with_parts(config, rasterizer, verifier, gateway))
    }

    /// Build a service from explicit collaborators.
    pub fn with_parts(
        config: ServiceConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        verifier: PaymentVerifier,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            gate: config.access_gate(),
            store: ArtifactStore::new(config.entry_ttl),
            config,
            rasterizer,
            verifier,
            gateway,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Start the background expiry sweep.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        self.store.spawn_reaper(self.config.sweep_interval)
    }

    /// Inspect an upload and register it for conversion.
    pub async fn check(&self, request: CheckRequest) -> Result<CheckOutcome, Pdf2ZipError> {
        let size_bytes = request.document.len() as u64;
        if size_bytes == 0 {
            return Err(Pdf2ZipError::MissingDocument);
        }
        if size_bytes > self.config.max_upload_bytes {
            return Err(Pdf2ZipError::UploadTooLarge {
                size: size_bytes,
                max: self.config.max_upload_bytes,
            });
        }
        if !has_pdf_header(&request.document) {
            return Err(Pdf2ZipError::NotAPdf {
                magic: request.document.iter().take(PDF_MAGIC.len()).copied().collect(),
            });
        }
        let dpi = self.validate_dpi(request.dpi)?;
        let encoding = request.encoding.unwrap_or(ImageEncoding::Jpeg);
        let password = request.password.filter(|p| !p.is_empty());

        let path = self.spool(request.document).await?;
        let info = render::inspect_document(self.rasterizer.clone(), &path, password.as_deref())
            .await?;

        let selected = select_pages(&request.range, info.page_count, request.strict_range)?;
        let metrics = DocumentMetrics {
            page_count: info.page_count,
            size_bytes,
            selected_pages: selected.len(),
        };
        let decision = self.gate.decide(&metrics);

        if decision.chargeable && self.gateway.is_none() {
            warn!(
                pages = metrics.page_count,
                bytes = size_bytes,
                "Chargeable document but no payment gateway is configured"
            );
            return Err(Pdf2ZipError::GatewayNotConfigured);
        }

        let inputs = EntryInputs {
            metrics,
            decision: decision.clone(),
            password: if info.password_protected { password } else { None },
            range: request.range,
            encoding,
            dpi,
            order_id: None,
        };
        let token = self.store.insert(Document::new(path, size_bytes, info), inputs);

        let mut order_id = None;
        if let (true, Some(gateway)) = (decision.chargeable, self.gateway.as_ref()) {
            let order = match gateway.create_order(decision.amount, &decision.currency).await {
                Ok(order) => order,
                Err(e) => {
                    self.store.abort(&token);
                    return Err(e);
                }
            };
            self.store.bind_order(&token, order.id.clone())?;
            order_id = Some(order.id);
        }

        info!(
            %token,
            pages = metrics.page_count,
            size_mb = metrics.size_mb(),
            selected = metrics.selected_pages,
            chargeable = decision.chargeable,
            "Document checked"
        );

        Ok(CheckOutcome {
            token,
            pages: metrics.page_count,
            size_bytes,
            size_mb: metrics.size_mb(),
            selected_pages: metrics.selected_pages,
            chargeable: decision.chargeable,
            amount: decision.amount,
            currency: decision.currency,
            order_id,
            key_id: self.gateway.as_ref().map(|g| g.key_id().to_string()),
            expires_in_secs: self.store.ttl().as_secs(),
        })
    }

    /// Convert a checked document into a ZIP of page images.
    pub async fn convert(&self, request: ConvertRequest) -> Result<Archive, Pdf2ZipError> {
        let start = Instant::now();
        let token: ArtifactToken = request.token.parse()?;
        let snapshot = self.store.snapshot(&token)?;
        let inputs = &snapshot.inputs;

        // ── Payment ──────────────────────────────────────────────────────
        if inputs.decision.chargeable {
            if request.proof.is_empty() {
                return Err(Pdf2ZipError::PaymentRequired {
                    amount: inputs.decision.amount,
                    currency: inputs.decision.currency.clone(),
                });
            }
            let paid_order = self.verifier.verify(&request.proof)?;
            if inputs.order_id.as_deref() != Some(paid_order) {
                warn!(%token, "Payment proof names a different order");
                return Err(Pdf2ZipError::OrderMismatch);
            }
            debug!(%token, order_id = paid_order, "Payment verified");
        }

        // ── Options ──────────────────────────────────────────────────────
        let overrides = request.overrides;
        let dpi = self.validate_dpi(overrides.dpi.or(Some(inputs.dpi)))?;
        let encoding = overrides.encoding.unwrap_or(inputs.encoding);
        let range = overrides.range.as_deref().unwrap_or(&inputs.range);
        let pages = select_pages(range, inputs.metrics.page_count, overrides.strict_range)?;
        let password = overrides
            .password
            .filter(|p| !p.is_empty())
            .or_else(|| inputs.password.clone());
        let options = RenderOptions::new(dpi, encoding, pages);

        // Credentials are checked before the lease: a wrong password leaves
        // the entry `Pending`. Other failures surface from the render.
        if snapshot.password_protected {
            let opened = render::inspect_document(
                self.rasterizer.clone(),
                &snapshot.path,
                password.as_deref(),
            )
            .await;
            if let Err(e) = opened {
                if e.kind() == ErrorKind::Authentication {
                    debug!(%token, code = e.code(), "Password rejected; entry kept");
                    return Err(e);
                }
            }
        }

        // ── Render ───────────────────────────────────────────────────────
        let lease = self.store.checkout(&token)?;
        let path = lease.document()?.path().to_path_buf();
        let archive = crate::pipeline::render_to_archive(
            self.rasterizer.clone(),
            &path,
            password.as_deref(),
            &options,
            self.config.max_rendered_pixels,
            None,
        )
        .await?;
        lease.commit();

        info!(
            %token,
            pages = archive.members.len(),
            bytes = archive.bytes.len(),
            dpi,
            format = encoding.extension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Conversion complete"
        );
        Ok(archive)
    }

    /// Abandon a checked document. `false` if there was nothing to abort.
    pub fn abort(&self, token: &str) -> Result<bool, Pdf2ZipError> {
        let token: ArtifactToken = token.parse()?;
        Ok(self.store.abort(&token))
    }

    fn validate_dpi(&self, dpi: Option<u32>) -> Result<u32, Pdf2ZipError> {
        let dpi = dpi.unwrap_or(self.config.default_dpi);
        if dpi == 0 || dpi > self.config.max_dpi {
            return Err(Pdf2ZipError::InvalidField {
                field: "dpi",
                reason: format!("{} is outside 1..={}", dpi, self.config.max_dpi),
            });
        }
        Ok(dpi)
    }

    /// Write the upload to a temporary file that is deleted on drop.
    async fn spool(&self, bytes: Vec<u8>) -> Result<TempPath, Pdf2ZipError> {
        let dir: PathBuf = self
            .config
            .spool_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix("pdf2zip-")
                .suffix(".pdf")
                .tempfile_in(&dir)
                .map_err(|source| Pdf2ZipError::SpoolFailed {
                    path: dir.clone(),
                    source,
                })?;
            file.write_all(&bytes)
                .and_then(|()| file.flush())
                .map_err(|source| Pdf2ZipError::SpoolFailed {
                    path: file.path().to_path_buf(),
                    source,
                })?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(|e| Pdf2ZipError::Internal(format!("Spool task panicked: {}", e)))?
    }
}

/// Resolve `spec`, failing in strict mode if any token was dropped.
fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(PDF_HEADER_WINDOW)]
        .windows(PDF_MAGIC.len())
        .any(|w| w == PDF_MAGIC)
}

fn select_pages(spec: &str, page_count: usize, strict: bool) -> Result<Vec<usize>, Pdf2ZipError> {
    let report = range::resolve_with_report(spec, page_count);
    if !report.rejected.is_empty() {
        if strict {
            return Err(Pdf2ZipError::InvalidRange {
                rejected: report.rejected_summary(),
            });
        }
        debug!(rejected = %report.rejected_summary(), fell_back = report.fell_back, "Dropped range tokens");
    }
    Ok(report.pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_selection_rejects_dropped_tokens() {
        assert_eq!(select_pages("1-3", 10, true).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            select_pages("1-3,abc", 10, true),
            Err(Pdf2ZipError::InvalidRange { .. })
        ));
        assert_eq!(select_pages("1-3,abc", 10, false).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_range_is_not_a_strict_failure() {
        assert_eq!(select_pages("", 3, true).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn header_is_found_after_leading_junk() {
        assert!(has_pdf_header(b"%PDF-1.7\n"));
        assert!(has_pdf_header(b"\xEF\xBB\xBF\r\n%PDF-1.4"));

        let mut late = vec![b' '; PDF_HEADER_WINDOW - 4];
        late.extend_from_slice(b"%PDF-1.4");
        assert!(has_pdf_header(&late));

        let mut too_late = vec![b' '; PDF_HEADER_WINDOW];
        too_late.extend_from_slice(b"%PDF-1.4");
        assert!(!has_pdf_header(&too_late));

        assert!(!has_pdf_header(b"PK\x03\x04"));
        assert!(!has_pdf_header(b"%PD"));
    }
}
