//! # pdf2zip
//!
//! Convert PDF documents into page images packaged as one ZIP archive,
//! behind a free-tier quota with verified payments for larger documents.
//!
//! ## Flow
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Check    spool, count pages, resolve range, free or chargeable?
//!  │              → token (+ gateway order when chargeable)
//!  ├─ 2. Pay      client pays the order, receives a signed proof
//!  ├─ 3. Convert  verify proof, claim the token exactly once,
//!  │              render (pdfium, spawn_blocking) → encode → zip
//!  └─ 4. Release  the spooled document is deleted on commit, abort or expiry
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2zip::{CheckRequest, ConversionService, ConvertRequest, PdfiumRasterizer, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().default_dpi(150).build()?;
//!     let service = ConversionService::new(config, Arc::new(PdfiumRasterizer::from_env()))?;
//!
//!     let outcome = service
//!         .check(CheckRequest {
//!             document: std::fs::read("document.pdf")?,
//!             ..Default::default()
//!         })
//!         .await?;
//!     assert!(!outcome.chargeable);
//!
//!     let archive = service
//!         .convert(ConvertRequest {
//!             token: outcome.token.to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     std::fs::write(archive.file_name, &archive.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router for `/precheck`, `/convert`, `/tokens/{token}`, `/healthz` |
//! | `cli`    | on      | Enables the `pdf2zip` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! pdf2zip = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! Rendering binds to the pdfium shared library at runtime through the
//! `pdfium-auto` workspace crate. `PDFIUM_LIB_PATH` (a library file or the
//! directory containing it) wins; otherwise a cached copy is used, downloaded
//! on first run. Build with `--features bundled` to embed the library.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod gate;
pub mod payment;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, ImageEncoding, RenderOptions, ServiceConfig, ServiceConfigBuilder};
pub use error::{ErrorKind, Pdf2ZipError};
pub use gate::{AccessDecision, AccessGate, DocumentMetrics};
pub use payment::{Order, PaymentGateway, PaymentProof, PaymentVerifier, RazorpayGateway};
pub use pipeline::package::{Archive, ARCHIVE_FILE_NAME};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{NoopRenderProgress, ProgressCallback, RenderProgress};
pub use service::{CheckOutcome, CheckRequest, ConversionService, ConvertOverrides, ConvertRequest};
pub use store::{ArtifactStore, ArtifactToken, EntryState};
