//! Error types for the pdf2zip library.
//!
//! A single error enum, [`Pdf2ZipError`], covers every way a check or a
//! conversion can fail. Each variant belongs to exactly one [`ErrorKind`]
//! so callers (the HTTP layer, the CLI) can map failures to a status code or
//! exit path without matching on every variant.
//!
//! Conversion is all-or-nothing: a single page that fails to render aborts
//! the whole request, so there is no per-page error type.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure category, one per user-visible class of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No document, malformed upload, bad option value.
    Validation,
    /// Protected document with a missing or wrong password.
    Authentication,
    /// Chargeable request attempted without any payment proof.
    ResourceLimit,
    /// Missing proof fields, bad signature, gateway not configured.
    Payment,
    /// Corrupt/unreadable document or a mid-render failure.
    Render,
    /// Unknown, expired or already-consumed token.
    Token,
    /// Unexpected internal failure.
    Internal,
}

/// All errors returned by the pdf2zip library.
#[derive(Debug, Error)]
pub enum Pdf2ZipError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The request carried no document at all.
    #[error("No file uploaded")]
    MissingDocument,

    /// The uploaded bytes do not start with the PDF magic.
    #[error("Uploaded file is not a PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// The upload exceeds the configured ceiling.
    #[error("Upload of {size} bytes exceeds the {max} byte limit")]
    UploadTooLarge { size: u64, max: u64 },

    /// The request body was cut off at the transport limit.
    #[error("Request body exceeds the {max} byte limit")]
    RequestTooLarge { max: u64 },

    /// A request field could not be parsed.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Strict range mode rejected one or more tokens.
    #[error("Invalid page range: rejected {rejected}")]
    InvalidRange { rejected: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Authentication errors ─────────────────────────────────────────────
    /// PDF requires a password but none was provided.
    #[error("This PDF is password-protected. Please enter the password.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Password incorrect for this PDF.")]
    WrongPassword,

    // ── Resource-limit errors ─────────────────────────────────────────────
    /// The document is over the free tier and no payment proof was sent.
    #[error("Payment required. Please complete payment of {amount} {currency}.")]
    PaymentRequired { amount: u64, currency: String },

    // ── Payment errors ────────────────────────────────────────────────────
    /// At least one of order id, payment id or signature is absent.
    #[error("Payment proof incomplete: missing {field}")]
    MissingProof { field: &'static str },

    /// The signature does not match the order/payment pair.
    #[error("Payment signature invalid.")]
    InvalidSignature,

    /// The proof names a different order than the one created for this token.
    #[error("Payment proof is for a different order.")]
    OrderMismatch,

    /// Payment is required but no gateway secret is provisioned.
    #[error("Payment required but the payment gateway is not configured")]
    GatewayNotConfigured,

    /// The gateway rejected or failed the order-creation call.
    #[error("Payment gateway request failed: {0}")]
    GatewayFailed(String),

    // ── Render errors ─────────────────────────────────────────────────────
    /// The document header/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt or unreadable: {detail}")]
    CorruptPdf { detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A rendered page could not be encoded to the requested format.
    #[error("Encoding page {page} failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// The archive could not be written.
    #[error("Packaging failed: {0}")]
    PackagingFailed(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or check network access for the first-run download."
    )]
    PdfiumBindingFailed(String),

    // ── Token errors ──────────────────────────────────────────────────────
    /// The token is unknown, expired, aborted or already consumed.
    ///
    /// These cases are deliberately indistinguishable to callers.
    #[error("Token not found or expired")]
    TokenNotFound,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not spool the upload to temporary storage.
    #[error("Failed to spool upload to '{path}': {source}")]
    SpoolFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2ZipError {
    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use Pdf2ZipError::*;
        match self {
            MissingDocument
            | NotAPdf { .. }
            | UploadTooLarge { .. }
            | RequestTooLarge { .. }
            | InvalidField { .. }
            | InvalidRange { .. }
            | InvalidConfig(_) => ErrorKind::Validation,
            PasswordRequired | WrongPassword => ErrorKind::Authentication,
            PaymentRequired { .. } => ErrorKind::ResourceLimit,
            MissingProof { .. }
            | InvalidSignature
            | OrderMismatch
            | GatewayNotConfigured
            | GatewayFailed(_) => ErrorKind::Payment,
            CorruptPdf { .. }
            | RasterisationFailed { .. }
            | EncodeFailed { .. }
            | PackagingFailed(_)
            | PdfiumBindingFailed(_) => ErrorKind::Render,
            TokenNotFound => ErrorKind::Token,
            SpoolFailed { .. } | Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        use Pdf2ZipError::*;
        match self {
            MissingDocument => "MISSING_DOCUMENT",
            NotAPdf { .. } => "NOT_A_PDF",
            UploadTooLarge { .. } | RequestTooLarge { .. } => "UPLOAD_TOO_LARGE",
            InvalidField { .. } => "INVALID_FIELD",
            InvalidRange { .. } => "INVALID_RANGE",
            InvalidConfig(_) => "INVALID_CONFIG",
            PasswordRequired => "PASSWORD_REQUIRED",
            WrongPassword => "WRONG_PASSWORD",
            PaymentRequired { .. } => "PAYMENT_REQUIRED",
            MissingProof { .. } => "MISSING_PROOF",
            InvalidSignature => "INVALID_SIGNATURE",
            OrderMismatch => "ORDER_MISMATCH",
            GatewayNotConfigured => "GATEWAY_NOT_CONFIGURED",
            GatewayFailed(_) => "GATEWAY_FAILED",
            CorruptPdf { .. } => "CORRUPT_PDF",
            RasterisationFailed { .. } => "RENDER_FAILED",
            EncodeFailed { .. } => "ENCODE_FAILED",
            PackagingFailed(_) => "PACKAGING_FAILED",
            PdfiumBindingFailed(_) => "ENGINE_UNAVAILABLE",
            TokenNotFound => "TOKEN_NOT_FOUND",
            SpoolFailed { .. } => "SPOOL_FAILED",
            Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_required_display() {
        let e = Pdf2ZipError::PaymentRequired {
            amount: 1000,
            currency: "INR".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("1000 INR"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::ResourceLimit);
    }

    #[test]
    fn missing_proof_names_field() {
        let e = Pdf2ZipError::MissingProof { field: "signature" };
        assert!(e.to_string().contains("signature"));
        assert_eq!(e.kind(), ErrorKind::Payment);
    }

    #[test]
    fn token_errors_do_not_leak_state() {
        let e = Pdf2ZipError::TokenNotFound;
        assert_eq!(e.to_string(), "Token not found or expired");
        assert_eq!(e.kind(), ErrorKind::Token);
    }

    #[test]
    fn rasterisation_display() {
        let e = Pdf2ZipError::RasterisationFailed {
            page: 3,
            detail: "bad xobject".into(),
        };
        assert!(e.to_string().contains("page 3"));
        assert_eq!(e.kind(), ErrorKind::Render);
        assert_eq!(e.code(), "RENDER_FAILED");
    }

    #[test]
    fn password_errors_are_authentication() {
        assert_eq!(Pdf2ZipError::PasswordRequired.kind(), ErrorKind::Authentication);
        assert_eq!(Pdf2ZipError::WrongPassword.kind(), ErrorKind::Authentication);
    }
}
