//! HTTP mapping for [`Pdf2ZipError`].

use crate::error::{ErrorKind, Pdf2ZipError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl Pdf2ZipError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match (self.kind(), self) {
            (_, Pdf2ZipError::UploadTooLarge { .. } | Pdf2ZipError::RequestTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            (_, Pdf2ZipError::InvalidConfig(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            (ErrorKind::Validation, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::Authentication, _) => StatusCode::FORBIDDEN,
            (ErrorKind::ResourceLimit, _) => StatusCode::PAYMENT_REQUIRED,
            (_, Pdf2ZipError::MissingProof { .. }) => StatusCode::BAD_REQUEST,
            (_, Pdf2ZipError::InvalidSignature | Pdf2ZipError::OrderMismatch) => {
                StatusCode::FORBIDDEN
            }
            (_, Pdf2ZipError::GatewayNotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            (_, Pdf2ZipError::GatewayFailed(_)) => StatusCode::BAD_GATEWAY,
            (_, Pdf2ZipError::CorruptPdf { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            (ErrorKind::Token, _) => StatusCode::NOT_FOUND,
            (ErrorKind::Payment | ErrorKind::Render | ErrorKind::Internal, _) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Pdf2ZipError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::debug!(status = status.as_u16(), code = self.code(), "{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        });
        (status, body).into_response()
    }
}
