//! Request handlers.
//!
//! Form fields keep the names the browser checkout page already posts:
//! `pdf_file`, `pdf_password`, `range`, `format`, `dpi` and the three
//! `razorpay_*` proof fields.

use crate::config::ImageEncoding;
use crate::error::Pdf2ZipError;
use crate::payment::PaymentProof;
use crate::service::{
    CheckOutcome, CheckRequest, ConversionService, ConvertOverrides, ConvertRequest,
};
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handler state.
pub type AppState = Arc<ConversionService>;

/// Name of the form field carrying the uploaded document.
const DOCUMENT_FIELD: &str = "pdf_file";

/// A submitted form, multipart or urlencoded.
#[derive(Debug, Default)]
pub struct FormFields {
    text: HashMap<String, String>,
    document: Option<Vec<u8>>,
}

impl FormFields {
    fn get(&self, name: &str) -> Option<&str> {
        self.text
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn owned(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }

    fn required(&self, name: &'static str) -> Result<String, Pdf2ZipError> {
        self.owned(name).ok_or_else(|| Pdf2ZipError::InvalidField {
            field: name,
            reason: "is required".into(),
        })
    }

    /// Password fields are not trimmed.
    fn password(&self) -> Option<String> {
        self.text
            .get("pdf_password")
            .filter(|p| !p.is_empty())
            .cloned()
    }

    fn dpi(&self) -> Result<Option<u32>, Pdf2ZipError> {
        self.get("dpi")
            .map(|raw| {
                raw.parse::<u32>().map_err(|_| Pdf2ZipError::InvalidField {
                    field: "dpi",
                    reason: format!("'{raw}' is not a whole number"),
                })
            })
            .transpose()
    }

    fn encoding(&self) -> Result<Option<ImageEncoding>, Pdf2ZipError> {
        self.get("format").map(str::parse::<ImageEncoding>).transpose()
    }

    fn flag(&self, name: &str) -> bool {
        matches!(
            self.get(name).map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "on" | "yes")
        )
    }

    fn proof(&self) -> PaymentProof {
        PaymentProof {
            order_id: self.owned("razorpay_order_id"),
            payment_id: self.owned("razorpay_payment_id"),
            signature: self.owned("razorpay_signature"),
        }
    }
}

fn multipart_error(e: MultipartError, max: u64) -> Pdf2ZipError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Pdf2ZipError::RequestTooLarge { max }
    } else {
        Pdf2ZipError::InvalidField {
            field: "body",
            reason: e.body_text(),
        }
    }
}

impl FromRequest<AppState> for FormFields {
    type Rejection = Pdf2ZipError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let max = state.config().max_upload_bytes;
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        let mut fields = FormFields::default();
        if !is_multipart {
            let Form(text) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        Pdf2ZipError::RequestTooLarge { max }
                    } else {
                        Pdf2ZipError::InvalidField {
                            field: "body",
                            reason: e.body_text(),
                        }
                    }
                })?;
            fields.text = text;
            return Ok(fields);
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| Pdf2ZipError::InvalidField {
                field: "body",
                reason: e.body_text(),
            })?;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == DOCUMENT_FIELD {
                let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
                tracing::debug!(bytes = data.len(), "Received document field");
                fields.document = Some(data.to_vec()).filter(|d| !d.is_empty());
            } else {
                let value = field.text().await.map_err(|e| multipart_error(e, max))?;
                fields.text.insert(name, value);
            }
        }
        Ok(fields)
    }
}

pub async fn healthz() -> &'static str {
    "OK"
}

pub async fn precheck(
    State(service): State<AppState>,
    fields: FormFields,
) -> Result<Json<CheckOutcome>, Pdf2ZipError> {
    let request = CheckRequest {
        password: fields.password(),
        range: fields.get("range").unwrap_or_default().to_string(),
        encoding: fields.encoding()?,
        dpi: fields.dpi()?,
        strict_range: fields.flag("strict_range"),
        document: fields.document.ok_or(Pdf2ZipError::MissingDocument)?,
    };
    Ok(Json(service.check(request).await?))
}

pub async fn convert(
    State(service): State<AppState>,
    fields: FormFields,
) -> Result<Response, Pdf2ZipError> {
    let token = fields.required("token")?;
    let request = ConvertRequest {
        token,
        proof: fields.proof(),
        overrides: ConvertOverrides {
            range: fields.owned("range"),
            encoding: fields.encoding()?,
            dpi: fields.dpi()?,
            password: fields.password(),
            strict_range: fields.flag("strict_range"),
        },
    };
    let archive = service.convert(request).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        archive.file_name
    ))
    .map_err(|e| Pdf2ZipError::Internal(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}

pub async fn abort(
    State(service): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, Pdf2ZipError> {
    service.abort(&token)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FormFields {
        FormFields {
            text: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            document: None,
        }
    }

    #[test]
    fn blank_fields_read_as_absent() {
        let f = fields(&[("range", "  "), ("dpi", "")]);
        assert_eq!(f.get("range"), None);
        assert_eq!(f.dpi().unwrap(), None);
    }

    #[test]
    fn required_field_must_be_present() {
        assert_eq!(fields(&[("token", " abc ")]).required("token").unwrap(), "abc");
        assert!(matches!(
            fields(&[("token", "")]).required("token"),
            Err(Pdf2ZipError::InvalidField { field: "token", .. })
        ));
    }

    #[test]
    fn dpi_must_be_numeric() {
        assert_eq!(fields(&[("dpi", "300")]).dpi().unwrap(), Some(300));
        assert!(matches!(
            fields(&[("dpi", "high")]).dpi(),
            Err(Pdf2ZipError::InvalidField { field: "dpi", .. })
        ));
    }

    #[test]
    fn format_field_parses() {
        assert_eq!(
            fields(&[("format", "PNG")]).encoding().unwrap(),
            Some(ImageEncoding::Png)
        );
        assert!(fields(&[("format", "TIFF")]).encoding().is_err());
    }

    #[test]
    fn proof_fields_map_from_form_names() {
        let f = fields(&[
            ("razorpay_order_id", "order_1"),
            ("razorpay_payment_id", "pay_1"),
            ("razorpay_signature", "abc"),
        ]);
        assert_eq!(f.proof(), PaymentProof::new("order_1", "pay_1", "abc"));
        assert!(fields(&[]).proof().is_empty());
    }

    #[test]
    fn flags_accept_common_truthy_values() {
        assert!(fields(&[("strict_range", "on")]).flag("strict_range"));
        assert!(fields(&[("strict_range", "TRUE")]).flag("strict_range"));
        assert!(!fields(&[("strict_range", "0")]).flag("strict_range"));
        assert!(!fields(&[]).flag("strict_range"));
    }

    #[test]
    fn password_keeps_whitespace() {
        let f = fields(&[("pdf_password", " pw ")]);
        assert_eq!(f.password().as_deref(), Some(" pw "));
    }
}
