//! Payment-proof verification.
//!
//! The checkout client returns `(order_id, payment_id, signature)` where
//! `signature = hex(HMAC-SHA256(key_secret, order_id + "|" + payment_id))`.
//! Checking it needs nothing but the shared secret: the gateway is never
//! consulted.
//!
//! Exactly one signature encoding is accepted: 64 lowercase hex characters,
//! as the gateway emits it. Uppercase hex, base64 or any other re-encoding of
//! the same digest is rejected.

use crate::error::Pdf2ZipError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded SHA-256 digest.
const SIGNATURE_HEX_LEN: usize = 64;

/// Client-submitted evidence that a payment completed.
///
/// Fields are optional because they arrive from a form; [`PaymentVerifier`]
/// decides what counts as missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
}

impl PaymentProof {
    pub fn new(
        order_id: impl Into<String>,
        payment_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            order_id: Some(order_id.into()),
            payment_id: Some(payment_id.into()),
            signature: Some(signature.into()),
        }
    }

    /// True when no field carries any content.
    pub fn is_empty(&self) -> bool {
        [&self.order_id, &self.payment_id, &self.signature]
            .iter()
            .all(|f| present(f).is_none())
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Verifies [`PaymentProof`]s against the gateway's shared secret.
#[derive(Clone)]
pub struct PaymentVerifier {
    secret: Option<Vec<u8>>,
}

impl fmt::Debug for PaymentVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentVerifier")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl PaymentVerifier {
    /// A verifier over `secret`. An empty secret counts as not configured.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Compute the canonical signature for an order/payment pair.
    pub fn sign(&self, order_id: &str, payment_id: &str) -> Result<String, Pdf2ZipError> {
        let mac = self.mac_for(order_id, payment_id)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify `proof`, returning the order id it attests to.
    ///
    /// Errors: [`Pdf2ZipError::GatewayNotConfigured`] without a secret,
    /// [`Pdf2ZipError::MissingProof`] if a field is absent or blank,
    /// [`Pdf2ZipError::InvalidSignature`] on any mismatch.
    pub fn verify<'p>(&self, proof: &'p PaymentProof) -> Result<&'p str, Pdf2ZipError> {
        if self.secret.is_none() {
            return Err(Pdf2ZipError::GatewayNotConfigured);
        }
        let order_id = present(&proof.order_id).ok_or(Pdf2ZipError::MissingProof {
            field: "order_id",
        })?;
        let payment_id = present(&proof.payment_id).ok_or(Pdf2ZipError::MissingProof {
            field: "payment_id",
        })?;
        let signature = present(&proof.signature).ok_or(Pdf2ZipError::MissingProof {
            field: "signature",
        })?;

        let digest = decode_canonical(signature).ok_or(Pdf2ZipError::InvalidSignature)?;
        self.mac_for(order_id, payment_id)?
            .verify_slice(&digest)
            .map_err(|_| Pdf2ZipError::InvalidSignature)?;

        Ok(order_id)
    }

    fn mac_for(&self, order_id: &str, payment_id: &str) -> Result<HmacSha256, Pdf2ZipError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(Pdf2ZipError::GatewayNotConfigured)?;
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| Pdf2ZipError::Internal(format!("hmac key: {e}")))?;
        mac.update(order_id.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Ok(mac)
    }
}

/// Decode a signature only if it is in canonical lowercase hex.
fn decode_canonical(signature: &str) -> Option<Vec<u8>> {
    let canonical = signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !canonical {
        return None;
    }
    hex::decode(signature).ok()
}
