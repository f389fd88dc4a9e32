//! Free-tier access gate.
//!
//! Whether a conversion is free depends only on the document as uploaded:
//! its total page count and byte size. The selected range never enters the
//! decision, so asking for page 1 of a 500-page book is still chargeable.
//! The charge is a flat amount, not prorated by how far over the limit the
//! document is.

use serde::{Deserialize, Serialize};

/// Inclusive free-tier thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTierLimits {
    pub max_pages: usize,
    pub max_bytes: u64,
}

/// The flat price of a chargeable conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Minor currency units (paise for INR).
    pub amount: u64,
    pub currency: String,
}

/// Size and shape of a checked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub page_count: usize,
    pub size_bytes: u64,
    pub selected_pages: usize,
}

impl DocumentMetrics {
    /// Size in MiB rounded to two decimals, as shown to clients.
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
    }
}

/// Outcome of the gate for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub chargeable: bool,
    /// `0` when not chargeable.
    pub amount: u64,
    pub currency: String,
}

/// Pure free/paid decision over configured limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGate {
    limits: FreeTierLimits,
    charge: Charge,
}

impl AccessGate {
    pub fn new(limits: FreeTierLimits, charge: Charge) -> Self {
        Self { limits, charge }
    }

    pub fn limits(&self) -> FreeTierLimits {
        self.limits
    }

    /// Decide whether `metrics` needs payment.
    ///
    /// A document exactly at either limit is still free.
    pub fn decide(&self, metrics: &DocumentMetrics) -> AccessDecision {
        let chargeable = metrics.page_count > self.limits.max_pages
            || metrics.size_bytes > self.limits.max_bytes;
        AccessDecision {
            chargeable,
            amount: if chargeable { self.charge.amount } else { 0 },
            currency: self.charge.currency.clone(),
        }
    }
}
