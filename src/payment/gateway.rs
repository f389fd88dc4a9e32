//! Order creation against the payment gateway.
//!
//! Only one call is ever made: "create a payable order for this amount".
//! Capturing, refunds and reconciliation stay on the gateway's side.

use crate::config::GatewayConfig;
use crate::error::Pdf2ZipError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A payable order created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Minor currency units.
    pub amount: u64,
    pub currency: String,
}

/// The "create a payable order" capability.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id the checkout client needs alongside the order id.
    fn key_id(&self) -> &str;

    /// Create an order for `amount` minor units of `currency`.
    async fn create_order(&self, amount: u64, currency: &str) -> Result<Order, Pdf2ZipError>;
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: u64,
    currency: &'a str,
    /// Capture automatically once the payment is authorised.
    payment_capture: u8,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    amount: Option<u64>,
    #[serde(default)]
    currency: Option<String>,
}

/// Razorpay Orders API client.
pub struct RazorpayGateway {
    config: GatewayConfig,
    http: reqwest::Client,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("config", &self.config)
            .finish()
    }
}

impl RazorpayGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, Pdf2ZipError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Pdf2ZipError::GatewayFailed(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn create_order(&self, amount: u64, currency: &str) -> Result<Order, Pdf2ZipError> {
        let url = self.orders_url();
        debug!(%url, amount, currency, "Creating gateway order");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&CreateOrderBody {
                amount,
                currency,
                payment_capture: 1,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Pdf2ZipError::GatewayFailed(format!(
                        "timed out after {}s",
                        self.config.timeout_secs
                    ))
                } else {
                    Pdf2ZipError::GatewayFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Gateway rejected order creation");
            return Err(Pdf2ZipError::GatewayFailed(format!(
                "HTTP {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let parsed: OrderResponse = response
            .json()
            .await
            .map_err(|e| Pdf2ZipError::GatewayFailed(format!("malformed order response: {e}")))?;

        let order = into_order(parsed, amount, currency)?;
        info!(order_id = %order.id, amount, currency, "Gateway order created");
        Ok(order)
    }
}

fn into_order(parsed: OrderResponse, amount: u64, currency: &str) -> Result<Order, Pdf2ZipError> {
    if parsed.id.trim().is_empty() {
        return Err(Pdf2ZipError::GatewayFailed("order response has empty id".into()));
    }
    Ok(Order {
        id: parsed.id,
        amount: parsed.amount.unwrap_or(amount),
        currency: parsed.currency.unwrap_or_else(|| currency.to_string()),
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(CreateOrderBody {
            amount: 1000,
            currency: "INR",
            payment_capture: 1,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"amount": 1000, "currency": "INR", "payment_capture": 1})
        );
    }

    #[test]
    fn parses_full_response() {
        let raw = r#"{"id":"order_9A33XWu170gUtm","entity":"order","amount":1000,
                      "currency":"INR","status":"created","attempts":0}"#;
        let parsed: OrderResponse = serde_json::from_str(raw).unwrap();
        let order = into_order(parsed, 1000, "INR").unwrap();
        assert_eq!(order.id, "order_9A33XWu170gUtm");
        assert_eq!(order.amount, 1000);
        assert_eq!(order.currency, "INR");
    }

    #[test]
    fn missing_amount_falls_back_to_request() {
        let parsed: OrderResponse = serde_json::from_str(r#"{"id":"order_1"}"#).unwrap();
        let order = into_order(parsed, 500, "USD").unwrap();
        assert_eq!(order.amount, 500);
        assert_eq!(order.currency, "USD");
    }

    #[test]
    fn empty_id_is_a_gateway_failure() {
        let parsed: OrderResponse = serde_json::from_str(r#"{"id":"  "}"#).unwrap();
        assert!(matches!(
            into_order(parsed, 1000, "INR"),
            Err(Pdf2ZipError::GatewayFailed(_))
        ));
    }

    #[test]
    fn orders_url_tolerates_trailing_slash() {
        let gw = RazorpayGateway::new(
            GatewayConfig::new("rzp_test", "s3cr3t-value").with_api_base("http://localhost:9/"),
        )
        .unwrap();
        assert_eq!(gw.orders_url(), "http://localhost:9/v1/orders");
        assert_eq!(gw.key_id(), "rzp_test");
        assert!(!format!("{gw:?}").contains("s3cr3t-value"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
