//! Payment gateway adapter: opens remote gateway transactions and verifies
//! their signed settlement proofs.

pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, instrument};

use crate::config::AppConfig;
use crate::errors::{GatewayErrorDetails, ServiceError};

/// A remote transaction opened with the payment gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Failure reported by the gateway, carrying the provider's own
/// diagnostics unmodified.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
    pub status_code: Option<u16>,
    pub code: Option<String>,
    pub description: Option<String>,
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::Gateway {
            message: "Failed to create gateway order".to_string(),
            details: GatewayErrorDetails {
                status_code: err.status_code,
                code: err.code,
                description: err.description.or(Some(err.message)),
            },
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a remote gateway transaction for the given amount in minor
    /// currency units, tagged with the order number as receipt.
    async fn open_transaction(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        metadata: Value,
    ) -> Result<GatewayOrder, GatewayError>;
}

#[derive(Debug, Serialize)]
struct CreateGatewayOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: Value,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: Option<GatewayErrorFields>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorFields {
    code: Option<String>,
    description: Option<String>,
}

/// HTTP client for a Razorpay-style orders API (basic auth, JSON bodies).
pub struct HttpPaymentGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, key_id: String, key_secret: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            key_id,
            key_secret,
        }
    }

    /// Builds a gateway client from configuration; `None` when the gateway
    /// credentials are not configured.
    pub fn from_config(cfg: &AppConfig) -> Option<Self> {
        let base_url = cfg.gateway_api_url.clone()?;
        let key_id = cfg.gateway_key_id.clone()?;
        let key_secret = cfg.gateway_key_secret.clone()?;
        Some(Self::new(
            base_url,
            key_id,
            key_secret,
            Duration::from_secs(cfg.gateway_timeout_secs),
        ))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, metadata), fields(receipt = %receipt, amount_minor = amount_minor))]
    async fn open_transaction(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
        metadata: Value,
    ) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/orders", self.base_url.trim_end_matches('/'));
        let body = CreateGatewayOrderBody {
            amount: amount_minor,
            currency,
            receipt,
            notes: metadata,
        };

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gateway request failed");
                GatewayError {
                    message: e.to_string(),
                    status_code: None,
                    code: None,
                    description: None,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let provider_error: Option<GatewayErrorBody> = response.json().await.ok();
            let fields = provider_error.and_then(|b| b.error);
            let (code, description) = match fields {
                Some(f) => (f.code, f.description),
                None => (None, None),
            };
            error!(
                status = status.as_u16(),
                code = code.as_deref().unwrap_or("-"),
                "Gateway rejected order creation"
            );
            return Err(GatewayError {
                message: format!("gateway returned status {}", status.as_u16()),
                status_code: Some(status.as_u16()),
                code,
                description,
            });
        }

        response.json::<GatewayOrder>().await.map_err(|e| {
            error!(error = %e, "Failed to decode gateway response");
            GatewayError {
                message: format!("invalid gateway response: {}", e),
                status_code: Some(status.as_u16()),
                code: None,
                description: None,
            }
        })
    }
}
