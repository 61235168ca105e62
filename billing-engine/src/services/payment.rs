//! Payment request service client.
//!
//! The engine never talks to the payment gateway itself; it asks the payment
//! subsystem for a single-use payment request bounded by the invoice's
//! computed expiry, and records the returned reference and payable URL. The
//! request's settlement lifecycle (webhooks, confirmation) belongs entirely
//! to that subsystem.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Input for creating a payment request.
#[derive(Debug, Clone, Serialize)]
pub struct NewPaymentRequest {
    pub merchant_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    /// Always true for subscription invoices: one request, one settlement.
    pub single_use: bool,
    pub expires_at: DateTime<Utc>,
    /// Settlement currencies the customer may pay in.
    pub accepted_currencies: Vec<String>,
}

/// A created payment request.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    /// The payment subsystem's reference for this request.
    pub request_ref: String,
    /// Customer-facing URL where the request can be paid.
    pub payable_url: String,
}

/// Seam to the external payment request service.
#[async_trait]
pub trait PaymentRequests: Send + Sync {
    /// Create a single-use payment request. Invoked at most logically-once
    /// per cycle; the idempotency guard discards any duplicate result.
    async fn create(&self, request: NewPaymentRequest) -> Result<PaymentRequest>;
}

/// Configuration for the payment service HTTP client.
#[derive(Debug, Clone)]
pub struct PaymentApiConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub request_timeout: Duration,
}

/// HTTP client for the payment request service.
#[derive(Clone)]
pub struct PaymentApiClient {
    client: Client,
    config: PaymentApiConfig,
}

#[derive(Debug, Deserialize)]
struct PaymentApiError {
    error: String,
}

impl PaymentApiClient {
    pub fn new(config: PaymentApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build payment HTTP client: {}", e))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PaymentRequests for PaymentApiClient {
    async fn create(&self, request: NewPaymentRequest) -> Result<PaymentRequest> {
        let url = format!("{}/v1/payment-requests", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Payment request call failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<PaymentApiError>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(anyhow!(
                "Payment service returned {}: {}",
                status,
                detail
            ));
        }

        response
            .json::<PaymentRequest>()
            .await
            .map_err(|e| anyhow!("Invalid payment service response: {}", e))
    }
}
