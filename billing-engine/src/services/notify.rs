//! Notification dispatcher client.
//!
//! Fire-and-forget: the engine requests a dispatch and moves on. A failed
//! dispatch is logged by the caller and never rolls back billing work
//! (at-most-once delivery).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Notification kinds the billing platform dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    InvoiceReady,
    PastDue,
    Completion,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Welcome => "welcome",
            NotificationKind::InvoiceReady => "invoice_ready",
            NotificationKind::PastDue => "past_due",
            NotificationKind::Completion => "completion",
        }
    }
}

/// A dispatch request. The dispatcher resolves the recipient's address and
/// renders the transport-specific message.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subscription_id: Uuid,
    pub recipient: Uuid,
    pub payload: serde_json::Value,
}

/// Seam to the external notification dispatcher.
#[async_trait]
pub trait Notifications: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// HTTP client for the notification dispatcher.
#[derive(Clone)]
pub struct NotificationApiClient {
    client: Client,
    base_url: String,
}

impl NotificationApiClient {
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build notification HTTP client: {}", e))?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl Notifications for NotificationApiClient {
    async fn notify(&self, notification: Notification) -> Result<()> {
        let url = format!("{}/v1/notifications", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&notification)
            .send()
            .await
            .map_err(|e| anyhow!("Notification dispatch call failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Notification dispatcher returned {}", status));
        }

        Ok(())
    }
}
