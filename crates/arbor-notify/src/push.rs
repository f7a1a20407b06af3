use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use arbor_db::models::PushSubscriptionRow;
use arbor_types::api::PushPayload;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The provider reported the endpoint as permanently invalid; the caller
    /// should prune the subscription.
    Gone,
}

/// Outbound push delivery seam. The HTTP implementation talks to the real
/// provider; tests substitute a recording transport.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, sub: &PushSubscriptionRow, payload: &PushPayload)
    -> Result<PushOutcome>;
}

/// Delivers via the subscription's endpoint: a JSON POST carrying the payload
/// and the subscription's two keys.
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        sub: &PushSubscriptionRow,
        payload: &PushPayload,
    ) -> Result<PushOutcome> {
        let response = self
            .client
            .post(&sub.endpoint)
            .json(&serde_json::json!({
                "keys": { "p256dh": sub.p256dh, "auth": sub.auth },
                "payload": payload,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(PushOutcome::Gone);
        }
        if !status.is_success() {
            return Err(anyhow!("push endpoint returned {}", status));
        }

        debug!("push delivered to {}", sub.endpoint);
        Ok(PushOutcome::Delivered)
    }
}
