//! Relay Dispatch
//!
//! Single-attempt HTTP POST of a classified event to a tenant's relay URL.
//! There is no queue and no retry: a failed delivery is reported to the caller,
//! which records it and still acknowledges the platform.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::classify::ClassificationResult;
use super::ssrf;
use super::xml::DecryptedEvent;
use crate::connections::ConnectionSummary;

/// Maximum characters of a downstream response body kept for auditing.
const RESPONSE_PREVIEW_CHARS: usize = 2048;

/// Relay delivery errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay target refused: {0}")]
    Blocked(String),
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },
    #[error("Relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Failed to encode relay payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of a relay attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// No relay URL configured.
    Skipped,
    Delivered {
        status: u16,
        response: String,
        latency_ms: u64,
    },
}

/// JSON body posted to the relay target.
#[derive(Debug, Serialize)]
pub struct RelayPayload<'a> {
    pub connection: &'a ConnectionSummary,
    pub event: Value,
    #[serde(rename = "processResult")]
    pub process_result: &'a ClassificationResult,
}

impl<'a> RelayPayload<'a> {
    /// Assemble the payload. The event keeps its platform field names (`AgentID`, ...)
    /// and is stamped with the connection's `corpId`/`agentId` alongside them.
    pub fn new(
        connection: &'a ConnectionSummary,
        event: &DecryptedEvent,
        process_result: &'a ClassificationResult,
    ) -> Result<Self, serde_json::Error> {
        let mut event = serde_json::to_value(event)?;
        if let Value::Object(ref mut map) = event {
            map.insert("corpId".into(), Value::from(connection.corp_id.as_str()));
            map.insert("agentId".into(), Value::from(connection.agent_id.as_str()));
        }

        Ok(Self {
            connection,
            event,
            process_result,
        })
    }
}

/// Posts classified events to relay targets.
#[derive(Clone)]
pub struct RelayDispatcher {
    client: reqwest::Client,
    timeout: Duration,
    block_private: bool,
}

impl RelayDispatcher {
    /// Build a dispatcher whose requests never outlive `timeout`.
    pub fn new(timeout: Duration, block_private: bool) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            timeout,
            block_private,
        })
    }

    /// Relay one event. `None` for `relay_url` is a successful no-op.
    pub async fn relay(
        &self,
        relay_url: Option<&str>,
        connection: &ConnectionSummary,
        event: &DecryptedEvent,
        process_result: &ClassificationResult,
    ) -> Result<RelayOutcome, RelayError> {
        let Some(url) = relay_url else {
            return Ok(RelayOutcome::Skipped);
        };

        let payload = serde_json::to_vec(&RelayPayload::new(connection, event, process_result)?)?;
        let client = self.client_for(url).await?;

        let start = Instant::now();
        let response = client
            .post(url)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                warn!(connection_id = %connection.id, url = %url, error = %e, "Relay request failed");
                RelayError::Transport(e)
            })?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        // A body read failure after a status line still counts as delivered
        let body = response.text().await.unwrap_or_default();
        let preview: String = body.chars().take(RESPONSE_PREVIEW_CHARS).collect();

        if !status.is_success() {
            warn!(
                connection_id = %connection.id,
                url = %url,
                status = status.as_u16(),
                latency_ms,
                "Relay target returned non-success status"
            );
            return Err(RelayError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        debug!(connection_id = %connection.id, status = status.as_u16(), latency_ms, "Relay delivered");
        Ok(RelayOutcome::Delivered {
            status: status.as_u16(),
            response: preview,
            latency_ms,
        })
    }

    /// The shared client, or a client pinned to a verified public address when
    /// private targets are blocked.
    async fn client_for(&self, url: &str) -> Result<reqwest::Client, RelayError> {
        if !self.block_private {
            return Ok(self.client.clone());
        }

        let pinned = ssrf::pin_public_target(url)
            .await
            .map_err(RelayError::Blocked)?;

        Ok(reqwest::Client::builder()
            .resolve(&pinned.host, pinned.addr)
            .timeout(self.timeout)
            .build()?)
    }
}
