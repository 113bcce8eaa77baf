//! Single-attempt collector transport.
//!
//! One POST per payload, bounded by a two-second deadline. There is no retry,
//! no backoff and no queueing here; a failed attempt is terminal and only
//! logged.

use crate::config::Config;
use crate::errors::ErrorRecord;
use crate::payload::EventPayload;
use rand::seq::SliceRandom;
use std::time::Duration;
use thiserror::Error;

/// Deadline applied to every delivery attempt.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

const INGEST_ENDPOINTS: [&str; 3] = [
    "https://ingest-us.apipulse.io",
    "https://ingest-eu.apipulse.io",
    "https://ingest-ap.apipulse.io",
];

const DEBUG_ENDPOINT: &str = "https://debug.apipulse.io";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector returned status {0}")]
    Status(u16),
}

/// HTTP client for the collector. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    api_key: String,
    endpoint: Option<String>,
    debug: bool,
}

impl Transport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            debug: config.debug,
        })
    }

    /// Deliver one exchange payload. Single attempt.
    pub async fn send(&self, payload: &EventPayload) -> Result<(), TransportError> {
        self.post(serde_json::to_vec(payload)?).await
    }

    /// Deliver a batch of error records. Single attempt.
    pub async fn send_errors(&self, records: &[ErrorRecord]) -> Result<(), TransportError> {
        self.post(serde_json::to_vec(records)?).await
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.endpoint_url())
            .header(http::header::CONTENT_TYPE.as_str(), "application/json")
            .header("x-api-key", self.api_key.as_str())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }

    /// A configured endpoint always wins; otherwise spread across the
    /// replicas at random. Selection is not health-aware.
    fn endpoint_url(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        if self.debug {
            return DEBUG_ENDPOINT.to_string();
        }
        INGEST_ENDPOINTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(INGEST_ENDPOINTS[0])
            .to_string()
    }
}
