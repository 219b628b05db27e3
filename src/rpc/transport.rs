//! Outbound transport for swarm envelopes.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::protocol::{ENDPOINT_API, SwarmRequest, SwarmResponse};

/// Delivers one request envelope to the node listening at `addr` (`host:port`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, addr: &str, request: SwarmRequest) -> Result<SwarmResponse>;
}

/// JSON over HTTP, one POST per request.
pub struct HttpTransport {
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl HttpTransport {
    /// `timeout` bounds each attempt and should stay below the node timeout,
    /// so one silent peer cannot stall a health-check pass past eviction.
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout,
            attempts: 2,
        }
    }

    /// Posts `payload`, retrying only when no connection could be made.
    ///
    /// Once a request may have reached the peer it is never repeated: requests
    /// such as `SubmitJob` and `RunJob` are not idempotent.
    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: String,
        payload: &T,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_connect() && attempt + 1 < self.attempts => {
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
                Err(e) => return Err(anyhow::anyhow!(e)),
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, addr: &str, request: SwarmRequest) -> Result<SwarmResponse> {
        let kind = request.kind();
        let response = self
            .post_with_retry(format!("http://{}{}", addr, ENDPOINT_API), &request)
            .await?;

        let status = response.status();
        let body: SwarmResponse = response.json().await?;
        if !status.is_success() && !matches!(body, SwarmResponse::Error(_)) {
            return Err(anyhow::anyhow!("{} to {} failed: {}", kind, addr, status));
        }

        tracing::trace!("{} to {} -> {}", kind, addr, body.kind());
        Ok(body)
    }
}
