use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::config::{self, Config};
use crate::dispatch::{
    ChunkStream, DispatchOutcome, GenerateRequest, UpstreamRequestBody, UpstreamTarget,
    build_body,
};
use crate::error::GaleError;

/// How often the backoff wait re-checks the cancellation signal.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cap on error body reads from a failed upstream response.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Bounded retries with doubling backoff for 429 responses.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: config::DEFAULT_RETRIES,
            initial_backoff: config::DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        RetryPolicy {
            retries: config.retries,
            initial_backoff: config.initial_backoff,
        }
    }
}

pub struct HttpDispatch {
    client: Client,
    retry: RetryPolicy,
}

impl Default for HttpDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDispatch {
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::default())
    }

    pub fn with_retry(retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");

        HttpDispatch { client, retry }
    }

    /// Full gateway path: resolve the target, build the canonical payload,
    /// and dispatch. This is what the request-handling layer calls.
    pub async fn generate(
        &self,
        config: &Config,
        request: &GenerateRequest,
        signal: &CancellationToken,
    ) -> Result<DispatchOutcome, GaleError> {
        if request.model.is_empty() {
            return Err(GaleError::InvalidRequest("model is required".to_string()));
        }

        let target = UpstreamTarget::for_request(config, request)?;
        let body = build_body(request);
        self.dispatch(&target, &body, signal).await
    }

    /// Send the canonical payload upstream, relaying a buffered or streamed
    /// result. The signal is consulted before the send, after the response
    /// arrives, during every backoff wait, and before each streamed chunk.
    pub async fn dispatch(
        &self,
        target: &UpstreamTarget,
        body: &UpstreamRequestBody,
        signal: &CancellationToken,
    ) -> Result<DispatchOutcome, GaleError> {
        let url = target.endpoint();
        let mut retries = self.retry.retries;
        let mut backoff = self.retry.initial_backoff;

        tracing::debug!(model = %body.model, stream = body.stream, "dispatching upstream request");

        loop {
            if signal.is_cancelled() {
                tracing::info!("request cancelled by client before send");
                return Ok(DispatchOutcome::Cancelled);
            }

            let mut request = self.client.post(&url).json(body);
            if let Some(key) = &target.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(transport_error)?;

            if signal.is_cancelled() {
                tracing::info!("request cancelled by client after response received");
                return Ok(DispatchOutcome::Cancelled);
            }

            if body.stream {
                return Ok(DispatchOutcome::Streaming(relay_stream(
                    response,
                    signal.clone(),
                )));
            }

            let status = response.status();
            if status == StatusCode::OK {
                let value = response.json().await.map_err(transport_error)?;
                return Ok(DispatchOutcome::Completed(value));
            }

            if status == StatusCode::TOO_MANY_REQUESTS && retries > 0 {
                tracing::info!(
                    wait_ms = backoff.as_millis() as u64,
                    retries_left = retries,
                    "rate limited, waiting before retry"
                );
                if wait_for_backoff(backoff, signal).await {
                    tracing::info!("request cancelled by client during retry wait");
                    return Ok(DispatchOutcome::Cancelled);
                }
                retries -= 1;
                backoff *= 2;
                continue;
            }

            return Err(upstream_error(response).await);
        }
    }
}

/// Connection-level failures surface as a gateway-class error; the caller
/// never sees transport internals.
fn transport_error(err: reqwest::Error) -> GaleError {
    GaleError::Transport(err.to_string())
}

/// Structured error for a non-200, non-retried response, with the quota flag
/// pulled out of the provider's own error payload.
async fn upstream_error(response: reqwest::Response) -> GaleError {
    let status = response.status();
    let message = status
        .canonical_reason()
        .unwrap_or("Unknown error occurred")
        .to_string();

    let bytes = response.bytes().await.unwrap_or_default();
    let truncated = &bytes[..bytes.len().min(MAX_ERROR_BODY_BYTES)];
    let payload: serde_json::Value = serde_json::from_slice(truncated).unwrap_or_default();
    let quota_error = status == StatusCode::TOO_MANY_REQUESTS
        && payload["error"]["type"] == "insufficient_quota";

    tracing::error!(
        status = status.as_u16(),
        %message,
        "chat completion request failed"
    );

    GaleError::Upstream {
        status: status.as_u16(),
        message,
        quota_error,
    }
}

/// Sleep for `backoff`, polling the signal each sub-interval. Returns true if
/// the signal was set during the wait.
async fn wait_for_backoff(backoff: Duration, signal: &CancellationToken) -> bool {
    let mut remaining = backoff;
    while !remaining.is_zero() {
        if signal.is_cancelled() {
            return true;
        }
        let step = remaining.min(CANCEL_POLL_INTERVAL);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    signal.is_cancelled()
}

/// Wrap the response body as a chunk stream that re-checks the signal before
/// each yield and ends cleanly once it is set. Upstream status and headers
/// are relayed as-is, whatever the status was.
fn relay_stream(response: reqwest::Response, signal: CancellationToken) -> ChunkStream {
    let status = response.status();
    let headers = response.headers().clone();
    let chunks = response
        .bytes_stream()
        .take_while(move |_| futures_util::future::ready(!signal.is_cancelled()))
        .map(|chunk| chunk.map_err(transport_error))
        .boxed();

    ChunkStream {
        status,
        headers,
        chunks,
    }
}
