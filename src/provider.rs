//! Shared plumbing for the OpenAI-compatible HTTP providers.
//!
//! Both the embedding client and the chat client use the same retry
//! strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;
use thiserror::Error;

/// Failure talking to an external model provider. Per-turn failures wrap
/// one of these with the pipeline stage they occurred in.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing credentials: {0} not set")]
    MissingCredentials(&'static str),

    #[error("provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Network(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("provider failed after {0} retries")]
    RetriesExhausted(u32),
}

/// Read the API key from the environment.
pub fn api_key() -> Result<String, ProviderError> {
    std::env::var("OPENAI_API_KEY").map_err(|_| ProviderError::MissingCredentials("OPENAI_API_KEY"))
}

/// Build a reqwest client with the per-call timeout applied.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::Network(e.to_string()))
}

/// Exponential backoff delay before retry `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Classify a reqwest transport error as retryable.
pub fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// POST `body` to `url` with retry/backoff, returning the parsed JSON of
/// the first successful response.
pub async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value, ProviderError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        let resp = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| ProviderError::InvalidResponse(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(status = status.as_u16(), attempt, "retrying provider call");
                    last_err = Some(ProviderError::Http {
                        status: status.as_u16(),
                        body: body_text,
                    });
                    continue;
                }

                // Client error (not 429) — don't retry
                return Err(ProviderError::Http {
                    status: status.as_u16(),
                    body: body_text,
                });
            }
            Err(e) => {
                last_err = Some(transport_error(e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or(ProviderError::RetriesExhausted(max_retries)))
}
