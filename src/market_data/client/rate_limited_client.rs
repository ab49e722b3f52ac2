use super::pacer::ProviderPacer;
use super::transport::{HttpTransport, ProviderEndpoint, ProviderRequest, TransportError};
use crate::market_data::errors::ProviderError;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One original attempt plus one retry for transient failures.
const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Sleep after a 429 before the single retry
    pub rate_limit_cooldown: Duration,
    /// Sleep after a 5xx/timeout before the single retry
    pub server_error_cooldown: Duration,
}

enum AttemptOutcome {
    Success(String),
    RateLimited,
    Unavailable(String),
    BadRequest(String),
}

/// Outbound calls to market-data providers: pacing, bounded retry, error mapping.
pub struct RateLimitedClient {
    transport: Arc<dyn HttpTransport>,
    pacer: Arc<ProviderPacer>,
    policy: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        pacer: Arc<ProviderPacer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            pacer,
            policy,
        }
    }

    /// Returns the response body of a 2xx answer.
    pub async fn fetch(
        &self,
        endpoint: &ProviderEndpoint,
        request: &ProviderRequest,
    ) -> Result<String, ProviderError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.pacer.acquire(endpoint.id).await;

            let outcome = classify(self.transport.get(endpoint, request).await);

            match outcome {
                AttemptOutcome::Success(body) => {
                    debug!(
                        "{} {} succeeded on attempt {}",
                        endpoint.id, request.path, attempt
                    );
                    return Ok(body);
                }
                AttemptOutcome::RateLimited => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(ProviderError::RateLimited {
                            provider: endpoint.id.to_string(),
                        });
                    }
                    warn!(
                        "{} rate limited on {}, cooling down for {:?}",
                        endpoint.id, request.path, self.policy.rate_limit_cooldown
                    );
                    tokio::time::sleep(self.policy.rate_limit_cooldown).await;
                }
                AttemptOutcome::Unavailable(reason) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(ProviderError::Unavailable {
                            provider: endpoint.id.to_string(),
                            reason,
                        });
                    }
                    warn!(
                        "{} unavailable on {} ({}), retrying in {:?}",
                        endpoint.id, request.path, reason, self.policy.server_error_cooldown
                    );
                    tokio::time::sleep(self.policy.server_error_cooldown).await;
                }
                AttemptOutcome::BadRequest(message) => {
                    return Err(ProviderError::BadRequest {
                        provider: endpoint.id.to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// `fetch` plus JSON decoding; an undecodable payload is a `BadRequest`.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        endpoint: &ProviderEndpoint,
        request: &ProviderRequest,
    ) -> Result<T, ProviderError> {
        let body = self.fetch(endpoint, request).await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::BadRequest {
            provider: endpoint.id.to_string(),
            message: format!("Malformed payload from {}: {}", request.path, e),
        })
    }
}

fn classify(
    result: Result<super::transport::TransportResponse, TransportError>,
) -> AttemptOutcome {
    match result {
        Ok(response) => match response.status {
            200..=299 => AttemptOutcome::Success(response.body),
            429 => AttemptOutcome::RateLimited,
            500..=599 => AttemptOutcome::Unavailable(format!("HTTP {}", response.status)),
            status => AttemptOutcome::BadRequest(format!(
                "HTTP {}: {}",
                status,
                truncate(&response.body, 200)
            )),
        },
        Err(TransportError::Timeout) => AttemptOutcome::Unavailable("request timed out".to_string()),
        Err(TransportError::Connection(reason)) => AttemptOutcome::Unavailable(reason),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
