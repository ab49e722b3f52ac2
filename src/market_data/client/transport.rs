use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Static description of one provider's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub id: &'static str,
    pub base_url: String,
    /// Header carrying the API key, if the provider needs one
    pub auth_header: Option<(&'static str, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ProviderRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Timeout,
    Connection(String),
}

/// Raw GET. Status handling and retries live in `RateLimitedClient`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        endpoint: &ProviderEndpoint,
        request: &ProviderRequest,
    ) -> Result<TransportResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("market-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        endpoint: &ProviderEndpoint,
        request: &ProviderRequest,
    ) -> Result<TransportResponse, TransportError> {
        let url = format!("{}{}", endpoint.base_url.trim_end_matches('/'), request.path);

        let mut builder = self
            .client
            .get(&url)
            .timeout(endpoint.timeout)
            .query(&request.query);

        if let Some((header, value)) = &endpoint.auth_header {
            builder = builder.header(*header, value);
        }

        debug!(
            "{} request: {} with {} params",
            endpoint.id,
            request.path,
            request.query.len()
        );

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        Ok(TransportResponse { status, body })
    }
}
