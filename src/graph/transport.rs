use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

use super::{GraphConfig, GraphError, GraphResult};

/// Raw reply from one GET against the graph API
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    /// Parsed `Retry-After` header, if any
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transient transport failures; both are retried
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),
}

/// One query-string GET against the graph API endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, query: &[(String, String)]) -> Result<HttpReply, TransportError>;
}

/// `reqwest` backed transport with identifying headers
pub struct ReqwestTransport {
    api_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &GraphConfig) -> GraphResult<Self> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| GraphError::Config(format!("invalid user agent: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, user_agent.clone());
        headers.insert(HeaderName::from_static("api-user-agent"), user_agent);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GraphError::Config(e.to_string()))?;

        Ok(Self {
            api_url: config.api_url.clone(),
            client,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, query: &[(String, String)]) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(query)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(classify)?;

        Ok(HttpReply {
            status,
            retry_after,
            body,
        })
    }
}

/// Parse a `Retry-After` value: either delta-seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait_ms = at.timestamp_millis() - chrono::Utc::now().timestamp_millis();
    Some(Duration::from_millis(wait_ms.max(0) as u64))
}
