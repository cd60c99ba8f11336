//! Access to the external article link graph.
//!
//! `WikiClient` talks to a MediaWiki-style API through a rate gate, retry
//! policy and TTL caches. `MemoryGraph` serves a fixed in-process graph.

mod cache;
mod client;
mod memory;
mod rate_gate;
mod request;
mod transport;
mod wire;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{ArticleSnapshot, Title};

pub use cache::TtlCache;
pub use client::WikiClient;
pub use memory::MemoryGraph;
pub use rate_gate::RateGate;
pub use request::{is_retryable_status, Requester, RetryPolicy};
pub use transport::{parse_retry_after, HttpReply, ReqwestTransport, Transport, TransportError};

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur while querying the link graph
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("Article not found: {0}")]
    NotFound(String),

    #[error("Random title was not navigable")]
    RandomUnavailable,

    #[error("Graph source unavailable after {attempts} attempts: {last}")]
    Unavailable { attempts: u32, last: String },

    #[error("Graph source returned status {0}")]
    Status(u16),

    #[error("Graph source error {code}: {info}")]
    Api { code: String, info: String },

    #[error("Response parsing failed: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Logical queries against the link graph
#[async_trait]
pub trait LinkGraph: Send + Sync {
    /// Follow redirects to the canonical title; `NotFound` if the page is missing
    async fn resolve_canonical_title(&self, title: &Title) -> GraphResult<Title>;

    /// Summary plus up to `max_links` navigable outbound links
    async fn fetch_article_snapshot(
        &self,
        title: &Title,
        max_links: usize,
    ) -> GraphResult<ArticleSnapshot>;

    /// Up to `limit` navigable, non-redirect pages linking to `title`
    async fn fetch_backlinks(&self, title: &Title, limit: usize) -> GraphResult<Vec<Title>>;

    async fn fetch_random_title(&self) -> GraphResult<Title>;

    /// Bulk title enumeration used to pad goal pools
    async fn fetch_expanded_goal_titles(&self, min_count: usize) -> GraphResult<Vec<Title>>;

    /// Whether `from` links to `to` within its first `scan_limit` links
    async fn has_direct_link(&self, from: &Title, to: &Title, scan_limit: usize) -> GraphResult<bool> {
        let article = self.fetch_article_snapshot(from, scan_limit).await?;
        Ok(article.links_to(to))
    }
}

/// Configuration for the MediaWiki client
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// `api.php` endpoint
    pub api_url: String,
    /// Prefix for article URLs handed to clients
    pub article_base_url: String,
    /// Sent as both `User-Agent` and `Api-User-Agent`
    pub user_agent: String,
    /// Minimum spacing between any two outbound requests
    pub min_spacing: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub title_ttl: Duration,
    pub article_ttl: Duration,
    pub backlink_ttl: Duration,
    pub edge_ttl: Duration,
    pub goal_titles_ttl: Duration,
    /// Max `allpages` pages fetched per bulk enumeration
    pub bulk_page_budget: usize,
    /// Max `random` requests used when `allpages` falls short
    pub random_sample_budget: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_url: "https://ja.wikipedia.org/w/api.php".to_string(),
            article_base_url: "https://ja.wikipedia.org/wiki/".to_string(),
            user_agent: default_user_agent(),
            min_spacing: Duration::from_millis(180),
            request_timeout: Duration::from_secs(12),
            retry: RetryPolicy::default(),
            title_ttl: Duration::from_secs(30 * 60),
            article_ttl: Duration::from_secs(10 * 60),
            backlink_ttl: Duration::from_secs(5 * 60),
            edge_ttl: Duration::from_secs(10 * 60),
            goal_titles_ttl: Duration::from_secs(6 * 60 * 60),
            bulk_page_budget: 8,
            random_sample_budget: 24,
        }
    }
}

fn default_user_agent() -> String {
    format!(
        "wikirace/{} (link race game server; https://github.com/wikirace/wikirace)",
        env!("CARGO_PKG_VERSION")
    )
}

impl GraphConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let non_empty = |key: &str| {
            std::env::var(key).ok().and_then(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };

        let mut retry = defaults.retry.clone();
        if let Some(max_retries) = non_empty("WIKI_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            retry.max_retries = max_retries;
        }

        Self {
            api_url: non_empty("WIKI_API_URL").unwrap_or(defaults.api_url),
            article_base_url: non_empty("WIKI_ARTICLE_BASE_URL")
                .unwrap_or(defaults.article_base_url),
            user_agent: non_empty("WIKI_USER_AGENT").unwrap_or(defaults.user_agent),
            min_spacing: non_empty("WIKI_MIN_SPACING_MS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_spacing),
            request_timeout: non_empty("WIKI_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            retry,
            ..defaults
        }
    }
}
