use async_trait::async_trait;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use super::cache::TtlCache;
use super::rate_gate::RateGate;
use super::request::Requester;
use super::transport::{ReqwestTransport, Transport};
use super::wire::ApiResponse;
use super::{GraphConfig, GraphError, GraphResult, LinkGraph};
use crate::random::RandomSource;
use crate::types::{ArticleSnapshot, Title};

/// Summary shown when the article has no plain-text intro
pub const EXTRACT_FALLBACK: &str = "このページの要約は取得できませんでした。";

/// Hard cap on continuation pages for a single logical query
const MAX_PAGES: usize = 20;

/// `apfrom` starting points so bulk enumeration does not always begin at "!"
const ALLPAGES_START_POINTS: &[&str] = &[
    "あ", "か", "さ", "た", "な", "は", "ま", "や", "ら", "わ", "ア", "カ", "サ", "タ", "ナ", "ハ",
    "マ", "ラ", "一", "三", "中", "日", "東", "大", "A", "M",
];

type Query = Vec<(String, String)>;

/// Append cleaned titles not seen before; returns the running total
fn absorb<I>(into: &mut Vec<Title>, seen: &mut HashSet<Title>, raw: I) -> usize
where
    I: IntoIterator<Item = String>,
{
    for title in Title::clean_all(raw) {
        if seen.insert(title.clone()) {
            into.push(title);
        }
    }
    into.len()
}

fn params(pairs: &[(&str, &str)]) -> Query {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Build the public article URL for a title
pub fn article_url(base: &str, title: &Title) -> String {
    let slug = title.as_str().replace(' ', "_");
    match reqwest::Url::parse(base) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(&slug);
            }
            url.to_string()
        }
        Err(_) => format!("{}{}", base, slug),
    }
}

/// MediaWiki backed link graph with caching, pacing and retries
pub struct WikiClient {
    config: GraphConfig,
    requester: Requester,
    rng: Arc<RandomSource>,
    titles: TtlCache<Title, Title>,
    articles: TtlCache<(Title, usize), ArticleSnapshot>,
    backlinks: TtlCache<(Title, usize), Vec<Title>>,
    edges: TtlCache<(Title, Title, usize), bool>,
    goal_titles: TtlCache<usize, Vec<Title>>,
}

impl WikiClient {
    /// Create a client that talks HTTP via `reqwest`
    pub fn new(config: GraphConfig) -> GraphResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(
            config,
            transport,
            Arc::new(RandomSource::from_entropy()),
        ))
    }

    pub fn with_transport(
        config: GraphConfig,
        transport: Arc<dyn Transport>,
        rng: Arc<RandomSource>,
    ) -> Self {
        let requester = Requester::new(
            transport,
            RateGate::new(config.min_spacing),
            config.retry.clone(),
            config.request_timeout,
            rng.clone(),
        );

        Self {
            titles: TtlCache::new(config.title_ttl),
            articles: TtlCache::new(config.article_ttl),
            backlinks: TtlCache::new(config.backlink_ttl),
            edges: TtlCache::new(config.edge_ttl),
            goal_titles: TtlCache::new(config.goal_titles_ttl),
            config,
            requester,
            rng,
        }
    }

    pub fn article_url(&self, title: &Title) -> String {
        article_url(&self.config.article_base_url, title)
    }

    /// One `action=query` request with the common parameters
    async fn query(&self, extra: &[(String, String)]) -> GraphResult<ApiResponse> {
        let mut query = params(&[
            ("action", "query"),
            ("format", "json"),
            ("formatversion", "2"),
            ("redirects", "1"),
        ]);
        query.extend(extra.iter().cloned());

        let mut response: ApiResponse = self.requester.get_json(&query).await?;
        if let Some(error) = response.error.take() {
            return Err(GraphError::Api {
                code: error.code,
                info: error.info,
            });
        }
        Ok(response)
    }

    /// Follow `continue` tokens until `visit` breaks, the listing ends, or
    /// `max_pages` is reached
    async fn paginate<F>(&self, base: Query, max_pages: usize, mut visit: F) -> GraphResult<()>
    where
        F: FnMut(ApiResponse) -> GraphResult<ControlFlow<()>> + Send,
    {
        let mut continuation: Option<Query> = None;

        for page in 0..max_pages {
            let mut query = base.clone();
            if let Some(extra) = continuation.take() {
                query.extend(extra);
            }

            let response = self.query(&query).await?;
            let next = response.continuation_params();
            tracing::debug!(page, has_more = next.is_some(), "Fetched graph page");

            if visit(response)?.is_break() {
                break;
            }
            match next {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        Ok(())
    }

    async fn remember_title(&self, input: &Title, canonical: &Title) {
        self.titles.insert(input.clone(), canonical.clone()).await;
        if input != canonical {
            self.titles.insert(canonical.clone(), canonical.clone()).await;
        }
    }

    /// Paged `allpages` listing from a random starting point
    async fn enumerate_all_pages(&self, min_count: usize, into: &mut Vec<Title>) -> GraphResult<()> {
        let mut base = params(&[
            ("list", "allpages"),
            ("apnamespace", "0"),
            ("apfilterredir", "nonredirects"),
            ("aplimit", "500"),
        ]);
        if let Some(start) = self.rng.pick(ALLPAGES_START_POINTS) {
            base.push(("apfrom".to_string(), start.to_string()));
        }

        let mut seen: HashSet<Title> = into.iter().cloned().collect();
        self.paginate(base, self.config.bulk_page_budget, |response| {
            let raw = response.into_query().allpages.into_iter().map(|e| e.title);
            Ok(if absorb(into, &mut seen, raw) >= min_count {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .await
    }
}

#[async_trait]
impl LinkGraph for WikiClient {
    async fn resolve_canonical_title(&self, title: &Title) -> GraphResult<Title> {
        if let Some(canonical) = self.titles.get(title).await {
            return Ok(canonical);
        }

        let response = self.query(&params(&[("titles", title.as_str())])).await?;
        let page = response
            .into_query()
            .pages
            .into_iter()
            .next()
            .filter(|page| page.exists())
            .ok_or_else(|| GraphError::NotFound(title.to_string()))?;

        let canonical = if page.title.is_empty() {
            title.clone()
        } else {
            Title::new(&page.title)
        };
        self.remember_title(title, &canonical).await;
        Ok(canonical)
    }

    async fn fetch_article_snapshot(
        &self,
        title: &Title,
        max_links: usize,
    ) -> GraphResult<ArticleSnapshot> {
        let key = (title.clone(), max_links);
        if let Some(snapshot) = self.articles.get(&key).await {
            tracing::debug!(%title, max_links, "Article cache hit");
            return Ok(snapshot);
        }

        let mut canonical = title.clone();
        let mut extract: Option<String> = None;
        let mut links: Vec<Title> = Vec::new();
        let mut seen = HashSet::new();

        let base = params(&[
            ("prop", "extracts|links"),
            ("exintro", "1"),
            ("explaintext", "1"),
            ("plnamespace", "0"),
            ("pllimit", "max"),
            ("titles", title.as_str()),
        ]);
        self.paginate(base, MAX_PAGES, |response| {
            let page = response
                .into_query()
                .pages
                .into_iter()
                .next()
                .filter(|page| page.exists())
                .ok_or_else(|| GraphError::NotFound(title.to_string()))?;

            if !page.title.is_empty() {
                canonical = Title::new(&page.title);
            }
            if let Some(text) = page.extract.filter(|text| !text.trim().is_empty()) {
                extract = Some(text);
            }
            let raw = page.links.into_iter().map(|link| link.title);

            Ok(if absorb(&mut links, &mut seen, raw) >= max_links {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .await?;

        links.truncate(max_links);

        let snapshot = ArticleSnapshot {
            url: self.article_url(&canonical),
            title: canonical.clone(),
            extract: extract.unwrap_or_else(|| EXTRACT_FALLBACK.to_string()),
            links,
        };

        self.remember_title(title, &canonical).await;
        self.articles.insert(key, snapshot.clone()).await;
        if canonical != *title {
            self.articles
                .insert((canonical, max_links), snapshot.clone())
                .await;
        }

        Ok(snapshot)
    }

    async fn fetch_backlinks(&self, title: &Title, limit: usize) -> GraphResult<Vec<Title>> {
        let key = (title.clone(), limit);
        if let Some(backlinks) = self.backlinks.get(&key).await {
            tracing::debug!(%title, limit, "Backlink cache hit");
            return Ok(backlinks);
        }

        let mut backlinks: Vec<Title> = Vec::new();
        let mut seen = HashSet::new();
        let base = params(&[
            ("list", "backlinks"),
            ("bltitle", title.as_str()),
            ("blnamespace", "0"),
            ("blfilterredir", "nonredirects"),
            ("bllimit", "max"),
        ]);
        self.paginate(base, MAX_PAGES, |response| {
            let raw = response.into_query().backlinks.into_iter().map(|e| e.title);
            Ok(if absorb(&mut backlinks, &mut seen, raw) >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .await?;

        backlinks.truncate(limit);
        self.backlinks.insert(key, backlinks.clone()).await;

        Ok(backlinks)
    }

    async fn fetch_random_title(&self) -> GraphResult<Title> {
        let response = self
            .query(&params(&[
                ("list", "random"),
                ("rnnamespace", "0"),
                ("rnlimit", "1"),
            ]))
            .await?;

        response
            .into_query()
            .random
            .into_iter()
            .next()
            .map(|entry| Title::new(&entry.title))
            .filter(|title| title.is_navigable())
            .ok_or(GraphError::RandomUnavailable)
    }

    async fn fetch_expanded_goal_titles(&self, min_count: usize) -> GraphResult<Vec<Title>> {
        if let Some(titles) = self.goal_titles.get(&min_count).await {
            return Ok(titles);
        }

        let mut titles: Vec<Title> = Vec::new();
        let mut last_error: Option<GraphError> = None;

        if let Err(e) = self.enumerate_all_pages(min_count, &mut titles).await {
            tracing::warn!("Bulk title listing failed, falling back to random sampling: {}", e);
            last_error = Some(e);
        }

        let mut seen: HashSet<Title> = titles.iter().cloned().collect();
        let mut samples = 0;
        while titles.len() < min_count && samples < self.config.random_sample_budget {
            samples += 1;
            let sample = self
                .query(&params(&[
                    ("list", "random"),
                    ("rnnamespace", "0"),
                    ("rnlimit", "max"),
                ]))
                .await;

            match sample {
                Ok(response) => {
                    let raw = response.into_query().random.into_iter().map(|e| e.title);
                    absorb(&mut titles, &mut seen, raw);
                }
                Err(e) => {
                    tracing::warn!(samples, "Random title sampling failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if titles.is_empty() {
            return Err(last_error.unwrap_or(GraphError::RandomUnavailable));
        }

        tracing::info!(
            count = titles.len(),
            min_count,
            random_samples = samples,
            "Enumerated goal titles"
        );
        self.goal_titles.insert(min_count, titles.clone()).await;
        Ok(titles)
    }

    async fn has_direct_link(&self, from: &Title, to: &Title, scan_limit: usize) -> GraphResult<bool> {
        let key = (from.clone(), to.clone(), scan_limit);
        if let Some(linked) = self.edges.get(&key).await {
            return Ok(linked);
        }

        let article = self.fetch_article_snapshot(from, scan_limit).await?;
        let linked = article.links_to(to);
        self.edges.insert(key, linked).await;
        Ok(linked)
    }
}
