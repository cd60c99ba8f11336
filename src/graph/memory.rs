use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::client::article_url;
use super::{GraphError, GraphResult, LinkGraph};
use crate::random::RandomSource;
use crate::types::{ArticleSnapshot, Title};

/// In-process link graph.
///
/// Used for tests and offline development. Link order is insertion order,
/// node iteration is sorted and the random source has a fixed seed, so
/// random picks are reproducible.
pub struct MemoryGraph {
    links: BTreeMap<Title, Vec<Title>>,
    redirects: HashMap<Title, Title>,
    extracts: HashMap<Title, String>,
    article_base_url: String,
    rng: RandomSource,
    offline: AtomicBool,
    snapshot_requests: AtomicUsize,
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            links: BTreeMap::new(),
            redirects: HashMap::new(),
            extracts: HashMap::new(),
            article_base_url: "https://ja.wikipedia.org/wiki/".to_string(),
            rng: RandomSource::seeded(0),
            offline: AtomicBool::new(false),
            snapshot_requests: AtomicUsize::new(0),
        }
    }

    /// Add an article with no outbound links
    pub fn article(mut self, title: &str) -> Self {
        self.links.entry(Title::new(title)).or_default();
        self
    }

    /// Add a directed edge; both ends become articles
    pub fn link(mut self, from: &str, to: &str) -> Self {
        let (from, to) = (Title::new(from), Title::new(to));
        self.links.entry(to.clone()).or_default();
        let outbound = self.links.entry(from).or_default();
        if !outbound.contains(&to) {
            outbound.push(to);
        }
        self
    }

    /// Add edges along `titles` in order
    pub fn chain(self, titles: &[&str]) -> Self {
        titles
            .windows(2)
            .fold(self, |graph, pair| graph.link(pair[0], pair[1]))
    }

    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(Title::new(from), Title::new(to));
        self
    }

    pub fn extract(mut self, title: &str, text: &str) -> Self {
        self.extracts.insert(Title::new(title), text.to_string());
        self
    }

    /// Make every query fail as if the source were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Outbound links of an article, following redirects; empty if unknown
    pub fn article_links(&self, title: &Title) -> Vec<Title> {
        self.canonical(title)
            .ok()
            .and_then(|canonical| self.links.get(&canonical).cloned())
            .unwrap_or_default()
    }

    /// Number of snapshot lookups served so far
    pub fn snapshot_requests(&self) -> usize {
        self.snapshot_requests.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> GraphResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(GraphError::Unavailable {
                attempts: 1,
                last: "graph offline".to_string(),
            });
        }
        Ok(())
    }

    fn canonical(&self, title: &Title) -> GraphResult<Title> {
        let target = self.redirects.get(title).unwrap_or(title);
        if self.links.contains_key(target) {
            Ok(target.clone())
        } else {
            Err(GraphError::NotFound(title.to_string()))
        }
    }

    fn navigable_nodes(&self) -> Vec<Title> {
        self.links
            .keys()
            .filter(|title| title.is_navigable())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LinkGraph for MemoryGraph {
    async fn resolve_canonical_title(&self, title: &Title) -> GraphResult<Title> {
        self.ensure_online()?;
        self.canonical(title)
    }

    async fn fetch_article_snapshot(
        &self,
        title: &Title,
        max_links: usize,
    ) -> GraphResult<ArticleSnapshot> {
        self.ensure_online()?;
        self.snapshot_requests.fetch_add(1, Ordering::SeqCst);

        let canonical = self.canonical(title)?;
        let outbound = self.links.get(&canonical).cloned().unwrap_or_default();
        let mut links = Title::clean_all(outbound.iter().map(Title::as_str));
        links.truncate(max_links);

        Ok(ArticleSnapshot {
            url: article_url(&self.article_base_url, &canonical),
            extract: self
                .extracts
                .get(&canonical)
                .cloned()
                .unwrap_or_else(|| format!("{} の要約", canonical)),
            title: canonical,
            links,
        })
    }

    async fn fetch_backlinks(&self, title: &Title, limit: usize) -> GraphResult<Vec<Title>> {
        self.ensure_online()?;
        Ok(self
            .links
            .iter()
            .filter(|(source, outbound)| source.is_navigable() && outbound.contains(title))
            .map(|(source, _)| source.clone())
            .take(limit)
            .collect())
    }

    async fn fetch_random_title(&self) -> GraphResult<Title> {
        self.ensure_online()?;
        let nodes = self.navigable_nodes();
        self.rng
            .pick(&nodes)
            .cloned()
            .ok_or(GraphError::RandomUnavailable)
    }

    async fn fetch_expanded_goal_titles(&self, _min_count: usize) -> GraphResult<Vec<Title>> {
        self.ensure_online()?;
        let nodes = self.navigable_nodes();
        if nodes.is_empty() {
            return Err(GraphError::RandomUnavailable);
        }
        Ok(nodes)
    }
}
