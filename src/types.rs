use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque ID types
pub type RoomId = String;
pub type PlayerId = String;

/// Epoch milliseconds
pub type Millis = i64;

/// Suffixes marking disambiguation pages (not navigable)
const DISAMBIGUATION_SUFFIXES: &[&str] = &["(曖昧さ回避)", "曖昧さ回避", "(disambiguation)"];

/// A normalized article title.
///
/// Underscores become spaces and surrounding whitespace is trimmed, so two
/// titles compare equal iff their normalized forms match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Title(String);

impl Title {
    pub fn new(raw: &str) -> Self {
        Self(raw.replace('_', " ").trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this title is a plain article a player may navigate to.
    /// Namespaced pages, anchors and disambiguation pages are excluded.
    pub fn is_navigable(&self) -> bool {
        if self.0.is_empty() || self.0.contains('#') || self.0.contains(':') {
            return false;
        }
        !DISAMBIGUATION_SUFFIXES
            .iter()
            .any(|suffix| self.0.ends_with(suffix))
    }

    /// Normalize, drop non-navigable titles and dedupe while keeping first-seen order.
    pub fn clean_all<I, S>(raw: I) -> Vec<Title>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        raw.into_iter()
            .map(|s| Title::new(s.as_ref()))
            .filter(|t| t.is_navigable())
            .filter(|t| seen.insert(t.clone()))
            .collect()
    }
}

impl From<String> for Title {
    fn from(raw: String) -> Self {
        Title::new(&raw)
    }
}

impl From<&str> for Title {
    fn from(raw: &str) -> Self {
        Title::new(raw)
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary plus outbound links of one article, as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSnapshot {
    pub title: Title,
    pub extract: String,
    pub links: Vec<Title>,
    pub url: String,
}

impl ArticleSnapshot {
    pub fn links_to(&self, target: &Title) -> bool {
        self.links.iter().any(|link| link == target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    /// Parse a client-supplied difficulty; anything unknown means `Normal`
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("easy") => Difficulty::Easy,
            Some("hard") => Difficulty::Hard,
            _ => Difficulty::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }

    /// Candidate chain lengths for this tier
    pub fn distance_candidates(&self) -> &'static [usize] {
        match self {
            Difficulty::Easy => &[2, 3],
            Difficulty::Normal => &[4, 5],
            Difficulty::Hard => &[6, 7, 8],
        }
    }

    pub fn min_distance(&self) -> usize {
        self.distance_candidates()
            .iter()
            .copied()
            .min()
            .unwrap_or(1)
    }

    /// Human readable hop range, e.g. "2-3 hops"
    pub fn distance_label(&self) -> String {
        let candidates = self.distance_candidates();
        let max = candidates.iter().copied().max().unwrap_or(1);
        format!("{}-{} hops", self.min_distance(), max)
    }

    /// Tiers whose curated seeds may pad this tier's pool
    pub fn adjacent(&self) -> &'static [Difficulty] {
        match self {
            Difficulty::Easy => &[Difficulty::Normal],
            Difficulty::Normal => &[Difficulty::Easy, Difficulty::Hard],
            Difficulty::Hard => &[Difficulty::Normal],
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub start_title: Title,
    pub goal_title: Title,
    pub difficulty: Difficulty,
    pub target_distance: usize,
    pub generated_at: Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayer {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
    pub joined_at: Millis,
    pub current_title: Title,
    pub clicks: u32,
    /// `path[0]` is always the round's start title
    pub path: Vec<Title>,
    pub finished_at: Option<Millis>,
}

impl RoomPlayer {
    /// Put the player back on the start title with no progress
    pub fn reset_progress(&mut self, start_title: &Title) {
        self.current_title = start_title.clone();
        self.clicks = 0;
        self.path = vec![start_title.clone()];
        self.finished_at = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub round: u32,
    pub status: RoomStatus,
    pub created_at: Millis,
    pub challenge: Challenge,
    /// Keyed by ULID, so iteration follows join order
    pub players: BTreeMap<PlayerId, RoomPlayer>,
    pub start_at: Option<Millis>,
    pub winner_id: Option<PlayerId>,
}

/// Derived ranking row; never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: PlayerId,
    pub name: String,
    pub clicks: u32,
    pub finished_at: Option<Millis>,
    pub elapsed_ms: Option<Millis>,
}
