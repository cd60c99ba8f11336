//! Per-tier candidate goal titles.
//!
//! Each tier starts from a curated seed list, borrows the seeds of adjacent
//! tiers, and is padded with bulk-enumerated titles until it reaches the
//! configured minimum size. Usage counters and a short recency window keep
//! goal selection from repeating itself.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::graph::LinkGraph;
use crate::random::RandomSource;
use crate::types::{Difficulty, Title};

const EASY_GOALS: &[&str] = &[
    "日本", "東京", "大阪市", "北海道", "富士山", "地球", "太陽", "月", "海", "猫",
    "犬", "サッカー", "野球", "アニメ", "漫画", "音楽", "映画", "インターネット",
    "スマートフォン", "自動車", "新幹線", "寿司", "ラーメン", "ドラえもん",
    "ポケットモンスター", "スタジオジブリ", "任天堂", "YouTube", "Wikipedia", "人工知能",
];

const NORMAL_GOALS: &[&str] = &[
    "アメリカ合衆国", "フランス", "中華人民共和国", "第二次世界大戦", "江戸時代",
    "明治維新", "源頼朝", "織田信長", "徳川家康", "坂本龍馬", "夏目漱石", "村上春樹",
    "手塚治虫", "新世紀エヴァンゲリオン", "鬼滅の刃", "ONE PIECE", "機動戦士ガンダム",
    "Jリーグ", "メジャーリーグベースボール", "東京大学", "京都大学", "ビットコイン",
    "量子力学", "相対性理論", "ブラックホール", "Apple", "Google", "OpenAI", "宇宙開発",
    "オリンピック",
];

const HARD_GOALS: &[&str] = &[
    "アラン・チューリング", "冪等性", "量子コンピュータ", "深層学習", "ゲーム理論",
    "暗号理論", "微分方程式", "一般相対性理論", "中世ヨーロッパ", "ビザンツ帝国",
    "産業革命", "冷戦", "国際連合", "欧州連合", "世界貿易機関", "多国籍企業",
    "サプライチェーン", "再生可能エネルギー", "ゲノム編集", "タンパク質", "神経科学",
    "認知科学", "言語学", "比較文学", "浮世絵", "現代建築", "クラシック音楽", "映画理論",
    "データベース", "分散システム",
];

/// Goal pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum pool size per tier before bulk padding stops
    pub min_size: usize,
    /// Lifetime of a complete pool
    pub ttl: Duration,
    /// How many recent goals per tier are avoided
    pub recent_window: usize,
    /// Lifetime of a pool that could not reach `min_size`
    pub degraded_retry: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1200,
            ttl: Duration::from_secs(30 * 60),
            recent_window: 8,
            degraded_retry: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_size: std::env::var("GOAL_POOL_MIN_SIZE")
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.min_size),
            ..defaults
        }
    }
}

/// Curated seed titles per tier
#[derive(Debug, Clone)]
pub struct TierSeeds {
    pub easy: Vec<Title>,
    pub normal: Vec<Title>,
    pub hard: Vec<Title>,
}

impl TierSeeds {
    pub fn curated() -> Self {
        Self::from_lists(EASY_GOALS, NORMAL_GOALS, HARD_GOALS)
    }

    pub fn from_lists(easy: &[&str], normal: &[&str], hard: &[&str]) -> Self {
        Self {
            easy: Title::clean_all(easy),
            normal: Title::clean_all(normal),
            hard: Title::clean_all(hard),
        }
    }

    pub fn for_tier(&self, difficulty: Difficulty) -> &[Title] {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Normal => &self.normal,
            Difficulty::Hard => &self.hard,
        }
    }
}

impl Default for TierSeeds {
    fn default() -> Self {
        Self::curated()
    }
}

#[derive(Debug)]
struct TierPool {
    titles: Arc<Vec<Title>>,
    expires_at: Instant,
    degraded: bool,
}

#[derive(Debug, Default)]
struct Usage {
    counts: HashMap<Title, u32>,
    recent: VecDeque<Title>,
    last: Option<Title>,
}

/// Cached goal pools plus usage bookkeeping for all tiers
pub struct GoalPool {
    config: PoolConfig,
    seeds: TierSeeds,
    rng: Arc<RandomSource>,
    pools: RwLock<HashMap<Difficulty, TierPool>>,
    usage: Mutex<HashMap<Difficulty, Usage>>,
}

impl GoalPool {
    pub fn new(config: PoolConfig, seeds: TierSeeds, rng: Arc<RandomSource>) -> Self {
        Self {
            config,
            seeds,
            rng,
            pools: RwLock::new(HashMap::new()),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Current pool for a tier, rebuilding it when expired
    pub async fn get_pool(&self, difficulty: Difficulty, graph: &dyn LinkGraph) -> Arc<Vec<Title>> {
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&difficulty) {
                if Instant::now() < pool.expires_at {
                    return pool.titles.clone();
                }
            }
        }

        self.refresh(difficulty, graph).await
    }

    /// Rebuild a tier's pool unconditionally
    pub async fn refresh(&self, difficulty: Difficulty, graph: &dyn LinkGraph) -> Arc<Vec<Title>> {
        let (titles, degraded) = self.build(difficulty, graph).await;
        let titles = Arc::new(titles);
        let ttl = if degraded {
            self.config.degraded_retry
        } else {
            self.config.ttl
        };

        self.pools.write().await.insert(
            difficulty,
            TierPool {
                titles: titles.clone(),
                expires_at: Instant::now() + ttl,
                degraded,
            },
        );

        titles
    }

    /// Whether the cached pool for a tier fell short of the minimum size
    pub async fn is_degraded(&self, difficulty: Difficulty) -> bool {
        self.pools
            .read()
            .await
            .get(&difficulty)
            .is_some_and(|pool| pool.degraded)
    }

    /// Size of the cached pool for a tier, if one has been built
    pub async fn cached_size(&self, difficulty: Difficulty) -> Option<usize> {
        self.pools
            .read()
            .await
            .get(&difficulty)
            .map(|pool| pool.titles.len())
    }

    /// Pool to serve while a rebuild could not finish in time: the stale
    /// pool if there is one, else the curated seeds. Kept for the degraded
    /// retry period.
    pub async fn interim_pool(&self, difficulty: Difficulty) -> Arc<Vec<Title>> {
        let mut pools = self.pools.write().await;
        let (titles, degraded) = match pools.get(&difficulty) {
            Some(stale) => (stale.titles.clone(), stale.degraded),
            None => {
                let seeds = self.seed_titles(difficulty);
                let degraded = seeds.len() < self.config.min_size;
                (Arc::new(seeds), degraded)
            }
        };

        pools.insert(
            difficulty,
            TierPool {
                titles: titles.clone(),
                expires_at: Instant::now() + self.config.degraded_retry,
                degraded,
            },
        );
        titles
    }

    /// Curated seeds for a tier followed by its adjacent tiers' seeds
    fn seed_titles(&self, difficulty: Difficulty) -> Vec<Title> {
        let mut seen: HashSet<Title> = HashSet::new();
        let curated = self.seeds.for_tier(difficulty).iter();
        let borrowed = difficulty
            .adjacent()
            .iter()
            .flat_map(|tier| self.seeds.for_tier(*tier).iter());

        curated
            .chain(borrowed)
            .filter(|title| seen.insert((*title).clone()))
            .cloned()
            .collect()
    }

    async fn build(&self, difficulty: Difficulty, graph: &dyn LinkGraph) -> (Vec<Title>, bool) {
        let mut titles = self.seed_titles(difficulty);
        let mut seen: HashSet<Title> = titles.iter().cloned().collect();

        if titles.len() < self.config.min_size {
            match graph.fetch_expanded_goal_titles(self.config.min_size).await {
                Ok(mut bulk) => {
                    self.rng.shuffle(&mut bulk);
                    for title in bulk {
                        if titles.len() >= self.config.min_size {
                            break;
                        }
                        if title.is_navigable() && seen.insert(title.clone()) {
                            titles.push(title);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(%difficulty, "Bulk goal enumeration failed: {}", e);
                }
            }
        }

        let degraded = titles.len() < self.config.min_size;
        if degraded {
            tracing::warn!(
                %difficulty,
                size = titles.len(),
                min_size = self.config.min_size,
                "Goal pool below minimum size"
            );
        } else {
            tracing::info!(%difficulty, size = titles.len(), "Goal pool rebuilt");
        }

        (titles, degraded)
    }

    /// Pick a goal from `pool`, preferring least-used titles outside the
    /// recency window and `exclude`. The window is dropped first, then the
    /// previous goal, then `exclude`, so a non-empty pool always yields a
    /// title.
    pub async fn select_goal(
        &self,
        difficulty: Difficulty,
        pool: &[Title],
        exclude: &[Title],
    ) -> Option<Title> {
        let usage = self.usage.lock().await;
        let tier = usage.get(&difficulty);

        let is_last = |title: &Title| tier.is_some_and(|u| u.last.as_ref() == Some(title));
        let in_window = |title: &Title| tier.is_some_and(|u| u.recent.contains(title));
        let excluded = |title: &Title| exclude.contains(title);

        let mut candidates: Vec<&Title> = pool
            .iter()
            .filter(|title| !excluded(*title) && !is_last(*title) && !in_window(*title))
            .collect();
        if candidates.is_empty() {
            candidates = pool
                .iter()
                .filter(|title| !excluded(*title) && !is_last(*title))
                .collect();
        }
        if candidates.is_empty() {
            candidates = pool.iter().filter(|title| !excluded(*title)).collect();
        }
        if candidates.is_empty() {
            candidates = pool.iter().collect();
        }

        let count = |title: &Title| tier.and_then(|u| u.counts.get(title)).copied().unwrap_or(0);
        let least = candidates.iter().map(|title| count(*title)).min()?;
        let tied: Vec<&Title> = candidates
            .into_iter()
            .filter(|title| count(*title) == least)
            .collect();

        self.rng.pick(&tied).map(|title| (*title).clone())
    }

    /// Count a goal as used and push it into the recency window
    pub async fn record_used(&self, difficulty: Difficulty, goal: &Title) {
        let mut usage = self.usage.lock().await;
        let tier = usage.entry(difficulty).or_default();

        *tier.counts.entry(goal.clone()).or_insert(0) += 1;
        tier.recent.retain(|title| title != goal);
        tier.recent.push_back(goal.clone());
        while tier.recent.len() > self.config.recent_window {
            tier.recent.pop_front();
        }
        tier.last = Some(goal.clone());
    }

    /// Most recently used goal for a tier
    pub async fn last_goal(&self, difficulty: Difficulty) -> Option<Title> {
        self.usage
            .lock()
            .await
            .get(&difficulty)
            .and_then(|u| u.last.clone())
    }
}
