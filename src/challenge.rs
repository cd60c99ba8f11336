//! Challenge generation by reverse backlink chains.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::clock::Clock;
use crate::goal_pool::GoalPool;
use crate::graph::{GraphError, GraphResult, LinkGraph};
use crate::random::RandomSource;
use crate::types::{Challenge, Difficulty, Title};

/// Goal used when even the pool is empty
const LAST_RESORT_GOAL: &str = "Wikipedia";

/// Challenge generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Wall-clock budget for chain-built attempts
    pub time_budget: Duration,
    pub max_attempts: usize,
    /// Backlinks fetched per chain step
    pub backlink_limit: usize,
    /// Node cap for the no-shortcut search
    pub bfs_node_cap: usize,
    /// Links enqueued per visited article during the search
    pub bfs_fanout: usize,
    /// Links fetched per visited article during the search
    pub bfs_snapshot_links: usize,
    /// Extra random draws when the fallback start collides with the goal
    pub fallback_random_retries: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_millis(11_000),
            max_attempts: 10,
            backlink_limit: 180,
            bfs_node_cap: 260,
            bfs_fanout: 60,
            bfs_snapshot_links: 140,
            fallback_random_retries: 6,
        }
    }
}

impl GeneratorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |key: &str| {
            std::env::var(key)
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok())
        };

        Self {
            time_budget: parse("CHALLENGE_TIME_BUDGET_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.time_budget),
            max_attempts: parse("CHALLENGE_MAX_ATTEMPTS")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_attempts),
            ..defaults
        }
    }
}

/// Why a single attempt did not produce a challenge
#[derive(Debug, thiserror::Error)]
enum Rejection {
    #[error("goal pool is empty")]
    EmptyPool,

    #[error("goal {0} is excluded after canonicalisation")]
    Excluded(Title),

    #[error("no unused backlink after {0} hops")]
    DeadEnd(usize),

    #[error("goal {0} resolves to the previous goal")]
    RepeatsLastGoal(Title),

    #[error("chain start equals goal")]
    StartIsGoal,

    #[error("goal reachable within {0} hops")]
    Shortcut(usize),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A generated challenge plus the chain that backs it
#[derive(Debug, Clone)]
pub struct Generated {
    pub challenge: Challenge,
    /// Start to goal, `target_distance + 1` titles. `None` for the
    /// availability fallback, which carries no reachability guarantee.
    pub chain: Option<Vec<Title>>,
}

impl Generated {
    pub fn is_fallback(&self) -> bool {
        self.chain.is_none()
    }
}

pub struct ChallengeGenerator {
    graph: Arc<dyn LinkGraph>,
    pool: GoalPool,
    rng: Arc<RandomSource>,
    clock: Arc<dyn Clock>,
    config: GeneratorConfig,
}

impl ChallengeGenerator {
    pub fn new(
        graph: Arc<dyn LinkGraph>,
        pool: GoalPool,
        rng: Arc<RandomSource>,
        clock: Arc<dyn Clock>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            graph,
            pool,
            rng,
            clock,
            config,
        }
    }

    pub fn pool(&self) -> &GoalPool {
        &self.pool
    }

    /// Rebuild every tier's goal pool
    pub async fn refresh_pools(&self) {
        let refreshes = Difficulty::ALL
            .iter()
            .map(|difficulty| self.pool.refresh(*difficulty, self.graph.as_ref()));
        let pools = futures::future::join_all(refreshes).await;
        tracing::debug!(
            sizes = ?pools.iter().map(|p| p.len()).collect::<Vec<_>>(),
            "Goal pools refreshed"
        );
    }

    pub async fn generate(&self, difficulty: Difficulty, exclude: &[Title]) -> GraphResult<Challenge> {
        self.generate_detailed(difficulty, exclude)
            .await
            .map(|generated| generated.challenge)
    }

    /// Generate a challenge, falling back to a random start once the time
    /// or attempt budget is spent. Fails only if the fallback's random
    /// title lookup fails.
    pub async fn generate_detailed(
        &self,
        difficulty: Difficulty,
        exclude: &[Title],
    ) -> GraphResult<Generated> {
        let started = Instant::now();
        let deadline = started + self.config.time_budget;

        // A cold pool may need bulk enumeration; leave half the budget for attempts
        let pool_deadline = started + self.config.time_budget / 2;
        let rebuild = self.pool.get_pool(difficulty, self.graph.as_ref());
        let pool = match tokio::time::timeout_at(pool_deadline, rebuild).await {
            Ok(pool) => pool,
            Err(_) => {
                tracing::warn!(%difficulty, "Goal pool rebuild too slow, serving interim pool");
                self.pool.interim_pool(difficulty).await
            }
        };
        let mut tried: Vec<Title> = exclude.to_vec();

        for attempt in 1..=self.config.max_attempts {
            if Instant::now() >= deadline {
                tracing::warn!(%difficulty, attempt, "Challenge time budget spent");
                break;
            }

            let outcome = tokio::time::timeout_at(
                deadline,
                self.attempt(difficulty, &pool, exclude, &mut tried),
            )
            .await;

            match outcome {
                Ok(Ok((selected, chain))) => {
                    let goal = chain[chain.len() - 1].clone();
                    self.pool.record_used(difficulty, &selected).await;
                    if selected != goal {
                        self.pool.record_used(difficulty, &goal).await;
                    }

                    let challenge = Challenge {
                        start_title: chain[0].clone(),
                        goal_title: goal,
                        difficulty,
                        target_distance: chain.len() - 1,
                        generated_at: self.clock.now_ms(),
                    };
                    tracing::info!(
                        %difficulty,
                        attempt,
                        start = %challenge.start_title,
                        goal = %challenge.goal_title,
                        distance = challenge.target_distance,
                        "Challenge generated"
                    );
                    return Ok(Generated {
                        challenge,
                        chain: Some(chain),
                    });
                }
                Ok(Err(rejection)) => {
                    tracing::warn!(%difficulty, attempt, "Challenge attempt rejected: {}", rejection);
                }
                Err(_) => {
                    tracing::warn!(%difficulty, attempt, "Challenge attempt hit the time budget");
                    break;
                }
            }
        }

        let challenge = self.fallback(difficulty, &pool, exclude).await?;
        Ok(Generated {
            challenge,
            chain: None,
        })
    }

    async fn attempt(
        &self,
        difficulty: Difficulty,
        pool: &[Title],
        exclude: &[Title],
        tried: &mut Vec<Title>,
    ) -> Result<(Title, Vec<Title>), Rejection> {
        let selected = self
            .pool
            .select_goal(difficulty, pool, tried)
            .await
            .ok_or(Rejection::EmptyPool)?;
        tried.push(selected.clone());

        let goal = self.graph.resolve_canonical_title(&selected).await?;
        if goal != selected {
            if exclude.contains(&goal) {
                return Err(Rejection::Excluded(goal));
            }
            if self.pool.last_goal(difficulty).await.as_ref() == Some(&goal) {
                return Err(Rejection::RepeatsLastGoal(goal));
            }
        }

        let distance = self
            .rng
            .pick(difficulty.distance_candidates())
            .copied()
            .unwrap_or_else(|| difficulty.min_distance());
        let chain = self.build_chain(&goal, distance).await?;

        if chain[0] == goal {
            return Err(Rejection::StartIsGoal);
        }

        let guard_depth = difficulty.min_distance().saturating_sub(1);
        if difficulty == Difficulty::Easy
            && guard_depth > 0
            && self.has_path_within(&chain[0], &goal, guard_depth).await?
        {
            return Err(Rejection::Shortcut(guard_depth));
        }

        Ok((selected, chain))
    }

    /// Prepend random unused backlinks to the goal until the chain spans
    /// `distance` hops
    async fn build_chain(&self, goal: &Title, distance: usize) -> Result<Vec<Title>, Rejection> {
        let mut chain: VecDeque<Title> = VecDeque::from([goal.clone()]);
        let mut used: HashSet<Title> = HashSet::from([goal.clone()]);

        while chain.len() < distance + 1 {
            let head = chain.front().cloned().unwrap_or_else(|| goal.clone());
            let backlinks = self
                .graph
                .fetch_backlinks(&head, self.config.backlink_limit)
                .await?;

            let candidates: Vec<&Title> = backlinks
                .iter()
                .filter(|title| !used.contains(*title))
                .collect();
            let next = self
                .rng
                .pick(&candidates)
                .map(|title| (*title).clone())
                .ok_or(Rejection::DeadEnd(chain.len() - 1))?;

            used.insert(next.clone());
            chain.push_front(next);
        }

        Ok(chain.into())
    }

    /// Bounded forward search: is `goal` linked within `max_depth` hops?
    async fn has_path_within(
        &self,
        start: &Title,
        goal: &Title,
        max_depth: usize,
    ) -> GraphResult<bool> {
        if start == goal {
            return Ok(true);
        }

        let mut queue: VecDeque<(Title, usize)> = VecDeque::from([(start.clone(), 0)]);
        let mut visited: HashSet<Title> = HashSet::from([start.clone()]);

        while let Some((title, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            let article = self
                .graph
                .fetch_article_snapshot(&title, self.config.bfs_snapshot_links)
                .await?;
            if article.links_to(goal) {
                return Ok(true);
            }

            for link in article.links.iter().take(self.config.bfs_fanout) {
                if !visited.insert(link.clone()) {
                    continue;
                }
                if visited.len() > self.config.bfs_node_cap {
                    return Ok(false);
                }
                queue.push_back((link.clone(), depth + 1));
            }
        }

        Ok(false)
    }

    async fn fallback(
        &self,
        difficulty: Difficulty,
        pool: &[Title],
        exclude: &[Title],
    ) -> GraphResult<Challenge> {
        let goal = self
            .pool
            .select_goal(difficulty, pool, exclude)
            .await
            .unwrap_or_else(|| Title::new(LAST_RESORT_GOAL));

        let mut start = self.graph.fetch_random_title().await?;
        for _ in 0..self.config.fallback_random_retries {
            if start != goal {
                break;
            }
            start = self.graph.fetch_random_title().await?;
        }

        if start == goal {
            let others: Vec<&Title> = pool.iter().filter(|title| **title != goal).collect();
            start = self
                .rng
                .pick(&others)
                .map(|title| (*title).clone())
                .ok_or(GraphError::RandomUnavailable)?;
        }

        self.pool.record_used(difficulty, &goal).await;
        tracing::warn!(
            %difficulty,
            start = %start,
            goal = %goal,
            "Serving fallback challenge without reachability guarantee"
        );

        Ok(Challenge {
            start_title: start,
            goal_title: goal,
            difficulty,
            target_distance: difficulty.min_distance(),
            generated_at: self.clock.now_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::goal_pool::{PoolConfig, TierSeeds};
    use crate::graph::MemoryGraph;
    use serial_test::serial;

    fn generator_with(
        graph: Arc<MemoryGraph>,
        seeds: TierSeeds,
        config: GeneratorConfig,
        seed: u64,
    ) -> ChallengeGenerator {
        let rng = Arc::new(RandomSource::seeded(seed));
        let pool = GoalPool::new(
            PoolConfig {
                min_size: 1,
                ..PoolConfig::default()
            },
            seeds,
            rng.clone(),
        );
        ChallengeGenerator::new(graph, pool, rng, Arc::new(ManualClock::new(1_000)), config)
    }

    /// Goal "G" with a single long backlink chain P8 -> ... -> P1 -> G
    fn linear_graph() -> MemoryGraph {
        MemoryGraph::new().chain(&["P8", "P7", "P6", "P5", "P4", "P3", "P2", "P1", "G"])
    }

    /// Walk the chain forward and confirm every hop is a real link
    async fn assert_chain_links(graph: &MemoryGraph, chain: &[Title]) {
        for pair in chain.windows(2) {
            assert!(
                graph.has_direct_link(&pair[0], &pair[1], 300).await.unwrap(),
                "{} does not link to {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[tokio::test]
    async fn test_chain_matches_target_distance_for_every_tier() {
        let graph = Arc::new(linear_graph());
        let seeds = TierSeeds::from_lists(&["G"], &["G"], &["G"]);

        for seed in 0..5 {
            let generator =
                generator_with(graph.clone(), seeds.clone(), GeneratorConfig::default(), seed);
            for difficulty in Difficulty::ALL {
                let generated = generator.generate_detailed(difficulty, &[]).await.unwrap();
                let chain = generated.chain.clone().expect("chain-built challenge");
                let challenge = &generated.challenge;

                assert!(difficulty
                    .distance_candidates()
                    .contains(&challenge.target_distance));
                assert_eq!(chain.len(), challenge.target_distance + 1);
                assert_eq!(chain[0], challenge.start_title);
                assert_eq!(chain[chain.len() - 1], challenge.goal_title);
                assert_ne!(challenge.start_title, challenge.goal_title);
                assert_eq!(challenge.generated_at, 1_000);
                assert_chain_links(&graph, &chain).await;
            }
        }
    }

    #[tokio::test]
    async fn test_easy_rejects_chains_with_shortcuts() {
        // Every two-hop start also links straight to the goal except via S
        let graph = Arc::new(
            MemoryGraph::new()
                .chain(&["S", "M", "G"])
                .chain(&["T", "N", "G"])
                .link("T", "G")
                .chain(&["U", "V", "W", "G"])
                .link("U", "G"),
        );
        let seeds = TierSeeds::from_lists(&["G"], &[], &[]);

        let mut chain_built = 0;
        for seed in 0..10 {
            let generator =
                generator_with(graph.clone(), seeds.clone(), GeneratorConfig::default(), seed);
            let generated = generator
                .generate_detailed(Difficulty::Easy, &[])
                .await
                .unwrap();

            if let Some(chain) = &generated.chain {
                chain_built += 1;
                let start = &chain[0];
                assert!(
                    !graph.has_direct_link(start, &Title::new("G"), 300).await.unwrap(),
                    "{} links straight to the goal",
                    start
                );
            }
        }
        assert!(chain_built > 0, "every seed fell back");
    }

    #[tokio::test]
    async fn test_excluded_goal_is_not_selected() {
        let graph = Arc::new(
            MemoryGraph::new()
                .chain(&["A3", "A2", "A1", "GA"])
                .chain(&["B3", "B2", "B1", "GB"]),
        );
        let seeds = TierSeeds::from_lists(&["GA", "GB"], &[], &[]);
        let generator = generator_with(graph, seeds, GeneratorConfig::default(), 7);

        for _ in 0..5 {
            let challenge = generator
                .generate(Difficulty::Easy, &[Title::new("GA")])
                .await
                .unwrap();
            assert_eq!(challenge.goal_title, Title::new("GB"));
        }
    }

    #[tokio::test]
    async fn test_goal_not_repeated_back_to_back() {
        let graph = Arc::new(
            MemoryGraph::new()
                .chain(&["A3", "A2", "A1", "GA"])
                .chain(&["B3", "B2", "B1", "GB"])
                .chain(&["C3", "C2", "C1", "GC"]),
        );
        let seeds = TierSeeds::from_lists(&["GA", "GB", "GC"], &[], &[]);
        let generator = generator_with(graph, seeds, GeneratorConfig::default(), 9);

        let mut previous: Option<Title> = None;
        for _ in 0..9 {
            let challenge = generator.generate(Difficulty::Easy, &[]).await.unwrap();
            assert_ne!(Some(&challenge.goal_title), previous.as_ref());
            previous = Some(challenge.goal_title);
        }
    }

    #[tokio::test]
    async fn test_redirect_alias_does_not_repeat_previous_goal() {
        // X redirects to Y, so picking X right after Y would serve Y twice
        let graph = Arc::new(
            MemoryGraph::new()
                .chain(&["Y8", "Y7", "Y6", "Y5", "Y4", "Y3", "Y2", "Y1", "Y"])
                .chain(&["Z8", "Z7", "Z6", "Z5", "Z4", "Z3", "Z2", "Z1", "Z"])
                .redirect("X", "Y"),
        );
        let seeds = TierSeeds::from_lists(&[], &["X", "Y", "Z"], &[]);

        for seed in 0..20 {
            let generator =
                generator_with(graph.clone(), seeds.clone(), GeneratorConfig::default(), seed);
            let mut previous: Option<Title> = None;
            for _ in 0..6 {
                let generated = generator
                    .generate_detailed(Difficulty::Normal, &[])
                    .await
                    .unwrap();
                assert!(!generated.is_fallback());
                let goal = generated.challenge.goal_title;
                assert_ne!(Some(&goal), previous.as_ref(), "seed {} repeated {}", seed, goal);
                previous = Some(goal);
            }
        }
    }

    /// Link graph whose bulk enumeration takes two minutes
    struct SlowBulk {
        inner: MemoryGraph,
    }

    #[async_trait::async_trait]
    impl LinkGraph for SlowBulk {
        async fn resolve_canonical_title(&self, title: &Title) -> GraphResult<Title> {
            self.inner.resolve_canonical_title(title).await
        }

        async fn fetch_article_snapshot(
            &self,
            title: &Title,
            max_links: usize,
        ) -> GraphResult<crate::types::ArticleSnapshot> {
            self.inner.fetch_article_snapshot(title, max_links).await
        }

        async fn fetch_backlinks(&self, title: &Title, limit: usize) -> GraphResult<Vec<Title>> {
            self.inner.fetch_backlinks(title, limit).await
        }

        async fn fetch_random_title(&self) -> GraphResult<Title> {
            self.inner.fetch_random_title().await
        }

        async fn fetch_expanded_goal_titles(&self, min_count: usize) -> GraphResult<Vec<Title>> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            self.inner.fetch_expanded_goal_titles(min_count).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_pool_rebuild_stays_within_budget() {
        let graph = Arc::new(SlowBulk {
            inner: linear_graph(),
        });
        let rng = Arc::new(RandomSource::seeded(5));
        let pool = GoalPool::new(
            PoolConfig::default(),
            TierSeeds::from_lists(&[], &["G"], &[]),
            rng.clone(),
        );
        let config = GeneratorConfig::default();
        let budget = config.time_budget;
        let generator =
            ChallengeGenerator::new(graph, pool, rng, Arc::new(ManualClock::new(0)), config);

        let started = Instant::now();
        let generated = generator
            .generate_detailed(Difficulty::Normal, &[])
            .await
            .unwrap();
        assert!(started.elapsed() <= budget);
        assert!(!generated.is_fallback());
        assert_eq!(generated.challenge.goal_title, Title::new("G"));
        assert!(generator.pool().is_degraded(Difficulty::Normal).await);

        // The interim pool is reused rather than waiting on another rebuild
        let started = Instant::now();
        generator.generate(Difficulty::Normal, &[]).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_dead_end_goals_use_fallback() {
        // Nothing links to G, so no chain can be built
        let graph = Arc::new(MemoryGraph::new().article("G").chain(&["X", "Y", "Z", "Q", "R"]));
        let seeds = TierSeeds::from_lists(&[], &["G"], &[]);
        let generator = generator_with(graph, seeds, GeneratorConfig::default(), 3);

        let generated = generator
            .generate_detailed(Difficulty::Normal, &[])
            .await
            .unwrap();
        assert!(generated.is_fallback());
        assert_eq!(generated.challenge.goal_title, Title::new("G"));
        assert_ne!(generated.challenge.start_title, Title::new("G"));
        assert_eq!(generated.challenge.target_distance, 4);
    }

    #[tokio::test]
    async fn test_fallback_start_never_equals_goal() {
        // The only random title is the goal itself; the pool supplies a start
        let graph = Arc::new(MemoryGraph::new().article("G"));
        let seeds = TierSeeds::from_lists(&["G", "H"], &[], &[]);
        let config = GeneratorConfig {
            max_attempts: 2,
            ..GeneratorConfig::default()
        };
        let generator = generator_with(graph, seeds, config, 1);

        for _ in 0..4 {
            let challenge = generator.generate(Difficulty::Easy, &[]).await.unwrap();
            assert_ne!(challenge.start_title, challenge.goal_title);
        }
    }

    #[tokio::test]
    async fn test_unavailable_graph_propagates_from_fallback() {
        let graph = Arc::new(linear_graph());
        graph.set_offline(true);
        let seeds = TierSeeds::from_lists(&["G"], &["G"], &["G"]);
        let generator = generator_with(graph, seeds, GeneratorConfig::default(), 2);

        let result = generator.generate(Difficulty::Hard, &[]).await;
        assert!(matches!(result, Err(GraphError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_zero_time_budget_goes_straight_to_fallback() {
        let graph = Arc::new(linear_graph());
        let seeds = TierSeeds::from_lists(&["G"], &["G"], &["G"]);
        let config = GeneratorConfig {
            time_budget: Duration::ZERO,
            ..GeneratorConfig::default()
        };
        let generator = generator_with(graph.clone(), seeds, config, 4);

        let generated = generator
            .generate_detailed(Difficulty::Easy, &[])
            .await
            .unwrap();
        assert!(generated.is_fallback());
        assert_eq!(generated.challenge.target_distance, 2);
    }

    #[test]
    #[serial]
    fn test_generator_config_from_env() {
        std::env::set_var("CHALLENGE_TIME_BUDGET_MS", "2500");
        std::env::set_var("CHALLENGE_MAX_ATTEMPTS", "3");

        let config = GeneratorConfig::from_env();
        assert_eq!(config.time_budget, Duration::from_millis(2500));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backlink_limit, 180);

        std::env::remove_var("CHALLENGE_TIME_BUDGET_MS");
        std::env::remove_var("CHALLENGE_MAX_ATTEMPTS");
    }
}
