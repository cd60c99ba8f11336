mod leaderboard;
mod room;
mod store;

pub use leaderboard::room_leaderboard;
pub use room::{
    sanitize_name, ErrorKind, MoveTransition, ReadyTransition, RoomError, MAX_NAME_CHARS,
    MAX_PLAYERS,
};
pub use store::{RoomConfig, RoomStore};

use crate::challenge::{ChallengeGenerator, GeneratorConfig};
use crate::clock::Clock;
use crate::goal_pool::{GoalPool, PoolConfig, TierSeeds};
use crate::graph::{GraphError, LinkGraph};
use crate::random::RandomSource;
use crate::types::*;
use std::sync::Arc;

/// Links returned by the article endpoint
pub const ARTICLE_LINK_LIMIT: usize = 240;
/// Links scanned when validating a move
pub const MOVE_SCAN_LIMIT: usize = 300;

/// Failure of a game action that may touch both rooms and the graph
#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{to} is not linked from {from}")]
    InvalidMove { from: Title, to: Title },
}

/// Component configuration bundle
#[derive(Debug, Clone, Default)]
pub struct StateConfig {
    pub rooms: RoomConfig,
    pub generator: GeneratorConfig,
    pub pool: PoolConfig,
    pub seeds: TierSeeds,
}

impl StateConfig {
    pub fn from_env() -> Self {
        Self {
            rooms: RoomConfig::from_env(),
            generator: GeneratorConfig::from_env(),
            pool: PoolConfig::from_env(),
            seeds: TierSeeds::curated(),
        }
    }
}

/// Response to a successful room creation
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub room: Room,
    pub player: RoomPlayer,
}

/// Shared application state
pub struct AppState {
    pub graph: Arc<dyn LinkGraph>,
    pub rooms: RoomStore,
    pub challenges: ChallengeGenerator,
}

impl AppState {
    pub fn new(
        graph: Arc<dyn LinkGraph>,
        clock: Arc<dyn Clock>,
        rng: Arc<RandomSource>,
        config: StateConfig,
    ) -> Self {
        let pool = GoalPool::new(config.pool, config.seeds, rng.clone());
        let challenges = ChallengeGenerator::new(
            graph.clone(),
            pool,
            rng.clone(),
            clock.clone(),
            config.generator,
        );

        Self {
            rooms: RoomStore::new(config.rooms, clock, rng),
            challenges,
            graph,
        }
    }

    pub fn now(&self) -> Millis {
        self.rooms.now()
    }

    pub async fn article(&self, title: &Title) -> Result<ArticleSnapshot, GraphError> {
        self.graph
            .fetch_article_snapshot(title, ARTICLE_LINK_LIMIT)
            .await
    }

    /// Generate a challenge and open a room for it
    pub async fn create_room(&self, difficulty: Difficulty, name: &str) -> Result<CreatedRoom, GameError> {
        let challenge = self.challenges.generate(difficulty, &[]).await?;
        let (room, player) = self.rooms.create_room(challenge, name).await;
        Ok(CreatedRoom { room, player })
    }

    /// Validate the edge from the player's current article, then apply it
    pub async fn submit_move(
        &self,
        room_id: &str,
        player_id: &str,
        to: &Title,
    ) -> Result<Room, GameError> {
        let room = self.rooms.get_room(room_id).await?;
        let from = room
            .players
            .get(player_id)
            .map(|player| player.current_title.clone())
            .ok_or(RoomError::PlayerNotFound)?;

        if !self.graph.has_direct_link(&from, to, MOVE_SCAN_LIMIT).await? {
            tracing::debug!(room_id, player_id, %from, %to, "Rejected move without a link");
            return Err(GameError::InvalidMove {
                from,
                to: to.clone(),
            });
        }

        Ok(self.rooms.apply_move(room_id, player_id, to).await?)
    }

    /// Start another round with a fresh challenge, excluding the finished goal.
    /// Keeps the room's difficulty unless one is given.
    pub async fn next_round(
        &self,
        room_id: &str,
        player_id: &str,
        difficulty: Option<Difficulty>,
    ) -> Result<Room, GameError> {
        let room = self.rooms.get_room(room_id).await?;
        if !room.players.contains_key(player_id) {
            return Err(RoomError::PlayerNotFound.into());
        }
        if room.status == RoomStatus::Running {
            return Err(RoomError::RoomInProgress.into());
        }

        let difficulty = difficulty.unwrap_or(room.challenge.difficulty);
        let challenge = self
            .challenges
            .generate(difficulty, std::slice::from_ref(&room.challenge.goal_title))
            .await?;

        Ok(self
            .rooms
            .start_next_round(room_id, player_id, challenge)
            .await?)
    }
}
