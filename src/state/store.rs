use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::room::{MoveTransition, ReadyTransition, RoomError};
use crate::clock::Clock;
use crate::random::RandomSource;
use crate::types::*;

const ROOM_ID_LEN: usize = 6;
const ROOM_ID_ATTEMPTS: usize = 10;

/// Room lifetime and countdown configuration
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Rooms older than this are swept
    pub ttl_ms: Millis,
    /// Countdown between "everyone ready" and the first accepted move
    pub start_delay_ms: Millis,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 12 * 60 * 60 * 1000,
            start_delay_ms: 4000,
        }
    }
}

impl RoomConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |key: &str| {
            std::env::var(key)
                .ok()
                .and_then(|value| value.trim().parse::<i64>().ok())
                .filter(|value| *value >= 0)
        };

        Self {
            ttl_ms: parse("ROOM_TTL_HOURS")
                .and_then(|hours| hours.checked_mul(60 * 60 * 1000))
                .unwrap_or(defaults.ttl_ms),
            start_delay_ms: parse("ROOM_START_DELAY_MS").unwrap_or(defaults.start_delay_ms),
        }
    }
}

struct RoomSlot {
    created_at: Millis,
    room: Arc<Mutex<Room>>,
}

/// Owns every live room.
///
/// The map lock is only held to find or insert a room; each room has its
/// own mutex so operations on one room are serialized without blocking the
/// others. Every operation returns a snapshot taken under that mutex.
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomId, RoomSlot>>,
    clock: Arc<dyn Clock>,
    rng: Arc<RandomSource>,
    player_ids: std::sync::Mutex<ulid::Generator>,
    config: RoomConfig,
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

impl RoomStore {
    pub fn new(config: RoomConfig, clock: Arc<dyn Clock>, rng: Arc<RandomSource>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            clock,
            rng,
            player_ids: std::sync::Mutex::new(ulid::Generator::new()),
            config,
        }
    }

    /// Monotonic ULID, so ids sort in join order
    fn next_player_id(&self) -> PlayerId {
        let mut ids = self
            .player_ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.generate()
            .unwrap_or_else(|_| ulid::Ulid::new())
            .to_string()
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub async fn room_count(&self) -> usize {
        self.sweep().await;
        self.rooms.read().await.len()
    }

    /// Drop rooms past their TTL
    async fn sweep(&self) {
        let now = self.now();
        let ttl = self.config.ttl_ms;
        let expired = |slot: &RoomSlot| now - slot.created_at > ttl;

        if !self.rooms.read().await.values().any(expired) {
            return;
        }

        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        rooms.retain(|_, slot| !expired(slot));
        tracing::info!(swept = before - rooms.len(), live = rooms.len(), "Swept expired rooms");
    }

    fn allocate_room_id(&self, rooms: &HashMap<RoomId, RoomSlot>) -> RoomId {
        for _ in 0..ROOM_ID_ATTEMPTS {
            let candidate = self.rng.base36(ROOM_ID_LEN);
            if !rooms.contains_key(&candidate) {
                return candidate;
            }
        }

        let stamp = to_base36(self.now().max(0) as u64);
        let tail = &stamp[stamp.len().saturating_sub(4)..];
        format!("{}{}", self.rng.base36(4), tail)
    }

    async fn slot(&self, room_id: &str) -> Result<Arc<Mutex<Room>>, RoomError> {
        self.sweep().await;
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|slot| slot.room.clone())
            .ok_or(RoomError::RoomNotFound)
    }

    pub async fn create_room(&self, challenge: Challenge, creator_name: &str) -> (Room, RoomPlayer) {
        self.sweep().await;
        let now = self.now();

        let mut rooms = self.rooms.write().await;
        let room_id = self.allocate_room_id(&rooms);
        let mut room = Room::new(room_id.clone(), challenge, now);
        let creator = RoomPlayer::new(
            self.next_player_id(),
            creator_name,
            now,
            &room.challenge.start_title,
        );
        room.players.insert(creator.id.clone(), creator.clone());

        rooms.insert(
            room_id.clone(),
            RoomSlot {
                created_at: now,
                room: Arc::new(Mutex::new(room.clone())),
            },
        );
        tracing::info!(room_id = %room_id, player_id = %creator.id, "Room created");

        (room, creator)
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, RoomError> {
        let slot = self.slot(room_id).await?;
        let room = slot.lock().await;
        Ok(room.clone())
    }

    pub async fn join_room(&self, room_id: &str, name: &str) -> Result<(Room, RoomPlayer), RoomError> {
        let slot = self.slot(room_id).await?;
        let mut room = slot.lock().await;

        let player = room.join(self.next_player_id(), name, self.now())?;
        tracing::info!(room_id, player_id = %player.id, "Player joined room");

        Ok((room.clone(), player))
    }

    pub async fn set_ready(&self, room_id: &str, player_id: &str, ready: bool) -> Result<Room, RoomError> {
        let slot = self.slot(room_id).await?;
        let mut room = slot.lock().await;

        let transition = room.set_ready(player_id, ready, self.now(), self.config.start_delay_ms)?;
        match transition {
            ReadyTransition::RaceStarted { start_at } => {
                tracing::info!(room_id, round = room.round, start_at, "Race started");
            }
            ReadyTransition::Updated => {
                tracing::debug!(room_id, player_id, ready, "Ready flag updated");
            }
            ReadyTransition::Ignored => {}
        }

        Ok(room.clone())
    }

    /// Apply a move whose edge the caller has already validated
    pub async fn apply_move(
        &self,
        room_id: &str,
        player_id: &str,
        next_title: &Title,
    ) -> Result<Room, RoomError> {
        let slot = self.slot(room_id).await?;
        let mut room = slot.lock().await;

        match room.apply_move(player_id, next_title, self.now())? {
            MoveTransition::Finished { clicks, won: true } => {
                tracing::info!(room_id, player_id, clicks, round = room.round, "Winner decided");
            }
            MoveTransition::Finished { clicks, won: false } => {
                tracing::info!(room_id, player_id, clicks, "Player finished after the winner");
            }
            MoveTransition::Moved { clicks } => {
                tracing::debug!(room_id, player_id, clicks, to = %next_title, "Move applied");
            }
            MoveTransition::Ignored => {
                tracing::debug!(room_id, player_id, "Move ignored for finished player");
            }
        }

        Ok(room.clone())
    }

    pub async fn start_next_round(
        &self,
        room_id: &str,
        player_id: &str,
        challenge: Challenge,
    ) -> Result<Room, RoomError> {
        let slot = self.slot(room_id).await?;
        let mut room = slot.lock().await;

        room.start_next_round(player_id, challenge)?;
        tracing::info!(room_id, round = room.round, "Round advanced");

        Ok(room.clone())
    }
}
