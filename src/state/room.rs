//! Room state machine.
//!
//! Transitions are plain methods on [`Room`] that take the current time and
//! report what happened, so they can be exercised without a store.

use crate::types::*;

/// Players allowed in one room
pub const MAX_PLAYERS: usize = 2;

/// Longest accepted display name, in characters
pub const MAX_NAME_CHARS: usize = 20;

const DEFAULT_PLAYER_NAME: &str = "Player";

/// Coarse category used to map room errors onto HTTP statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
}

/// State machine and identity violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Player not found in room")]
    PlayerNotFound,

    #[error("Room has already started")]
    RoomAlreadyStarted,

    #[error("Room is full")]
    RoomFull,

    #[error("Room is not running")]
    RoomNotRunning,

    #[error("Race has not started yet")]
    RaceNotStarted,

    #[error("Round is still in progress")]
    RoomInProgress,
}

impl RoomError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::PlayerNotFound => "PLAYER_NOT_FOUND",
            RoomError::RoomAlreadyStarted => "ROOM_ALREADY_STARTED",
            RoomError::RoomFull => "ROOM_FULL",
            RoomError::RoomNotRunning => "ROOM_NOT_RUNNING",
            RoomError::RaceNotStarted => "RACE_NOT_STARTED",
            RoomError::RoomInProgress => "ROOM_IN_PROGRESS",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::RoomNotFound | RoomError::PlayerNotFound => ErrorKind::NotFound,
            _ => ErrorKind::Conflict,
        }
    }
}

/// Outcome of [`Room::set_ready`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyTransition {
    /// Room was not waiting; nothing changed
    Ignored,
    /// Flag stored, room still waiting
    Updated,
    /// Both players ready; race begins at `start_at`
    RaceStarted { start_at: Millis },
}

/// Outcome of [`Room::apply_move`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveTransition {
    /// Player had already finished; nothing changed
    Ignored,
    Moved { clicks: u32 },
    /// Player reached the goal. `won` is false for a later finisher.
    Finished { clicks: u32, won: bool },
}

/// Trim and cap a display name, falling back to a default
pub fn sanitize_name(raw: &str) -> String {
    let name: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim_end().to_string();
    if name.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        name
    }
}

impl RoomPlayer {
    /// Fresh player standing on `start_title`
    pub fn new(id: PlayerId, name: &str, joined_at: Millis, start_title: &Title) -> Self {
        Self {
            id,
            name: sanitize_name(name),
            ready: false,
            joined_at,
            current_title: start_title.clone(),
            clicks: 0,
            path: vec![start_title.clone()],
            finished_at: None,
        }
    }
}

impl Room {
    pub fn new(id: RoomId, challenge: Challenge, created_at: Millis) -> Self {
        Self {
            id,
            round: 1,
            status: RoomStatus::Waiting,
            created_at,
            challenge,
            players: Default::default(),
            start_at: None,
            winner_id: None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    /// Add a player built for this room's current challenge
    pub fn join(&mut self, id: PlayerId, name: &str, now: Millis) -> Result<RoomPlayer, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::RoomAlreadyStarted);
        }
        if self.is_full() {
            return Err(RoomError::RoomFull);
        }

        let player = RoomPlayer::new(id, name, now, &self.challenge.start_title);
        self.players.insert(player.id.clone(), player.clone());
        Ok(player)
    }

    pub fn set_ready(
        &mut self,
        player_id: &str,
        ready: bool,
        now: Millis,
        start_delay_ms: Millis,
    ) -> Result<ReadyTransition, RoomError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(RoomError::PlayerNotFound)?;

        if self.status != RoomStatus::Waiting {
            return Ok(ReadyTransition::Ignored);
        }

        player.ready = ready;

        let everyone_ready = self.players.values().all(|p| p.ready);
        if self.is_full() && everyone_ready {
            let start_at = now + start_delay_ms;
            self.status = RoomStatus::Running;
            self.start_at = Some(start_at);
            let start_title = self.challenge.start_title.clone();
            for player in self.players.values_mut() {
                player.reset_progress(&start_title);
            }
            return Ok(ReadyTransition::RaceStarted { start_at });
        }

        Ok(ReadyTransition::Updated)
    }

    /// Record a move the caller has already validated against the graph
    pub fn apply_move(
        &mut self,
        player_id: &str,
        next_title: &Title,
        now: Millis,
    ) -> Result<MoveTransition, RoomError> {
        if self.status != RoomStatus::Running {
            return Err(RoomError::RoomNotRunning);
        }
        match self.start_at {
            Some(start_at) if now >= start_at => {}
            _ => return Err(RoomError::RaceNotStarted),
        }

        let player = self
            .players
            .get_mut(player_id)
            .ok_or(RoomError::PlayerNotFound)?;

        if player.finished_at.is_some() {
            return Ok(MoveTransition::Ignored);
        }

        player.current_title = next_title.clone();
        player.clicks += 1;
        player.path.push(next_title.clone());
        let clicks = player.clicks;

        if *next_title != self.challenge.goal_title {
            return Ok(MoveTransition::Moved { clicks });
        }

        player.finished_at = Some(now);
        let won = self.winner_id.is_none();
        if won {
            self.winner_id = Some(player_id.to_string());
            self.status = RoomStatus::Finished;
        }

        Ok(MoveTransition::Finished { clicks, won })
    }

    /// Install a new challenge and reset every player for another round
    pub fn start_next_round(&mut self, player_id: &str, challenge: Challenge) -> Result<(), RoomError> {
        if !self.players.contains_key(player_id) {
            return Err(RoomError::PlayerNotFound);
        }
        if self.status == RoomStatus::Running {
            return Err(RoomError::RoomInProgress);
        }

        self.round += 1;
        self.status = RoomStatus::Waiting;
        self.start_at = None;
        self.winner_id = None;
        for player in self.players.values_mut() {
            player.ready = false;
            player.reset_progress(&challenge.start_title);
        }
        self.challenge = challenge;

        Ok(())
    }

    /// The challenge and player progress stay hidden until the countdown
    /// has elapsed or the round is over
    pub fn is_challenge_visible(&self, now: Millis) -> bool {
        match self.status {
            RoomStatus::Finished => true,
            RoomStatus::Running => self.start_at.is_some_and(|start_at| now >= start_at),
            RoomStatus::Waiting => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(start: &str, goal: &str) -> Challenge {
        Challenge {
            start_title: Title::new(start),
            goal_title: Title::new(goal),
            difficulty: Difficulty::Easy,
            target_distance: 3,
            generated_at: 0,
        }
    }

    /// Room with two players, "p1" and "p2"
    fn two_player_room() -> Room {
        let mut room = Room::new("room01".to_string(), challenge("A", "Z"), 0);
        room.join("p1".to_string(), "Alice", 0).unwrap();
        room.join("p2".to_string(), "Bob", 10).unwrap();
        room
    }

    fn running_room() -> Room {
        let mut room = two_player_room();
        room.set_ready("p1", true, 100, 4000).unwrap();
        room.set_ready("p2", true, 100, 4000).unwrap();
        room
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Alice  "), "Alice");
        assert_eq!(sanitize_name("   "), "Player");
        assert_eq!(sanitize_name(""), "Player");
        assert_eq!(sanitize_name(&"x".repeat(30)).chars().count(), 20);
        assert_eq!(sanitize_name("あいうえおかきくけこさしすせそたちつてとなに"), "あいうえおかきくけこさしすせそたちつてと");
    }

    #[test]
    fn test_join_limits() {
        let mut room = two_player_room();
        assert_eq!(
            room.join("p3".to_string(), "Carol", 20),
            Err(RoomError::RoomFull)
        );

        let mut room = running_room();
        room.players.remove("p2");
        assert_eq!(
            room.join("p3".to_string(), "Carol", 20),
            Err(RoomError::RoomAlreadyStarted)
        );
    }

    #[test]
    fn test_joined_player_starts_on_start_title() {
        let room = two_player_room();
        let bob = &room.players["p2"];
        assert_eq!(bob.current_title, Title::new("A"));
        assert_eq!(bob.path, vec![Title::new("A")]);
        assert_eq!(bob.clicks, 0);
        assert!(!bob.ready);
    }

    #[test]
    fn test_ready_is_order_independent() {
        for order in [["p1", "p2"], ["p2", "p1"]] {
            let mut room = two_player_room();
            assert_eq!(
                room.set_ready(order[0], true, 50, 4000),
                Ok(ReadyTransition::Updated)
            );
            assert_eq!(room.status, RoomStatus::Waiting);
            assert_eq!(
                room.set_ready(order[1], true, 60, 4000),
                Ok(ReadyTransition::RaceStarted { start_at: 4060 })
            );
            assert_eq!(room.status, RoomStatus::Running);
            assert_eq!(room.start_at, Some(4060));
        }
    }

    #[test]
    fn test_single_player_never_starts() {
        let mut room = Room::new("solo01".to_string(), challenge("A", "Z"), 0);
        room.join("p1".to_string(), "Alice", 0).unwrap();
        assert_eq!(
            room.set_ready("p1", true, 10, 4000),
            Ok(ReadyTransition::Updated)
        );
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn test_unready_blocks_start() {
        let mut room = two_player_room();
        room.set_ready("p1", true, 10, 4000).unwrap();
        room.set_ready("p1", false, 20, 4000).unwrap();
        room.set_ready("p2", true, 30, 4000).unwrap();
        assert_eq!(room.status, RoomStatus::Waiting);
    }

    #[test]
    fn test_ready_outside_waiting_is_ignored() {
        let mut room = running_room();
        assert_eq!(
            room.set_ready("p1", false, 200, 4000),
            Ok(ReadyTransition::Ignored)
        );
        assert!(room.players["p1"].ready);
        assert_eq!(
            room.set_ready("ghost", true, 200, 4000),
            Err(RoomError::PlayerNotFound)
        );
    }

    #[test]
    fn test_move_before_start_is_rejected() {
        let mut room = running_room();
        assert_eq!(
            room.apply_move("p1", &Title::new("B"), 4099),
            Err(RoomError::RaceNotStarted)
        );

        let mut waiting = two_player_room();
        assert_eq!(
            waiting.apply_move("p1", &Title::new("B"), 5000),
            Err(RoomError::RoomNotRunning)
        );
    }

    #[test]
    fn test_moves_and_single_winner() {
        let mut room = running_room();

        assert_eq!(
            room.apply_move("p1", &Title::new("B"), 4100),
            Ok(MoveTransition::Moved { clicks: 1 })
        );
        assert_eq!(
            room.apply_move("p1", &Title::new("Z"), 4200),
            Ok(MoveTransition::Finished { clicks: 2, won: true })
        );
        assert_eq!(room.status, RoomStatus::Finished);
        assert_eq!(room.winner_id.as_deref(), Some("p1"));

        let p1 = &room.players["p1"];
        assert_eq!(p1.path, vec![Title::new("A"), Title::new("B"), Title::new("Z")]);
        assert_eq!(p1.clicks as usize, p1.path.len() - 1);
        assert_eq!(p1.finished_at, Some(4200));
    }

    #[test]
    fn test_second_finisher_does_not_overwrite_winner() {
        let mut room = running_room();
        room.apply_move("p1", &Title::new("Z"), 4100).unwrap();

        // The room is no longer running, so the late move is refused
        assert_eq!(
            room.apply_move("p2", &Title::new("Z"), 4101),
            Err(RoomError::RoomNotRunning)
        );
        assert_eq!(room.winner_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_move_after_finish_is_noop() {
        let mut room = running_room();
        room.apply_move("p1", &Title::new("Z"), 4100).unwrap();

        // Reopen the race to reach the finished-player branch directly
        room.status = RoomStatus::Running;
        let before = room.clone();
        assert_eq!(
            room.apply_move("p1", &Title::new("Q"), 4200),
            Ok(MoveTransition::Ignored)
        );
        assert_eq!(room, before);

        assert_eq!(
            room.apply_move("p2", &Title::new("Z"), 4300),
            Ok(MoveTransition::Finished { clicks: 1, won: false })
        );
        assert_eq!(room.winner_id.as_deref(), Some("p1"));
        assert_eq!(room.players["p2"].finished_at, Some(4300));
    }

    #[test]
    fn test_next_round_resets_players() {
        let mut room = running_room();
        assert_eq!(
            room.start_next_round("p1", challenge("M", "N")),
            Err(RoomError::RoomInProgress)
        );

        room.apply_move("p1", &Title::new("B"), 4100).unwrap();
        room.apply_move("p1", &Title::new("Z"), 4200).unwrap();
        assert_eq!(
            room.start_next_round("ghost", challenge("M", "N")),
            Err(RoomError::PlayerNotFound)
        );

        room.start_next_round("p2", challenge("M", "N")).unwrap();
        assert_eq!(room.round, 2);
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.start_at, None);
        assert_eq!(room.winner_id, None);
        assert_eq!(room.challenge.start_title, Title::new("M"));
        for player in room.players.values() {
            assert!(!player.ready);
            assert_eq!(player.current_title, Title::new("M"));
            assert_eq!(player.path, vec![Title::new("M")]);
            assert_eq!(player.clicks, 0);
            assert_eq!(player.finished_at, None);
        }
    }

    #[test]
    fn test_challenge_visibility() {
        let waiting = two_player_room();
        assert!(!waiting.is_challenge_visible(1_000_000));

        let mut room = running_room();
        assert!(!room.is_challenge_visible(4099));
        assert!(room.is_challenge_visible(4100));

        room.apply_move("p1", &Title::new("Z"), 4100).unwrap();
        assert!(room.is_challenge_visible(0));
    }

    #[test]
    fn test_error_codes_and_kinds() {
        assert_eq!(RoomError::RoomFull.code(), "ROOM_FULL");
        assert_eq!(RoomError::RoomNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(RoomError::PlayerNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(RoomError::RaceNotStarted.kind(), ErrorKind::Conflict);
    }
}
