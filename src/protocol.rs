//! JSON shapes exchanged with clients.
//!
//! Room views apply the visibility rule: until the countdown has elapsed
//! (or the round is over) the challenge is `null` and player progress is
//! blanked.

use crate::state::room_leaderboard;
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
    pub joined_at: Millis,
    pub current_title: Title,
    pub clicks: u32,
    pub path_length: usize,
    pub path: Vec<Title>,
    pub finished_at: Option<Millis>,
}

impl PlayerView {
    fn new(player: &RoomPlayer, visible: bool) -> Self {
        if visible {
            Self {
                id: player.id.clone(),
                name: player.name.clone(),
                ready: player.ready,
                joined_at: player.joined_at,
                current_title: player.current_title.clone(),
                clicks: player.clicks,
                path_length: player.path.len(),
                path: player.path.clone(),
                finished_at: player.finished_at,
            }
        } else {
            Self {
                id: player.id.clone(),
                name: player.name.clone(),
                ready: player.ready,
                joined_at: player.joined_at,
                current_title: Title::new(""),
                clicks: 0,
                path_length: 0,
                path: Vec::new(),
                finished_at: None,
            }
        }
    }
}

/// The requesting player's own progress
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeView {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
    pub current_title: Title,
    pub clicks: u32,
    pub path: Vec<Title>,
    pub finished_at: Option<Millis>,
}

impl From<PlayerView> for MeView {
    fn from(view: PlayerView) -> Self {
        Self {
            id: view.id,
            name: view.name,
            ready: view.ready,
            current_title: view.current_title,
            clicks: view.clicks,
            path: view.path,
            finished_at: view.finished_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: RoomId,
    pub round: u32,
    pub status: RoomStatus,
    pub created_at: Millis,
    pub challenge: Option<Challenge>,
    pub start_at: Option<Millis>,
    pub winner_id: Option<PlayerId>,
    pub players: Vec<PlayerView>,
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub me: Option<MeView>,
}

impl RoomView {
    /// Client view of `room` at `now`; `viewer` adds a `me` block when it
    /// names a player in the room
    pub fn new(room: &Room, now: Millis, viewer: Option<&str>) -> Self {
        let visible = room.is_challenge_visible(now);

        Self {
            id: room.id.clone(),
            round: room.round,
            status: room.status,
            created_at: room.created_at,
            challenge: visible.then(|| room.challenge.clone()),
            start_at: room.start_at,
            winner_id: room.winner_id.clone(),
            players: room
                .players
                .values()
                .map(|player| PlayerView::new(player, visible))
                .collect(),
            leaderboard: room_leaderboard(room),
            me: viewer
                .and_then(|id| room.players.get(id))
                .map(|player| PlayerView::new(player, visible).into()),
        }
    }
}

// Request bodies. Missing optional fields fall back to defaults.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    #[serde(default)]
    pub player_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyRequest {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub to_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextRoundRequest {
    #[serde(default)]
    pub player_id: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

// Response bodies

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room: RoomView,
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub invite_path: String,
    pub invite_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub player_id: PlayerId,
    pub room: RoomView,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomResponse {
    pub room: RoomView,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveResponse {
    pub accepted: bool,
    pub room: RoomView,
}
