use std::cmp::Ordering;

use crate::types::{LeaderboardEntry, Room};

/// Rank players: finishers by elapsed time, then everyone else by name
pub fn room_leaderboard(room: &Room) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = room
        .players
        .values()
        .map(|player| LeaderboardEntry {
            id: player.id.clone(),
            name: player.name.clone(),
            clicks: player.clicks,
            finished_at: player.finished_at,
            elapsed_ms: match (player.finished_at, room.start_at) {
                (Some(finished_at), Some(start_at)) => Some(finished_at - start_at),
                _ => None,
            },
        })
        .collect();

    entries.sort_by(|a, b| match (a.elapsed_ms, b.elapsed_ms) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });

    entries
}
