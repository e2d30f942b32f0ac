//! Ephemeral presence: who currently holds a live credential for a room.
//!
//! Entries expire after the configured TTL. Reads prune the room they touch;
//! [`run_sweeper`] prunes every room on a fixed period.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::models::PresenceInfo;

#[derive(Debug, Clone)]
struct PresenceEntry {
    info: PresenceInfo,
    expires_at: DateTime<Utc>,
}

/// Live participants of one room
#[derive(Default)]
struct RoomPresence {
    members: DashMap<String, PresenceEntry>, // user_id -> entry
}

impl RoomPresence {
    fn prune(&self, now: DateTime<Utc>) {
        self.members.retain(|_, entry| entry.expires_at > now);
    }
}

/// Presence across all rooms
pub struct PresenceStore {
    rooms: DashMap<String, RoomPresence>, // room_id -> RoomPresence
    ttl: Duration,
}

impl PresenceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rooms: DashMap::new(),
            ttl,
        }
    }

    /// Record or refresh a participant. Keeps the original join time on refresh.
    pub fn record(&self, room_id: &str, user_id: &str, display_name: &str) {
        let now = Utc::now();
        let room = self.rooms.entry(room_id.to_string()).or_default();

        room.members
            .entry(user_id.to_string())
            .and_modify(|entry| {
                entry.expires_at = now + self.ttl;
                entry.info.display_name = display_name.to_string();
            })
            .or_insert_with(|| PresenceEntry {
                info: PresenceInfo {
                    user_id: user_id.to_string(),
                    display_name: display_name.to_string(),
                    joined_at: now,
                },
                expires_at: now + self.ttl,
            });
    }

    /// Returns true if the user was present
    pub fn remove(&self, room_id: &str, user_id: &str) -> bool {
        let removed = self
            .rooms
            .get(room_id)
            .map(|room| room.members.remove(user_id).is_some())
            .unwrap_or(false);

        self.rooms.remove_if(room_id, |_, room| room.members.is_empty());
        removed
    }

    /// Drop all presence for a room (room ended or deleted)
    pub fn clear_room(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    /// Live participants ordered by join time
    pub fn participants(&self, room_id: &str) -> Vec<PresenceInfo> {
        let now = Utc::now();
        let mut list: Vec<PresenceInfo> = match self.rooms.get(room_id) {
            Some(room) => {
                room.prune(now);
                room.members.iter().map(|e| e.info.clone()).collect()
            }
            None => return Vec::new(),
        };

        self.rooms.remove_if(room_id, |_, room| room.members.is_empty());
        list.sort_by_key(|p| p.joined_at);
        list
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Prune expired entries in every room and drop rooms left empty.
    /// Returns the number of rooms dropped.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.rooms.len();
        self.rooms.retain(|_, room| {
            room.prune(now);
            !room.members.is_empty()
        });
        before.saturating_sub(self.rooms.len())
    }
}

/// Sweep `presence` every `period` until the runtime shuts down
pub async fn run_sweeper(presence: Arc<PresenceStore>, period: std::time::Duration) {
    tracing::info!(period_secs = period.as_secs(), "Starting presence sweeper");

    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let dropped = presence.sweep();
        if dropped > 0 {
            tracing::debug!(rooms = dropped, "Dropped expired presence rooms");
        }
    }
}
