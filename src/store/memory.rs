use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{OtpStore, RoomStore, StoreError, StoreResult, UserStore};
use crate::models::{MeetingCategory, Room, User};

/// Process-local store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,    // room_id -> Room
    users: DashMap<String, User>,    // user_id -> User
    emails: DashMap<String, String>, // email -> user_id
    otps: DashMap<String, (String, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn insert_room(&self, room: &Room) -> StoreResult<bool> {
        match self.rooms.entry(room.room_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(room.clone());
                Ok(true)
            }
        }
    }

    async fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        Ok(self.rooms.get(room_id).map(|r| r.clone()))
    }

    async fn replace_room(&self, room: &Room, previous: &Room) -> StoreResult<()> {
        let mut slot = self
            .rooms
            .get_mut(&previous.room_id)
            .ok_or_else(|| StoreError::Missing(previous.room_id.clone()))?;
        *slot = room.clone();
        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<bool> {
        Ok(self.rooms.remove(room_id).is_some())
    }

    async fn add_participant(&self, room_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::Missing(room_id.to_string()))?;
        Ok(room.participant_ids.insert(user_id.to_string()))
    }

    async fn rooms_for_user(
        &self,
        user_id: &str,
        category: MeetingCategory,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Room>> {
        let mut rooms: Vec<Room> = self
            .rooms
            .iter()
            .filter(|r| r.is_participant(user_id))
            .filter(|r| match category {
                MeetingCategory::Upcoming => r.window_from > now,
                MeetingCategory::Past => r.window_from <= now,
            })
            .map(|r| r.clone())
            .collect();

        match category {
            MeetingCategory::Upcoming => rooms.sort_by_key(|r| r.window_from),
            MeetingCategory::Past => rooms.sort_by(|a, b| b.window_from.cmp(&a.window_from)),
        }
        rooms.truncate(limit);
        Ok(rooms)
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail(user.email.clone())),
            Entry::Vacant(slot) => {
                self.users.insert(user.id.clone(), user.clone());
                slot.insert(user.id.clone());
                Ok(())
            }
        }
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user_id = match self.emails.get(email) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        self.get_user(&user_id).await
    }

    async fn set_refresh_token_ref(&self, user_id: &str, jti: Option<&str>) -> StoreResult<()> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::Missing(user_id.to_string()))?;
        user.refresh_token_ref = jti.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn put_otp(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()> {
        let expires = Instant::now() + Duration::from_secs(ttl_seconds);
        self.otps.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get_otp(&self, key: &str) -> StoreResult<Option<String>> {
        let expired = match self.otps.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.otps.remove(key);
        }
        Ok(None)
    }

    async fn delete_otp(&self, key: &str) -> StoreResult<()> {
        self.otps.remove(key);
        Ok(())
    }
}
