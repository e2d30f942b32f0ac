use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::Pool;
use redis::AsyncCommands;

use super::{OtpStore, RoomStore, StoreError, StoreResult, UserStore};
use crate::models::{MeetingCategory, Room, User};

fn room_key(room_id: &str) -> String {
    format!("room:{}", room_id)
}

fn participants_key(room_id: &str) -> String {
    format!("room:{}:participants", room_id)
}

fn user_rooms_key(user_id: &str) -> String {
    format!("user:{}:rooms", user_id)
}

fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

fn email_key(email: &str) -> String {
    format!("user:email:{}", email)
}

/// Redis-backed store.
///
/// Rooms live at `room:{id}` with the participant set in `room:{id}:participants`.
/// Each user has a sorted index `user:{id}:rooms` scored by window start (ms).
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomStore for RedisStore {
    async fn insert_room(&self, room: &Room) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(room)?;

        // Reserve the code first; the rest is only written by the winner.
        let reserved: Option<String> = redis::cmd("SET")
            .arg(room_key(&room.room_id))
            .arg(&json)
            .arg("NX")
            .query_async(&mut *conn)
            .await?;
        if reserved.is_none() {
            return Ok(false);
        }

        let score = room.window_from.timestamp_millis();
        let members: Vec<&str> = room.participant_ids.iter().map(String::as_str).collect();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SADD")
            .arg(participants_key(&room.room_id))
            .arg(&members)
            .ignore();
        for user_id in &members {
            pipe.cmd("ZADD")
                .arg(user_rooms_key(user_id))
                .arg(score)
                .arg(&room.room_id)
                .ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        tracing::debug!(room_id = %room.room_id, "Room stored");
        Ok(true)
    }

    async fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>> {
        let mut conn = self.pool.get().await?;

        let json: Option<String> = conn.get(room_key(room_id)).await?;
        let Some(data) = json else {
            return Ok(None);
        };

        let mut room: Room = serde_json::from_str(&data)?;
        let members: Vec<String> = conn.smembers(participants_key(room_id)).await?;
        room.participant_ids = members.into_iter().collect();
        Ok(Some(room))
    }

    async fn replace_room(&self, room: &Room, previous: &Room) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(room)?;
        let score = room.window_from.timestamp_millis();
        let members: Vec<&str> = room.participant_ids.iter().map(String::as_str).collect();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(room_key(&room.room_id))
            .arg(&json)
            .ignore()
            .cmd("DEL")
            .arg(participants_key(&room.room_id))
            .ignore()
            .cmd("SADD")
            .arg(participants_key(&room.room_id))
            .arg(&members)
            .ignore();
        for removed in previous.participant_ids.difference(&room.participant_ids) {
            pipe.cmd("ZREM")
                .arg(user_rooms_key(removed))
                .arg(&room.room_id)
                .ignore();
        }
        for user_id in &members {
            pipe.cmd("ZADD")
                .arg(user_rooms_key(user_id))
                .arg(score)
                .arg(&room.room_id)
                .ignore();
        }
        pipe.query_async::<()>(&mut *conn).await?;

        tracing::debug!(room_id = %room.room_id, "Room replaced");
        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let members: Vec<String> = conn.smembers(participants_key(room_id)).await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(room_key(room_id))
            .cmd("DEL")
            .arg(participants_key(room_id))
            .ignore();
        for user_id in &members {
            pipe.cmd("ZREM")
                .arg(user_rooms_key(user_id))
                .arg(room_id)
                .ignore();
        }
        let (deleted,): (u32,) = pipe.query_async(&mut *conn).await?;

        Ok(deleted > 0)
    }

    async fn add_participant(&self, room_id: &str, user_id: &str) -> StoreResult<bool> {
        let room = self
            .get_room(room_id)
            .await?
            .ok_or_else(|| StoreError::Missing(room_id.to_string()))?;
        if room.is_participant(user_id) {
            return Ok(false);
        }

        let mut conn = self.pool.get().await?;
        let added: u32 = conn.sadd(participants_key(room_id), user_id).await?;
        if added > 0 {
            redis::cmd("ZADD")
                .arg(user_rooms_key(user_id))
                .arg(room.window_from.timestamp_millis())
                .arg(room_id)
                .query_async::<()>(&mut *conn)
                .await?;
        }
        Ok(added > 0)
    }

    async fn rooms_for_user(
        &self,
        user_id: &str,
        category: MeetingCategory,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Room>> {
        let mut conn = self.pool.get().await?;
        let key = user_rooms_key(user_id);
        let now_ms = now.timestamp_millis();

        let ids: Vec<String> = match category {
            MeetingCategory::Upcoming => {
                redis::cmd("ZRANGEBYSCORE")
                    .arg(&key)
                    .arg(format!("({}", now_ms))
                    .arg("+inf")
                    .arg("LIMIT")
                    .arg(0)
                    .arg(limit)
                    .query_async(&mut *conn)
                    .await?
            }
            MeetingCategory::Past => {
                redis::cmd("ZREVRANGEBYSCORE")
                    .arg(&key)
                    .arg(now_ms)
                    .arg("-inf")
                    .arg("LIMIT")
                    .arg(0)
                    .arg(limit)
                    .query_async(&mut *conn)
                    .await?
            }
        };
        drop(conn);

        let mut rooms = Vec::with_capacity(ids.len());
        for room_id in ids {
            match self.get_room(&room_id).await? {
                Some(room) => rooms.push(room),
                None => {
                    tracing::debug!(user_id = %user_id, room_id = %room_id, "Dropping stale room index entry");
                    let mut conn = self.pool.get().await?;
                    conn.zrem::<_, _, ()>(&key, &room_id).await?;
                }
            }
        }
        Ok(rooms)
    }

    async fn health_check(&self) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;

        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;

        Ok(pong == "PONG")
    }
}

#[async_trait]
impl UserStore for RedisStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;

        let claimed: Option<String> = redis::cmd("SET")
            .arg(email_key(&user.email))
            .arg(&user.id)
            .arg("NX")
            .query_async(&mut *conn)
            .await?;
        if claimed.is_none() {
            return Err(StoreError::DuplicateEmail(user.email.clone()));
        }

        let json = serde_json::to_string(user)?;
        conn.set::<_, _, ()>(user_key(&user.id), json).await?;

        tracing::info!(user_id = %user.id, "User stored");
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.pool.get().await?;

        let json: Option<String> = conn.get(user_key(user_id)).await?;

        match json {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user_id: Option<String> = {
            let mut conn = self.pool.get().await?;
            conn.get(email_key(email)).await?
        };

        match user_id {
            Some(id) => self.get_user(&id).await,
            None => Ok(None),
        }
    }

    async fn set_refresh_token_ref(&self, user_id: &str, jti: Option<&str>) -> StoreResult<()> {
        let mut user = self
            .get_user(user_id)
            .await?
            .ok_or_else(|| StoreError::Missing(user_id.to_string()))?;
        user.refresh_token_ref = jti.map(str::to_string);

        let mut conn = self.pool.get().await?;
        let json = serde_json::to_string(&user)?;
        conn.set::<_, _, ()>(user_key(user_id), json).await?;
        Ok(())
    }
}

#[async_trait]
impl OtpStore for RedisStore {
    async fn put_otp(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;

        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds as i64)
            .arg(value)
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn get_otp(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete_otp(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
