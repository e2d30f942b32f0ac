pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};

use crate::config::{Config, StorageBackend};
use crate::models::{MeetingCategory, Room, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Email {0} is already registered")]
    DuplicateEmail(String),
    #[error("Record {0} not found")]
    Missing(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistent room records
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert `room` only if its id is free. Returns `false` on collision.
    async fn insert_room(&self, room: &Room) -> StoreResult<bool>;

    async fn get_room(&self, room_id: &str) -> StoreResult<Option<Room>>;

    /// Overwrite `previous` with `room`, replacing the participant set as a whole.
    async fn replace_room(&self, room: &Room, previous: &Room) -> StoreResult<()>;

    /// Returns `false` when the room did not exist.
    async fn delete_room(&self, room_id: &str) -> StoreResult<bool>;

    /// Append-only membership. Returns `true` if the user was newly added.
    async fn add_participant(&self, room_id: &str, user_id: &str) -> StoreResult<bool>;

    /// Upcoming: `window_from > now` ascending. Past: `window_from <= now` descending.
    async fn rooms_for_user(
        &self,
        user_id: &str,
        category: MeetingCategory,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Room>>;

    async fn health_check(&self) -> StoreResult<bool>;
}

/// Registered users
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateEmail`] if the email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn set_refresh_token_ref(&self, user_id: &str, jti: Option<&str>) -> StoreResult<()>;

    /// Ids from `user_ids` that do not resolve to a user
    async fn missing_users(&self, user_ids: &[String]) -> StoreResult<Vec<String>> {
        let mut missing = Vec::new();
        for id in user_ids {
            if self.get_user(id).await?.is_none() {
                missing.push(id.clone());
            }
        }
        Ok(missing)
    }
}

/// Short-lived one-time codes
#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn put_otp(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<()>;
    async fn get_otp(&self, key: &str) -> StoreResult<Option<String>>;
    async fn delete_otp(&self, key: &str) -> StoreResult<()>;
}

/// All stores behind one backend
#[derive(Clone)]
pub struct Stores {
    pub rooms: Arc<dyn RoomStore>,
    pub users: Arc<dyn UserStore>,
    pub otps: Arc<dyn OtpStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            rooms: store.clone(),
            users: store.clone(),
            otps: store,
        }
    }

    pub fn redis(pool: Pool) -> Self {
        let store = Arc::new(RedisStore::new(pool));
        Self {
            rooms: store.clone(),
            users: store.clone(),
            otps: store,
        }
    }

    pub fn from_config(config: &Config) -> StoreResult<Self> {
        match config.storage_backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::Redis => Ok(Self::redis(create_pool(config)?)),
        }
    }
}

/// Create a Redis connection pool
pub fn create_pool(config: &Config) -> StoreResult<Pool> {
    let redis_config = RedisConfig::from_url(&config.redis_url);
    let pool = redis_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| StoreError::Redis(format!("Failed to create Redis pool: {}", e)))?;

    Ok(pool)
}
