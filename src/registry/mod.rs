//! Room registry: the authoritative owner of room records.
//!
//! Room codes are 8-digit numeric strings drawn at random; insertion is
//! insert-if-absent so concurrent creates never share a code. Collisions are
//! retried up to [`MAX_CODE_ATTEMPTS`] times before giving up.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;

use crate::models::{JoinPolicy, MeetingCategory, NewRoom, Room, RoomUpdate};
use crate::store::{RoomStore, StoreError, UserStore};

/// Upper bound on code draws per create
pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Width of a room code
pub const ROOM_CODE_LEN: usize = 8;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Room {0} not found")]
    NotFound(String),
    #[error("Unknown participant ids: {0:?}")]
    InvalidParticipant(Vec<String>),
    #[error("No free room code after {0} attempts")]
    Exhausted(u32),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Source of candidate room codes
pub trait CodeGenerator: Send + Sync {
    fn next_code(&self) -> String;
}

/// Uniform 8-digit codes with a non-zero leading digit
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn next_code(&self) -> String {
        let mut rng = rand::rng();
        let n: u32 = rng.random_range(10_000_000..100_000_000);
        n.to_string()
    }
}

/// Trim a user-entered room code and drop interior whitespace and separators.
pub fn normalize_room_id(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<dyn RoomStore>,
    users: Arc<dyn UserStore>,
    codes: Arc<dyn CodeGenerator>,
    page_size: usize,
    instant_duration: Duration,
}

impl RoomRegistry {
    pub fn new(
        rooms: Arc<dyn RoomStore>,
        users: Arc<dyn UserStore>,
        page_size: usize,
        instant_duration: Duration,
    ) -> Self {
        Self {
            rooms,
            users,
            codes: Arc::new(RandomCodes),
            page_size,
            instant_duration,
        }
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Schedule a room. The host is always a participant.
    pub async fn create(&self, new_room: NewRoom) -> RegistryResult<Room> {
        let title = new_room.title.trim().to_string();
        if title.is_empty() {
            return Err(RegistryError::InvalidInput("Title is required".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(RegistryError::InvalidInput(format!(
                "Title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        if new_room.window_to <= new_room.window_from {
            return Err(RegistryError::InvalidInput(
                "meetingTo must be after meetingFrom".to_string(),
            ));
        }

        let mut participants: BTreeSet<String> = new_room
            .participant_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        participants.insert(new_room.host_id.clone());

        let ids: Vec<String> = participants.iter().cloned().collect();
        let missing = self.users.missing_users(&ids).await?;
        if !missing.is_empty() {
            return Err(RegistryError::InvalidParticipant(missing));
        }

        self.insert_with_fresh_code(|room_id| Room {
            room_id,
            title: title.clone(),
            host_id: new_room.host_id.clone(),
            window_from: new_room.window_from,
            window_to: new_room.window_to,
            participant_ids: participants.clone(),
            join_policy: new_room.join_policy,
            created_at: Utc::now(),
        })
        .await
    }

    /// Create a room that opens now, with the host as sole participant.
    pub async fn create_instant(&self, host_id: &str) -> RegistryResult<Room> {
        if self.users.get_user(host_id).await?.is_none() {
            return Err(RegistryError::InvalidParticipant(vec![host_id.to_string()]));
        }

        let now = Utc::now();
        self.insert_with_fresh_code(|room_id| Room {
            room_id,
            title: "Instant Meeting".to_string(),
            host_id: host_id.to_string(),
            window_from: now,
            window_to: now + self.instant_duration,
            participant_ids: [host_id.to_string()].into_iter().collect(),
            join_policy: JoinPolicy::Anytime,
            created_at: now,
        })
        .await
    }

    async fn insert_with_fresh_code<F>(&self, build: F) -> RegistryResult<Room>
    where
        F: Fn(String) -> Room,
    {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let room = build(self.codes.next_code());
            if self.rooms.insert_room(&room).await? {
                tracing::info!(
                    room_id = %room.room_id,
                    host_id = %room.host_id,
                    attempt = attempt,
                    "Room created"
                );
                return Ok(room);
            }
            tracing::debug!(room_id = %room.room_id, attempt = attempt, "Room code collision");
        }

        tracing::error!(attempts = MAX_CODE_ATTEMPTS, "Room code allocation exhausted");
        Err(RegistryError::Exhausted(MAX_CODE_ATTEMPTS))
    }

    /// Exact lookup after normalization
    pub async fn resolve(&self, room_id: &str) -> RegistryResult<Room> {
        let room_id = normalize_room_id(room_id);
        if room_id.is_empty() {
            return Err(RegistryError::NotFound(room_id));
        }

        self.rooms
            .get_room(&room_id)
            .await?
            .ok_or(RegistryError::NotFound(room_id))
    }

    /// At most `page_size` rooms the user participates in
    pub async fn list_for_user(
        &self,
        user_id: &str,
        category: MeetingCategory,
    ) -> RegistryResult<Vec<Room>> {
        let rooms = self
            .rooms
            .rooms_for_user(user_id, category, Utc::now(), self.page_size)
            .await?;
        Ok(rooms)
    }

    /// Apply a partial update. A new participant list replaces the old one.
    pub async fn update(&self, room_id: &str, update: RoomUpdate) -> RegistryResult<Room> {
        let previous = self.resolve(room_id).await?;
        let mut room = previous.clone();

        if let Some(title) = update.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(RegistryError::InvalidInput("Title is required".to_string()));
            }
            room.title = title;
        }
        if let Some(from) = update.window_from {
            room.window_from = from;
        }
        if let Some(to) = update.window_to {
            room.window_to = to;
        }
        if room.window_to <= room.window_from {
            return Err(RegistryError::InvalidInput(
                "meetingTo must be after meetingFrom".to_string(),
            ));
        }
        if let Some(policy) = update.join_policy {
            room.join_policy = policy;
        }
        if let Some(ids) = update.participant_ids {
            let mut participants: BTreeSet<String> = ids
                .into_iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect();
            participants.insert(room.host_id.clone());

            let list: Vec<String> = participants.iter().cloned().collect();
            let missing = self.users.missing_users(&list).await?;
            if !missing.is_empty() {
                return Err(RegistryError::InvalidParticipant(missing));
            }
            room.participant_ids = participants;
        }

        self.rooms.replace_room(&room, &previous).await?;
        tracing::info!(room_id = %room.room_id, "Room updated");
        Ok(room)
    }

    pub async fn delete(&self, room_id: &str) -> RegistryResult<()> {
        let room_id = normalize_room_id(room_id);
        if !self.rooms.delete_room(&room_id).await? {
            return Err(RegistryError::NotFound(room_id));
        }
        tracing::info!(room_id = %room_id, "Room deleted");
        Ok(())
    }

    /// Append `user_id` to the room's participants. No write if already present.
    pub async fn ensure_participant(&self, room: &Room, user_id: &str) -> RegistryResult<()> {
        if room.is_participant(user_id) {
            return Ok(());
        }
        match self.rooms.add_participant(&room.room_id, user_id).await {
            Ok(added) => {
                if added {
                    tracing::debug!(room_id = %room.room_id, user_id = %user_id, "Participant added");
                }
                Ok(())
            }
            Err(StoreError::Missing(id)) => Err(RegistryError::NotFound(id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn health_check(&self) -> RegistryResult<bool> {
        Ok(self.rooms.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::store::MemoryStore;
    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCodes(Vec<&'static str>, AtomicUsize);

    impl CodeGenerator for FixedCodes {
        fn next_code(&self) -> String {
            let i = self.1.fetch_add(1, Ordering::SeqCst);
            self.0[i % self.0.len()].to_string()
        }
    }

    async fn setup() -> (RoomRegistry, Arc<MemoryStore>, Vec<String>) {
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::new();
        for name in ["host", "alice", "bob"] {
            let user = User::new(&format!("{}@example.com", name), name, "hash".into(), true);
            store.insert_user(&user).await.unwrap();
            ids.push(user.id);
        }
        let registry = RoomRegistry::new(store.clone(), store.clone(), 10, Duration::hours(1));
        (registry, store, ids)
    }

    fn scheduled(host: &str, participants: Vec<String>, offset: Duration) -> NewRoom {
        let from = Utc::now() + offset;
        NewRoom {
            title: "Planning".to_string(),
            window_from: from,
            window_to: from + Duration::hours(1),
            host_id: host.to_string(),
            participant_ids: participants,
            join_policy: JoinPolicy::Anytime,
        }
    }

    #[test]
    fn test_random_codes_shape() {
        for _ in 0..100 {
            let code = RandomCodes.next_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn test_normalize_room_id() {
        assert_eq!(normalize_room_id("  1234 5678 "), "12345678");
        assert_eq!(normalize_room_id("1234-5678"), "12345678");
        assert_eq!(normalize_room_id("abc"), "ABC");
        assert_eq!(normalize_room_id("   "), "");
    }

    #[tokio::test]
    async fn test_create_includes_host() {
        let (registry, _, ids) = setup().await;
        let room = registry
            .create(scheduled(&ids[0], vec![ids[1].clone()], Duration::hours(1)))
            .await
            .unwrap();

        assert!(room.is_participant(&ids[0]));
        assert!(room.is_participant(&ids[1]));
        assert_eq!(room.participant_ids.len(), 2);
        assert_eq!(registry.resolve(&room.room_id).await.unwrap(), room);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_participant() {
        let (registry, _, ids) = setup().await;
        let err = registry
            .create(scheduled(&ids[0], vec!["ghost".to_string()], Duration::hours(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidParticipant(ref m) if m == &vec!["ghost".to_string()]));
    }

    #[tokio::test]
    async fn test_create_rejects_inverted_window() {
        let (registry, _, ids) = setup().await;
        let mut new_room = scheduled(&ids[0], vec![], Duration::hours(1));
        new_room.window_to = new_room.window_from - Duration::minutes(1);

        assert!(matches!(
            registry.create(new_room).await,
            Err(RegistryError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_collision_is_retried() {
        let (registry, _, ids) = setup().await;
        let registry = registry.with_code_generator(Arc::new(FixedCodes(
            vec!["11111111", "11111111", "22222222"],
            AtomicUsize::new(0),
        )));

        let first = registry.create_instant(&ids[0]).await.unwrap();
        let second = registry.create_instant(&ids[0]).await.unwrap();
        assert_eq!(first.room_id, "11111111");
        assert_eq!(second.room_id, "22222222");
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported() {
        let (registry, _, ids) = setup().await;
        let registry = registry
            .with_code_generator(Arc::new(FixedCodes(vec!["33333333"], AtomicUsize::new(0))));

        registry.create_instant(&ids[0]).await.unwrap();
        let err = registry.create_instant(&ids[0]).await.unwrap_err();
        assert!(matches!(err, RegistryError::Exhausted(MAX_CODE_ATTEMPTS)));
    }

    #[tokio::test]
    async fn test_concurrent_creates_are_unique() {
        let (registry, _, ids) = setup().await;

        let creates = (0..64).map(|_| {
            let registry = registry.clone();
            let host = ids[0].clone();
            tokio::spawn(async move { registry.create_instant(&host).await })
        });
        let rooms: Vec<Room> = join_all(creates)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let unique: HashSet<&str> = rooms.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(unique.len(), rooms.len());
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let (registry, _, _) = setup().await;
        assert!(matches!(
            registry.resolve("99999999").await,
            Err(RegistryError::NotFound(id)) if id == "99999999"
        ));
        assert!(matches!(
            registry.resolve("  ").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_for_user_filters_orders_and_caps() {
        let (registry, _, ids) = setup().await;

        for hours in 1..=12 {
            registry
                .create(scheduled(&ids[0], vec![], Duration::hours(hours)))
                .await
                .unwrap();
            registry
                .create(scheduled(&ids[0], vec![], Duration::hours(-hours)))
                .await
                .unwrap();
        }
        // Not a participant in this one
        registry
            .create(scheduled(&ids[1], vec![], Duration::hours(3)))
            .await
            .unwrap();

        let now = Utc::now();
        let upcoming = registry
            .list_for_user(&ids[0], MeetingCategory::Upcoming)
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 10);
        assert!(upcoming.iter().all(|r| r.window_from > now));
        assert!(upcoming.windows(2).all(|w| w[0].window_from <= w[1].window_from));

        let past = registry
            .list_for_user(&ids[0], MeetingCategory::Past)
            .await
            .unwrap();
        assert_eq!(past.len(), 10);
        assert!(past.iter().all(|r| r.window_from <= Utc::now()));
        assert!(past.windows(2).all(|w| w[0].window_from >= w[1].window_from));
    }

    #[tokio::test]
    async fn test_update_replaces_participants() {
        let (registry, _, ids) = setup().await;
        let room = registry
            .create(scheduled(&ids[0], vec![ids[1].clone()], Duration::hours(1)))
            .await
            .unwrap();

        let updated = registry
            .update(
                &room.room_id,
                RoomUpdate {
                    participant_ids: Some(vec![ids[2].clone()]),
                    title: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let expected: BTreeSet<String> = [ids[0].clone(), ids[2].clone()].into_iter().collect();
        assert_eq!(updated.participant_ids, expected);
        assert_eq!(updated.title, "Renamed");
        assert_eq!(registry.resolve(&room.room_id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_delete() {
        let (registry, _, ids) = setup().await;
        let room = registry.create_instant(&ids[0]).await.unwrap();

        registry.delete(&room.room_id).await.unwrap();
        assert!(matches!(
            registry.resolve(&room.room_id).await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.delete(&room.room_id).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_participant_appends() {
        let (registry, _, ids) = setup().await;
        let room = registry.create_instant(&ids[0]).await.unwrap();

        registry.ensure_participant(&room, &ids[1]).await.unwrap();
        let room = registry.resolve(&room.room_id).await.unwrap();
        assert!(room.is_participant(&ids[1]));
        assert!(room.is_participant(&ids[0]));
    }
}
