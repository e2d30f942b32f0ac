//! Join coordinator.
//!
//! Turns an authenticated join request into a join descriptor:
//!
//! 1. AuthCheck: done by the [`AuthUser`](crate::auth::AuthUser) extractor; here
//!    the caller's account is loaded for its display name.
//! 2. RoomResolve: look up the room by code, or create an instant room.
//! 3. CredentialMint: ask the configured issuer for a fresh credential.
//! 4. Respond: build the descriptor and record presence.
//!
//! Every call mints a new credential; two joins never share a token.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::credential::CredentialIssuer;
use crate::error::{AppError, Result};
use crate::models::{JoinDescriptor, Room, User};
use crate::presence::PresenceStore;
use crate::registry::RoomRegistry;
use crate::store::UserStore;

/// What the caller wants to join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    /// Join by room code
    Existing(String),
    /// Create a room with the caller as host, then join it
    Instant,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: Room,
    pub descriptor: JoinDescriptor,
}

pub struct JoinCoordinator {
    registry: Arc<RoomRegistry>,
    users: Arc<dyn UserStore>,
    issuer: Arc<dyn CredentialIssuer>,
    presence: Arc<PresenceStore>,
    ttl_seconds: u64,
    join_grace: Duration,
}

impl JoinCoordinator {
    pub fn new(
        registry: Arc<RoomRegistry>,
        users: Arc<dyn UserStore>,
        issuer: Arc<dyn CredentialIssuer>,
        presence: Arc<PresenceStore>,
        ttl_seconds: u64,
        join_grace: Duration,
    ) -> Self {
        Self {
            registry,
            users,
            issuer,
            presence,
            ttl_seconds,
            join_grace,
        }
    }

    pub fn issuer_configured(&self) -> bool {
        self.issuer.is_configured()
    }

    async fn caller(&self, user_id: &str) -> Result<User> {
        self.users.get_user(user_id).await?.ok_or_else(|| {
            warn!(user_id = %user_id, "Bearer token for unknown account");
            AppError::Unauthenticated("Account no longer exists".to_string())
        })
    }

    #[instrument(skip(self))]
    pub async fn join(&self, user_id: &str, target: JoinTarget) -> Result<JoinOutcome> {
        let caller = self.caller(user_id).await?;

        let room = match &target {
            JoinTarget::Existing(code) => {
                let room = self.registry.resolve(code).await?;
                if !room.is_joinable_at(Utc::now(), self.join_grace) {
                    debug!(room_id = %room.room_id, "Join outside scheduled window");
                    return Err(AppError::Forbidden(
                        "Meeting is not open for joining".to_string(),
                    ));
                }
                room
            }
            JoinTarget::Instant => {
                if !self.issuer.is_configured() {
                    return Err(AppError::Configuration(
                        "credential issuer is not configured".to_string(),
                    ));
                }
                self.registry.create_instant(&caller.id).await?
            }
        };

        let issued = match self
            .issuer
            .issue(&caller.id, Some(&room.room_id), self.ttl_seconds)
        {
            Ok(issued) => issued,
            Err(e) => {
                if target == JoinTarget::Instant {
                    self.discard_instant(&room).await;
                }
                return Err(e.into());
            }
        };

        self.registry.ensure_participant(&room, &caller.id).await?;
        self.presence
            .record(&room.room_id, &caller.id, &caller.display_name);

        info!(room_id = %room.room_id, instant = matches!(target, JoinTarget::Instant), "Join credential issued");

        let descriptor = JoinDescriptor {
            app_id: issued.app_id,
            credential: issued.credential,
            room_id: Some(room.room_id.clone()),
            user_id: caller.id,
            user_name: caller.display_name,
            expires_at: issued.expires_at,
        };

        Ok(JoinOutcome { room, descriptor })
    }

    /// An instant room nobody could join is removed again
    async fn discard_instant(&self, room: &Room) {
        if let Err(e) = self.registry.delete(&room.room_id).await {
            warn!(room_id = %room.room_id, error = %e, "Failed to remove unjoinable instant room");
        }
    }

    /// Room-less descriptor for engine initialisation. Not valid for any room.
    #[instrument(skip(self))]
    pub async fn engine_config(&self, user_id: &str) -> Result<JoinDescriptor> {
        let caller = self.caller(user_id).await?;
        let issued = self.issuer.issue(&caller.id, None, self.ttl_seconds)?;

        Ok(JoinDescriptor {
            app_id: issued.app_id,
            credential: issued.credential,
            room_id: None,
            user_id: caller.id,
            user_name: caller.display_name,
            expires_at: issued.expires_at,
        })
    }
}
