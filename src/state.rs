use std::sync::Arc;

use chrono::Duration;

use crate::auth::AuthService;
use crate::config::Config;
use crate::coordinator::JoinCoordinator;
use crate::credential::CredentialIssuer;
use crate::mail::Mailer;
use crate::otp::OtpService;
use crate::presence::PresenceStore;
use crate::registry::RoomRegistry;
use crate::store::{Stores, UserStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub users: Arc<dyn UserStore>,
    pub registry: Arc<RoomRegistry>,
    pub coordinator: Arc<JoinCoordinator>,
    pub presence: Arc<PresenceStore>,
    pub otp: Arc<OtpService>,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Stores,
        issuer: Arc<dyn CredentialIssuer>,
        mailer: Mailer,
    ) -> Self {
        let registry = Arc::new(RoomRegistry::new(
            stores.rooms,
            stores.users.clone(),
            config.meetings_page_size,
            seconds(config.instant_meeting_seconds),
        ));
        let presence = Arc::new(PresenceStore::new(seconds(config.presence_ttl_seconds)));
        let coordinator = Arc::new(JoinCoordinator::new(
            registry.clone(),
            stores.users.clone(),
            issuer,
            presence.clone(),
            config.credential_ttl_seconds,
            seconds(config.join_grace_seconds),
        ));
        let otp = Arc::new(OtpService::new(stores.otps, Arc::new(mailer)));

        Self {
            auth: Arc::new(AuthService::new(&config)),
            config: Arc::new(config),
            users: stores.users,
            registry,
            coordinator,
            presence,
            otp,
        }
    }
}

fn seconds(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).unwrap_or(i64::MAX / 1000))
}
