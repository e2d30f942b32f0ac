//! Shared harness for HTTP tests: in-memory stores, a counting issuer and
//! seeded accounts.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use quickconnect_backend::api;
use quickconnect_backend::auth::AuthService;
use quickconnect_backend::config::Config;
use quickconnect_backend::credential::{CredentialIssuer, CredentialSigner, IssuedCredential, SignerError};
use quickconnect_backend::mail::Mailer;
use quickconnect_backend::models::{JoinPolicy, Room, User};
use quickconnect_backend::state::AppState;
use quickconnect_backend::store::{RoomStore, Stores, UserStore};

/// Delegates to a real signer and counts calls
pub struct CountingIssuer {
    inner: CredentialSigner,
    calls: AtomicUsize,
}

impl CountingIssuer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialIssuer for CountingIssuer {
    fn issue(
        &self,
        user_id: &str,
        room_id: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<IssuedCredential, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.issue(user_id, room_id, ttl_seconds)
    }

    fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }
}

pub struct TestApp {
    pub config: Config,
    pub state: AppState,
    pub stores: Stores,
    pub issuer: Arc<CountingIssuer>,
    pub host: User,
    pub host_token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::for_tests()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let stores = Stores::in_memory();
        let issuer = Arc::new(CountingIssuer {
            inner: CredentialSigner::from_config(&config),
            calls: AtomicUsize::new(0),
        });
        let state = AppState::new(config.clone(), stores.clone(), issuer.clone(), Mailer::disabled());

        let host = User::new("host@example.com", "Host", "unused".to_string(), true);
        stores.users.insert_user(&host).await.unwrap();
        let host_token = access_token(&config, &host);

        Self {
            config,
            state,
            stores,
            issuer,
            host,
            host_token,
        }
    }

    pub fn router(&self) -> Router {
        api::create_router(self.state.clone())
    }

    /// Add an account and return it with a valid access token
    pub async fn seed_user(&self, email: &str, name: &str) -> (User, String) {
        let user = User::new(email, name, "unused".to_string(), true);
        self.stores.users.insert_user(&user).await.unwrap();
        let token = access_token(&self.config, &user);
        (user, token)
    }

    /// Insert a room with a fixed code hosted by `self.host`
    pub async fn seed_room(&self, room_id: &str, starts_in: Duration, policy: JoinPolicy) -> Room {
        let from = Utc::now() + starts_in;
        let room = Room {
            room_id: room_id.to_string(),
            title: "Weekly sync".to_string(),
            host_id: self.host.id.clone(),
            window_from: from,
            window_to: from + Duration::hours(1),
            participant_ids: [self.host.id.clone()].into_iter().collect(),
            join_policy: policy,
            created_at: Utc::now(),
        };
        assert!(self.stores.rooms.insert_room(&room).await.unwrap());
        room
    }
}

pub fn access_token(config: &Config, user: &User) -> String {
    AuthService::new(config)
        .issue_tokens(&user.id)
        .unwrap()
        .tokens
        .access_token
}

/// Build a request with an optional bearer token and JSON body
pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("Failed to build request"),
        None => builder.body(Body::empty()).expect("Failed to build request"),
    }
}

/// Send through the router and decode the JSON body
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(request)
        .await
        .expect("Failed to execute request");
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
