use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::client::ClientError;
use crate::models::JoinDescriptor;

/// Every call gives up after this long and surfaces [`ClientError::Timeout`]
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Server calls made by a join session
#[async_trait]
pub trait JoinApi: Send + Sync {
    /// Fetch a join credential for a normalized room key
    async fn fetch_credential(&self, room_key: &str) -> Result<JoinDescriptor, ClientError>;

    /// Drop the caller's presence in a room
    async fn leave_room(&self, room_key: &str) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`JoinApi`] over HTTP with bearer auth
pub struct HttpJoinApi {
    client: reqwest::Client,
    base_url: String,
    access_token: RwLock<Option<String>>,
}

impl HttpJoinApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: RwLock::new(None),
        })
    }

    /// Replace the access token used for subsequent calls
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    fn bearer(&self) -> Result<String, ClientError> {
        self.access_token
            .read()
            .clone()
            .ok_or(ClientError::Unauthenticated)
    }

    async fn error_from(response: reqwest::Response, room_key: &str) -> ClientError {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ClientError::Unauthenticated,
            StatusCode::NOT_FOUND => ClientError::RoomNotFound(room_key.to_string()),
            _ => ClientError::Server {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl JoinApi for HttpJoinApi {
    async fn fetch_credential(&self, room_key: &str) -> Result<JoinDescriptor, ClientError> {
        let token = self.bearer()?;
        let response = self
            .client
            .get(format!("{}/api/zego/token/{}", self.base_url, room_key))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, room_key).await);
        }

        let envelope: Envelope<JoinDescriptor> = response.json().await?;
        Ok(envelope.data)
    }

    async fn leave_room(&self, room_key: &str) -> Result<(), ClientError> {
        let token = self.bearer()?;
        let response = self
            .client
            .post(format!("{}/api/zego/room/{}/leave", self.base_url, room_key))
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, room_key).await);
        }
        Ok(())
    }
}
