//! Client-side join session.
//!
//! Sequences a join from the app's point of view:
//!
//! ```text
//! Idle -> PermissionPending -> PermissionGranted -> CredentialFetching -> CredentialReady -> Attached -> Left
//!                          \-> PermissionDenied                      \-> CredentialError
//! ```
//!
//! The controller in [`session`] owns the state. Network and device access go
//! through the [`JoinApi`] and [`DevicePermissions`] seams so the flow can be
//! driven without a device or a live server.

pub mod permissions;
pub mod session;
pub mod transport;

pub use permissions::{Capability, DevicePermissions, GrantAll, PermissionOutcome, PlatformProfile};
pub use session::{JoinStatus, SessionController, SessionProps};
pub use transport::{HttpJoinApi, JoinApi, REQUEST_TIMEOUT};

use std::fmt::Display;

/// Where a client session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    PermissionPending,
    PermissionGranted,
    PermissionDenied,
    CredentialFetching,
    CredentialReady,
    CredentialError,
    Attached,
    Left,
}

impl SessionState {
    /// A permission prompt or credential fetch is outstanding
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SessionState::PermissionPending
                | SessionState::PermissionGranted
                | SessionState::CredentialFetching
        )
    }

    /// A credential is held for the current room
    pub fn holds_credential(&self) -> bool {
        matches!(self, SessionState::CredentialReady | SessionState::Attached)
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            SessionState::Idle => "Idle",
            SessionState::PermissionPending => "PermissionPending",
            SessionState::PermissionGranted => "PermissionGranted",
            SessionState::PermissionDenied => "PermissionDenied",
            SessionState::CredentialFetching => "CredentialFetching",
            SessionState::CredentialReady => "CredentialReady",
            SessionState::CredentialError => "CredentialError",
            SessionState::Attached => "Attached",
            SessionState::Left => "Left",
        };
        write!(f, "{state}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Room id is required")]
    MissingRoomId,

    #[error("Device permissions denied: {0:?}")]
    PermissionDenied(Vec<Capability>),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },
}

impl ClientError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ClientError::MissingRoomId => "Please enter a meeting code".to_string(),
            ClientError::PermissionDenied(_) => {
                "Camera and microphone access is needed to join. Enable it in settings and try again."
                    .to_string()
            }
            ClientError::Unauthenticated => "Your session has expired. Please log in again.".to_string(),
            ClientError::RoomNotFound(_) => "Meeting not found. Check the code and try again.".to_string(),
            ClientError::Network(_) | ClientError::Timeout => {
                "Network problem while joining. Check your connection and retry.".to_string()
            }
            ClientError::Server { .. } => "Failed to join meeting".to_string(),
            ClientError::InvalidState { .. } => "Please wait, the meeting is still loading".to_string(),
        }
    }

    /// Whether a manual retry can succeed without re-login
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ClientError::Unauthenticated | ClientError::MissingRoomId)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(err.to_string())
        }
    }
}
