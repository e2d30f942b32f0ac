use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::credential::SignerError;
use crate::registry::RegistryError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown participant ids: {}", .0.join(", "))]
    InvalidParticipant(Vec<String>),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not allocate a unique room code after {0} attempts")]
    RegistryExhausted(u32),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::RoomNotFound(_) => (StatusCode::NOT_FOUND, "Meeting not found".to_string()),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidParticipant(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Configuration(msg) => {
                tracing::error!(error = %msg, "Server configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                )
            }
            AppError::RegistryExhausted(attempts) => {
                tracing::error!(attempts = attempts, "Room code space exhausted");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Store(msg) | AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail(_) => {
                AppError::Conflict("User with this email already exists".to_string())
            }
            other => AppError::Store(other.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(room_id) => AppError::RoomNotFound(room_id),
            RegistryError::InvalidParticipant(ids) => AppError::InvalidParticipant(ids),
            RegistryError::Exhausted(attempts) => AppError::RegistryExhausted(attempts),
            RegistryError::InvalidInput(msg) => AppError::BadRequest(msg),
            RegistryError::Store(e) => AppError::Store(e.to_string()),
        }
    }
}

impl From<SignerError> for AppError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Configuration(msg) => AppError::Configuration(msg),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthenticated(format!("Invalid token: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::InternalError(format!("Password hashing failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::RoomNotFound("1".into()), StatusCode::NOT_FOUND),
            (AppError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::InvalidParticipant(vec!["u9".into()]), StatusCode::BAD_REQUEST),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::Configuration("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::RegistryExhausted(5), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_registry_errors_map_to_taxonomy() {
        let err: AppError = RegistryError::NotFound("12345678".into()).into();
        assert!(matches!(err, AppError::RoomNotFound(id) if id == "12345678"));

        let err: AppError = RegistryError::Exhausted(5).into();
        assert!(matches!(err, AppError::RegistryExhausted(5)));

        let err: AppError = StoreError::DuplicateEmail("a@b.c".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
