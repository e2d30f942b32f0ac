use axum::{extract::State, routing::post, Json, Router};
use axum_extra::extract::WithRejection;
use serde::Serialize;

use crate::api::ApiResponse;
use crate::auth::password::{hash_password, verify_password};
use crate::error::{AppError, Result};
use crate::models::{
    normalize_email, AuthResponse, LoginRequest, OtpRequest, RefreshRequest, RegisterRequest,
    TokenPair, User, VerifyOtpRequest,
};
use crate::otp::OtpPurpose;
use crate::security::ct_eq;
use crate::state::AppState;

type JsonBody<T> = WithRejection<Json<T>, AppError>;

/// Auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/request-otp", post(request_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

fn require_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".to_string()));
    }
    Ok(email)
}

/// Issue a token pair and remember its refresh id on the account
async fn start_session(state: &AppState, user: &User) -> Result<TokenPair> {
    let issued = state.auth.issue_tokens(&user.id)?;
    state
        .users
        .set_refresh_token_ref(&user.id, Some(&issued.refresh_jti))
        .await?;
    Ok(issued.tokens)
}

/// POST /api/auth/request-otp
async fn request_otp(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<OtpRequest>,
) -> Result<ApiResponse<()>> {
    let email = require_email(&request.email)?;
    state.otp.request(&email, OtpPurpose::Registration).await?;
    Ok(ApiResponse::ok(()).with_message("OTP sent successfully"))
}

/// POST /api/auth/verify-otp
async fn verify_otp(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<VerifyOtpRequest>,
) -> Result<ApiResponse<()>> {
    let email = require_email(&request.email)?;
    state
        .otp
        .verify(&email, &request.otp, OtpPurpose::Registration)
        .await?;
    Ok(ApiResponse::ok(()).with_message("OTP verified successfully"))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<RegisterRequest>,
) -> Result<ApiResponse<AuthResponse>> {
    let email = require_email(&request.email)?;
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    state
        .otp
        .verify(&email, &request.otp, OtpPurpose::Registration)
        .await?;

    // insert_user re-checks atomically
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let cost = state.config.bcrypt_cost;
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::InternalError(format!("Hashing task failed: {}", e)))??;

    let user = User::new(&email, name, password_hash, true);
    state.users.insert_user(&user).await?;
    state.otp.consume(&email, OtpPurpose::Registration).await?;

    let tokens = start_session(&state, &user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok(ApiResponse::created(AuthResponse {
        user: user.profile(),
        tokens,
    })
    .with_message("User registered successfully"))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<LoginRequest>,
) -> Result<ApiResponse<AuthResponse>> {
    let email = normalize_email(&request.email);
    let invalid = || AppError::Unauthenticated("Invalid email or password".to_string());

    let user = state.users.find_by_email(&email).await?.ok_or_else(invalid)?;

    let password = request.password;
    let hash = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::InternalError(format!("Hashing task failed: {}", e)))?;
    if !matches {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(invalid());
    }

    if !user.email_verified {
        return Err(AppError::Forbidden(
            "Please verify your email before logging in".to_string(),
        ));
    }

    let tokens = start_session(&state, &user).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::ok(AuthResponse {
        user: user.profile(),
        tokens,
    }))
}

/// POST /api/auth/refresh-token
///
/// Rotates the pair. A refresh token is accepted once; its id must match
/// the one remembered on the account.
async fn refresh_token(
    State(state): State<AppState>,
    WithRejection(Json(request), _): JsonBody<RefreshRequest>,
) -> Result<ApiResponse<RefreshResponse>> {
    let claims = state.auth.validate_refresh(&request.refresh_token)?;
    let rejected = || AppError::Unauthenticated("Invalid refresh token".to_string());

    let user = state.users.get_user(&claims.sub).await?.ok_or_else(rejected)?;

    let presented = claims.jti.as_deref().unwrap_or_default();
    let stored = user.refresh_token_ref.as_deref().unwrap_or_default();
    if presented.is_empty() || !ct_eq(presented, stored) {
        tracing::warn!(user_id = %user.id, "Refresh token reuse or mismatch");
        return Err(rejected());
    }

    let tokens = start_session(&state, &user).await?;
    Ok(ApiResponse::ok(RefreshResponse { tokens }))
}
