//! Join credential issuance.
//!
//! A credential binds `{app_id, user_id, room_id, ctime, expire, nonce}` under an
//! HMAC-SHA256 signature keyed with the server secret. The opaque token is the
//! base64 encoding of the JSON payload with its hex signature appended as a field.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::{Config, CredentialMode};
use crate::models::JoinCredential;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("{0}")]
    Configuration(String),
    #[error("Malformed token: {0}")]
    Malformed(String),
    #[error("Token signature mismatch")]
    BadSignature,
    #[error("Token expired")]
    Expired,
    #[error("Token is not valid for room {0}")]
    WrongRoom(String),
}

/// Signed portion of a token. Field order is the canonical serialization order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    pub app_id: u32,
    pub user_id: String,
    pub room_id: Option<String>,
    pub ctime: i64,
    pub expire: i64,
    pub nonce: u32,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SignedToken {
    #[serde(flatten)]
    payload: TokenPayload,
    signature: String,
}

/// A freshly minted credential
#[derive(Debug, Clone)]
pub struct Credential {
    pub app_id: u32,
    pub token: String,
    pub user_id: String,
    pub room_id: Option<String>,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// HMAC token signer
#[derive(Clone)]
pub struct CredentialSigner {
    app_id: Option<u32>,
    secret: Option<String>,
}

impl CredentialSigner {
    pub fn new(app_id: Option<u32>, secret: Option<String>) -> Self {
        Self { app_id, secret }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.zego_app_id, config.zego_server_secret.clone())
    }

    fn keyed(&self) -> Result<(u32, HmacSha256), SignerError> {
        let app_id = self
            .app_id
            .ok_or_else(|| SignerError::Configuration("ZEGO_APP_ID not configured".to_string()))?;
        let secret = self.secret.as_deref().ok_or_else(|| {
            SignerError::Configuration("ZEGO_SERVER_SECRET not configured".to_string())
        })?;
        let key = hex::decode(secret).map_err(|_| {
            SignerError::Configuration("ZEGO_SERVER_SECRET must be hex encoded".to_string())
        })?;
        let mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| SignerError::Configuration(format!("Invalid signing key: {}", e)))?;
        Ok((app_id, mac))
    }

    /// Mint a credential for `user_id`, optionally bound to `room_id`.
    pub fn mint(
        &self,
        user_id: &str,
        room_id: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<Credential, SignerError> {
        if ttl_seconds == 0 {
            return Err(SignerError::Configuration(
                "credential ttl must be positive".to_string(),
            ));
        }
        let (app_id, mut mac) = self.keyed()?;

        let now = Utc::now().timestamp();
        let expire = i64::try_from(ttl_seconds)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| {
                SignerError::Configuration(format!("credential ttl {} is out of range", ttl_seconds))
            })?;
        let payload = TokenPayload {
            app_id,
            user_id: user_id.to_string(),
            room_id: room_id.map(str::to_string),
            ctime: now,
            expire,
            nonce: rand::rng().random_range(0..i32::MAX as u32),
            payload: String::new(),
        };

        let canonical = serde_json::to_vec(&payload)
            .map_err(|e| SignerError::Malformed(e.to_string()))?;
        mac.update(&canonical);
        let signature = hex::encode(mac.finalize().into_bytes());

        let signed = SignedToken {
            payload: payload.clone(),
            signature,
        };
        let json =
            serde_json::to_vec(&signed).map_err(|e| SignerError::Malformed(e.to_string()))?;

        Ok(Credential {
            app_id,
            token: STANDARD.encode(json),
            user_id: payload.user_id,
            room_id: payload.room_id,
            issued_at: payload.ctime,
            expires_at: payload.expire,
        })
    }

    /// Decode a token without checking its signature.
    pub fn decode(token: &str) -> Result<TokenPayload, SignerError> {
        Ok(Self::decode_signed(token)?.payload)
    }

    fn decode_signed(token: &str) -> Result<SignedToken, SignerError> {
        let raw = STANDARD
            .decode(token.trim())
            .map_err(|e| SignerError::Malformed(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| SignerError::Malformed(e.to_string()))
    }

    /// Check signature and expiry, returning the payload.
    pub fn verify(&self, token: &str, now: i64) -> Result<TokenPayload, SignerError> {
        let (_, mut mac) = self.keyed()?;
        let signed = Self::decode_signed(token)?;

        let signature =
            hex::decode(&signed.signature).map_err(|_| SignerError::BadSignature)?;
        let canonical = serde_json::to_vec(&signed.payload)
            .map_err(|e| SignerError::Malformed(e.to_string()))?;
        mac.update(&canonical);
        mac.verify_slice(&signature)
            .map_err(|_| SignerError::BadSignature)?;

        if signed.payload.expire <= now {
            return Err(SignerError::Expired);
        }
        Ok(signed.payload)
    }

    /// Like [`verify`](Self::verify), additionally requiring a binding to `room_id`.
    /// Room-less credentials are never valid for a specific room.
    pub fn verify_for_room(
        &self,
        token: &str,
        room_id: &str,
        now: i64,
    ) -> Result<TokenPayload, SignerError> {
        let payload = self.verify(token, now)?;
        match payload.room_id.as_deref() {
            Some(bound) if bound == room_id => Ok(payload),
            _ => Err(SignerError::WrongRoom(room_id.to_string())),
        }
    }
}

/// Output of a [`CredentialIssuer`]
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub app_id: u32,
    pub credential: JoinCredential,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Seam between the join coordinator and the credential mechanism
pub trait CredentialIssuer: Send + Sync {
    fn issue(
        &self,
        user_id: &str,
        room_id: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<IssuedCredential, SignerError>;

    fn is_configured(&self) -> bool;
}

impl CredentialIssuer for CredentialSigner {
    fn issue(
        &self,
        user_id: &str,
        room_id: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<IssuedCredential, SignerError> {
        let credential = self.mint(user_id, room_id, ttl_seconds)?;
        Ok(IssuedCredential {
            app_id: credential.app_id,
            expires_at: Utc.timestamp_opt(credential.expires_at, 0).single(),
            credential: JoinCredential::TokenBased {
                token: credential.token,
            },
        })
    }

    fn is_configured(&self) -> bool {
        self.keyed().is_ok()
    }
}

/// Hands out the static app sign; the engine authenticates with it directly.
#[derive(Clone)]
pub struct AppSignIssuer {
    app_id: Option<u32>,
    app_sign: Option<String>,
}

impl AppSignIssuer {
    pub fn new(app_id: Option<u32>, app_sign: Option<String>) -> Self {
        Self { app_id, app_sign }
    }
}

impl CredentialIssuer for AppSignIssuer {
    fn issue(
        &self,
        _user_id: &str,
        _room_id: Option<&str>,
        _ttl_seconds: u64,
    ) -> Result<IssuedCredential, SignerError> {
        match (self.app_id, self.app_sign.as_ref()) {
            (Some(app_id), Some(app_sign)) => Ok(IssuedCredential {
                app_id,
                credential: JoinCredential::SignBased {
                    app_sign: app_sign.clone(),
                },
                expires_at: None,
            }),
            _ => Err(SignerError::Configuration(
                "ZEGO_APP_ID or ZEGO_APP_SIGN not configured".to_string(),
            )),
        }
    }

    fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.app_sign.is_some()
    }
}

/// Build the issuer selected by `ZEGO_CREDENTIAL_MODE`
pub fn issuer_from_config(config: &Config) -> Arc<dyn CredentialIssuer> {
    match config.credential_mode {
        CredentialMode::Token => Arc::new(CredentialSigner::from_config(config)),
        CredentialMode::Sign => Arc::new(AppSignIssuer::new(
            config.zego_app_id,
            config.zego_app_sign.clone(),
        )),
    }
}
