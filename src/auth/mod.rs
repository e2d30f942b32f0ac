pub mod extract;
pub mod password;

pub use extract::AuthUser;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Claims, TokenPair, TokenType};

/// Issued access/refresh pair plus the refresh token id to remember
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub tokens: TokenPair,
    pub refresh_jti: String,
}

/// JWT Authentication Service
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
    refresh_expiry_seconds: u64,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expiry_seconds: config.jwt_expiry_seconds,
            refresh_expiry_seconds: config.refresh_expiry_seconds,
        }
    }

    fn sign(&self, user_id: &str, token_type: TokenType, ttl: u64, jti: Option<String>) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            token_type,
            jti,
            iat: now,
            exp: now + ttl as i64,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Generate an access/refresh pair for a user
    pub fn issue_tokens(&self, user_id: &str) -> Result<IssuedTokens> {
        let refresh_jti = uuid::Uuid::new_v4().to_string();
        let access_token = self.sign(user_id, TokenType::Access, self.expiry_seconds, None)?;
        let refresh_token = self.sign(
            user_id,
            TokenType::Refresh,
            self.refresh_expiry_seconds,
            Some(refresh_jti.clone()),
        )?;

        Ok(IssuedTokens {
            tokens: TokenPair {
                access_token,
                refresh_token,
                expires_in: self.expiry_seconds,
            },
            refresh_jti,
        })
    }

    fn validate(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthenticated(format!("Invalid token: {}", e)))?;

        if token_data.claims.token_type != expected {
            return Err(AppError::Unauthenticated("Wrong token type".to_string()));
        }
        Ok(token_data.claims)
    }

    /// Validate a bearer access token and return the claims
    pub fn validate_access(&self, token: &str) -> Result<Claims> {
        self.validate(token, TokenType::Access)
    }

    /// Validate a refresh token; callers still compare its `jti` with the stored ref
    pub fn validate_refresh(&self, token: &str) -> Result<Claims> {
        self.validate(token, TokenType::Refresh)
    }
}
