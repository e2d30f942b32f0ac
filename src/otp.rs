//! Registration one-time codes.
//!
//! Codes are stored salted and hashed under `otp:{email}:{purpose}` for
//! [`OTP_TTL_SECONDS`] and consumed after a successful registration.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::mail::Mailer;
use crate::models::normalize_email;
use crate::security::{ct_eq, generate_otp_code, generate_salt_hex, hash_secret_sha256_hex};
use crate::store::OtpStore;

pub const OTP_TTL_SECONDS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Registration,
}

impl OtpPurpose {
    fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Registration => "registration",
        }
    }
}

fn otp_key(email: &str, purpose: OtpPurpose) -> String {
    format!("otp:{}:{}", normalize_email(email), purpose.as_str())
}

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn OtpStore>,
    mailer: Arc<Mailer>,
}

impl OtpService {
    pub fn new(store: Arc<dyn OtpStore>, mailer: Arc<Mailer>) -> Self {
        Self { store, mailer }
    }

    /// Store a fresh code and return it. Replaces any earlier code.
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> Result<String> {
        let code = generate_otp_code();
        let salt = generate_salt_hex();
        let record = format!("{}:{}", salt, hash_secret_sha256_hex(&code, &salt));

        self.store
            .put_otp(&otp_key(email, purpose), &record, OTP_TTL_SECONDS)
            .await?;
        Ok(code)
    }

    /// Issue a code and mail it to `email`
    pub async fn request(&self, email: &str, purpose: OtpPurpose) -> Result<()> {
        let code = self.issue(email, purpose).await?;
        self.mailer
            .send(
                vec![normalize_email(email)],
                "Your Verification Code".to_string(),
                format!(
                    "Your verification code is: {}\n\nThis code will expire in {} minutes.",
                    code,
                    OTP_TTL_SECONDS / 60
                ),
            )
            .await?;

        tracing::info!(purpose = purpose.as_str(), "OTP issued");
        Ok(())
    }

    /// Check a code without consuming it
    pub async fn verify(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        let stored = self
            .store
            .get_otp(&otp_key(email, purpose))
            .await?
            .ok_or_else(|| AppError::BadRequest("OTP not found or expired".to_string()))?;

        let (salt, expected) = stored
            .split_once(':')
            .ok_or_else(|| AppError::InternalError("Corrupt OTP record".to_string()))?;

        if !ct_eq(&hash_secret_sha256_hex(code.trim(), salt), expected) {
            return Err(AppError::BadRequest("Invalid OTP".to_string()));
        }
        Ok(())
    }

    pub async fn consume(&self, email: &str, purpose: OtpPurpose) -> Result<()> {
        self.store.delete_otp(&otp_key(email, purpose)).await?;
        Ok(())
    }
}
