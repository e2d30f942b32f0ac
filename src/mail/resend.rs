use std::time::Duration;

use crate::error::{AppError, Result};
use reqwest::Client;
use serde::Serialize;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new_from_env() -> Option<Self> {
        let api_key = std::env::var("RESEND_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;

        let from = std::env::var("MAIL_FROM")
            .unwrap_or_else(|_| "QuickConnect <onboarding@resend.dev>".to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Some(Self {
            client,
            api_key,
            from,
        })
    }

    pub async fn send(&self, to: Vec<String>, subject: String, text: String) -> Result<()> {
        #[derive(Serialize)]
        struct Payload {
            from: String,
            to: Vec<String>,
            subject: String,
            text: String,
        }

        let payload = Payload {
            from: self.from.clone(),
            to,
            subject,
            text,
        };

        let res = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::InternalError(format!("Mail send failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AppError::InternalError(format!(
                "Resend API error {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
