pub mod resend;

use crate::error::Result;

/// Outgoing mail (backed by Resend when configured)
#[derive(Clone)]
pub struct Mailer {
    inner: Option<resend::ResendMailer>,
}

impl Mailer {
    /// Create mailer from env (RESEND_API_KEY, MAIL_FROM).
    /// Without an API key, messages are logged and dropped.
    pub fn new_from_env() -> Self {
        let inner = resend::ResendMailer::new_from_env();
        if inner.is_none() {
            tracing::warn!("RESEND_API_KEY not set; outgoing mail is disabled");
        }
        Self { inner }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn send(&self, to: Vec<String>, subject: String, text: String) -> Result<()> {
        match &self.inner {
            Some(mailer) => mailer.send(to, subject, text).await,
            None => {
                tracing::warn!(recipients = to.len(), subject = %subject, "Mail dropped (no provider)");
                Ok(())
            }
        }
    }
}
