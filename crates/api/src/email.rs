//! One-time code delivery
//!
//! Dispatch is a collaborator: the registration flow hands over the code and
//! surfaces any failure to the caller without retrying.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::Mutex;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(String),
    #[error("Mail provider rejected message with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait OtpMailer: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), MailError>;
}

/// Delivers codes through the Resend HTTP API
#[derive(Clone)]
pub struct ResendMailer {
    http_client: Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendMailer {
    pub fn new(http_client: Client, api_key: String, from: String) -> Self {
        Self::with_endpoint(http_client, api_key, from, RESEND_API_URL.to_string())
    }

    pub fn with_endpoint(http_client: Client, api_key: String, from: String, endpoint: String) -> Self {
        Self {
            http_client,
            api_key,
            from,
            endpoint,
        }
    }
}

fn otp_html(code: &str) -> String {
    format!(
        r#"<div style="font-family: Arial; padding: 20px">
  <h2>Verify your email</h2>
  <p>Your OTP is:</p>
  <h1 style="letter-spacing:4px">{}</h1>
  <p>This OTP is valid for 5 minutes.</p>
</div>"#,
        code
    )
}

#[async_trait]
impl OtpMailer for ResendMailer {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), MailError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [email],
                "subject": "Your OTP Code",
                "html": otp_html(code),
            }))
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "OTP email rejected by provider");
            return Err(MailError::Rejected(status.as_u16()));
        }

        tracing::info!(email = %email, "OTP email sent");
        Ok(())
    }
}

/// Local development mailer: writes the code to the debug log instead of sending it
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl OtpMailer for LogMailer {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), MailError> {
        tracing::debug!(email = %email, code = %code, "OTP email send stub");
        Ok(())
    }
}

/// Keeps every dispatched code in memory. Used by tests to read back codes.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every dispatch fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl OtpMailer for RecordingMailer {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Transport("recording mailer set to fail".into()));
        }
        self.sent
            .lock()
            .await
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}
