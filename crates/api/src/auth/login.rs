//! Password login
//!
//! Unknown email and wrong password produce the same error. A password check
//! still runs for unknown emails so both paths cost roughly the same.

use std::sync::Arc;
use std::sync::OnceLock;

use super::jwt::JwtManager;
use super::password;
use crate::error::{ApiError, ApiResult};
use crate::identity::{normalize_email, Identity, IdentityRepository};

/// Successful login: bearer token plus the identity it was issued for
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub identity: Identity,
}

/// Hash verified against when the email is unknown
fn decoy_hash() -> &'static str {
    static DECOY: OnceLock<String> = OnceLock::new();
    DECOY.get_or_init(|| {
        password::hash_password_blocking("decoy-password-never-matches").unwrap_or_default()
    })
}

#[derive(Clone)]
pub struct CredentialAuthenticator {
    identities: Arc<dyn IdentityRepository>,
    jwt_manager: JwtManager,
}

impl CredentialAuthenticator {
    pub fn new(identities: Arc<dyn IdentityRepository>, jwt_manager: JwtManager) -> Self {
        Self {
            identities,
            jwt_manager,
        }
    }

    pub async fn login(&self, email: &str, password_input: &str) -> ApiResult<LoginOutcome> {
        let email = normalize_email(email);
        if email.is_empty() || password_input.trim().is_empty() {
            return Err(ApiError::Validation("All fields required".into()));
        }

        let identity = self.identities.find_by_email(&email).await?;
        let stored = match &identity {
            Some(identity) => identity.password_hash.clone(),
            None => tokio::task::spawn_blocking(|| decoy_hash().to_string())
                .await
                .map_err(password::PasswordError::from)?,
        };

        let matches = password::verify_password(password_input, &stored).await?;
        let identity = match identity {
            Some(identity) if matches => identity,
            _ => {
                tracing::info!(email = %email, "Login failed");
                return Err(ApiError::InvalidCredentials);
            }
        };

        let token = self.jwt_manager.generate_token(&identity)?;
        tracing::info!(user_id = %identity.id, role = %identity.role, "Login successful");
        Ok(LoginOutcome { token, identity })
    }
}
