//! Email-verified registration
//!
//! Two steps per email: request a one-time code, then redeem it together
//! with name and password. Existence is checked at both steps for a clear
//! error, but the identity store's uniqueness constraint is what decides
//! conflicts. Registration does not log the user in.

use std::sync::Arc;

use super::challenge::ChallengeStore;
use super::password;
use crate::email::OtpMailer;
use crate::error::{ApiError, ApiResult};
use crate::identity::{normalize_email, Identity, IdentityRepository, NewIdentity};

#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub otp: String,
}

#[derive(Clone)]
pub struct RegistrationService {
    challenges: ChallengeStore,
    identities: Arc<dyn IdentityRepository>,
    mailer: Arc<dyn OtpMailer>,
}

impl RegistrationService {
    pub fn new(
        challenges: ChallengeStore,
        identities: Arc<dyn IdentityRepository>,
        mailer: Arc<dyn OtpMailer>,
    ) -> Self {
        Self {
            challenges,
            identities,
            mailer,
        }
    }

    /// Issue a code for `email` and hand it to the mailer.
    pub async fn request_challenge(&self, email: &str) -> ApiResult<()> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ApiError::Validation("Email required".into()));
        }

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(ApiError::Conflict);
        }

        let code = self.challenges.issue(&email).await?;
        self.mailer.send_otp(&email, &code).await.map_err(|e| {
            tracing::error!(email = %email, error = %e, "Failed to dispatch OTP");
            ApiError::Dispatch(e)
        })?;

        tracing::info!(email = %email, "Registration OTP issued");
        Ok(())
    }

    /// Redeem a code and create the identity with role `User`.
    pub async fn complete_registration(&self, request: RegistrationRequest) -> ApiResult<Identity> {
        let email = normalize_email(&request.email);
        let name = request.name.trim();
        if name.is_empty()
            || email.is_empty()
            || request.password.trim().is_empty()
            || request.otp.trim().is_empty()
        {
            return Err(ApiError::Validation("All fields required".into()));
        }

        if !self.challenges.verify(&email, &request.otp).await? {
            tracing::debug!(email = %email, "Rejected registration with invalid or expired OTP");
            return Err(ApiError::InvalidOtp);
        }

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(ApiError::Conflict);
        }

        let password_hash = password::hash_password(&request.password).await?;
        let identity = self
            .identities
            .create(NewIdentity {
                email: email.clone(),
                name: name.to_string(),
                password_hash,
            })
            .await?;

        self.challenges.clear(&email).await?;

        tracing::info!(user_id = %identity.id, email = %email, "Identity registered");
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::RecordingMailer;
    use crate::identity::{IdentityError, InMemoryIdentityRepository, Role};
    use async_trait::async_trait;
    use uuid::Uuid;

    struct Fixture {
        service: RegistrationService,
        identities: Arc<InMemoryIdentityRepository>,
        mailer: RecordingMailer,
    }

    fn fixture() -> Fixture {
        let identities = Arc::new(InMemoryIdentityRepository::new());
        let mailer = RecordingMailer::new();
        let service = RegistrationService::new(
            ChallengeStore::in_memory(),
            identities.clone(),
            Arc::new(mailer.clone()),
        );
        Fixture {
            service,
            identities,
            mailer,
        }
    }

    fn request(email: &str, otp: &str) -> RegistrationRequest {
        RegistrationRequest {
            name: "Ann".into(),
            email: email.into(),
            password: "Passw0rd!".into(),
            otp: otp.into(),
        }
    }

    #[tokio::test]
    async fn test_register_happy_path() {
        let f = fixture();
        f.service.request_challenge("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").await.unwrap();

        let identity = f
            .service
            .complete_registration(request("a@x.com", &code))
            .await
            .unwrap();

        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.email, "a@x.com");
        assert!(identity.password_hash.starts_with("$argon2"));
        assert_ne!(identity.password_hash, "Passw0rd!");
        assert!(password::verify_password_blocking("Passw0rd!", &identity.password_hash));
    }

    #[tokio::test]
    async fn test_code_cannot_be_reused() {
        let f = fixture();
        f.service.request_challenge("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").await.unwrap();
        f.service
            .complete_registration(request("a@x.com", &code))
            .await
            .unwrap();

        let err = f
            .service
            .complete_registration(request("a@x.com", &code))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOtp));
    }

    #[tokio::test]
    async fn test_missing_email_rejected() {
        let f = fixture();
        let err = f.service.request_challenge("   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(f.mailer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_existing_user_cannot_request_code() {
        let f = fixture();
        f.service.request_challenge("b@x.com").await.unwrap();
        let code = f.mailer.last_code_for("b@x.com").await.unwrap();
        f.service
            .complete_registration(request("b@x.com", &code))
            .await
            .unwrap();

        let err = f.service.request_challenge("B@x.com").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict));
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let f = fixture();
        let mut req = request("a@x.com", "123456");
        req.password = "  ".into();
        assert!(matches!(
            f.service.complete_registration(req).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            f.service.complete_registration(request("a@x.com", "")).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_code_rejected_and_retry_allowed() {
        let f = fixture();
        f.service.request_challenge("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            f.service.complete_registration(request("a@x.com", wrong)).await,
            Err(ApiError::InvalidOtp)
        ));
        f.service
            .complete_registration(request("a@x.com", &code))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_padded_code_rejected() {
        let f = fixture();
        f.service.request_challenge("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").await.unwrap();

        assert!(matches!(
            f.service
                .complete_registration(request("a@x.com", &format!(" {}\n", code)))
                .await,
            Err(ApiError::InvalidOtp)
        ));
        assert_eq!(f.identities.len().await, 0);

        f.service
            .complete_registration(request("a@x.com", &code))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_code_rejected() {
        let f = fixture();
        f.service.request_challenge("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").await.unwrap();

        tokio::time::advance(std::time::Duration::from_secs(5 * 60 + 1)).await;

        assert!(matches!(
            f.service.complete_registration(request("a@x.com", &code)).await,
            Err(ApiError::InvalidOtp)
        ));
        assert_eq!(f.identities.len().await, 0);
    }

    #[tokio::test]
    async fn test_identity_created_after_challenge_is_conflict() {
        let f = fixture();
        f.service.request_challenge("a@x.com").await.unwrap();
        let code = f.mailer.last_code_for("a@x.com").await.unwrap();

        // Someone signs in with Google between the two steps
        f.identities
            .create(NewIdentity {
                email: "a@x.com".into(),
                name: "Other".into(),
                password_hash: password::generate_impossible_hash(),
            })
            .await
            .unwrap();

        assert!(matches!(
            f.service.complete_registration(request("a@x.com", &code)).await,
            Err(ApiError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_dispatch_failure_surfaced() {
        let service = RegistrationService::new(
            ChallengeStore::in_memory(),
            Arc::new(InMemoryIdentityRepository::new()),
            Arc::new(RecordingMailer::failing()),
        );
        assert!(matches!(
            service.request_challenge("a@x.com").await,
            Err(ApiError::Dispatch(_))
        ));
    }

    /// Store whose lookups never see anything, so only the insert can detect duplicates
    struct BlindLookupRepository(InMemoryIdentityRepository);

    #[async_trait]
    impl IdentityRepository for BlindLookupRepository {
        async fn find_by_email(&self, _email: &str) -> Result<Option<Identity>, IdentityError> {
            Ok(None)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, IdentityError> {
            self.0.find_by_id(id).await
        }

        async fn create(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
            self.0.create(new).await
        }
    }

    #[tokio::test]
    async fn test_unique_violation_after_passing_precheck_is_conflict() {
        let mailer = RecordingMailer::new();
        let challenges = ChallengeStore::in_memory();
        let service = RegistrationService::new(
            challenges.clone(),
            Arc::new(BlindLookupRepository(InMemoryIdentityRepository::new())),
            Arc::new(mailer.clone()),
        );

        service.request_challenge("race@x.com").await.unwrap();
        let code = mailer.last_code_for("race@x.com").await.unwrap();
        service
            .complete_registration(request("race@x.com", &code))
            .await
            .unwrap();

        // Pre-check passes again, insert must still fail
        service.request_challenge("race@x.com").await.unwrap();
        let code = mailer.last_code_for("race@x.com").await.unwrap();
        let err = service
            .complete_registration(request("race@x.com", &code))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict));
        // Challenge stays until a successful registration
        assert!(challenges.verify("race@x.com", &code).await.unwrap());
    }
}
