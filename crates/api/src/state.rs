//! Application state

use std::sync::Arc;

use crate::{
    auth::{
        AssertionVerifier, AuthState, ChallengeStore, CredentialAuthenticator, JwtManager,
        RegistrationService,
    },
    config::Config,
    email::OtpMailer,
    identity::IdentityRepository,
    sweets::SweetRepository,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub identities: Arc<dyn IdentityRepository>,
    pub sweets: Arc<dyn SweetRepository>,
    /// Verifies federated ID tokens
    pub federated: Arc<dyn AssertionVerifier>,
    pub registration: RegistrationService,
    pub authenticator: CredentialAuthenticator,
}

/// External collaborators the state is assembled from
pub struct Backends {
    pub identities: Arc<dyn IdentityRepository>,
    pub sweets: Arc<dyn SweetRepository>,
    pub challenges: ChallengeStore,
    pub mailer: Arc<dyn OtpMailer>,
    pub federated: Arc<dyn AssertionVerifier>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_days);

        if !config.federation_enabled() {
            tracing::warn!("GOOGLE_CLIENT_ID not set - federated login will be rejected");
        }

        let registration = RegistrationService::new(
            backends.challenges,
            backends.identities.clone(),
            backends.mailer,
        );
        let authenticator =
            CredentialAuthenticator::new(backends.identities.clone(), jwt_manager.clone());

        Self {
            config,
            jwt_manager,
            identities: backends.identities,
            sweets: backends.sweets,
            federated: backends.federated,
            registration,
            authenticator,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
