//! Authentication module for the Sweet Shop API

pub mod challenge;
pub mod federated;
pub mod jwt;
pub mod login;
pub mod middleware;
pub mod password;
pub mod registration;

pub use challenge::{
    ChallengeBackend, ChallengeStore, InMemoryChallengeBackend, RedisChallengeBackend,
};
pub use federated::{
    find_or_create_identity, AssertionVerifier, FederatedProfile, FederationError,
    GoogleIdTokenVerifier,
};
pub use jwt::{Claims, JwtManager, TokenError};
pub use login::{CredentialAuthenticator, LoginOutcome};
pub use middleware::{require_admin, require_auth, AuthError, AuthState, AuthUser};
pub use password::{generate_impossible_hash, hash_password, verify_password};
pub use registration::{RegistrationRequest, RegistrationService};
