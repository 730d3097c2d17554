//! Federated (Google) sign-in
//!
//! Google ID tokens are RS256 JWTs signed by keys published as a JWKS. The key
//! set is cached and refetched when it goes stale or a token names an unknown
//! `kid`. The cache lock is never held while the provider is being called.
//!
//! A verified email is mapped to a local identity, created on first sign-in
//! with role `User` and a credential no password can match.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::password;
use crate::identity::{normalize_email, Identity, IdentityError, IdentityRepository, NewIdentity};

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// How long a fetched key set is trusted before refetching
const JWKS_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Unknown `kid`s do not trigger a refetch more often than this
const JWKS_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("Federated login is not configured")]
    NotConfigured,
    #[error("Invalid identity assertion: {0}")]
    InvalidAssertion(String),
    #[error("Could not load provider keys: {0}")]
    KeySet(String),
}

/// Identity facts vouched for by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedProfile {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait AssertionVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<FederatedProfile, FederationError>;
}

#[derive(Debug, Deserialize)]
struct GoogleIdClaims {
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct GoogleIdTokenVerifier {
    http_client: Client,
    client_id: String,
    jwks_url: String,
    cache: Arc<RwLock<Option<CachedKeys>>>,
}

impl GoogleIdTokenVerifier {
    pub fn new(http_client: Client, client_id: String, jwks_url: String) -> Self {
        Self {
            http_client,
            client_id,
            jwks_url,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn fetch_keys(&self) -> Result<JwkSet, FederationError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| FederationError::KeySet(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FederationError::KeySet(format!(
                "provider returned {}",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| FederationError::KeySet(e.to_string()))
    }

    /// Resolve the decoding key for `kid`, refreshing the cached set at most once
    /// and never more often than [`JWKS_MIN_REFRESH_INTERVAL`].
    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, FederationError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = cached.fetched_at.elapsed();
                if age < JWKS_CACHE_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|e| FederationError::KeySet(e.to_string()));
                    }
                    if age < JWKS_MIN_REFRESH_INTERVAL {
                        tracing::debug!(kid = %kid, "Unknown kid within refresh interval, not refetching");
                        return Err(FederationError::InvalidAssertion(
                            "unknown signing key".into(),
                        ));
                    }
                }
            }
        }

        tracing::debug!(kid = %kid, "Refreshing federation key set");
        let keys = self.fetch_keys().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|e| FederationError::KeySet(e.to_string()))?;

        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        key.ok_or_else(|| FederationError::InvalidAssertion("unknown signing key".into()))
    }
}

#[async_trait]
impl AssertionVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, assertion: &str) -> Result<FederatedProfile, FederationError> {
        if self.client_id.is_empty() {
            return Err(FederationError::NotConfigured);
        }

        let header =
            decode_header(assertion).map_err(|e| FederationError::InvalidAssertion(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(FederationError::InvalidAssertion(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| FederationError::InvalidAssertion("missing kid".into()))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);

        let claims = decode::<GoogleIdClaims>(assertion, &key, &validation)
            .map_err(|e| FederationError::InvalidAssertion(format!("{:?}", e.kind())))?
            .claims;

        if claims.email_verified == Some(false) {
            return Err(FederationError::InvalidAssertion("email not verified".into()));
        }
        let email = claims
            .email
            .map(|e| normalize_email(&e))
            .filter(|e| !e.is_empty())
            .ok_or_else(|| FederationError::InvalidAssertion("missing email".into()))?;
        let name = claims
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(FederatedProfile { email, name })
    }
}

/// Look up the identity for a verified profile, creating a federated-only
/// `User` on first sign-in. Existing identities are returned untouched.
pub async fn find_or_create_identity(
    identities: &dyn IdentityRepository,
    profile: &FederatedProfile,
) -> Result<Identity, IdentityError> {
    if let Some(existing) = identities.find_by_email(&profile.email).await? {
        return Ok(existing);
    }

    let created = identities
        .create(NewIdentity {
            email: profile.email.clone(),
            name: profile.name.clone(),
            password_hash: password::generate_impossible_hash(),
        })
        .await;

    match created {
        Ok(identity) => {
            tracing::info!(user_id = %identity.id, "Created identity from federated sign-in");
            Ok(identity)
        }
        // Lost a race with a concurrent sign-in or registration
        Err(IdentityError::EmailTaken) => identities
            .find_by_email(&profile.email)
            .await?
            .ok_or(IdentityError::EmailTaken),
        Err(e) => Err(e),
    }
}
