//! One-time email challenges
//!
//! A challenge is a six-digit code bound to an email address with a short TTL.
//! Issuing a new code for an email replaces the previous one. A wrong guess
//! leaves the challenge in place; only a successful registration clears it.
//!
//! Storage is pluggable through [`ChallengeBackend`]. The in-memory backend
//! is process-local, so a multi-instance deployment needs the Redis backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::identity::normalize_email;

/// Default challenge lifetime
pub const CHALLENGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Number of decimal digits in an issued code
pub const CODE_LENGTH: usize = 6;

const REDIS_KEY_PREFIX: &str = "otp:";

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("Challenge backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for ChallengeError {
    fn from(err: redis::RedisError) -> Self {
        ChallengeError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub code: String,
}

/// Key-value storage with per-entry expiry.
///
/// Each call is atomic for its key. `get` never returns an expired entry.
#[async_trait]
pub trait ChallengeBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredChallenge>, ChallengeError>;

    async fn set(
        &self,
        key: &str,
        value: StoredChallenge,
        ttl: Duration,
    ) -> Result<(), ChallengeError>;

    async fn delete(&self, key: &str) -> Result<(), ChallengeError>;
}

struct Entry {
    value: StoredChallenge,
    expires_at: Instant,
}

/// Single-process backend. Expired entries are dropped lazily on read and
/// swept on every write.
#[derive(Default)]
pub struct InMemoryChallengeBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryChallengeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl ChallengeBackend for InMemoryChallengeBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredChallenge>, ChallengeError> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => Instant::now() > entry.expires_at,
        };
        if expired {
            entries.remove(key);
            tracing::debug!("Dropped expired challenge");
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: StoredChallenge,
        ttl: Duration,
    ) -> Result<(), ChallengeError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        // Codes that were never redeemed would otherwise stay forever
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ChallengeError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// Shared backend for multi-instance deployments. Expiry is delegated to Redis.
#[derive(Clone)]
pub struct RedisChallengeBackend {
    conn: ConnectionManager,
}

impl RedisChallengeBackend {
    pub async fn connect(url: &str) -> Result<Self, ChallengeError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(key: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, key)
    }
}

#[async_trait]
impl ChallengeBackend for RedisChallengeBackend {
    async fn get(&self, key: &str) -> Result<Option<StoredChallenge>, ChallengeError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(key)).await?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| ChallengeError::Backend(e.to_string()))
        })
        .transpose()
    }

    async fn set(
        &self,
        key: &str,
        value: StoredChallenge,
        ttl: Duration,
    ) -> Result<(), ChallengeError> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(&value).map_err(|e| ChallengeError::Backend(e.to_string()))?;
        let _: () = conn
            .set_ex(Self::key(key), raw, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ChallengeError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(key)).await?;
        Ok(())
    }
}

/// Issues and checks one-time codes keyed by normalized email
#[derive(Clone)]
pub struct ChallengeStore {
    backend: Arc<dyn ChallengeBackend>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(backend: Arc<dyn ChallengeBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryChallengeBackend::new()), CHALLENGE_TTL)
    }

    /// Generate a fresh code for `email`, replacing any outstanding one.
    pub async fn issue(&self, email: &str) -> Result<String, ChallengeError> {
        let code = generate_code();
        self.backend
            .set(
                &normalize_email(email),
                StoredChallenge { code: code.clone() },
                self.ttl,
            )
            .await?;
        Ok(code)
    }

    /// Check `code` against the outstanding challenge for `email`.
    /// A mismatch does not consume the challenge.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool, ChallengeError> {
        let Some(stored) = self.backend.get(&normalize_email(email)).await? else {
            return Ok(false);
        };
        Ok(codes_match(&stored.code, code))
    }

    pub async fn clear(&self, email: &str) -> Result<(), ChallengeError> {
        self.backend.delete(&normalize_email(email)).await
    }
}

fn generate_code() -> String {
    let n: u32 = rand::rng().random_range(0..10u32.pow(CODE_LENGTH as u32));
    format!("{:0width$}", n, width = CODE_LENGTH)
}

fn codes_match(expected: &str, given: &str) -> bool {
    expected.len() == given.len() && bool::from(expected.as_bytes().ct_eq(given.as_bytes()))
}
