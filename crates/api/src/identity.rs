//! Identities and their persistence
//!
//! The database owns email uniqueness (unique index on `lower(email)`).
//! Callers may pre-check with [`IdentityRepository::find_by_email`] for a
//! friendlier error, but only [`IdentityError::EmailTaken`] returned from
//! [`IdentityRepository::create`] is authoritative.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Access level carried by an identity and its tokens.
///
/// No code path in this crate ever produces `Admin`; elevation happens
/// out-of-band directly in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Role::User),
            "Admin" => Ok(Role::Admin),
            other => Err(IdentityError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Public projection returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&Identity> for IdentitySummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            role: identity.role,
        }
    }
}

/// Input for identity creation. There is no role field: every identity
/// created through this type is a `User`.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("An identity with this email already exists")]
    EmailTaken,
    #[error("Unknown role: {0}")]
    InvalidRole(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Lower-case and trim an email so it can be used as a lookup key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, IdentityError>;

    /// Insert a new `User` identity. Fails with [`IdentityError::EmailTaken`]
    /// if the normalized email is already present, even when a prior lookup
    /// found nothing.
    async fn create(&self, new: NewIdentity) -> Result<Identity, IdentityError>;
}

#[derive(Debug, FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    role: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = IdentityError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed identity store
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation() || db.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        let row: Option<IdentityRow> = sqlx::query_as(
            r#"
            SELECT id, email, name, password_hash, role, created_at, updated_at
            FROM identities
            WHERE lower(email) = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, IdentityError> {
        let row: Option<IdentityRow> = sqlx::query_as(
            r#"
            SELECT id, email, name, password_hash, role, created_at, updated_at
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Identity::try_from).transpose()
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
        let result: Result<IdentityRow, sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO identities (id, email, name, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'User', NOW(), NOW())
            RETURNING id, email, name, password_hash, role, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(normalize_email(&new.email))
        .bind(new.name.trim())
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(e) if is_unique_violation(&e) => Err(IdentityError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local identity store for tests and local development.
/// Uniqueness is enforced under the write lock, like the database index.
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    identities: RwLock<HashMap<String, Identity>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed identity, bypassing the `User`-only creation path.
    /// Stands in for out-of-band provisioning (e.g. seeding an admin).
    pub async fn insert(&self, identity: Identity) {
        self.identities
            .write()
            .await
            .insert(normalize_email(&identity.email), identity);
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self
            .identities
            .read()
            .await
            .get(&normalize_email(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, IdentityError> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn create(&self, new: NewIdentity) -> Result<Identity, IdentityError> {
        let key = normalize_email(&new.email);
        let mut identities = self.identities.write().await;
        if identities.contains_key(&key) {
            return Err(IdentityError::EmailTaken);
        }

        let now = OffsetDateTime::now_utc();
        let identity = Identity {
            id: Uuid::new_v4(),
            email: key.clone(),
            name: new.name.trim().to_string(),
            password_hash: new.password_hash,
            role: Role::User,
            created_at: now,
            updated_at: now,
        };
        identities.insert(key, identity.clone());
        Ok(identity)
    }
}
