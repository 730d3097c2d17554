//! Password hashing with Argon2id
//!
//! Passwords are trimmed before hashing and verification. Hashing runs on the
//! blocking pool since a single hash takes tens of milliseconds by design.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;

/// Prefix of the stored credential for identities that can only sign in
/// through a federated provider. Never a valid PHC string, so it can never
/// verify against any password.
pub const FEDERATED_ONLY_PREFIX: &str = "!federated:";

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn normalize(password: &str) -> &str {
    password.trim()
}

/// Hash a password synchronously. Prefer [`hash_password`] from async code.
pub fn hash_password_blocking(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(normalize(password).as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Verify a password synchronously. Malformed or federated-only stored
/// credentials never verify.
pub fn verify_password_blocking(password: &str, stored: &str) -> bool {
    if is_federated_only(stored) {
        return false;
    }
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(normalize(password).as_bytes(), &parsed)
        .is_ok()
}

pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash_password_blocking(&password)).await?
}

pub async fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let password = password.to_string();
    let stored = stored.to_string();
    Ok(tokio::task::spawn_blocking(move || verify_password_blocking(&password, &stored)).await?)
}

/// Credential stored for federated-only identities: the marker prefix plus
/// random bytes so no two accounts share a value.
pub fn generate_impossible_hash() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", FEDERATED_ONLY_PREFIX, hex)
}

pub fn is_federated_only(stored: &str) -> bool {
    stored.starts_with(FEDERATED_ONLY_PREFIX)
}
