//! Password hashing with Argon2id.
//!
//! Hashing is CPU bound, so it runs on the blocking pool and the number of
//! computations in flight is capped by a semaphore.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand_core::OsRng;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP minimum for Argon2id: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    params: Params,
    permits: Arc<Semaphore>,
}

impl CredentialStore {
    pub fn new(cost: HashCost, max_concurrent: usize) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AppError::ConfigError(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self {
            params,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Hash a password into a PHC string with a freshly generated salt.
    pub async fn hash(&self, plaintext: &str) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;

        let params = self.params.clone();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hash_blocking(&plaintext, params))
            .await
            .map_err(|e| AppError::InternalError(format!("Hash task failed: {}", e)))?
    }

    /// A malformed digest is treated as a mismatch, never as an error.
    pub async fn verify(&self, plaintext: &str, digest: &str) -> Result<bool> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AppError::InternalError(e.to_string()))?;

        let plaintext = plaintext.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || verify_blocking(&plaintext, &digest))
            .await
            .map_err(|e| AppError::InternalError(format!("Verify task failed: {}", e)))
    }
}

fn hash_blocking(plaintext: &str, params: Params) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let hash = argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

fn verify_blocking(plaintext: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    // Parameters come from the parsed hash, not from the configured cost.
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PENDING_PASSWORD_HASH;

    fn cheap() -> CredentialStore {
        CredentialStore::new(
            HashCost {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
            2,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let store = cheap();
        let digest = store.hash("password123").await.unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(store.verify("password123", &digest).await.unwrap());
        assert!(!store.verify("password124", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_salt_is_never_reused() {
        let store = cheap();
        let first = store.hash("password123").await.unwrap();
        let second = store.hash("password123").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_digest_is_a_mismatch() {
        let store = cheap();
        assert!(!store.verify("password123", "not-a-hash").await.unwrap());
        assert!(!store.verify("PENDING", PENDING_PASSWORD_HASH).await.unwrap());
        assert!(!store.verify("", "").await.unwrap());
    }

    #[test]
    fn test_invalid_cost_is_a_config_error() {
        let result = CredentialStore::new(
            HashCost {
                memory_kib: 0,
                iterations: 0,
                parallelism: 0,
            },
            1,
        );
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
