//! Operator accounts.
//!
//! Accounts only gate who may start a scan. Storage sits behind
//! [`AccountStore`] so the HTTP layer never sees the backing map; the bundled
//! [`InMemoryAccountStore`] forgets everything on restart.

use std::fmt;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, Salt, SaltString,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use rand::{TryRngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AccountError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub identity: String,
    #[serde(skip)]
    pub secret_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountStore: Send + Sync + fmt::Debug {
    async fn find_account_by_identity(&self, identity: &str) -> Option<Account>;

    /// Hashes `secret` and stores a new account. Fails with
    /// [`AccountError::Conflict`] when the identity is taken.
    async fn create_account(
        &self,
        identity: &str,
        secret: &str,
        role: Role,
    ) -> Result<Account, AccountError>;
}

/// Identities are compared trimmed and case-insensitively.
fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_account_by_identity(&self, identity: &str) -> Option<Account> {
        self.accounts
            .get(&normalize_identity(identity))
            .map(|entry| entry.value().clone())
    }

    async fn create_account(
        &self,
        identity: &str,
        secret: &str,
        role: Role,
    ) -> Result<Account, AccountError> {
        let key = normalize_identity(identity);
        if key.is_empty() {
            return Err(AccountError::InvalidInput(
                "identity must not be empty".to_string(),
            ));
        }
        if secret.is_empty() {
            return Err(AccountError::InvalidInput(
                "secret must not be empty".to_string(),
            ));
        }

        // Hash outside the shard lock.
        let secret_hash = hash_secret(secret)?;

        match self.accounts.entry(key.clone()) {
            Entry::Occupied(_) => Err(AccountError::Conflict(key)),
            Entry::Vacant(slot) => {
                let account = Account {
                    id: Uuid::now_v7(),
                    identity: key,
                    secret_hash,
                    role,
                    created_at: Utc::now(),
                };
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }
}

/// Argon2id PHC string for `secret` with a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, AccountError> {
    let mut salt_bytes = [0u8; Salt::RECOMMENDED_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|err| AccountError::Hashing(err.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|err| AccountError::Hashing(err.to_string()))?;

    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AccountError::Hashing(err.to_string()))
}

/// False for a wrong secret and for a stored hash that does not parse.
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}
