use std::fmt;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::{Rng, distr::Alphanumeric, rng};
use zenkey_core::{Account, Role};

const TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub identity: String,
    pub role: Role,
    pub issued_at: DateTime<Utc>,
}

/// Opaque session tokens handed out by `/login`. Held in memory only.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionInfo>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("active_sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, account: &Account) -> String {
        let token: String = rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        self.sessions.insert(
            token.clone(),
            SessionInfo {
                identity: account.identity.clone(),
                role: account.role,
                issued_at: Utc::now(),
            },
        );
        token
    }

    pub fn resolve(&self, token: &str) -> Option<SessionInfo> {
        self.sessions.get(token).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
