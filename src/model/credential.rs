//! API credential record.

use chrono::{DateTime, Utc};

/// An API key's persisted record. The cleartext key is never stored; only
/// its SHA-256 hash is, and lookups are by hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Credential {
    pub key_hash: String,
    pub project_id: String,
    pub user_id: String,
    pub label: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Which environment a key belongs to, derived from its prefix. This is a
/// display/tagging concept only — it does not affect lookup or authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEnvironment {
    Live,
    Test,
}

impl Credential {
    pub fn environment_of(cleartext_key: &str) -> Option<KeyEnvironment> {
        if cleartext_key.starts_with("sk_live_") {
            Some(KeyEnvironment::Live)
        } else if cleartext_key.starts_with("sk_test_") {
            Some(KeyEnvironment::Test)
        } else {
            None
        }
    }
}
