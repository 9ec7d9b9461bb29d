//! Dead-letter record for un-retriable archiver upload failures.
//!
//! Grounded in the dead-letter queue idiom (sqlx-backed table of failed
//! operations with a retry count and terminal status), adapted here to the
//! one failure path spec.md leaves genuinely durable: archiver uploads that
//! exhaust their retry budget. Notifier failures are intentionally NOT
//! dead-lettered — the rule engine drops them per its no-retry contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterSource {
    ArchiverUpload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterStatus {
    Pending,
    PermanentlyFailed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetterRecord {
    pub id: uuid::Uuid,
    pub source: DeadLetterSource,
    pub payload: serde_json::Value,
    pub failure_reason: String,
    pub retry_count: i32,
    pub status: DeadLetterStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempted_at: DateTime<Utc>,
}
