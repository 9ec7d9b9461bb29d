//! `events` table row shape (§6). Primary key includes `event_id`; the
//! MergeTree-family table engine configured in the deployment's DDL must
//! dedupe on merge by that key to absorb at-least-once duplicates — this
//! crate only assumes that contract, it does not issue the DDL itself.

use crate::model::EventEnvelope;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Serialize;

#[derive(Debug, Clone, Row, Serialize)]
pub struct EventRow {
    pub event_id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub sdk_name: String,
    pub sdk_version: String,
    pub body: String,
    pub context: String,
    pub queued_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub queue_latency_ms: f32,
    pub estimated_cost_usd: f64,
}

impl EventRow {
    pub fn from_envelope(event: &EventEnvelope) -> Self {
        Self {
            event_id: event.event_id.clone(),
            project_id: event.project_id.clone(),
            event_type: serde_json::to_value(event.event_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            timestamp: event.timestamp,
            sdk_name: event.sdk_name.clone(),
            sdk_version: event.sdk_version.clone(),
            body: event.body.to_string(),
            context: event
                .context
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "null".to_string()),
            queued_at: event.queued_at.unwrap_or(event.timestamp),
            processed_at: event.processed_at.unwrap_or(event.timestamp),
            queue_latency_ms: event.queue_latency_ms.unwrap_or(0.0) as f32,
            estimated_cost_usd: event.estimated_cost_usd,
        }
    }
}
