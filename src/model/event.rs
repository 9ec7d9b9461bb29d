//! Event envelope: the typed wrapper around a single telemetry record.
//!
//! Wire fields are accepted in either camelCase or snake_case; canonical
//! storage and every downstream comparison (notably alert rule matching)
//! use snake_case exclusively. `RawEnvelope::into_canonical` is the single
//! seam where casing is resolved, so a camelCase field can never leak past
//! ingest (a past bug this corpus is explicit about avoiding).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Log,
    Error,
    Span,
    TokenUsage,
    Message,
    ModelResponse,
    AgentAction,
    Retrieval,
    ToolCall,
    EvalMetric,
    Custom,
}

/// Raw wire-format envelope as received over HTTP, before casing/ID/timestamp
/// normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(alias = "eventId", alias = "event_id")]
    pub event_id: Option<String>,
    #[serde(alias = "projectId", alias = "project_id")]
    pub project_id: String,
    #[serde(alias = "type")]
    pub event_type: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub sdk: Option<SdkInfo>,
    pub context: Option<Value>,
    pub body: Value,
    #[serde(alias = "traceId", alias = "trace_id")]
    pub trace_id: Option<String>,
    #[serde(alias = "parentEventId", alias = "parent_event_id")]
    pub parent_event_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
}

/// Canonical, fully-normalized event envelope used by every component past
/// ingest admission.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub project_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub sdk_name: String,
    pub sdk_version: String,
    pub context: Option<Value>,
    pub body: Value,
    pub trace_id: Option<String>,
    pub parent_event_id: Option<String>,

    // Server-assigned fields, populated over the event's lifecycle.
    pub queued_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub queue_latency_ms: Option<f64>,
    pub estimated_cost_usd: f64,
    pub cost_breakdown: Option<crate::pricing::CostBreakdown>,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown event type: {0}")]
    UnknownType(String),
    #[error("field {field}: {message}")]
    Field { field: String, message: String },
}

fn parse_event_type(raw: &str) -> EventType {
    match raw {
        "log" => EventType::Log,
        "error" => EventType::Error,
        "span" => EventType::Span,
        "token_usage" | "tokenUsage" => EventType::TokenUsage,
        "message" => EventType::Message,
        "model_response" | "modelResponse" => EventType::ModelResponse,
        "agent_action" | "agentAction" => EventType::AgentAction,
        "retrieval" => EventType::Retrieval,
        "tool_call" | "toolCall" => EventType::ToolCall,
        "eval_metric" | "evalMetric" => EventType::EvalMetric,
        // Unknown types are accepted as custom-equivalent, never rejected.
        _ => EventType::Custom,
    }
}

impl RawEnvelope {
    /// Normalize casing, default the event id and timestamp, and validate
    /// the per-type body contract.
    pub fn into_canonical(self) -> Result<EventEnvelope, ValidationError> {
        let event_type = parse_event_type(&self.event_type);
        validate_body(event_type, &self.body)?;

        let event_id = self
            .event_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let sdk = self.sdk.unwrap_or(SdkInfo {
            name: "unknown".into(),
            version: "0.0.0".into(),
        });

        Ok(EventEnvelope {
            event_id,
            project_id: self.project_id,
            event_type,
            timestamp,
            sdk_name: sdk.name,
            sdk_version: sdk.version,
            context: self.context,
            body: self.body,
            trace_id: self.trace_id,
            parent_event_id: self.parent_event_id,
            queued_at: None,
            processed_at: None,
            queue_latency_ms: None,
            estimated_cost_usd: 0.0,
            cost_breakdown: None,
        })
    }
}

fn require_string(body: &Value, field: &str) -> Result<(), ValidationError> {
    match body.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(()),
        Some(_) => Err(ValidationError::Field {
            field: field.to_string(),
            message: "must be a non-empty string".to_string(),
        }),
        None => Err(ValidationError::Field {
            field: field.to_string(),
            message: "is required".to_string(),
        }),
    }
}

fn require_nonneg_number(body: &Value, field: &str) -> Result<(), ValidationError> {
    match body.get(field).and_then(Value::as_f64) {
        Some(n) if n >= 0.0 => Ok(()),
        Some(_) => Err(ValidationError::Field {
            field: field.to_string(),
            message: "must be >= 0".to_string(),
        }),
        None => Err(ValidationError::Field {
            field: field.to_string(),
            message: "is required and must be numeric".to_string(),
        }),
    }
}

/// Validate the per-type body contract. Unknown/custom types are never
/// rejected; only the explicitly-specified types carry a strict contract.
fn validate_body(event_type: EventType, body: &Value) -> Result<(), ValidationError> {
    match event_type {
        EventType::Log => {
            match body.get("level").and_then(Value::as_str) {
                Some("debug") | Some("info") | Some("warn") | Some("error") => {}
                _ => {
                    return Err(ValidationError::Field {
                        field: "level".into(),
                        message: "must be one of debug, info, warn, error".into(),
                    })
                }
            }
            require_string(body, "message")
        }
        EventType::Error => require_string(body, "message"),
        EventType::Span => require_string(body, "span_id").or_else(|_| require_string(body, "spanId")),
        EventType::TokenUsage => {
            require_string(body, "model")?;
            let has_split = body.get("input_tokens").is_some()
                || body.get("inputTokens").is_some()
                || body.get("output_tokens").is_some()
                || body.get("outputTokens").is_some();
            if has_split {
                require_nonneg_number(body, "input_tokens")
                    .or_else(|_| require_nonneg_number(body, "inputTokens"))?;
                require_nonneg_number(body, "output_tokens")
                    .or_else(|_| require_nonneg_number(body, "outputTokens"))
            } else {
                // No input/output split present — fall back to the
                // total_tokens-only shape (70/30 split applied downstream
                // during cost enrichment).
                require_nonneg_number(body, "total_tokens")
                    .or_else(|_| require_nonneg_number(body, "totalTokens"))
            }
        }
        EventType::ModelResponse => {
            require_string(body, "model")?;
            require_string(body, "prompt")?;
            require_string(body, "response")?;
            require_nonneg_number(body, "latency_ms")
                .or_else(|_| require_nonneg_number(body, "latencyMs"))
        }
        EventType::AgentAction
        | EventType::Retrieval
        | EventType::ToolCall
        | EventType::EvalMetric
        | EventType::Message
        | EventType::Custom => {
            // Detailed in the original source-schema section; bodies are
            // accepted as opaque maps and never rejected here.
            Ok(())
        }
    }
}

/// Get a value at a dotted path (`a.b.c`), descending maps by key.
/// Returns `None` on any missing or non-map hop.
pub fn get_nested_value<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Flatten a canonical envelope into the bus's field map (§4.5, §6).
pub fn to_bus_fields(event: &EventEnvelope) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("event_id".into(), event.event_id.clone());
    fields.insert("project_id".into(), event.project_id.clone());
    fields.insert(
        "type".into(),
        serde_json::to_value(event.event_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
    );
    fields.insert("timestamp".into(), event.timestamp.to_rfc3339());
    fields.insert("sdk_name".into(), event.sdk_name.clone());
    fields.insert("sdk_version".into(), event.sdk_version.clone());
    fields.insert("body".into(), event.body.to_string());
    fields.insert(
        "context".into(),
        event
            .context
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "null".to_string()),
    );
    if let Some(qa) = event.queued_at {
        fields.insert("queued_at".into(), qa.to_rfc3339());
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(event_type: &str, body: Value) -> RawEnvelope {
        RawEnvelope {
            event_id: None,
            project_id: "proj_1".into(),
            event_type: event_type.into(),
            timestamp: None,
            sdk: None,
            context: None,
            body,
            trace_id: None,
            parent_event_id: None,
        }
    }

    #[test]
    fn missing_event_id_gets_fresh_uuid() {
        let envelope = raw("log", json!({"level": "info", "message": "hi"}))
            .into_canonical()
            .unwrap();
        assert!(!envelope.event_id.is_empty());
    }

    #[test]
    fn supplied_event_id_is_preserved() {
        let mut r = raw("log", json!({"level": "info", "message": "hi"}));
        r.event_id = Some("client-assigned-123".into());
        let envelope = r.into_canonical().unwrap();
        assert_eq!(envelope.event_id, "client-assigned-123");
    }

    #[test]
    fn unknown_type_is_accepted_as_custom() {
        let envelope = raw("some_future_type", json!({"anything": true}))
            .into_canonical()
            .unwrap();
        assert_eq!(envelope.event_type, EventType::Custom);
    }

    #[test]
    fn token_usage_requires_model_and_counts() {
        let err = raw("token_usage", json!({"model": "gpt-4"}))
            .into_canonical()
            .unwrap_err();
        assert!(matches!(err, ValidationError::Field { .. }));
    }

    #[test]
    fn token_usage_accepts_camelcase_fields() {
        let envelope = raw(
            "token_usage",
            json!({"model": "gpt-4", "inputTokens": 10, "outputTokens": 5}),
        )
        .into_canonical()
        .unwrap();
        assert_eq!(envelope.event_type, EventType::TokenUsage);
    }

    #[test]
    fn token_usage_accepts_total_tokens_only() {
        let envelope = raw("token_usage", json!({"model": "gpt-4", "total_tokens": 1500}))
            .into_canonical()
            .unwrap();
        assert_eq!(envelope.event_type, EventType::TokenUsage);
    }

    #[test]
    fn model_response_requires_latency_ms() {
        let err = raw(
            "model_response",
            json!({"model": "gpt-4", "prompt": "hi", "response": "there"}),
        )
        .into_canonical()
        .unwrap_err();
        assert!(matches!(err, ValidationError::Field { .. }));
    }

    #[test]
    fn model_response_accepts_camelcase_latency() {
        let envelope = raw(
            "model_response",
            json!({"model": "gpt-4", "prompt": "hi", "response": "there", "latencyMs": 42}),
        )
        .into_canonical()
        .unwrap();
        assert_eq!(envelope.event_type, EventType::ModelResponse);
    }

    #[test]
    fn log_requires_valid_level() {
        let err = raw("log", json!({"level": "verbose", "message": "hi"}))
            .into_canonical()
            .unwrap_err();
        assert!(matches!(err, ValidationError::Field { .. }));
    }

    #[test]
    fn nested_value_resolution_descends_maps() {
        let root = json!({"body": {"latencyMs": 1500}});
        assert_eq!(
            get_nested_value(&root, "body.latencyMs"),
            Some(&json!(1500))
        );
        assert_eq!(get_nested_value(&root, "body.missing"), None);
        assert_eq!(get_nested_value(&root, "body.latencyMs.nope"), None);
    }
}
