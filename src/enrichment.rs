//! Processor-side enrichment: queue latency, processed-at stamping, and
//! cost estimation. Pure with respect to its inputs beyond reading the
//! clock; never fails — missing fields degrade to zero or omission.

use crate::model::{EventEnvelope, EventType};
use crate::pricing;
use chrono::Utc;
use serde_json::Value;

pub fn enrich(mut event: EventEnvelope) -> EventEnvelope {
    let now = Utc::now();
    event.processed_at = Some(now);

    if let Some(queued_at) = event.queued_at {
        let delta_ms = (now - queued_at).num_milliseconds();
        event.queue_latency_ms = Some(delta_ms.max(0) as f64);
    }

    if event.event_type == EventType::TokenUsage {
        let model = event
            .body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or("default");
        let has_split = body_has_any(&event.body, &["input_tokens", "inputTokens"])
            || body_has_any(&event.body, &["output_tokens", "outputTokens"]);

        let (cost, breakdown) = if has_split {
            let input_tokens = body_u64(&event.body, &["input_tokens", "inputTokens"]);
            let output_tokens = body_u64(&event.body, &["output_tokens", "outputTokens"]);
            pricing::estimate_cost(model, input_tokens, output_tokens)
        } else {
            let total_tokens = body_u64(&event.body, &["total_tokens", "totalTokens"]);
            pricing::estimate_cost_from_total(model, total_tokens)
        };
        event.estimated_cost_usd = cost;
        event.cost_breakdown = Some(breakdown);
    }

    event
}

fn body_u64(body: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| body.get(*k).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn body_has_any(body: &Value, keys: &[&str]) -> bool {
    keys.iter().any(|k| body.get(*k).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEnvelope;
    use serde_json::json;

    fn make_event(body: Value, event_type: &str, queued_at: Option<chrono::DateTime<Utc>>) -> EventEnvelope {
        let raw = RawEnvelope {
            event_id: None,
            project_id: "p1".into(),
            event_type: event_type.into(),
            timestamp: None,
            sdk: None,
            context: None,
            body,
            trace_id: None,
            parent_event_id: None,
        };
        let mut event = raw.into_canonical().unwrap();
        event.queued_at = queued_at;
        event
    }

    #[test]
    fn token_usage_gets_cost_estimate() {
        let event = make_event(
            json!({"model": "gpt-4", "input_tokens": 1000, "output_tokens": 500}),
            "token_usage",
            None,
        );
        let enriched = enrich(event);
        assert_eq!(enriched.estimated_cost_usd, 0.06);
    }

    #[test]
    fn token_usage_with_only_total_tokens_uses_seventy_thirty_split() {
        let event = make_event(json!({"model": "gpt-4", "total_tokens": 1500}), "token_usage", None);
        let enriched = enrich(event);
        let (expected, _) = pricing::estimate_cost_from_total("gpt-4", 1500);
        assert_eq!(enriched.estimated_cost_usd, expected);
        assert!(enriched.estimated_cost_usd > 0.0);
    }

    #[test]
    fn non_token_usage_events_get_zero_cost() {
        let event = make_event(json!({"level": "info", "message": "hi"}), "log", None);
        let enriched = enrich(event);
        assert_eq!(enriched.estimated_cost_usd, 0.0);
    }

    #[test]
    fn queue_latency_is_nonnegative() {
        let past = Utc::now() - chrono::Duration::milliseconds(250);
        let event = make_event(json!({"level": "info", "message": "hi"}), "log", Some(past));
        let enriched = enrich(event);
        assert!(enriched.queue_latency_ms.unwrap() >= 0.0);
    }

    #[test]
    fn missing_queued_at_leaves_latency_unset() {
        let event = make_event(json!({"level": "info", "message": "hi"}), "log", None);
        let enriched = enrich(event);
        assert!(enriched.queue_latency_ms.is_none());
    }
}
