pub mod manager;
pub mod store;

pub use manager::RuleManager;
pub use store::RuleStore;

use crate::model::event::get_nested_value;
use crate::model::{Alert, AlertRule, ConditionKind, EventEnvelope};

/// Evaluate a single rule against an enriched event. Returns `Some(alert)`
/// iff every gating condition holds (enabled, project match, event-type
/// filter, condition-kind predicate).
pub fn evaluate_rule(rule: &AlertRule, event: &EventEnvelope) -> Option<Alert> {
    if !rule.enabled {
        return None;
    }
    if rule.project_id != event.project_id {
        return None;
    }
    if let Some(expected_type) = &rule.event_type {
        if !event_type_matches(expected_type, event) {
            return None;
        }
    }

    let message = match rule.condition {
        ConditionKind::ErrorCount => evaluate_error_count(event)?,
        ConditionKind::LatencyThreshold => evaluate_latency_threshold(rule, event)?,
        ConditionKind::CostThreshold => evaluate_cost_threshold(rule, event)?,
        ConditionKind::EventMatch => evaluate_event_match(rule, event)?,
    };

    Some(Alert {
        rule_id: rule.rule_id.clone(),
        rule_name: rule.name.clone(),
        project_id: rule.project_id.clone(),
        severity: rule.severity,
        message,
        triggering_event_id: Some(event.event_id.clone()),
        event_type: event_type_str(event),
        event_timestamp: event.timestamp,
    })
}

fn event_type_str(event: &EventEnvelope) -> String {
    serde_json::to_value(event.event_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn event_type_matches(expected: &str, event: &EventEnvelope) -> bool {
    event_type_str(event) == expected
}

fn evaluate_error_count(event: &EventEnvelope) -> Option<String> {
    if event_type_str(event) != "error" {
        return None;
    }
    let message = event
        .body
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("(no message)");
    Some(format!("error event: {message}"))
}

fn evaluate_latency_threshold(rule: &AlertRule, event: &EventEnvelope) -> Option<String> {
    let path = rule.field_path.as_deref().unwrap_or("body.latencyMs");
    let root = serde_json::json!({ "body": event.body });
    let value = get_nested_value(&root, path)?.as_f64()?;
    if value > rule.threshold {
        Some(format!(
            "latency {value} exceeded threshold {}",
            rule.threshold
        ))
    } else {
        None
    }
}

fn evaluate_cost_threshold(rule: &AlertRule, event: &EventEnvelope) -> Option<String> {
    if event.estimated_cost_usd > rule.threshold {
        Some(format!(
            "cost {} exceeded threshold {}",
            event.estimated_cost_usd, rule.threshold
        ))
    } else {
        None
    }
}

fn evaluate_event_match(rule: &AlertRule, event: &EventEnvelope) -> Option<String> {
    let path = rule.field_path.as_deref()?;
    let expected = rule.field_value.as_deref()?;
    let root = serde_json::json!({ "body": event.body });
    let value = get_nested_value(&root, path)?;
    let stringified = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if stringified == expected {
        Some(format!("field {path} matched {expected}"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawEnvelope, Severity};
    use serde_json::json;

    fn rule(condition: ConditionKind) -> AlertRule {
        AlertRule {
            rule_id: "r1".into(),
            project_id: "p1".into(),
            name: "test rule".into(),
            condition,
            threshold: 1000.0,
            severity: Severity::Warning,
            enabled: true,
            event_type: Some("model_response".into()),
            field_path: Some("body.latencyMs".into()),
            field_value: None,
        }
    }

    fn event(body: serde_json::Value) -> crate::model::EventEnvelope {
        RawEnvelope {
            event_id: Some("evt_1".into()),
            project_id: "p1".into(),
            event_type: "model_response".into(),
            timestamp: None,
            sdk: None,
            context: None,
            body,
            trace_id: None,
            parent_event_id: None,
        }
        .into_canonical()
        .unwrap()
    }

    #[test]
    fn latency_threshold_fires_when_exceeded() {
        let r = rule(ConditionKind::LatencyThreshold);
        let e = event(json!({"model": "gpt-4", "prompt": "x", "response": "y", "latencyMs": 1500}));
        let alert = evaluate_rule(&r, &e).unwrap();
        assert!(alert.message.contains("1500"));
        assert!(alert.message.contains("1000"));
    }

    #[test]
    fn latency_threshold_does_not_fire_when_under() {
        let r = rule(ConditionKind::LatencyThreshold);
        let e = event(json!({"model": "gpt-4", "prompt": "x", "response": "y", "latencyMs": 500}));
        assert!(evaluate_rule(&r, &e).is_none());
    }

    #[test]
    fn disabled_rule_never_fires() {
        let mut r = rule(ConditionKind::LatencyThreshold);
        r.enabled = false;
        let e = event(json!({"model": "gpt-4", "prompt": "x", "response": "y", "latencyMs": 5000}));
        assert!(evaluate_rule(&r, &e).is_none());
    }

    #[test]
    fn mismatched_project_id_never_fires() {
        let mut r = rule(ConditionKind::LatencyThreshold);
        r.project_id = "other_project".into();
        let e = event(json!({"model": "gpt-4", "prompt": "x", "response": "y", "latencyMs": 5000}));
        assert!(evaluate_rule(&r, &e).is_none());
    }

    #[test]
    fn event_type_filter_excludes_nonmatching_events() {
        let r = rule(ConditionKind::LatencyThreshold);
        let mut e = event(json!({"model": "gpt-4", "prompt": "x", "response": "y", "latencyMs": 5000}));
        e.event_type = crate::model::EventType::Log;
        assert!(evaluate_rule(&r, &e).is_none());
    }
}
