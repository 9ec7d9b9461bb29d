//! End-to-end scenarios across envelope parsing, cost estimation,
//! enrichment, and alert evaluation — the parts of the pipeline that do
//! not require a live Postgres/Redis/ClickHouse/S3 to exercise.

use chrono::Utc;
use lynex::alerts::evaluate_rule;
use lynex::bus::MemoryBus;
use lynex::enrichment::enrich;
use lynex::model::event::to_bus_fields;
use lynex::model::{AlertRule, ConditionKind, RawEnvelope, Severity};
use lynex::pricing::estimate_cost;
use serde_json::json;

fn raw(project_id: &str, event_type: &str, body: serde_json::Value) -> RawEnvelope {
    RawEnvelope {
        event_id: None,
        project_id: project_id.to_string(),
        event_type: event_type.to_string(),
        timestamp: None,
        sdk: None,
        context: None,
        body,
        trace_id: None,
        parent_event_id: None,
    }
}

/// S1: a token_usage event for gpt-4 with 1000 input / 500 output tokens
/// resolves to exactly 6 cents.
#[test]
fn s1_token_usage_cost_matches_expected_cents() {
    let event = raw(
        "proj_free",
        "token_usage",
        json!({"model": "gpt-4", "inputTokens": 1000, "outputTokens": 500}),
    )
    .into_canonical()
    .unwrap();

    let enriched = enrich(event);
    assert_eq!(enriched.estimated_cost_usd, 0.06);

    let (direct, _) = estimate_cost("gpt-4", 1000, 500);
    assert_eq!(direct, 0.06);
}

/// S2: the same event id ingested twice produces two bus appends, but the
/// canonical event_id is identical both times — the analytics store's
/// merge-by-primary-key contract (schema.rs doc comment) is what
/// collapses these into one logical row downstream; this test only
/// verifies the upstream half of that idempotence law, that re-ingesting
/// the same client-assigned id does not mint a new one.
#[test]
fn s2_duplicate_event_id_is_preserved_not_regenerated() {
    let mut first = raw("proj_a", "log", json!({"level": "info", "message": "hi"}));
    first.event_id = Some("evt_dup_1".to_string());
    let envelope_a = first.clone().into_canonical().unwrap();

    let mut second = first;
    second.event_id = Some("evt_dup_1".to_string());
    let envelope_b = second.into_canonical().unwrap();

    assert_eq!(envelope_a.event_id, "evt_dup_1");
    assert_eq!(envelope_b.event_id, "evt_dup_1");
}

/// S3: a latency_threshold rule on model_response events fires exactly
/// once when body.latencyMs exceeds the configured threshold, with the
/// observed and threshold values both present in the alert message.
#[test]
fn s3_latency_threshold_rule_fires_with_expected_message() {
    let event = raw(
        "proj_a",
        "model_response",
        json!({"model": "gpt-4", "prompt": "hi", "response": "there", "latencyMs": 1500}),
    )
    .into_canonical()
    .unwrap();

    let rule = AlertRule {
        rule_id: "rule_1".to_string(),
        project_id: "proj_a".to_string(),
        name: "slow responses".to_string(),
        condition: ConditionKind::LatencyThreshold,
        threshold: 1000.0,
        severity: Severity::Warning,
        enabled: true,
        event_type: Some("model_response".to_string()),
        field_path: None,
        field_value: None,
    };

    let alert = evaluate_rule(&rule, &event).expect("rule should fire");
    assert_eq!(alert.severity, Severity::Warning);
    assert!(alert.message.contains("1500"));
    assert!(alert.message.contains("1000"));

    // A second evaluation of the same rule against the same event produces
    // exactly one more alert, not zero or two — evaluation is stateless.
    let second = evaluate_rule(&rule, &event);
    assert!(second.is_some());
}

/// A disabled rule never fires, even when its condition would otherwise
/// match.
#[test]
fn disabled_rule_never_fires() {
    let event = raw(
        "proj_a",
        "model_response",
        json!({"model": "gpt-4", "prompt": "hi", "response": "there", "latencyMs": 5000}),
    )
    .into_canonical()
    .unwrap();

    let rule = AlertRule {
        rule_id: "rule_disabled".to_string(),
        project_id: "proj_a".to_string(),
        name: "disabled rule".to_string(),
        condition: ConditionKind::LatencyThreshold,
        threshold: 1000.0,
        severity: Severity::Critical,
        enabled: false,
        event_type: Some("model_response".to_string()),
        field_path: None,
        field_value: None,
    };

    assert!(evaluate_rule(&rule, &event).is_none());
}

/// S5: when the durable bus is unreachable, events still get queued
/// (into the in-memory fallback ring) and carry synthetic `mem-` ids
/// rather than being rejected outright.
#[test]
fn s5_memory_fallback_assigns_synthetic_ids() {
    let bus = MemoryBus::new(16);
    let event = raw("proj_a", "log", json!({"level": "info", "message": "degraded"}))
        .into_canonical()
        .unwrap();

    let id = bus.append(to_bus_fields(&event)).unwrap();
    assert!(id.starts_with("mem-"));
}

/// Memory fallback drops the newest entry once the ring is full, rather
/// than blocking or growing unbounded.
#[test]
fn s5_memory_fallback_drops_newest_when_full() {
    let bus = MemoryBus::new(2);
    for i in 0..3 {
        let event = raw("proj_a", "log", json!({"level": "info", "message": format!("msg {i}")}))
            .into_canonical()
            .unwrap();
        let _ = bus.append(to_bus_fields(&event));
    }
    assert_eq!(bus.dropped_count(), 1);
}

/// Cost computation is pure: the same (model, input, output) triple
/// always yields the same result.
#[test]
fn cost_computation_is_pure() {
    let (first, _) = estimate_cost("claude-3-5-sonnet", 2000, 800);
    let (second, _) = estimate_cost("claude-3-5-sonnet", 2000, 800);
    assert_eq!(first, second);
}

/// Round-trip law: serializing an envelope to bus fields and decoding it
/// back through the canonical path (model::event::to_bus_fields is the
/// encode half; the processor's parse_fields is the decode half, covered
/// in processor::mod::tests) preserves the event id and project id.
#[test]
fn envelope_round_trip_preserves_identity_fields() {
    let mut raw_event = raw("proj_rt", "log", json!({"level": "info", "message": "round trip"}));
    raw_event.event_id = Some("evt_rt_1".to_string());
    let event = raw_event.into_canonical().unwrap();
    let mut event = event;
    event.queued_at = Some(Utc::now());

    let fields = to_bus_fields(&event);
    assert_eq!(fields.get("event_id").map(String::as_str), Some("evt_rt_1"));
    assert_eq!(fields.get("project_id").map(String::as_str), Some("proj_rt"));
}
