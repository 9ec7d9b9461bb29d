//! Processor loop: at-least-once consumption, enrichment, alert
//! evaluation, batched analytics writes, and stuck-message reclaim.

use crate::alerts::{evaluate_rule, RuleManager};
use crate::analytics::AnalyticsWriter;
use crate::bus::DurableBus;
use crate::enrichment::enrich;
use crate::metrics::Metrics;
use crate::model::event::to_bus_fields;
use crate::notifiers::{fan_out, Notifier};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct Processor {
    bus: Arc<DurableBus>,
    analytics: Arc<AnalyticsWriter>,
    rules: Arc<RuleManager>,
    notifiers: Vec<Arc<dyn Notifier>>,
    metrics: Arc<Metrics>,
    consumer: String,
    claim_idle: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Processor {
    pub fn new(
        bus: Arc<DurableBus>,
        analytics: Arc<AnalyticsWriter>,
        rules: Arc<RuleManager>,
        notifiers: Vec<Arc<dyn Notifier>>,
        metrics: Arc<Metrics>,
        claim_idle: Duration,
    ) -> Self {
        let consumer = format!("processor-{}", Utc::now().timestamp());
        Self {
            bus,
            analytics,
            rules,
            notifiers,
            metrics,
            consumer,
            claim_idle,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Startup: create the consumer group (ignoring "already exists"),
    /// then run the main loop plus the periodic reclaim scan until a
    /// shutdown signal trips.
    pub async fn run(self: Arc<Self>) {
        if let Err(e) = self.bus.create_group().await {
            error!(err = ?e, "failed to create consumer group");
        }

        let reclaim_handle = {
            let this = self.clone();
            tokio::spawn(async move { this.reclaim_loop().await })
        };

        info!(consumer = %self.consumer, "processor loop starting");
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.bus.read_as(&self.consumer, 10, 5000).await {
                Ok(messages) if !messages.is_empty() => {
                    for (id, fields) in messages {
                        self.metrics.processor_consumed_total.inc();
                        self.process_message(&id, fields).await;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(err = ?e, "bus read failed — retrying shortly");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }

        if let Err(e) = self.analytics.flush().await {
            error!(err = %e, "final analytics flush failed during shutdown");
        }
        reclaim_handle.abort();
        info!("processor loop stopped");
    }

    async fn process_message(&self, id: &str, fields: BTreeMap<String, String>) {
        let event = match parse_fields(&fields) {
            Ok(event) => event,
            Err(e) => {
                // Malformed stored message: a permanent error, not
                // redelivery-worthy. Ack it so it does not wedge the group.
                error!(err = %e, message_id = id, "failed to parse bus message — dropping");
                let _ = self.bus.ack(id).await;
                return;
            }
        };

        let enriched = enrich(event);

        let rules = self.rules.current();
        let matching: Vec<_> = rules
            .iter()
            .filter_map(|r| evaluate_rule(r, &enriched))
            .collect();
        for alert in &matching {
            self.metrics.alerts_fired_total.inc();
            let notifiers = self.notifiers.clone();
            let alert = alert.clone();
            tokio::spawn(async move {
                fan_out(&notifiers, &alert).await;
            });
        }

        match self.analytics.insert(&enriched).await {
            Ok(()) => {
                self.metrics
                    .analytics_buffer_depth
                    .set(self.analytics.buffered_count() as i64);
                if let Err(e) = self.bus.ack(id).await {
                    warn!(err = ?e, message_id = id, "ack failed — message will be redelivered");
                } else {
                    self.metrics.processor_acked_total.inc();
                }
            }
            Err(e) => {
                // Do not ack on write failure; the bus redelivers.
                error!(err = %e, message_id = id, "analytics write failed — leaving unacked");
            }
        }
    }

    async fn reclaim_loop(&self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            match self.bus.pending_range(100).await {
                Ok(pending) => {
                    let idle_ids: Vec<String> = pending
                        .iter()
                        .filter(|p| p.idle_ms as u128 >= self.claim_idle.as_millis())
                        .map(|p| p.id.clone())
                        .collect();
                    if idle_ids.is_empty() {
                        continue;
                    }
                    match self
                        .bus
                        .claim(&self.consumer, self.claim_idle.as_millis() as i64, &idle_ids)
                        .await
                    {
                        Ok(claimed) => {
                            self.metrics
                                .processor_reclaimed_total
                                .inc_by(claimed.len() as u64);
                            for (id, fields) in claimed {
                                self.process_message(&id, fields).await;
                            }
                        }
                        Err(e) => warn!(err = ?e, "claim failed"),
                    }
                }
                Err(e) => warn!(err = ?e, "pending_range failed"),
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid json in field {0}: {1}")]
    InvalidJson(&'static str, String),
}

fn parse_fields(fields: &BTreeMap<String, String>) -> Result<crate::model::EventEnvelope, ParseError> {
    let get = |k: &'static str| fields.get(k).cloned().ok_or(ParseError::MissingField(k));

    let event_type_str = get("type")?;
    let body: Value = serde_json::from_str(fields.get("body").map(String::as_str).unwrap_or("null"))
        .map_err(|e| ParseError::InvalidJson("body", e.to_string()))?;
    let context: Option<Value> = fields
        .get("context")
        .filter(|s| s.as_str() != "null")
        .map(|s| serde_json::from_str(s))
        .transpose()
        .map_err(|e: serde_json::Error| ParseError::InvalidJson("context", e.to_string()))?;

    let raw = crate::model::RawEnvelope {
        event_id: Some(get("event_id")?),
        project_id: get("project_id")?,
        event_type: event_type_str,
        timestamp: get("timestamp")
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        sdk: Some(crate::model::event::SdkInfo {
            name: fields.get("sdk_name").cloned().unwrap_or_default(),
            version: fields.get("sdk_version").cloned().unwrap_or_default(),
        }),
        context,
        body,
        trace_id: None,
        parent_event_id: None,
    };

    let mut event = raw
        .into_canonical()
        .map_err(|e| ParseError::InvalidJson("body", e.to_string()))?;
    event.queued_at = fields
        .get("queued_at")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawEnvelope;

    #[test]
    fn parse_fields_round_trips_to_bus_and_back() {
        let raw = RawEnvelope {
            event_id: Some("evt_1".into()),
            project_id: "p1".into(),
            event_type: "log".into(),
            timestamp: None,
            sdk: None,
            context: None,
            body: serde_json::json!({"level": "info", "message": "hi"}),
            trace_id: None,
            parent_event_id: None,
        };
        let mut event = raw.into_canonical().unwrap();
        event.queued_at = Some(Utc::now());

        let fields = to_bus_fields(&event);
        let parsed = parse_fields(&fields).unwrap();

        assert_eq!(parsed.event_id, event.event_id);
        assert_eq!(parsed.project_id, event.project_id);
    }

    #[test]
    fn parse_fields_rejects_missing_required_field() {
        let mut fields = BTreeMap::new();
        fields.insert("project_id".to_string(), "p1".to_string());
        assert!(parse_fields(&fields).is_err());
    }
}
