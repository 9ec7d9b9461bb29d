//! Prometheus text-format metrics exposition.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub ingest_events_total: IntCounter,
    pub processor_consumed_total: IntCounter,
    pub processor_acked_total: IntCounter,
    pub processor_reclaimed_total: IntCounter,
    pub alerts_fired_total: IntCounter,
    pub analytics_buffer_depth: IntGauge,
    pub archiver_rows_archived_total: IntCounter,
    pub bus_memory_fallback_dropped_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        macro_rules! counter {
            ($name:literal, $help:literal) => {{
                let c = IntCounter::new($name, $help).unwrap();
                registry.register(Box::new(c.clone())).unwrap();
                c
            }};
        }
        macro_rules! gauge {
            ($name:literal, $help:literal) => {{
                let g = IntGauge::new($name, $help).unwrap();
                registry.register(Box::new(g.clone())).unwrap();
                g
            }};
        }

        Self {
            ingest_events_total: counter!("lynex_ingest_events_total", "events accepted at ingest"),
            processor_consumed_total: counter!(
                "lynex_processor_consumed_total",
                "bus messages consumed by the processor"
            ),
            processor_acked_total: counter!(
                "lynex_processor_acked_total",
                "bus messages acknowledged by the processor"
            ),
            processor_reclaimed_total: counter!(
                "lynex_processor_reclaimed_total",
                "pending messages reclaimed from idle consumers"
            ),
            alerts_fired_total: counter!("lynex_alerts_fired_total", "alerts fired by the rule engine"),
            analytics_buffer_depth: gauge!(
                "lynex_analytics_buffer_depth",
                "events currently buffered awaiting analytics flush"
            ),
            archiver_rows_archived_total: counter!(
                "lynex_archiver_rows_archived_total",
                "rows exported to cold-tier object storage"
            ),
            bus_memory_fallback_dropped_total: counter!(
                "lynex_bus_memory_fallback_dropped_total",
                "events dropped from the in-memory fallback ring because it was full"
            ),
            registry,
        }
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
