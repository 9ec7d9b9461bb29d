//! Notifier fan-out: webhook, chat, and console sinks. Each implements the
//! same `send(alert)` operation; the engine invokes all configured
//! notifiers concurrently and aggregates results for logging only — one
//! notifier's failure never affects another, and the engine never retries
//! a failed notification (§4.13).

mod chat;
mod console;
mod webhook;

pub use chat::ChatNotifier;
pub use console::ConsoleNotifier;
pub use webhook::WebhookNotifier;

use crate::model::Alert;
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SendResult {
    pub channel: &'static str,
    pub success: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &Alert) -> SendResult;
}

/// Fan out one alert to every configured notifier concurrently.
pub async fn fan_out(notifiers: &[Arc<dyn Notifier>], alert: &Alert) -> Vec<SendResult> {
    let futures = notifiers.iter().map(|n| n.send(alert));
    let results = join_all(futures).await;
    for r in &results {
        if !r.success {
            warn!(
                channel = r.channel,
                error = r.error.as_deref().unwrap_or(""),
                rule_id = %alert.rule_id,
                "notifier delivery failed — dropping this notification"
            );
        }
    }
    results
}
