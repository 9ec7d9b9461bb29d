use super::{Notifier, SendResult};
use crate::model::Alert;
use async_trait::async_trait;
use std::time::Duration;

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &Alert) -> SendResult {
        match self.client.post(&self.url).json(alert).send().await {
            Ok(resp) if resp.status().is_success() => SendResult {
                channel: "webhook",
                success: true,
                error: None,
            },
            Ok(resp) => SendResult {
                channel: "webhook",
                success: false,
                error: Some(format!("status {}", resp.status())),
            },
            Err(e) => SendResult {
                channel: "webhook",
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}
