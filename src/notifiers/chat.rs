use super::{Notifier, SendResult};
use crate::model::{Alert, Severity};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Posts a pre-formatted block payload to a chat webhook (Slack-compatible
/// `blocks` shape).
pub struct ChatNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl ChatNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            webhook_url: webhook_url.into(),
        }
    }

    fn emoji(severity: Severity) -> &'static str {
        match severity {
            Severity::Info => ":information_source:",
            Severity::Warning => ":warning:",
            Severity::Critical => ":rotating_light:",
        }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn send(&self, alert: &Alert) -> SendResult {
        let payload = json!({
            "blocks": [{
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "{} *{}* — {}",
                        Self::emoji(alert.severity),
                        alert.rule_name,
                        alert.message
                    ),
                }
            }]
        });

        match self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => SendResult {
                channel: "chat",
                success: true,
                error: None,
            },
            Ok(resp) => SendResult {
                channel: "chat",
                success: false,
                error: Some(format!("status {}", resp.status())),
            },
            Err(e) => SendResult {
                channel: "chat",
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}
