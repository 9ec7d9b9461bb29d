use super::{Notifier, SendResult};
use crate::model::{Alert, Severity};
use async_trait::async_trait;

/// ANSI-colored stderr sink. Always succeeds — writing to stderr is not
/// expected to fail in practice, and this is the fallback channel an
/// operator reaches for when nothing else is configured.
pub struct ConsoleNotifier;

fn color_code(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "\x1b[34m",     // blue
        Severity::Warning => "\x1b[33m",  // yellow
        Severity::Critical => "\x1b[31m", // red
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, alert: &Alert) -> SendResult {
        eprintln!(
            "{}[{:?}]\x1b[0m {} — {}",
            color_code(alert.severity),
            alert.severity,
            alert.rule_name,
            alert.message
        );
        SendResult {
            channel: "console",
            success: true,
            error: None,
        }
    }
}
