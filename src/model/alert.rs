//! Alert rule and alert instance types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    ErrorCount,
    LatencyThreshold,
    CostThreshold,
    EventMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRule {
    pub rule_id: String,
    pub project_id: String,
    pub name: String,
    pub condition: ConditionKind,
    pub threshold: f64,
    pub severity: Severity,
    pub enabled: bool,
    pub event_type: Option<String>,
    pub field_path: Option<String>,
    pub field_value: Option<String>,
}

/// Ephemeral alert produced during evaluation; never persisted by the
/// rule engine.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub rule_id: String,
    pub rule_name: String,
    pub project_id: String,
    pub severity: Severity,
    pub message: String,
    pub triggering_event_id: Option<String>,
    pub event_type: String,
    pub event_timestamp: chrono::DateTime<chrono::Utc>,
}
