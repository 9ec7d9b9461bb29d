//! Durable storage for alert rules (admin CRUD surface is out of scope;
//! this is the read side the rule manager polls).

use crate::model::AlertRule;
use sqlx::PgPool;

pub struct RuleStore {
    pool: PgPool,
}

impl RuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load_all(&self) -> Result<Vec<AlertRule>, sqlx::Error> {
        sqlx::query_as::<_, AlertRule>(
            "SELECT rule_id, project_id, name, condition, threshold, severity, enabled, \
             event_type, field_path, field_value FROM alert_rules",
        )
        .fetch_all(&self.pool)
        .await
    }
}
