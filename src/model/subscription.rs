//! Subscription entity and tier policy table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
}

/// A count that is either a finite number or explicitly unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    Finite(u64),
    Unlimited,
}

impl Cap {
    pub fn exceeded_by(&self, n: u64) -> bool {
        match self {
            Cap::Finite(limit) => n > *limit,
            Cap::Unlimited => false,
        }
    }
}

/// Literal per-tier policy constants.
#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub monthly_events: Cap,
    pub retention_days: u32,
    pub projects: Cap,
    pub members: Cap,
    pub alert_rules: Cap,
}

impl Tier {
    pub const fn limits(self) -> TierLimits {
        match self {
            Tier::Free => TierLimits {
                monthly_events: Cap::Finite(50_000),
                retention_days: 7,
                projects: Cap::Finite(1),
                members: Cap::Finite(1),
                alert_rules: Cap::Finite(3),
            },
            Tier::Pro => TierLimits {
                monthly_events: Cap::Finite(500_000),
                retention_days: 30,
                projects: Cap::Finite(5),
                members: Cap::Finite(5),
                alert_rules: Cap::Finite(20),
            },
            Tier::Business => TierLimits {
                monthly_events: Cap::Finite(5_000_000),
                retention_days: 90,
                projects: Cap::Unlimited,
                members: Cap::Unlimited,
                alert_rules: Cap::Unlimited,
            },
        }
    }

    /// Map an external plan id to a tier. Unknown plan ids map to free.
    pub fn from_plan_id(plan_id: &str) -> Tier {
        match plan_id {
            "plan_pro" | "plan_pro_monthly" | "plan_pro_annual" => Tier::Pro,
            "plan_business" | "plan_business_monthly" | "plan_business_annual" => Tier::Business,
            _ => Tier::Free,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub user_id: String,
    pub tier: Tier,
    pub external_membership_id: Option<String>,
    pub external_plan_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub events_used: i64,
}

impl Subscription {
    pub fn new_free(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: Tier::Free,
            external_membership_id: None,
            external_plan_id: None,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: now + chrono::Duration::days(30),
            events_used: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_plan_id_maps_to_free() {
        assert_eq!(Tier::from_plan_id("plan_nonexistent"), Tier::Free);
    }

    #[test]
    fn unlimited_cap_is_never_exceeded() {
        assert!(!Cap::Unlimited.exceeded_by(u64::MAX));
    }

    #[test]
    fn finite_cap_exceeded_strictly_above_limit() {
        assert!(!Cap::Finite(50_000).exceeded_by(50_000));
        assert!(Cap::Finite(50_000).exceeded_by(50_001));
    }
}
