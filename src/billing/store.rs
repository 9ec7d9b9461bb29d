//! Subscription lifecycle: lazy-created free tier, auto-renewal, and
//! webhook-driven tier transitions.

use crate::billing::webhook::WebhookPayload;
use crate::model::{Subscription, SubscriptionStatus, Tier};
use chrono::{Duration, Utc};
use sqlx::PgPool;

pub struct BillingEngine {
    pool: PgPool,
}

impl BillingEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Return the user's current subscription, creating a free one (30-day
    /// period) if none exists. Free-tier subscriptions past their period
    /// end are atomically auto-renewed (period extended, counter reset);
    /// paid tiers are never auto-extended here — they wait for the
    /// external webhook to reconcile.
    pub async fn get_subscription(&self, user_id: &str) -> Result<Subscription, sqlx::Error> {
        let existing = sqlx::query_as::<_, Subscription>(
            "SELECT user_id, tier, external_membership_id, external_plan_id, status, \
             current_period_start, current_period_end, events_used \
             FROM subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let sub = match existing {
            Some(sub) => sub,
            None => {
                let now = Utc::now();
                let fresh = Subscription::new_free(user_id, now);
                self.upsert(&fresh).await?;
                fresh
            }
        };

        if sub.tier == Tier::Free && Utc::now() > sub.current_period_end {
            let now = Utc::now();
            let renewed = Subscription {
                current_period_start: now,
                current_period_end: now + Duration::days(30),
                events_used: 0,
                ..sub
            };
            self.upsert(&renewed).await?;
            return Ok(renewed);
        }

        Ok(sub)
    }

    /// Apply a verified webhook payload: map plan id to tier, update
    /// external ids and status, and reset the usage counter iff the
    /// billing period genuinely rolled over (start differs by > 24h).
    ///
    /// Open question resolved per the project's stated semantics:
    /// `payment.failed` transitions status to `past_due`; `payment.succeeded`
    /// is a no-op beyond the membership data already carried in the event.
    pub async fn update_from_webhook(
        &self,
        user_id: &str,
        payload: &WebhookPayload,
    ) -> Result<(), sqlx::Error> {
        let mut sub = self.get_subscription(user_id).await?;

        match payload.action.as_str() {
            "membership.went_valid" => {
                let tier = payload
                    .data
                    .plan_id
                    .as_deref()
                    .map(Tier::from_plan_id)
                    .unwrap_or(Tier::Free);
                let new_period_start = payload.data.period_start.unwrap_or(sub.current_period_start);
                let period_rolled_over =
                    (new_period_start - sub.current_period_start).num_hours().abs() > 24;

                sub.tier = tier;
                sub.external_membership_id = payload.data.membership_id.clone();
                sub.external_plan_id = payload.data.plan_id.clone();
                sub.status = SubscriptionStatus::Active;
                sub.current_period_start = new_period_start;
                if let Some(end) = payload.data.period_end {
                    sub.current_period_end = end;
                }
                if period_rolled_over {
                    sub.events_used = 0;
                }
            }
            "membership.went_invalid" => {
                sub.status = SubscriptionStatus::Canceled;
            }
            "payment.failed" => {
                sub.status = SubscriptionStatus::PastDue;
            }
            "payment.succeeded" => {
                // No-op: membership.went_valid already carries the tier and
                // period data this webhook would otherwise duplicate.
            }
            _ => {}
        }

        self.upsert(&sub).await
    }

    async fn upsert(&self, sub: &Subscription) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO subscriptions \
             (user_id, tier, external_membership_id, external_plan_id, status, \
              current_period_start, current_period_end, events_used) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO UPDATE SET \
               tier = EXCLUDED.tier, \
               external_membership_id = EXCLUDED.external_membership_id, \
               external_plan_id = EXCLUDED.external_plan_id, \
               status = EXCLUDED.status, \
               current_period_start = EXCLUDED.current_period_start, \
               current_period_end = EXCLUDED.current_period_end, \
               events_used = EXCLUDED.events_used",
        )
        .bind(&sub.user_id)
        .bind(sub.tier)
        .bind(&sub.external_membership_id)
        .bind(&sub.external_plan_id)
        .bind(sub.status)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .bind(sub.events_used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
