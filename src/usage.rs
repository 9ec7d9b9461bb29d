//! Usage accountant: per-user monthly event counters with fail-open
//! availability semantics.
//!
//! Grounded in the Redis INCR + EXPIRE pattern from the ingest API's rate
//! limiter: one counter key per user per calendar month, given a TTL long
//! enough (32 days) that natural expiry retires old months without an
//! explicit cleanup job.

use crate::model::{Cap, Tier};
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

const COUNTER_TTL_SECS: i64 = 32 * 24 * 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    pub used: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

pub struct UsageAccountant {
    redis: ConnectionManager,
}

impl UsageAccountant {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn counter_key(user_id: &str) -> String {
        format!("usage:{}:{}", user_id, Utc::now().format("%Y-%m"))
    }

    /// Atomically increment the user's monthly counter by `n` and compare
    /// against the tier limit. The increment is never rolled back, even
    /// when it pushes the counter over the limit (a small race-induced
    /// overshoot is accepted by design).
    ///
    /// On counter-store unavailability, fails open: the request is allowed
    /// and the failure is logged, so the accountant can never cause an
    /// ingest outage.
    pub async fn check_and_increment(&self, user_id: &str, tier: Tier, n: u64) -> (bool, UsageStats) {
        let limit = match tier.limits().monthly_events {
            Cap::Unlimited => {
                return (
                    true,
                    UsageStats {
                        used: 0,
                        limit: None,
                        remaining: None,
                    },
                )
            }
            Cap::Finite(limit) => limit,
        };

        let mut conn = self.redis.clone();
        let key = Self::counter_key(user_id);

        let used: redis::RedisResult<i64> = async {
            let used: i64 = conn.incr(&key, n as i64).await?;
            // Only the first increment in a period needs to set the TTL;
            // re-arming it on every call is harmless and self-healing if a
            // prior SETEX-equivalent was lost.
            let _: () = conn.expire(&key, COUNTER_TTL_SECS).await?;
            Ok(used)
        }
        .await;

        match used {
            Ok(used) => {
                let used = used.max(0) as u64;
                let allowed = used <= limit;
                (
                    allowed,
                    UsageStats {
                        used,
                        limit: Some(limit),
                        remaining: Some(limit.saturating_sub(used)),
                    },
                )
            }
            Err(e) => {
                warn!(err = %e, user_id, "usage counter store unavailable — failing open");
                (
                    true,
                    UsageStats {
                        used: 0,
                        limit: Some(limit),
                        remaining: Some(limit),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_key_is_scoped_to_user_and_month() {
        let key = UsageAccountant::counter_key("user_1");
        assert!(key.starts_with("usage:user_1:"));
    }
}
