pub mod alerts;
pub mod analytics;
pub mod archiver;
pub mod billing;
pub mod bus;
pub mod config;
pub mod credentials;
pub mod enrichment;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notifiers;
pub mod pricing;
pub mod processor;
pub mod retry;
pub mod usage;

use std::sync::Arc;
use std::time::Instant;

use billing::BillingEngine;
use bus::{DurableBus, RedisBus};
use credentials::CredentialStore;
use metrics::Metrics;
use sqlx::PgPool;
use usage::UsageAccountant;

/// Shared state constructed once at startup and handed to whichever
/// binary entry point (`ingest` or `processor`) is running.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<config::Config>,
    pub pool: PgPool,
    pub bus: Arc<DurableBus>,
    pub credentials: Arc<CredentialStore>,
    pub usage: Arc<UsageAccountant>,
    pub billing: Arc<BillingEngine>,
    pub metrics: Arc<Metrics>,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(
        config: Arc<config::Config>,
        pool: PgPool,
        redis: RedisBus,
        redis_conn_for_usage: redis::aio::ConnectionManager,
    ) -> Self {
        let bus = DurableBus::new(redis, config.memory_fallback_capacity);
        let credentials = Arc::new(CredentialStore::new(pool.clone()));
        let usage = Arc::new(UsageAccountant::new(redis_conn_for_usage));
        let billing = Arc::new(BillingEngine::new(pool.clone()));
        let metrics = Arc::new(Metrics::new());

        Self {
            config,
            pool,
            bus,
            credentials,
            usage,
            billing,
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn ingest_context(&self) -> ingest::IngestContext {
        ingest::IngestContext {
            bus: self.bus.clone(),
            credentials: self.credentials.clone(),
            usage: self.usage.clone(),
            billing: self.billing.clone(),
            pool: self.pool.clone(),
            metrics: self.metrics.clone(),
            started_at: self.started_at,
            webhook_secret: self.config.billing.webhook_secret.clone(),
        }
    }
}
