//! Ingest admission HTTP surface: `POST /api/v1/events`,
//! `/api/v1/events/batch`, `/health`, `/health/queue`, `/metrics`.

pub mod routes;

use crate::billing::BillingEngine;
use crate::bus::DurableBus;
use crate::credentials::CredentialStore;
use crate::metrics::Metrics;
use crate::usage::UsageAccountant;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct IngestContext {
    pub bus: Arc<DurableBus>,
    pub credentials: Arc<CredentialStore>,
    pub usage: Arc<UsageAccountant>,
    pub billing: Arc<BillingEngine>,
    pub pool: PgPool,
    pub metrics: Arc<Metrics>,
    pub started_at: Instant,
    /// `WHOP_WEBHOOK_SECRET` — `None` bypasses signature verification.
    pub webhook_secret: Option<String>,
}

pub fn router(ctx: IngestContext) -> axum::Router {
    routes::router(ctx)
}
