use super::IngestContext;
use crate::billing::{verify_signature, WebhookPayload};
use crate::error::{BillingError, IngestError};
use crate::model::{Credential, RawEnvelope};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

const MAX_BATCH_SIZE: usize = 100;

pub fn router(ctx: IngestContext) -> Router {
    Router::new()
        .route("/api/v1/events", post(ingest_single))
        .route("/api/v1/events/batch", post(ingest_batch))
        .route("/api/v1/billing/webhooks/whop", post(billing_webhook))
        .route("/health", get(health))
        .route("/health/queue", get(health_queue))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn authenticate(ctx: &IngestContext, headers: &HeaderMap) -> Result<Credential, IngestError> {
    let key = headers
        .get("X-API-Key")
        .ok_or(IngestError::MissingCredential)?
        .to_str()
        .map_err(|_| IngestError::MalformedCredential)?;

    ctx.credentials.resolve(key).await.map_err(|e| match e {
        crate::credentials::CredentialError::Malformed => IngestError::MalformedCredential,
        crate::credentials::CredentialError::Unauthorized => IngestError::UnauthorizedCredential,
        crate::credentials::CredentialError::Storage(_) => IngestError::UnauthorizedCredential,
    })
}

async fn check_usage(ctx: &IngestContext, credential: &Credential, n: u64) -> Result<(), IngestError> {
    let subscription = ctx
        .billing
        .get_subscription(&credential.user_id)
        .await
        .map_err(|_| IngestError::BusUnavailable)?;

    let (allowed, stats) = ctx
        .usage
        .check_and_increment(&credential.user_id, subscription.tier, n)
        .await;

    if !allowed {
        return Err(IngestError::OverLimit {
            used: stats.used,
            limit: stats.limit.unwrap_or(0),
        });
    }
    Ok(())
}

fn validate_and_stamp(
    raw: RawEnvelope,
    credential: &Credential,
) -> Result<crate::model::EventEnvelope, IngestError> {
    if raw.project_id != credential.project_id {
        // Warn-only: the credential's project id is authoritative
        // downstream; we never reject on this mismatch.
        warn!(
            event_project_id = %raw.project_id,
            credential_project_id = %credential.project_id,
            "event project_id differs from credential project_id"
        );
    }

    let mut event = raw
        .into_canonical()
        .map_err(|e| IngestError::InvalidEnvelope(e.to_string()))?;
    event.project_id = credential.project_id.clone();
    event.queued_at = Some(chrono::Utc::now());
    Ok(event)
}

async fn ingest_single(
    State(ctx): State<IngestContext>,
    headers: HeaderMap,
    Json(raw): Json<RawEnvelope>,
) -> Result<impl IntoResponse, IngestError> {
    let credential = authenticate(&ctx, &headers).await?;
    check_usage(&ctx, &credential, 1).await?;
    let event = validate_and_stamp(raw, &credential)?;

    let fields = crate::model::event::to_bus_fields(&event);
    ctx.bus
        .append(fields)
        .await
        .map_err(|_| IngestError::BusUnavailable)?;

    ctx.metrics.ingest_events_total.inc();

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "event_id": event.event_id })),
    ))
}

async fn ingest_batch(
    State(ctx): State<IngestContext>,
    headers: HeaderMap,
    Json(raws): Json<Vec<RawEnvelope>>,
) -> Result<impl IntoResponse, IngestError> {
    if raws.len() > MAX_BATCH_SIZE {
        return Err(IngestError::BatchTooLarge(raws.len()));
    }

    let credential = authenticate(&ctx, &headers).await?;

    // Charge the whole batch against the monthly counter up front, in one
    // atomic INCRBY, rather than once per event: per-event charging would
    // both serialize N Redis round-trips and leave the counter permanently
    // drifted if the batch is rejected partway through validation.
    check_usage(&ctx, &credential, raws.len() as u64).await?;

    let mut event_ids = Vec::with_capacity(raws.len());
    let mut all_fields = Vec::with_capacity(raws.len());
    for raw in raws {
        let event = validate_and_stamp(raw, &credential)?;
        event_ids.push(event.event_id.clone());
        all_fields.push(crate::model::event::to_bus_fields(&event));
    }

    // Pipelined append in input order; partial failure surfaces as a
    // full-batch 503 so the caller retries the whole batch.
    for fields in all_fields {
        ctx.bus
            .append(fields)
            .await
            .map_err(|_| IngestError::BusUnavailable)?;
    }

    ctx.metrics.ingest_events_total.inc_by(event_ids.len() as u64);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "queued", "count": event_ids.len(), "event_ids": event_ids })),
    ))
}

async fn billing_webhook(
    State(ctx): State<IngestContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, BillingError> {
    let signature = headers
        .get("X-Whop-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(BillingError::SignatureMismatch)?;

    if !verify_signature(&body, signature, ctx.webhook_secret.as_deref()) {
        return Err(BillingError::SignatureMismatch);
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;
    let Some(user_id) = payload.data.user_id.clone() else {
        return Err(BillingError::MalformedPayload("missing data.user_id".to_string()));
    };

    ctx.billing.update_from_webhook(&user_id, &payload).await?;

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}

async fn health(State(ctx): State<IngestContext>) -> impl IntoResponse {
    let degraded = ctx.bus.mode() == crate::bus::BusMode::MemoryFallback;
    Json(json!({ "status": if degraded { "degraded" } else { "healthy" } }))
}

async fn health_queue(State(ctx): State<IngestContext>) -> impl IntoResponse {
    Json(ctx.bus.stats().await)
}

async fn metrics(State(ctx): State<IngestContext>) -> impl IntoResponse {
    match ctx.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
