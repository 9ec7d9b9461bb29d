//! Cold-tier archiver: periodic export of aged analytics rows to object
//! storage, grouped by year-month, with an optional tombstone delete.

use crate::analytics::schema::EventRow;
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::metrics::Metrics;
use crate::model::{DeadLetterRecord, DeadLetterSource, DeadLetterStatus};
use crate::retry::{retry_with_backoff, RetryConfig};
use arrow::array::{Float32Array, Float64Array, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{Duration, Utc};
use clickhouse::Client;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct Archiver {
    clickhouse: Client,
    s3: aws_sdk_s3::Client,
    pool: PgPool,
    config: ArchiveConfig,
    metrics: Arc<Metrics>,
}

impl Archiver {
    pub fn new(
        clickhouse: Client,
        s3: aws_sdk_s3::Client,
        pool: PgPool,
        config: ArchiveConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            clickhouse,
            s3,
            pool,
            config,
            metrics,
        }
    }

    /// Run forever, sleeping `config.interval` between cycles.
    pub async fn run_forever(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.interval).await;
            self.run_cycle().await;
        }
    }

    /// One archival cycle: select aged rows, group by month, write+upload
    /// each group, optionally delete. A failure in one month-batch does
    /// not abort the cycle for other months.
    pub async fn run_cycle(&self) {
        let Some(bucket) = &self.config.bucket else {
            warn!("S3_ARCHIVE_BUCKET not configured — skipping archive cycle");
            return;
        };

        let cutoff = Utc::now() - Duration::days(self.config.after_days);
        let rows = match self.select_aged_rows(cutoff).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(err = %e, "archive cycle: row selection failed, skipping this cycle");
                return;
            }
        };
        if rows.is_empty() {
            return;
        }

        let by_month = group_by_month(rows);
        for (month, group) in by_month {
            if let Err(e) = self.archive_month(bucket, &month, group).await {
                error!(err = %e, month, "archive cycle: month-batch failed, continuing with others");
            }
        }
    }

    async fn select_aged_rows(&self, cutoff: chrono::DateTime<Utc>) -> Result<Vec<EventRow>, ArchiveError> {
        #[derive(clickhouse::Row, serde::Deserialize)]
        struct Selected {
            event_id: String,
            project_id: String,
            #[serde(rename = "type")]
            event_type: String,
            timestamp: chrono::DateTime<Utc>,
            sdk_name: String,
            sdk_version: String,
            body: String,
            context: String,
            queued_at: chrono::DateTime<Utc>,
            processed_at: chrono::DateTime<Utc>,
            queue_latency_ms: f32,
            estimated_cost_usd: f64,
        }

        let rows: Vec<Selected> = self
            .clickhouse
            .query(
                "SELECT event_id, project_id, type, timestamp, sdk_name, sdk_version, body, \
                 context, queued_at, processed_at, queue_latency_ms, estimated_cost_usd \
                 FROM events WHERE timestamp < ? ORDER BY timestamp LIMIT ?",
            )
            .bind(cutoff)
            .bind(self.config.batch_size as u64)
            .fetch_all()
            .await
            .map_err(|e| ArchiveError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| EventRow {
                event_id: r.event_id,
                project_id: r.project_id,
                event_type: r.event_type,
                timestamp: r.timestamp,
                sdk_name: r.sdk_name,
                sdk_version: r.sdk_version,
                body: r.body,
                context: r.context,
                queued_at: r.queued_at,
                processed_at: r.processed_at,
                queue_latency_ms: r.queue_latency_ms,
                estimated_cost_usd: r.estimated_cost_usd,
            })
            .collect())
    }

    async fn archive_month(
        &self,
        bucket: &str,
        month: &str,
        rows: Vec<EventRow>,
    ) -> Result<(), ArchiveError> {
        let row_count = rows.len();
        let event_ids: Vec<String> = rows.iter().map(|r| r.event_id.clone()).collect();
        let bytes = encode_parquet(&rows)?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let key = format!("{}/{}/events_{}.parquet", self.config.prefix, month, timestamp);

        let upload_result = self.upload_with_retry(bucket, &key, bytes).await;

        match upload_result {
            Ok(()) => {
                info!(bucket, key, rows = row_count, "archive batch uploaded");
                self.metrics
                    .archiver_rows_archived_total
                    .inc_by(row_count as u64);

                if self.config.delete_after_archive {
                    if let Err(e) = self.delete_archived_rows(&event_ids).await {
                        warn!(err = %e, "archived rows uploaded but delete failed; rows remain in hot store");
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.dead_letter_upload(&key, &event_ids, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn upload_with_retry(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        let config = RetryConfig {
            max_attempts: 3,
            ..RetryConfig::default()
        };
        retry_with_backoff(&config, || async {
            self.s3
                .put_object()
                .bucket(bucket)
                .key(key)
                .storage_class(aws_sdk_s3::types::StorageClass::StandardIa)
                .body(ByteStream::from(bytes.clone()))
                .send()
                .await
                .map_err(|e| e.to_string())?;

            // Verification: head_object confirms presence.
            self.s3
                .head_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(ArchiveError::Upload)
    }

    async fn delete_archived_rows(&self, event_ids: &[String]) -> Result<(), ArchiveError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        self.clickhouse
            .query("ALTER TABLE events DELETE WHERE event_id IN ?")
            .bind(event_ids)
            .execute()
            .await
            .map_err(|e| ArchiveError::Query(e.to_string()))
    }

    async fn dead_letter_upload(&self, key: &str, event_ids: &[String], reason: &str) {
        let record = DeadLetterRecord {
            id: Uuid::new_v4(),
            source: DeadLetterSource::ArchiverUpload,
            payload: serde_json::json!({ "key": key, "event_ids": event_ids }),
            failure_reason: reason.to_string(),
            retry_count: 3,
            status: DeadLetterStatus::PermanentlyFailed,
            created_at: Utc::now(),
            last_attempted_at: Utc::now(),
        };
        if let Err(e) = sqlx::query(
            "INSERT INTO dead_letters (id, source, payload, failure_reason, retry_count, status, \
             created_at, last_attempted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.source)
        .bind(record.payload)
        .bind(record.failure_reason)
        .bind(record.retry_count)
        .bind(record.status)
        .bind(record.created_at)
        .bind(record.last_attempted_at)
        .execute(&self.pool)
        .await
        {
            error!(err = %e, "failed to persist dead-letter record for archiver upload");
        }
    }
}

fn group_by_month(rows: Vec<EventRow>) -> BTreeMap<String, Vec<EventRow>> {
    let mut groups: BTreeMap<String, Vec<EventRow>> = BTreeMap::new();
    for row in rows {
        let month = row.timestamp.format("%Y-%m").to_string();
        groups.entry(month).or_default().push(row);
    }
    groups
}

fn encode_parquet(rows: &[EventRow]) -> Result<Vec<u8>, ArchiveError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("event_id", DataType::Utf8, false),
        Field::new("project_id", DataType::Utf8, false),
        Field::new("type", DataType::Utf8, false),
        Field::new("timestamp", DataType::Timestamp(TimeUnit::Second, None), false),
        Field::new("sdk_name", DataType::Utf8, false),
        Field::new("sdk_version", DataType::Utf8, false),
        Field::new("body", DataType::Utf8, false),
        Field::new("context", DataType::Utf8, false),
        Field::new("queued_at", DataType::Timestamp(TimeUnit::Second, None), false),
        Field::new("processed_at", DataType::Timestamp(TimeUnit::Second, None), false),
        Field::new("queue_latency_ms", DataType::Float32, false),
        Field::new("estimated_cost_usd", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.event_id.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.project_id.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.event_type.as_str()))),
            Arc::new(TimestampSecondArray::from_iter_values(
                rows.iter().map(|r| r.timestamp.timestamp()),
            )),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.sdk_name.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.sdk_version.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.body.as_str()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.context.as_str()))),
            Arc::new(TimestampSecondArray::from_iter_values(
                rows.iter().map(|r| r.queued_at.timestamp()),
            )),
            Arc::new(TimestampSecondArray::from_iter_values(
                rows.iter().map(|r| r.processed_at.timestamp()),
            )),
            Arc::new(Float32Array::from_iter_values(rows.iter().map(|r| r.queue_latency_ms))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.estimated_cost_usd))),
        ],
    )
    .map_err(|e| ArchiveError::Encode(e.to_string()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut buffer = Vec::new();
    {
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))
            .map_err(|e| ArchiveError::Encode(e.to_string()))?;
        writer
            .write(&batch)
            .map_err(|e| ArchiveError::Encode(e.to_string()))?;
        writer.close().map_err(|e| ArchiveError::Encode(e.to_string()))?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(event_id: &str, month: &str) -> EventRow {
        let timestamp = chrono::DateTime::parse_from_rfc3339(&format!("{month}-15T00:00:00Z"))
            .unwrap()
            .with_timezone(&Utc);
        EventRow {
            event_id: event_id.to_string(),
            project_id: "p1".to_string(),
            event_type: "log".to_string(),
            timestamp,
            sdk_name: "sdk".to_string(),
            sdk_version: "1.0".to_string(),
            body: "{}".to_string(),
            context: "null".to_string(),
            queued_at: timestamp,
            processed_at: timestamp,
            queue_latency_ms: 0.0,
            estimated_cost_usd: 0.0,
        }
    }

    #[test]
    fn groups_rows_by_year_month() {
        let rows = vec![
            sample_row("a", "2024-01"),
            sample_row("b", "2024-01"),
            sample_row("c", "2024-02"),
        ];
        let groups = group_by_month(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["2024-01"].len(), 2);
        assert_eq!(groups["2024-02"].len(), 1);
    }

    #[test]
    fn encodes_rows_to_nonempty_parquet_bytes() {
        let rows = vec![sample_row("a", "2024-01")];
        let bytes = encode_parquet(&rows).unwrap();
        assert!(!bytes.is_empty());
    }
}
