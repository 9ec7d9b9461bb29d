//! Buffered, batched inserter into the columnar analytics store.
//!
//! `insert` appends to an in-memory buffer; once the buffer reaches the
//! flush threshold it drains to ClickHouse in a single batched write.
//! `flush` is explicit and is also invoked on shutdown.

pub mod schema;

use crate::error::AnalyticsError;
use crate::model::EventEnvelope;
use crate::retry::{retry_with_backoff, RetryConfig};
use clickhouse::Client;
use schema::EventRow;
use std::sync::Mutex;
use tracing::{error, info};

const DEFAULT_FLUSH_THRESHOLD: usize = 100;

pub struct AnalyticsWriter {
    client: Client,
    buffer: Mutex<Vec<EventRow>>,
    flush_threshold: usize,
}

impl AnalyticsWriter {
    /// Connect to ClickHouse, retrying with backoff up to 5 attempts.
    pub async fn connect(url: &str, database: &str, user: &str, password: &str) -> Result<Self, AnalyticsError> {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user)
            .with_password(password);

        let config = RetryConfig {
            max_attempts: 5,
            ..RetryConfig::default()
        };
        retry_with_backoff(&config, || async {
            client
                .query("SELECT 1")
                .execute()
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(AnalyticsError::Connection)?;

        Ok(Self {
            client,
            buffer: Mutex::new(Vec::new()),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        })
    }

    /// Append an event to the buffer, flushing if the threshold is reached.
    pub async fn insert(&self, event: &EventEnvelope) -> Result<(), AnalyticsError> {
        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.push(EventRow::from_envelope(event));
            buffer.len() >= self.flush_threshold
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Drain the buffer and write it in a single batched insert, wrapped
    /// in exponential backoff (base 1s, cap 10s, up to 3 attempts).
    ///
    /// On failure, the batch is re-prepended to the buffer so the caller
    /// (the processor) can decide not to ack — the bus will redeliver.
    /// Downstream duplicates from this are expected and absorbed by the
    /// analytics table's merge-time dedup on `event_id`.
    pub async fn flush(&self) -> Result<(), AnalyticsError> {
        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            std::mem::take(&mut *buffer)
        };
        if batch.is_empty() {
            return Ok(());
        }

        let config = RetryConfig {
            max_attempts: 3,
            initial_delay: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(10),
            multiplier: 2.0,
        };

        let result = retry_with_backoff(&config, || async {
            let mut insert = self
                .client
                .insert("events")
                .map_err(|e| e.to_string())?;
            for row in &batch {
                insert.write(row).await.map_err(|e| e.to_string())?;
            }
            insert.end().await.map_err(|e| e.to_string())
        })
        .await;

        match result {
            Ok(()) => {
                info!(count = batch.len(), "analytics batch flushed");
                Ok(())
            }
            Err(e) => {
                error!(err = %e, count = batch.len(), "analytics write failed — re-buffering");
                let mut buffer = self.buffer.lock().unwrap();
                let mut restored = batch;
                restored.extend(std::mem::take(&mut *buffer));
                *buffer = restored;
                Err(AnalyticsError::Write(e))
            }
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}
