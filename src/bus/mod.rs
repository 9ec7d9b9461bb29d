//! Durable event bus: an append-only, consumer-group-aware log, backed by
//! Redis Streams, with a bounded in-memory fallback when Redis is
//! unreachable.
//!
//! The contract (§4.5) is implementation-independent: `append`,
//! `create_group`, `read_as`, `ack`, `pending_range`, `claim`. Two
//! implementations satisfy it here; `DurableBus` picks between them and
//! exposes the health-check mode.

mod memory;
mod redis_stream;

pub use memory::MemoryBus;
pub use redis_stream::RedisBus;

use crate::error::BusError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub const STREAM_KEY: &str = "lynex:events:incoming";
pub const GROUP_NAME: &str = "lynex-processors";

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: String,
    pub idle_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMode {
    Durable,
    MemoryFallback,
}

/// Facade over the durable bus that transparently falls back to an
/// in-memory ring when Redis is unavailable at append time. The fallback
/// flag latches to `MemoryFallback` on the first failure and is only
/// cleared by a successful subsequent append against Redis — flapping
/// between modes mid-stream would make "memory-mode events are not
/// replayed" an even worse guarantee than it already is.
pub struct DurableBus {
    redis: RedisBus,
    memory: MemoryBus,
    degraded: AtomicBool,
}

impl DurableBus {
    pub fn new(redis: RedisBus, memory_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            redis,
            memory: MemoryBus::new(memory_capacity),
            degraded: AtomicBool::new(false),
        })
    }

    pub fn mode(&self) -> BusMode {
        if self.degraded.load(Ordering::Relaxed) {
            BusMode::MemoryFallback
        } else {
            BusMode::Durable
        }
    }

    pub async fn append(&self, fields: BTreeMap<String, String>) -> Result<String, BusError> {
        match self.redis.append(STREAM_KEY, fields.clone()).await {
            Ok(id) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    tracing::info!("durable bus connection restored");
                }
                Ok(id)
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!(err = ?e, "durable bus unavailable — falling back to in-memory ring");
                }
                self.memory.append(fields)
            }
        }
    }

    pub async fn create_group(&self) -> Result<(), BusError> {
        self.redis.create_group(STREAM_KEY, GROUP_NAME).await
    }

    pub async fn read_as(
        &self,
        consumer: &str,
        max_count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, BTreeMap<String, String>)>, BusError> {
        self.redis
            .read_as(STREAM_KEY, GROUP_NAME, consumer, max_count, block_ms)
            .await
    }

    pub async fn ack(&self, message_id: &str) -> Result<(), BusError> {
        self.redis.ack(STREAM_KEY, GROUP_NAME, message_id).await
    }

    pub async fn pending_range(&self, count: usize) -> Result<Vec<PendingMessage>, BusError> {
        self.redis.pending_range(STREAM_KEY, GROUP_NAME, count).await
    }

    pub async fn claim(
        &self,
        consumer: &str,
        min_idle_ms: i64,
        ids: &[String],
    ) -> Result<Vec<(String, BTreeMap<String, String>)>, BusError> {
        self.redis
            .claim(STREAM_KEY, GROUP_NAME, consumer, min_idle_ms, ids)
            .await
    }

    /// Queue stats for `/health/queue`.
    pub async fn stats(&self) -> QueueStats {
        if self.degraded.load(Ordering::Relaxed) {
            let (len, first, last) = self.memory.stats();
            QueueStats {
                length: len as u64,
                first_id: first,
                last_id: last,
                mode: BusMode::MemoryFallback,
            }
        } else {
            match self.redis.len(STREAM_KEY).await {
                Ok(len) => QueueStats {
                    length: len,
                    first_id: None,
                    last_id: None,
                    mode: BusMode::Durable,
                },
                Err(_) => QueueStats {
                    length: 0,
                    first_id: None,
                    last_id: None,
                    mode: BusMode::Durable,
                },
            }
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub length: u64,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
    #[serde(rename = "mode")]
    pub mode: BusMode,
}

impl serde::Serialize for BusMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(match self {
            BusMode::Durable => "durable",
            BusMode::MemoryFallback => "memory_fallback",
        })
    }
}
