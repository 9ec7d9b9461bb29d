//! Redis Streams-backed implementation of the durable bus contract.
//!
//! Uses raw `XADD`/`XGROUP`/`XREADGROUP`/`XACK`/`XPENDING`/`XCLAIM` commands
//! via `redis::cmd` rather than the typed streams helpers, so the exact
//! reply shapes are controlled here rather than threaded through generic
//! deserialization.

use crate::bus::PendingMessage;
use crate::error::BusError;
use redis::aio::ConnectionManager;
use redis::{FromRedisValue, RedisResult, Value};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct RedisBus {
    conn: ConnectionManager,
    max_len: usize,
}

impl RedisBus {
    pub fn new(conn: ConnectionManager, max_len: usize) -> Self {
        Self { conn, max_len }
    }

    pub async fn append(
        &self,
        stream: &str,
        fields: BTreeMap<String, String>,
    ) -> Result<String, BusError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*");
        for (k, v) in &fields {
            cmd.arg(k).arg(v);
        }
        let id: String = cmd.query_async(&mut conn).await?;
        Ok(id)
    }

    /// Idempotent group creation. "BUSYGROUP" (already exists) is not an
    /// error.
    pub async fn create_group(&self, stream: &str, group: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_as(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, BTreeMap<String, String>)>, BusError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(max_count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;
        Ok(parse_stream_reply(&reply))
    }

    pub async fn ack(&self, stream: &str, group: &str, message_id: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("XACK")
            .arg(stream)
            .arg(group)
            .arg(message_id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn pending_range(
        &self,
        stream: &str,
        group: &str,
        count: usize,
    ) -> Result<Vec<PendingMessage>, BusError> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok(parse_pending_reply(&reply))
    }

    pub async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: i64,
        ids: &[String],
    ) -> Result<Vec<(String, BTreeMap<String, String>)>, BusError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(stream).arg(group).arg(consumer).arg(min_idle_ms);
        for id in ids {
            cmd.arg(id);
        }
        let reply: Value = cmd.query_async(&mut conn).await?;
        Ok(parse_entries(&reply))
    }

    pub async fn len(&self, stream: &str) -> Result<u64, BusError> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("XLEN").arg(stream).query_async(&mut conn).await?;
        Ok(len)
    }
}

/// `XREADGROUP ... STREAMS key` replies as
/// `[[key, [[id, [field, value, ...]], ...]]]`.
fn parse_stream_reply(value: &Value) -> Vec<(String, BTreeMap<String, String>)> {
    let Value::Array(outer) = value else {
        return Vec::new();
    };
    let mut result = Vec::new();
    for stream_entry in outer {
        if let Value::Array(pair) = stream_entry {
            if let Some(Value::Array(entries)) = pair.get(1) {
                result.extend(parse_entries(&Value::Array(entries.clone())));
            }
        }
    }
    result
}

/// `[[id, [field, value, ...]], ...]` → `[(id, {field: value})]`.
fn parse_entries(value: &Value) -> Vec<(String, BTreeMap<String, String>)> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };
    let mut result = Vec::new();
    for entry in entries {
        let Value::Array(pair) = entry else { continue };
        let Some(id_value) = pair.first() else { continue };
        let Ok(id) = String::from_redis_value(id_value) else { continue };
        let mut map = BTreeMap::new();
        if let Some(Value::Array(kvs)) = pair.get(1) {
            let mut iter = kvs.iter();
            while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                if let (Ok(k), Ok(v)) = (String::from_redis_value(k), String::from_redis_value(v)) {
                    map.insert(k, v);
                }
            }
        }
        result.push((id, map));
    }
    result
}

/// `XPENDING key group - + count` replies as
/// `[[id, consumer, idle_ms, delivery_count], ...]`.
fn parse_pending_reply(value: &Value) -> Vec<PendingMessage> {
    let Value::Array(entries) = value else {
        return Vec::new();
    };
    let mut result = Vec::new();
    for entry in entries {
        let Value::Array(fields) = entry else { continue };
        let Some(id_value) = fields.first() else { continue };
        let Ok(id) = String::from_redis_value(id_value) else { continue };
        let idle_ms = fields
            .get(2)
            .and_then(|v| i64::from_redis_value(v).ok())
            .unwrap_or(0);
        result.push(PendingMessage { id, idle_ms });
    }
    result
}
