//! Bounded in-memory ring used when the durable bus is unreachable.
//!
//! Not durable across restart; this is an explicit availability
//! concession (§4.5). Messages carry synthetic ids prefixed `mem-` so a
//! consumer can tell them apart from real stream ids if it ever needs to.

use crate::error::BusError;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct MemoryBus {
    capacity: usize,
    ring: Mutex<VecDeque<(String, BTreeMap<String, String>)>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            next_id: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn append(&self, fields: BTreeMap<String, String>) -> Result<String, BusError> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("mem-{n}");
        let mut ring = self.ring.lock().unwrap();
        if ring.len() >= self.capacity {
            // Drop-newest: reject the incoming message rather than evict an
            // older one, so delivery order for already-queued messages is
            // preserved.
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(BusError::FallbackFull);
        }
        ring.push_back((id.clone(), fields));
        Ok(id)
    }

    pub fn drain(&self, max: usize) -> Vec<(String, BTreeMap<String, String>)> {
        let mut ring = self.ring.lock().unwrap();
        let n = max.min(ring.len());
        ring.drain(..n).collect()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> (usize, Option<String>, Option<String>) {
        let ring = self.ring.lock().unwrap();
        let first = ring.front().map(|(id, _)| id.clone());
        let last = ring.back().map(|(id, _)| id.clone());
        (ring.len(), first, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_monotonic() {
        let bus = MemoryBus::new(10);
        let a = bus.append(BTreeMap::new()).unwrap();
        let b = bus.append(BTreeMap::new()).unwrap();
        assert!(a.starts_with("mem-"));
        assert!(b.starts_with("mem-"));
        assert_ne!(a, b);
    }

    #[test]
    fn full_ring_drops_newest() {
        let bus = MemoryBus::new(1);
        bus.append(BTreeMap::new()).unwrap();
        assert!(bus.append(BTreeMap::new()).is_err());
        assert_eq!(bus.dropped_count(), 1);
    }

    #[test]
    fn drain_removes_in_order() {
        let bus = MemoryBus::new(10);
        bus.append(BTreeMap::from([("k".to_string(), "1".to_string())]))
            .unwrap();
        bus.append(BTreeMap::from([("k".to_string(), "2".to_string())]))
            .unwrap();
        let drained = bus.drain(10);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].1.get("k").unwrap(), "1");
    }
}
