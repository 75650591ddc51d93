//! Per-subscription key-indexed conflation map.
//!
//! Pairs a map (latest pending value per key) with an ordered list (first-arrival
//! order of keys not yet flushed) under one mutex, so flushing is FIFO by first
//! arrival per key without losing the "latest value wins" semantics.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::message::Message;

struct Inner<T> {
    pending: HashMap<Arc<str>, Message<T>>,
    order: Vec<Arc<str>>,
}

pub struct ConflationMap<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for ConflationMap<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }
}

pub enum OfferOutcome {
    /// Key was not already pending; this counts as a fresh enqueue.
    NewKey,
    /// Key was already pending; the stale value was overwritten in place.
    ConflationHit,
}

impl<T> ConflationMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn offer(&self, key: Arc<str>, msg: Message<T>) -> OfferOutcome {
        let mut guard = self.inner.lock().await;
        if guard.pending.contains_key(&key) {
            guard.pending.insert(key, msg);
            OfferOutcome::ConflationHit
        } else {
            guard.order.push(key.clone());
            guard.pending.insert(key, msg);
            OfferOutcome::NewKey
        }
    }

    /// Drains every pending entry in first-arrival order, leaving the map empty.
    pub async fn flush(&self) -> Vec<Message<T>> {
        let mut guard = self.inner.lock().await;
        let order = std::mem::take(&mut guard.order);
        let mut out = Vec::with_capacity(order.len());
        for key in order {
            if let Some(msg) = guard.pending.remove(&key) {
                out.push(msg);
            }
        }
        out
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.pending.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CorrelationId, MessageId};

    fn msg(body: &str) -> Message<String> {
        Message {
            id: MessageId(1),
            correlation_id: CorrelationId(1),
            key: None,
            from_tag: None,
            inception_ticks: 0,
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn same_key_overwrites_without_growing_order() {
        let map = ConflationMap::new();
        map.offer(Arc::from("AAPL"), msg("p0")).await;
        map.offer(Arc::from("AAPL"), msg("p1")).await;
        map.offer(Arc::from("AAPL"), msg("p2")).await;
        assert_eq!(map.len().await, 1);
        let flushed = map.flush().await;
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].body, "p2");
    }

    #[tokio::test]
    async fn distinct_keys_flush_in_first_arrival_order() {
        let map = ConflationMap::new();
        map.offer(Arc::from("b"), msg("v-b")).await;
        map.offer(Arc::from("a"), msg("v-a")).await;
        map.offer(Arc::from("b"), msg("v-b-2")).await;
        let flushed = map.flush().await;
        let bodies: Vec<_> = flushed.iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies, vec!["v-b-2".to_string(), "v-a".to_string()]);
    }

    #[tokio::test]
    async fn flush_empties_the_map() {
        let map = ConflationMap::new();
        map.offer(Arc::from("a"), msg("v")).await;
        map.flush().await;
        assert!(map.is_empty().await);
    }
}
