//! Per-channel last-value-per-key snapshot store.
//!
//! Only messages published with `store = true` and a non-empty key are retained.
//! Entries never expire by age; the store is cleared only when the owning channel
//! is removed. Snapshot iteration reflects a coherent view: it clones the map under
//! a single read-lock acquisition rather than iterating the live map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::message::Message;

pub struct StateStore<T> {
    entries: RwLock<HashMap<Arc<str>, Message<T>>>,
}

impl<T> Default for StateStore<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> StateStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, msg), fields(key = %key))]
    pub async fn upsert(&self, key: Arc<str>, msg: Message<T>) {
        let mut guard = self.entries.write().await;
        guard.insert(key, msg);
    }

    pub async fn try_get(&self, key: &str) -> Option<Message<T>> {
        let guard = self.entries.read().await;
        guard.get(key).cloned()
    }

    /// Returns a coherent point-in-time copy of every retained message.
    #[tracing::instrument(skip(self))]
    pub async fn snapshot(&self) -> Vec<Message<T>> {
        let guard = self.entries.read().await;
        guard.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
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
    async fn upsert_and_get() {
        let store = StateStore::new();
        store.upsert(Arc::from("k1"), msg("a")).await;
        assert_eq!(store.try_get("k1").await.unwrap().body, "a");
        assert!(store.try_get("missing").await.is_none());
    }

    #[tokio::test]
    async fn overwrite_replaces_value_not_count() {
        let store = StateStore::new();
        store.upsert(Arc::from("k1"), msg("a")).await;
        store.upsert(Arc::from("k1"), msg("b")).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.try_get("k1").await.unwrap().body, "b");
    }

    #[tokio::test]
    async fn snapshot_reflects_all_keys() {
        let store = StateStore::new();
        store.upsert(Arc::from("k1"), msg("a")).await;
        store.upsert(Arc::from("k2"), msg("b")).await;
        let mut bodies: Vec<_> = store.snapshot().await.into_iter().map(|m| m.body).collect();
        bodies.sort();
        assert_eq!(bodies, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let store = StateStore::new();
        store.upsert(Arc::from("k1"), msg("a")).await;
        store.clear().await;
        assert!(store.is_empty().await);
    }
}
