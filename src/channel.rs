//! A single named, typed channel: publish-order id counter, state store,
//! subscriber set, and publish-side stats.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::task::JoinSet;

use crate::ids::{CorrelationId, MessageId, MessageIdAllocator, SubscriptionId};
use crate::message::{Message, SubscriptionInfo, now_ticks};
use crate::state_store::StateStore;
use crate::stats::{ChannelStats, SubscriptionStats};
use crate::subscription::pipeline::SubscriberInbox;

/// Diagnostic metadata tracked per subscriber alongside its delivery inbox, so
/// `getChannelSubscriptions` can answer without touching the generic pipeline.
pub struct SubscriberMeta {
    pub subscription_name: Option<String>,
    pub channel_pattern: String,
    pub is_wildcard: bool,
    pub stats: Arc<SubscriptionStats>,
}

struct SubscriberEntry<T> {
    inbox: Arc<SubscriberInbox<T>>,
    meta: Arc<SubscriberMeta>,
}

pub struct TypedChannel<T> {
    name: String,
    id_alloc: MessageIdAllocator,
    state_store: StateStore<T>,
    subscribers: RwLock<HashMap<SubscriptionId, SubscriberEntry<T>>>,
    stats: ChannelStats,
}

impl<T: Clone + Send + Sync + 'static> TypedChannel<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_alloc: MessageIdAllocator::new(),
            state_store: StateStore::new(),
            subscribers: RwLock::new(HashMap::new()),
            stats: ChannelStats::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn next_message_id(&self) -> MessageId {
        self.id_alloc.next()
    }

    /// Publishes `body`, updating the state store (if requested) and fanning the
    /// message out to a snapshot of the current subscriber set. Each subscriber's
    /// offer runs independently and concurrently so one slow `WaitForSpace`
    /// subscriber cannot delay delivery to the others.
    #[tracing::instrument(skip(self, body), fields(channel = %self.name))]
    pub async fn publish(
        &self,
        body: T,
        correlation_id: CorrelationId,
        key: Option<Arc<str>>,
        store: bool,
        from_tag: Option<Arc<str>>,
    ) -> Message<T> {
        let msg = Message {
            id: self.next_message_id(),
            correlation_id,
            key: key.clone(),
            from_tag: from_tag.clone(),
            inception_ticks: now_ticks(),
            body,
        };

        if store {
            if let Some(key) = &key {
                self.state_store.upsert(key.clone(), msg.clone()).await;
            }
        }

        let inboxes: Vec<_> = {
            let guard = self.subscribers.read().unwrap();
            guard.values().map(|e| e.inbox.clone()).collect()
        };

        let mut set = JoinSet::new();
        for inbox in inboxes {
            let msg = msg.clone();
            set.spawn(async move {
                inbox.offer(msg).await;
            });
        }
        while set.join_next().await.is_some() {}

        self.stats.record_publish(msg.inception_ticks, from_tag);
        msg
    }

    /// Synchronous so a wildcard binder can register a subscriber inline,
    /// inside the same non-async path that creates the channel, with no
    /// window for a publish to snapshot the subscriber set first.
    pub fn add_subscriber(
        &self,
        id: SubscriptionId,
        inbox: Arc<SubscriberInbox<T>>,
        meta: Arc<SubscriberMeta>,
    ) {
        self.subscribers
            .write()
            .unwrap()
            .insert(id, SubscriberEntry { inbox, meta });
    }

    pub fn remove_subscriber(&self, id: &SubscriptionId) {
        self.subscribers.write().unwrap().remove(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    pub fn subscription_infos(&self) -> Vec<SubscriptionInfo> {
        let guard = self.subscribers.read().unwrap();
        guard
            .iter()
            .map(|(id, entry)| {
                let stats = entry.meta.stats.snapshot();
                SubscriptionInfo {
                    id: *id,
                    subscription_name: entry.meta.subscription_name.clone(),
                    channel_pattern: entry.meta.channel_pattern.clone(),
                    queue_depth: stats.queue_depth,
                    dropped_count: stats.dropped,
                    timeout_count: stats.timeouts,
                    processed_count: stats.processed,
                    is_wildcard: entry.meta.is_wildcard,
                }
            })
            .collect()
    }

    pub async fn state_snapshot(&self) -> Vec<Message<T>> {
        self.state_store.snapshot().await
    }

    pub async fn stored_message_count(&self) -> usize {
        self.state_store.len().await
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inbox_counting(
        counter: Arc<AtomicUsize>,
    ) -> (
        Arc<crate::subscription::pipeline::SubscriberInbox<i32>>,
        Arc<SubscriberMeta>,
    ) {
        use crate::subscription::context::CancellationSignal;
        use crate::subscription::options::SubscribeOptions;

        let stats = Arc::new(SubscriptionStats::new(
            crate::subscription::options::StatsOptions::default(),
        ));
        let faulted = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let signal = CancellationSignal::new();
        let handler: crate::subscription::pipeline::Handler<i32> = {
            let counter = counter.clone();
            Arc::new(move |_msg| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as crate::subscription::pipeline::HandlerFuture
            })
        };
        let handles = crate::subscription::pipeline::spawn(
            SubscriptionId::new(),
            "test".to_string(),
            &SubscribeOptions::new(),
            signal,
            stats.clone(),
            faulted,
            vec![],
            handler,
            None,
        );
        let meta = Arc::new(SubscriberMeta {
            subscription_name: None,
            channel_pattern: "test".to_string(),
            is_wildcard: false,
            stats,
        });
        (handles.inbox, meta)
    }

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let channel = TypedChannel::<i32>::new("orders");
        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_b = Arc::new(AtomicUsize::new(0));
        let (inbox_a, meta_a) = inbox_counting(counter_a.clone());
        let (inbox_b, meta_b) = inbox_counting(counter_b.clone());
        channel.add_subscriber(SubscriptionId::new(), inbox_a, meta_a);
        channel.add_subscriber(SubscriptionId::new(), inbox_b, meta_b);

        channel
            .publish(42, CorrelationId(1), None, false, None)
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(counter_a.load(Ordering::SeqCst), 1);
        assert_eq!(counter_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_true_with_key_populates_state_store() {
        let channel = TypedChannel::<i32>::new("orders");
        channel
            .publish(1, CorrelationId(1), Some(Arc::from("k1")), true, None)
            .await;
        assert_eq!(channel.stored_message_count().await, 1);
        let snapshot = channel.state_snapshot().await;
        assert_eq!(snapshot[0].body, 1);
    }

    #[tokio::test]
    async fn message_ids_increase_across_publishes() {
        let channel = TypedChannel::<i32>::new("orders");
        let m1 = channel.publish(1, CorrelationId(1), None, false, None).await;
        let m2 = channel.publish(2, CorrelationId(2), None, false, None).await;
        assert!(m1.id < m2.id);
    }
}
