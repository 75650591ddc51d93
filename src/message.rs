//! Message and metadata record types.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, MessageId, SubscriptionId};

/// Monotonic "ticks" since an arbitrary epoch, captured at publish time.
///
/// Backed by `SystemTime` rather than `Instant` so that replayed state-store
/// messages can carry a meaningful absolute timestamp across a snapshot boundary.
pub type InceptionTicks = u128;

pub fn now_ticks() -> InceptionTicks {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos()
}

/// An immutable published value, typed by its channel's body type `T`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub id: MessageId,
    pub correlation_id: CorrelationId,
    pub key: Option<Arc<str>>,
    pub from_tag: Option<Arc<str>>,
    pub inception_ticks: InceptionTicks,
    pub body: T,
}

impl<T> Message<T> {
    pub fn map_body<U>(self, f: impl FnOnce(T) -> U) -> Message<U> {
        Message {
            id: self.id,
            correlation_id: self.correlation_id,
            key: self.key,
            from_tag: self.from_tag,
            inception_ticks: self.inception_ticks,
            body: f(self.body),
        }
    }
}

/// Snapshot describing a registered channel, returned from `getChannels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub body_type: &'static str,
    pub subscription_count: usize,
    pub total_published: u64,
    pub stored_message_count: usize,
    pub last_published_at: Option<InceptionTicks>,
    pub last_publisher_tag: Option<Arc<str>>,
    pub publish_rate: f64,
}

/// Snapshot describing a single subscription, returned from `getChannelSubscriptions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub subscription_name: Option<String>,
    pub channel_pattern: String,
    pub queue_depth: usize,
    pub dropped_count: u64,
    pub timeout_count: u64,
    pub processed_count: u64,
    pub is_wildcard: bool,
}

/// Record delivered to an `onTimeout` callback when a handler misses its deadline.
#[derive(Debug, Clone)]
pub struct TimeoutFailure {
    pub subscription: SubscriptionId,
    pub channel: String,
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
}
