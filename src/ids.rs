//! Identifier types used throughout CrossBar.
//!
//! `SubscriptionId` follows the time-ordered UUID v7 convention; the per-channel
//! message `Id` and the process-wide `CorrelationId` are plain strictly-increasing
//! counters, since ordering (not global uniqueness across restarts) is what the
//! pipeline depends on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use uuid::Uuid;

/// A unique, time-ordered subscription identifier based on UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Monotonically increasing per-channel message id (`Message<T>::id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates strictly increasing `MessageId`s for a single channel.
#[derive(Debug, Default)]
pub struct MessageIdAllocator(AtomicU64);

impl MessageIdAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Returns the next id, starting at 1.
    pub fn next(&self) -> MessageId {
        MessageId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Caller-supplied or allocated correlation id, monotonic process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub i64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-wide strictly increasing correlation id generator.
#[derive(Debug, Default)]
pub struct CorrelationIdAllocator(AtomicI64);

impl CorrelationIdAllocator {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_strictly_increasing() {
        let alloc = MessageIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        let c = alloc.next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn correlation_ids_are_strictly_increasing() {
        let alloc = CorrelationIdAllocator::new();
        let ids: Vec<_> = (0..100).map(|_| alloc.next()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn subscription_id_displays_with_prefix() {
        let id = SubscriptionId::new();
        assert!(id.to_string().starts_with("sub_"));
    }
}
