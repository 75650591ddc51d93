//! Reserved system channel bodies: `$channel.lifecycle` and `$channel.errors`.
//!
//! Names beginning with the configured system prefix are reserved; CrossBar
//! publishes onto these two internal channels itself when the corresponding
//! config flags are enabled.

use serde::{Deserialize, Serialize};

use crate::ids::SubscriptionId;
use crate::message::now_ticks;

pub fn lifecycle_channel_name(prefix: char) -> String {
    format!("{prefix}channel.lifecycle")
}

pub fn error_channel_name(prefix: char) -> String {
    format!("{prefix}channel.errors")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    ChannelCreated { channel: String },
    SubscriptionAdded { channel: String, subscription: SubscriptionId },
    SubscriptionRemoved { channel: String, subscription: SubscriptionId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    Timeout,
    PublishFailure,
    TypeMismatch,
    InvalidOperation,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub id: u64,
    pub timestamp_utc: u128,
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub channel_name: Option<String>,
    pub subscription_id: Option<SubscriptionId>,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl ErrorReport {
    pub fn new(
        id: u64,
        error_type: ErrorType,
        severity: ErrorSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            timestamp_utc: now_ticks(),
            error_type,
            severity,
            channel_name: None,
            subscription_id: None,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel_name = Some(channel.into());
        self
    }

    pub fn with_subscription(mut self, subscription: SubscriptionId) -> Self {
        self.subscription_id = Some(subscription);
        self
    }
}

/// Totals exposed to reporting collaborators outside this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverviewSnapshot {
    pub total_channels: usize,
    pub total_subscriptions: usize,
    pub wildcard_subscriptions: usize,
    pub aggregate_throughput: f64,
    pub total_published: u64,
    pub total_processed: u64,
    pub total_timed_out: u64,
    pub subscriptions_with_backlog: usize,
}
