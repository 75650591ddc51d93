//! Error taxonomy for CrossBar operations.
//!
//! Every caller-visible failure mode is a variant of [`CrossBarError`]. Runtime
//! failures that must not reach the publisher (handler faults, soft timeouts) are
//! represented separately in `system_channels::ErrorReport` and never constructed here.

use thiserror::Error;

use crate::ids::SubscriptionId;

pub type CrossBarResult<T> = Result<T, CrossBarError>;

/// Closed set of failure modes a caller of the public API can observe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrossBarError {
    #[error("invalid channel name {name:?}: {reason}")]
    InvalidChannelName { name: String, reason: String },

    #[error("channel {channel:?} was established with type {expected} but {actual} was requested")]
    ChannelTypeMismatch {
        channel: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("publish to {channel:?} failed: {reason}")]
    FailedPublish { channel: String, reason: String },

    #[error("subscription {subscription} is no longer valid: {reason}")]
    InvalidSubscription {
        subscription: SubscriptionId,
        reason: String,
    },

    #[error("crossbar is shutting down")]
    Closed,
}

impl CrossBarError {
    pub fn invalid_channel_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidChannelName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn type_mismatch(
        channel: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::ChannelTypeMismatch {
            channel: channel.into(),
            expected,
            actual,
        }
    }

    pub fn failed_publish(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FailedPublish {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_subscription(
        subscription: SubscriptionId,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSubscription {
            subscription,
            reason: reason.into(),
        }
    }
}
