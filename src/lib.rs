#![warn(missing_docs)]
//! # CrossBar
//!
//! An in-process publish/subscribe message bus for typed, async Rust
//! applications.
//!
//! ## Overview
//!
//! CrossBar routes messages between publishers and subscribers over named
//! channels, each bound to a single Rust type the first time it is used.
//! Beyond a plain fan-out bus, it provides:
//!
//! - **Per-subscriber buffering** with a configurable slow-consumer policy
//!   (skip, fail the subscriber, or make the publisher wait).
//! - **Key-indexed conflation**, collapsing a backlog of same-key updates
//!   down to the latest value on a periodic flush.
//! - **A channel state store**, replaying the last value per key to new
//!   subscribers that ask for it.
//! - **Wildcard routing** (`orders.*`, `orders.>`) binding one subscription
//!   to every channel matching a pattern, now and in the future.
//! - **Stats**: throughput, queue depth, conflation ratio, and percentile
//!   latency/service-time tracking per subscription.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crossbar::prelude::*;
//!
//! #[derive(Clone)]
//! struct OrderFilled {
//!     symbol: String,
//!     quantity: u32,
//! }
//!
//! # async fn run() -> Result<(), CrossBarError> {
//! let bus = CrossBar::new();
//!
//! let subscription = bus
//!     .subscribe(
//!         "orders.filled",
//!         |msg: Message<OrderFilled>| async move {
//!             println!("filled {} x{}", msg.body.symbol, msg.body.quantity);
//!         },
//!         SubscribeOptions::new(),
//!     )
//!     .await?;
//!
//! bus.publish(
//!     "orders.filled",
//!     OrderFilled { symbol: "AAPL".into(), quantity: 10 },
//!     PublishOptions::new(),
//! )
//! .await?;
//!
//! drop(subscription);
//! # Ok(())
//! # }
//! ```

mod channel;
mod channel_name;
mod conflation;
mod config;
mod crossbar;
mod error;
mod ids;
mod message;
mod registry;
mod state_store;
mod stats;
mod subscription;
mod system_channels;
mod wildcard;

pub use config::CrossBarConfig;
pub use crossbar::{CrossBar, PublishOptions};
pub use error::{CrossBarError, CrossBarResult};
pub use ids::{CorrelationId, MessageId, SubscriptionId};
pub use message::{ChannelInfo, Message, SubscriptionInfo, TimeoutFailure};
pub use stats::SubscriptionStatsSnapshot;
pub use subscription::{
    BufferCapacity, ConflationInterval, OnTimeout, SlowConsumerStrategy, StatsOptions,
    SubscribeOptions, Subscription, SubscriptionState,
};
pub use system_channels::{ErrorReport, ErrorSeverity, ErrorType, LifecycleEvent, OverviewSnapshot};

/// Re-exports the types most callers need for a single `use crossbar::prelude::*;`.
pub mod prelude {
    pub use crate::{
        BufferCapacity,
        ChannelInfo,
        ConflationInterval,
        CorrelationId,
        CrossBar,
        CrossBarConfig,
        CrossBarError,
        CrossBarResult,
        ErrorReport,
        ErrorSeverity,
        ErrorType,
        LifecycleEvent,
        Message,
        MessageId,
        OnTimeout,
        OverviewSnapshot,
        PublishOptions,
        SlowConsumerStrategy,
        StatsOptions,
        SubscribeOptions,
        Subscription,
        SubscriptionId,
        SubscriptionInfo,
        SubscriptionState,
        SubscriptionStatsSnapshot,
        TimeoutFailure,
    };
}
