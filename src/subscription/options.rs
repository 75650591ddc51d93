//! Subscription options: buffer capacity, slow-consumer policy, conflation,
//! handler timeout, and stats parameters.

use std::sync::Arc;
use std::time::Duration;

use crate::message::TimeoutFailure;

/// Policy applied when a subscriber's buffer is full.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SlowConsumerStrategy {
    /// Silently drop the new message and increment `droppedCount` (default).
    #[default]
    SkipUpdates,
    /// Terminate the subscription with a fault.
    FailSubscriber,
    /// Suspend the publisher cooperatively until space exists.
    WaitForSpace,
}

/// Bounded or unbounded subscriber queue length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferCapacity {
    Bounded(usize),
    Unbounded,
}

impl BufferCapacity {
    pub fn value(&self) -> Option<usize> {
        match self {
            BufferCapacity::Bounded(n) => Some(*n),
            BufferCapacity::Unbounded => None,
        }
    }
}

impl From<usize> for BufferCapacity {
    fn from(n: usize) -> Self {
        BufferCapacity::Bounded(n)
    }
}

/// Conflation flush cadence; `Disabled` (a zero interval) turns conflation off
/// entirely for the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflationInterval {
    Disabled,
    Every(Duration),
}

/// Percentile/EWMA parameters for a subscription's stats tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsOptions {
    pub percentile: f64,
    pub alpha: f64,
    pub ewma_window_size: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            percentile: 0.99,
            alpha: 0.2,
            ewma_window_size: 64,
        }
    }
}

pub type OnTimeout = Arc<dyn Fn(TimeoutFailure) + Send + Sync>;

/// Options accepted by `CrossBar::subscribe`.
#[derive(Clone)]
pub struct SubscribeOptions {
    pub subscription_name: Option<String>,
    pub fetch_state: bool,
    pub slow_consumer_strategy: SlowConsumerStrategy,
    pub buffer_capacity: BufferCapacity,
    pub conflation_interval: ConflationInterval,
    pub handler_timeout: Option<Duration>,
    pub on_timeout: Option<OnTimeout>,
    pub stats_options: StatsOptions,
}

impl std::fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("subscription_name", &self.subscription_name)
            .field("fetch_state", &self.fetch_state)
            .field("slow_consumer_strategy", &self.slow_consumer_strategy)
            .field("buffer_capacity", &self.buffer_capacity)
            .field("conflation_interval", &self.conflation_interval)
            .field("handler_timeout", &self.handler_timeout)
            .field("on_timeout", &self.on_timeout.is_some())
            .field("stats_options", &self.stats_options)
            .finish()
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            subscription_name: None,
            fetch_state: false,
            slow_consumer_strategy: SlowConsumerStrategy::default(),
            buffer_capacity: BufferCapacity::Unbounded,
            conflation_interval: ConflationInterval::Disabled,
            handler_timeout: None,
            on_timeout: None,
            stats_options: StatsOptions::default(),
        }
    }
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription_name(mut self, name: impl Into<String>) -> Self {
        self.subscription_name = Some(name.into());
        self
    }

    pub fn with_fetch_state(mut self, fetch_state: bool) -> Self {
        self.fetch_state = fetch_state;
        self
    }

    pub fn with_slow_consumer_strategy(mut self, strategy: SlowConsumerStrategy) -> Self {
        self.slow_consumer_strategy = strategy;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: impl Into<BufferCapacity>) -> Self {
        self.buffer_capacity = capacity.into();
        self
    }

    pub fn with_conflation_interval(mut self, interval: Duration) -> Self {
        self.conflation_interval = if interval.is_zero() {
            ConflationInterval::Disabled
        } else {
            ConflationInterval::Every(interval)
        };
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    pub fn with_on_timeout(mut self, callback: impl Fn(TimeoutFailure) + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(callback));
        self
    }

    pub fn with_stats_options(mut self, options: StatsOptions) -> Self {
        self.stats_options = options;
        self
    }

    pub fn conflation_enabled(&self) -> bool {
        matches!(self.conflation_interval, ConflationInterval::Every(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_skip_updates() {
        assert_eq!(
            SlowConsumerStrategy::default(),
            SlowConsumerStrategy::SkipUpdates
        );
    }

    #[test]
    fn zero_interval_disables_conflation() {
        let opts = SubscribeOptions::new().with_conflation_interval(Duration::ZERO);
        assert!(!opts.conflation_enabled());
    }

    #[test]
    fn positive_interval_enables_conflation() {
        let opts = SubscribeOptions::new().with_conflation_interval(Duration::from_millis(500));
        assert!(opts.conflation_enabled());
    }

    #[test]
    fn default_buffer_is_unbounded() {
        assert_eq!(SubscribeOptions::new().buffer_capacity, BufferCapacity::Unbounded);
    }
}
