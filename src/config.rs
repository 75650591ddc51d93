//! CrossBar-wide configuration, builder-style like the rest of the crate.

use std::time::Duration;

use crate::subscription::options::SlowConsumerStrategy;

#[derive(Debug, Clone)]
pub struct CrossBarConfig {
    pub default_buffer_capacity: Option<usize>,
    pub default_slow_consumer_strategy: SlowConsumerStrategy,
    pub default_conflation_interval: Option<Duration>,
    pub max_channels: usize,
    pub max_channel_name_length: usize,
    pub enable_message_tracing: bool,
    pub enable_lifecycle_tracking: bool,
    pub enable_publish_logging: bool,
    pub system_channel_prefix: char,
    pub system_channel_buffer_capacity: usize,
}

impl Default for CrossBarConfig {
    fn default() -> Self {
        Self {
            default_buffer_capacity: None,
            default_slow_consumer_strategy: SlowConsumerStrategy::default(),
            default_conflation_interval: None,
            max_channels: 10_000,
            max_channel_name_length: 256,
            enable_message_tracing: false,
            enable_lifecycle_tracking: false,
            enable_publish_logging: false,
            system_channel_prefix: '$',
            system_channel_buffer_capacity: 256,
        }
    }
}

impl CrossBarConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_buffer_capacity(mut self, capacity: usize) -> Self {
        self.default_buffer_capacity = Some(capacity);
        self
    }

    pub fn with_default_slow_consumer_strategy(mut self, strategy: SlowConsumerStrategy) -> Self {
        self.default_slow_consumer_strategy = strategy;
        self
    }

    pub fn with_default_conflation_interval(mut self, interval: Duration) -> Self {
        self.default_conflation_interval = Some(interval);
        self
    }

    pub fn with_max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    pub fn with_max_channel_name_length(mut self, max_len: usize) -> Self {
        self.max_channel_name_length = max_len;
        self
    }

    pub fn with_message_tracing(mut self, enable: bool) -> Self {
        self.enable_message_tracing = enable;
        self
    }

    pub fn with_lifecycle_tracking(mut self, enable: bool) -> Self {
        self.enable_lifecycle_tracking = enable;
        self
    }

    pub fn with_publish_logging(mut self, enable: bool) -> Self {
        self.enable_publish_logging = enable;
        self
    }

    pub fn with_system_channel_prefix(mut self, prefix: char) -> Self {
        self.system_channel_prefix = prefix;
        self
    }

    pub fn with_system_channel_buffer_capacity(mut self, capacity: usize) -> Self {
        self.system_channel_buffer_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_system_prefix_is_dollar() {
        assert_eq!(CrossBarConfig::default().system_channel_prefix, '$');
    }

    #[test]
    fn builder_overrides_apply() {
        let config = CrossBarConfig::new()
            .with_max_channels(10)
            .with_message_tracing(true);
        assert_eq!(config.max_channels, 10);
        assert!(config.enable_message_tracing);
    }
}
