//! The public entry point: `CrossBar` ties the channel registry, system
//! channels, and subscription pipeline together into the `publish`/`subscribe`
//! API callers actually use.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use crate::channel::{SubscriberMeta, TypedChannel};
use crate::channel_name;
use crate::config::CrossBarConfig;
use crate::error::{CrossBarError, CrossBarResult};
use crate::ids::{CorrelationId, CorrelationIdAllocator, SubscriptionId};
use crate::message::{ChannelInfo, Message, SubscriptionInfo};
use crate::registry::ChannelRegistry;
use crate::stats::SubscriptionStats;
use crate::subscription::context::CancellationSignal;
use crate::subscription::handle::OnDetach;
use crate::subscription::options::SubscribeOptions;
use crate::subscription::pipeline::{self, ErrorSink, Handler, HandlerFuture, RuntimeFailure};
use crate::subscription::Subscription;
use crate::system_channels::{
    error_channel_name, lifecycle_channel_name, ErrorReport, ErrorSeverity, ErrorType,
    LifecycleEvent, OverviewSnapshot,
};
use crate::wildcard::Pattern;

/// Per-publish overrides, mirroring `SubscribeOptions`'s builder convention.
#[derive(Clone, Default)]
pub struct PublishOptions {
    pub correlation_id: Option<CorrelationId>,
    pub key: Option<Arc<str>>,
    pub store: bool,
    pub from_tag: Option<Arc<str>>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_store(mut self, store: bool) -> Self {
        self.store = store;
        self
    }

    pub fn with_from_tag(mut self, tag: impl Into<Arc<str>>) -> Self {
        self.from_tag = Some(tag.into());
        self
    }
}

/// The two reserved internal channels CrossBar publishes onto itself, plus
/// the allocators their messages need.
struct SystemChannels {
    lifecycle: Arc<TypedChannel<LifecycleEvent>>,
    errors: Arc<TypedChannel<ErrorReport>>,
    correlation_ids: CorrelationIdAllocator,
    report_ids: AtomicU64,
    lifecycle_enabled: bool,
}

impl SystemChannels {
    async fn emit_lifecycle(&self, event: LifecycleEvent) {
        if !self.lifecycle_enabled {
            return;
        }
        tracing::debug!(?event, "lifecycle event");
        let correlation_id = self.correlation_ids.next();
        self.lifecycle
            .publish(event, correlation_id, None, false, None)
            .await;
    }

    async fn emit_error(
        &self,
        error_type: ErrorType,
        severity: ErrorSeverity,
        message: String,
        channel: Option<String>,
        subscription: Option<SubscriptionId>,
    ) {
        if !self.lifecycle_enabled {
            return;
        }
        let id = self.report_ids.fetch_add(1, Ordering::Relaxed);
        let mut report = ErrorReport::new(id, error_type, severity, message);
        if let Some(channel) = channel {
            report = report.with_channel(channel);
        }
        if let Some(subscription) = subscription {
            report = report.with_subscription(subscription);
        }
        let correlation_id = self.correlation_ids.next();
        self.errors
            .publish(report, correlation_id, None, false, None)
            .await;
    }
}

/// An in-process publish/subscribe bus with typed channels, per-subscriber
/// buffering and conflation, a replayable state store, and wildcard routing.
///
/// Cloning is not supported; share a `CrossBar` behind an `Arc` across tasks.
pub struct CrossBar {
    registry: ChannelRegistry,
    config: Arc<CrossBarConfig>,
    system: Arc<SystemChannels>,
    closed: Arc<AtomicBool>,
    signals: DashMap<SubscriptionId, std::sync::Weak<CancellationSignal>>,
}

impl Default for CrossBar {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossBar {
    pub fn new() -> Self {
        Self::with_config(CrossBarConfig::default())
    }

    pub fn with_config(config: CrossBarConfig) -> Self {
        let config = Arc::new(config);
        let registry = ChannelRegistry::new(config.clone());

        let lifecycle_name = lifecycle_channel_name(config.system_channel_prefix);
        let error_name = error_channel_name(config.system_channel_prefix);
        let lifecycle = registry
            .get_or_create::<LifecycleEvent>(&lifecycle_name)
            .expect("system channel name is always valid");
        let errors = registry
            .get_or_create::<ErrorReport>(&error_name)
            .expect("system channel name is always valid");

        let system = Arc::new(SystemChannels {
            lifecycle,
            errors,
            correlation_ids: CorrelationIdAllocator::new(),
            report_ids: AtomicU64::new(0),
            lifecycle_enabled: config.enable_lifecycle_tracking,
        });

        Self {
            registry,
            config,
            system,
            closed: Arc::new(AtomicBool::new(false)),
            signals: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CrossBarConfig {
        &self.config
    }

    /// Publishes `body` on `channel`, creating the channel (with type `T`) on
    /// first use. Returns `ChannelTypeMismatch` if the channel already exists
    /// with a different body type.
    pub async fn publish<T: Clone + Send + Sync + 'static>(
        &self,
        channel: &str,
        body: T,
        options: PublishOptions,
    ) -> CrossBarResult<Message<T>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CrossBarError::Closed);
        }
        if channel_name::is_system_channel(channel, self.config.system_channel_prefix) {
            return Err(CrossBarError::invalid_channel_name(
                channel,
                "system channels are reserved for internal use",
            ));
        }
        self.publish_internal(channel, body, options).await
    }

    async fn publish_internal<T: Clone + Send + Sync + 'static>(
        &self,
        channel: &str,
        body: T,
        options: PublishOptions,
    ) -> CrossBarResult<Message<T>> {
        let (typed, created) = self.registry.get_or_create_checked::<T>(channel)?;
        if created {
            self.system
                .emit_lifecycle(LifecycleEvent::ChannelCreated {
                    channel: channel.to_string(),
                })
                .await;
        }

        let correlation_id = options
            .correlation_id
            .unwrap_or_else(|| self.system.correlation_ids.next());

        if self.config.enable_message_tracing {
            tracing::trace!(
                channel = %channel,
                correlation_id = %correlation_id,
                key = ?options.key,
                "publishing message"
            );
        }

        let msg = typed
            .publish(body, correlation_id, options.key, options.store, options.from_tag)
            .await;

        if self.config.enable_publish_logging {
            tracing::info!(
                channel = %channel,
                message_id = %msg.id,
                correlation_id = %msg.correlation_id,
                "published message"
            );
        }

        Ok(msg)
    }

    /// Subscribes `handler` to `channel_pattern`, which may be a concrete
    /// channel name or a wildcard pattern (`*`/`>`). The returned handle owns
    /// the read loop: dropping or disposing it detaches the subscription.
    pub async fn subscribe<T, F, Fut>(
        &self,
        channel_pattern: &str,
        handler: F,
        options: SubscribeOptions,
    ) -> CrossBarResult<Subscription<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Message<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CrossBarError::Closed);
        }
        channel_name::validate_pattern(
            channel_pattern,
            self.config.system_channel_prefix,
            self.config.max_channel_name_length,
        )?;

        let id = SubscriptionId::new();
        let signal = CancellationSignal::new();
        let stats = Arc::new(SubscriptionStats::new(options.stats_options));
        let faulted = Arc::new(AtomicBool::new(false));
        let handler_arc: Handler<T> =
            Arc::new(move |msg| Box::pin(handler(msg)) as HandlerFuture);

        let system_for_sink = self.system.clone();
        let error_sink: ErrorSink = Arc::new(move |failure: RuntimeFailure| {
            let system = system_for_sink.clone();
            tokio::spawn(async move {
                system
                    .emit_error(
                        failure.error_type,
                        failure.severity,
                        failure.message,
                        Some(failure.channel),
                        Some(failure.subscription),
                    )
                    .await;
            });
        });

        let is_wildcard = channel_name::is_wildcard_pattern(channel_pattern);
        let (handles, cleanup) = if is_wildcard {
            self.subscribe_wildcard(
                id,
                channel_pattern,
                &options,
                signal.clone(),
                stats.clone(),
                faulted.clone(),
                handler_arc,
                Some(error_sink),
            )
            .await?
        } else {
            self.subscribe_concrete(
                id,
                channel_pattern,
                &options,
                signal.clone(),
                stats.clone(),
                faulted.clone(),
                handler_arc,
                Some(error_sink),
            )
            .await?
        };

        self.signals.insert(id, Arc::downgrade(&signal));

        if self.config.enable_lifecycle_tracking {
            self.system
                .emit_lifecycle(LifecycleEvent::SubscriptionAdded {
                    channel: channel_pattern.to_string(),
                    subscription: id,
                })
                .await;
        }

        let system_for_detach = self.system.clone();
        let pattern_for_detach = channel_pattern.to_string();
        let lifecycle_enabled = self.config.enable_lifecycle_tracking;
        let on_detach: OnDetach = Arc::new(move |sub_id| {
            cleanup(sub_id);
            if lifecycle_enabled {
                let system = system_for_detach.clone();
                let channel = pattern_for_detach.clone();
                tokio::spawn(async move {
                    system
                        .emit_lifecycle(LifecycleEvent::SubscriptionRemoved {
                            channel,
                            subscription: sub_id,
                        })
                        .await;
                });
            }
        });

        Ok(Subscription::new(
            id,
            channel_pattern.to_string(),
            options.subscription_name.clone(),
            is_wildcard,
            signal,
            stats,
            faulted,
            handles.task,
        )
        .with_on_detach(on_detach))
    }

    #[allow(clippy::too_many_arguments)]
    async fn subscribe_concrete<T: Clone + Send + Sync + 'static>(
        &self,
        id: SubscriptionId,
        channel_name: &str,
        options: &SubscribeOptions,
        signal: Arc<CancellationSignal>,
        stats: Arc<SubscriptionStats>,
        faulted: Arc<AtomicBool>,
        handler: Handler<T>,
        error_sink: Option<ErrorSink>,
    ) -> CrossBarResult<(pipeline::PipelineHandles<T>, OnDetach)> {
        let (typed, created) = self.registry.get_or_create_checked::<T>(channel_name)?;
        if created {
            self.system
                .emit_lifecycle(LifecycleEvent::ChannelCreated {
                    channel: channel_name.to_string(),
                })
                .await;
        }

        let replay = if options.fetch_state {
            typed.state_snapshot().await
        } else {
            Vec::new()
        };

        let handles = pipeline::spawn(
            id,
            channel_name.to_string(),
            options,
            signal,
            stats.clone(),
            faulted,
            replay,
            handler,
            error_sink,
        );

        let meta = Arc::new(SubscriberMeta {
            subscription_name: options.subscription_name.clone(),
            channel_pattern: channel_name.to_string(),
            is_wildcard: false,
            stats,
        });
        typed.add_subscriber(id, handles.inbox.clone(), meta);

        let detach_channel = typed.clone();
        let on_detach: OnDetach = Arc::new(move |sub_id| {
            detach_channel.remove_subscriber(&sub_id);
        });

        Ok((handles, on_detach))
    }

    /// Binds a wildcard subscription to every matching channel, existing and
    /// future. For each channel, a requested state replay is delivered into the
    /// subscriber's inbox before it is added to that channel's subscriber set,
    /// so a concurrent publish during the bind can never race ahead of the
    /// replay and be lost.
    #[allow(clippy::too_many_arguments)]
    async fn subscribe_wildcard<T: Clone + Send + Sync + 'static>(
        &self,
        id: SubscriptionId,
        pattern_str: &str,
        options: &SubscribeOptions,
        signal: Arc<CancellationSignal>,
        stats: Arc<SubscriptionStats>,
        faulted: Arc<AtomicBool>,
        handler: Handler<T>,
        error_sink: Option<ErrorSink>,
    ) -> CrossBarResult<(pipeline::PipelineHandles<T>, OnDetach)> {
        let pattern = Pattern::compile(pattern_str);
        let handles = pipeline::spawn(
            id,
            pattern_str.to_string(),
            options,
            signal,
            stats.clone(),
            faulted,
            Vec::new(),
            handler,
            error_sink,
        );

        let bound: Arc<std::sync::Mutex<Vec<Arc<TypedChannel<T>>>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));

        let inbox_for_binder = handles.inbox.clone();
        let bound_for_binder = bound.clone();
        let subscription_name = options.subscription_name.clone();
        let pattern_string = pattern_str.to_string();
        let stats_for_binder = stats.clone();
        // Runs synchronously inside `get_or_create_checked`, before the new
        // channel is visible to any publisher, so the subscriber is in place
        // before the channel's first publish can snapshot its subscriber set.
        // A channel reaching this binder was just constructed on this call
        // path, so it has no prior state to replay.
        let binder: crate::registry::WildcardBinder = Arc::new(move |_name, any| {
            let Ok(channel) = any.clone().downcast::<TypedChannel<T>>() else {
                return;
            };
            let meta = Arc::new(SubscriberMeta {
                subscription_name: subscription_name.clone(),
                channel_pattern: pattern_string.clone(),
                is_wildcard: true,
                stats: stats_for_binder.clone(),
            });
            channel.add_subscriber(id, inbox_for_binder.clone(), meta);
            bound_for_binder.lock().unwrap().push(channel);
        });

        let existing = self.registry.register_wildcard::<T>(&pattern, binder);
        for (_name, channel) in existing {
            if options.fetch_state {
                let snapshot = channel.state_snapshot().await;
                handles.inbox.deliver_replay(snapshot).await;
            }
            let meta = Arc::new(SubscriberMeta {
                subscription_name: options.subscription_name.clone(),
                channel_pattern: pattern_str.to_string(),
                is_wildcard: true,
                stats: stats.clone(),
            });
            channel.add_subscriber(id, handles.inbox.clone(), meta);
            bound.lock().unwrap().push(channel);
        }

        let on_detach: OnDetach = Arc::new(move |sub_id| {
            let channels: Vec<_> = bound.lock().unwrap().clone();
            for channel in channels {
                channel.remove_subscriber(&sub_id);
            }
        });

        Ok((handles, on_detach))
    }

    /// `getChannels()`: a snapshot of every registered channel, including the
    /// two reserved system channels.
    pub async fn get_channels(&self) -> Vec<ChannelInfo> {
        self.registry.channel_infos().await
    }

    /// `getChannelSubscriptions(name)`: an unknown channel yields an empty
    /// list rather than an error.
    pub async fn get_channel_subscriptions(&self, name: &str) -> Vec<SubscriptionInfo> {
        self.registry.channel_subscription_infos(name).await
    }

    /// `getChannelState(name)`: the channel's retained last-value-per-key
    /// store. A channel that has never been created returns an empty list.
    pub async fn get_channel_state<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> CrossBarResult<Vec<Message<T>>> {
        match self.registry.get_existing::<T>(name)? {
            Some(channel) => Ok(channel.state_snapshot().await),
            None => Ok(Vec::new()),
        }
    }

    pub fn get_next_correlation_id(&self) -> CorrelationId {
        self.system.correlation_ids.next()
    }

    /// Aggregates per-channel and per-subscription stats into a single
    /// snapshot. A wildcard subscription bound to several channels counts
    /// once, not once per channel.
    pub async fn overview(&self) -> OverviewSnapshot {
        let channel_infos = self.registry.channel_infos().await;
        let total_channels = channel_infos.len();
        let total_published: u64 = channel_infos.iter().map(|c| c.total_published).sum();
        let aggregate_throughput: f64 = channel_infos.iter().map(|c| c.publish_rate).sum();

        let mut seen = std::collections::HashSet::new();
        let mut wildcard_subscriptions = 0usize;
        let mut total_processed = 0u64;
        let mut total_timed_out = 0u64;
        let mut subscriptions_with_backlog = 0usize;

        for name in self.registry.channel_names() {
            for sub in self.registry.channel_subscription_infos(&name).await {
                if !seen.insert(sub.id) {
                    continue;
                }
                if sub.is_wildcard {
                    wildcard_subscriptions += 1;
                }
                total_processed += sub.processed_count;
                total_timed_out += sub.timeout_count;
                if sub.queue_depth > 0 {
                    subscriptions_with_backlog += 1;
                }
            }
        }

        OverviewSnapshot {
            total_channels,
            total_subscriptions: seen.len(),
            wildcard_subscriptions,
            aggregate_throughput,
            total_published,
            total_processed,
            total_timed_out,
            subscriptions_with_backlog,
        }
    }

    /// Cancels every live subscription's read loop and marks the bus closed;
    /// further `publish`/`subscribe` calls fail with `Closed`. Subscription
    /// handles already held by callers still observe `Detached` on their next
    /// `state()` check.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for entry in self.signals.iter() {
            if let Some(signal) = entry.value().upgrade() {
                signal.cancel();
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
