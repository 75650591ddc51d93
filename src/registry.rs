//! Type-erased channel registry with a wildcard back-binding index.
//!
//! Channels are stored behind `Arc<dyn Any + Send + Sync>` so the registry can map
//! `String -> channel` without knowing every `T` the crate's callers will ever use.
//! The "already exists" lookup path is a single `DashMap` shard lock; only channel
//! creation takes the (still per-shard) write path.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::channel::TypedChannel;
use crate::channel_name;
use crate::config::CrossBarConfig;
use crate::error::{CrossBarError, CrossBarResult};
use crate::message::{ChannelInfo, SubscriptionInfo};
use crate::wildcard::Pattern;

/// Object-safe view over a `TypedChannel<T>` for a concrete `T` the registry does
/// not know statically, used to answer `getChannels()` without monomorphizing the
/// registry itself.
#[async_trait::async_trait]
pub trait ErasedChannelOps: Send + Sync {
    fn type_name(&self) -> &'static str;
    async fn info(&self, name: &str) -> ChannelInfo;
    async fn subscription_infos(&self) -> Vec<SubscriptionInfo>;
}

#[async_trait::async_trait]
impl<T: Clone + Send + Sync + 'static> ErasedChannelOps for TypedChannel<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    async fn info(&self, name: &str) -> ChannelInfo {
        ChannelInfo {
            name: name.to_string(),
            body_type: self.type_name(),
            subscription_count: self.subscriber_count(),
            total_published: self.stats().total_published(),
            stored_message_count: self.stored_message_count().await,
            last_published_at: self.stats().last_published_at(),
            last_publisher_tag: self.stats().last_publisher_tag(),
            publish_rate: self.stats().publish_rate(),
        }
    }

    async fn subscription_infos(&self) -> Vec<SubscriptionInfo> {
        self.subscription_infos()
    }
}

struct Erased {
    type_id: TypeId,
    any: Arc<dyn Any + Send + Sync>,
    ops: Arc<dyn ErasedChannelOps>,
}

/// Invoked when a new channel is created whose name matches a pending wildcard
/// subscription's pattern; attempts to downcast the erased channel to the
/// subscriber's `T` and binds if it matches.
pub type WildcardBinder = Arc<dyn Fn(&str, &Arc<dyn Any + Send + Sync>) + Send + Sync>;

struct WildcardEntry {
    pattern: Pattern,
    binder: WildcardBinder,
}

pub struct ChannelRegistry {
    channels: DashMap<String, Erased>,
    wildcard_buckets: DashMap<String, Vec<WildcardEntry>>,
    config: Arc<CrossBarConfig>,
}

fn prefix_bucket_key(prefix: &str) -> String {
    prefix.split('.').next().unwrap_or("").to_string()
}

impl ChannelRegistry {
    pub fn new(config: Arc<CrossBarConfig>) -> Self {
        Self {
            channels: DashMap::new(),
            wildcard_buckets: DashMap::new(),
            config,
        }
    }

    /// `getOrCreate(name, T)`: non-blocking for the common already-exists path.
    pub fn get_or_create<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> CrossBarResult<Arc<TypedChannel<T>>> {
        self.get_or_create_checked(name).map(|(channel, _)| channel)
    }

    /// Same as [`Self::get_or_create`] but also reports whether this call is
    /// what created the channel, so callers can emit a one-shot
    /// `ChannelCreated` lifecycle event instead of one per lookup.
    pub fn get_or_create_checked<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> CrossBarResult<(Arc<TypedChannel<T>>, bool)> {
        channel_name::validate(
            name,
            self.config.system_channel_prefix,
            self.config.max_channel_name_length,
        )?;

        if let Some(entry) = self.channels.get(name) {
            return Self::downcast_or_mismatch::<T>(name, &entry).map(|c| (c, false));
        }

        match self.channels.entry(name.to_string()) {
            Entry::Occupied(entry) => Self::downcast_or_mismatch::<T>(name, entry.get()).map(|c| (c, false)),
            Entry::Vacant(vacant) => {
                if self.channels.len() >= self.config.max_channels {
                    return Err(CrossBarError::failed_publish(
                        name,
                        format!("registry at max_channels ({})", self.config.max_channels),
                    ));
                }
                let channel = Arc::new(TypedChannel::<T>::new(name));
                let erased = Erased {
                    type_id: TypeId::of::<TypedChannel<T>>(),
                    any: channel.clone() as Arc<dyn Any + Send + Sync>,
                    ops: channel.clone() as Arc<dyn ErasedChannelOps>,
                };
                vacant.insert(erased);
                self.back_bind_wildcards(name);
                Ok((channel, true))
            }
        }
    }

    /// Looks up an existing channel without creating one; used by
    /// `getChannelState` so a typo'd or never-published-to name fails with
    /// `InvalidChannelName`/`ChannelTypeMismatch` rather than silently
    /// fabricating an empty channel.
    pub fn get_existing<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> CrossBarResult<Option<Arc<TypedChannel<T>>>> {
        match self.channels.get(name) {
            Some(entry) => Self::downcast_or_mismatch::<T>(name, &entry).map(Some),
            None => Ok(None),
        }
    }

    fn downcast_or_mismatch<T: Clone + Send + Sync + 'static>(
        name: &str,
        entry: &Erased,
    ) -> CrossBarResult<Arc<TypedChannel<T>>> {
        if entry.type_id != TypeId::of::<TypedChannel<T>>() {
            return Err(CrossBarError::type_mismatch(
                name,
                entry.ops.type_name(),
                std::any::type_name::<T>(),
            ));
        }
        Ok(entry
            .any
            .clone()
            .downcast::<TypedChannel<T>>()
            .expect("type_id checked above"))
    }

    fn back_bind_wildcards(&self, name: &str) {
        let key = prefix_bucket_key(name);
        let entry = self.channels.get(name).expect("just inserted");
        for bucket_key in [key.as_str(), ""] {
            if let Some(bucket) = self.wildcard_buckets.get(bucket_key) {
                for wildcard in bucket.iter() {
                    if wildcard.pattern.matches(name) {
                        (wildcard.binder)(name, &entry.any);
                    }
                }
            }
        }
    }

    /// Registers a binder invoked for every channel created hereafter whose name
    /// matches `pattern`. Returns the matching channels that already exist, for
    /// the caller to bind immediately: a wildcard subscription binds to a
    /// snapshot of existing channels at creation time, then picks up new ones
    /// as they're created.
    pub fn register_wildcard<T: Clone + Send + Sync + 'static>(
        &self,
        pattern: &Pattern,
        binder: WildcardBinder,
    ) -> Vec<(String, Arc<TypedChannel<T>>)> {
        let existing: Vec<_> = self
            .channels
            .iter()
            .filter(|entry| {
                entry.value().type_id == TypeId::of::<TypedChannel<T>>()
                    && pattern.matches(entry.key())
            })
            .filter_map(|entry| {
                let channel = entry
                    .value()
                    .any
                    .clone()
                    .downcast::<TypedChannel<T>>()
                    .ok()?;
                Some((entry.key().clone(), channel))
            })
            .collect();

        let key = prefix_bucket_key(&pattern.concrete_prefix());
        self.wildcard_buckets
            .entry(key)
            .or_default()
            .push(WildcardEntry {
                pattern: pattern.clone(),
                binder,
            });

        existing
    }

    pub async fn channel_infos(&self) -> Vec<ChannelInfo> {
        let entries: Vec<(String, Arc<dyn ErasedChannelOps>)> = self
            .channels
            .iter()
            .map(|e| (e.key().clone(), e.value().ops.clone()))
            .collect();
        let mut out = Vec::with_capacity(entries.len());
        for (name, ops) in entries {
            out.push(ops.info(&name).await);
        }
        out
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// `getChannelSubscriptions(name)`. An unknown channel name yields an
    /// empty collection rather than an error — only publish/subscribe treat an
    /// invalid or unknown channel name as a failure.
    pub async fn channel_subscription_infos(&self, name: &str) -> Vec<SubscriptionInfo> {
        let ops = self.channels.get(name).map(|e| e.value().ops.clone());
        match ops {
            Some(ops) => ops.subscription_infos().await,
            None => Vec::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
