//! The subscription handle returned to callers of `CrossBar::subscribe`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;

use crate::ids::SubscriptionId;
use crate::stats::{SubscriptionStats, SubscriptionStatsSnapshot};
use crate::subscription::context::CancellationSignal;

/// Invoked exactly once, at the moment a subscription transitions out of
/// `Active`, so the owning `CrossBar` can emit a `SubscriptionRemoved`
/// lifecycle event without the handle needing to know about `CrossBar` itself.
pub type OnDetach = Arc<dyn Fn(SubscriptionId) + Send + Sync>;

/// Terminal lifecycle states of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Detached,
    Faulted,
}

/// Owned handle to a live subscription. Disposal is idempotent: dropping or
/// explicitly calling `dispose` both cancel the read loop exactly once.
pub struct Subscription<T> {
    pub(crate) id: SubscriptionId,
    pub(crate) channel_pattern: String,
    pub(crate) subscription_name: Option<String>,
    pub(crate) is_wildcard: bool,
    pub(crate) signal: Arc<CancellationSignal>,
    pub(crate) state: Arc<std::sync::Mutex<SubscriptionState>>,
    pub(crate) faulted: Arc<AtomicBool>,
    pub(crate) stats: Arc<SubscriptionStats>,
    pub(crate) task: Option<JoinHandle<()>>,
    pub(crate) on_detach: Option<OnDetach>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        channel_pattern: String,
        subscription_name: Option<String>,
        is_wildcard: bool,
        signal: Arc<CancellationSignal>,
        stats: Arc<SubscriptionStats>,
        faulted: Arc<AtomicBool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            channel_pattern,
            subscription_name,
            is_wildcard,
            signal,
            state: Arc::new(std::sync::Mutex::new(SubscriptionState::Active)),
            faulted,
            stats,
            task: Some(task),
            on_detach: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Registers the callback `CrossBar::subscribe` uses to publish
    /// `SubscriptionRemoved` once this handle leaves the `Active` state.
    pub(crate) fn with_on_detach(mut self, on_detach: OnDetach) -> Self {
        self.on_detach = Some(on_detach);
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription_name.as_deref()
    }

    pub fn channel_pattern(&self) -> &str {
        &self.channel_pattern
    }

    pub fn is_wildcard(&self) -> bool {
        self.is_wildcard
    }

    /// The pipeline sets `faulted` directly (no callback) when a
    /// `FailSubscriber` buffer overflow trips, so a fault observed there
    /// takes precedence over whatever `dispose`/`mark_faulted` last recorded
    /// in `state`.
    pub fn state(&self) -> SubscriptionState {
        if self.faulted.load(Ordering::SeqCst) {
            return SubscriptionState::Faulted;
        }
        *self.state.lock().unwrap()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state(), SubscriptionState::Active)
    }

    pub fn stats(&self) -> SubscriptionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Idempotent disposal: cancels the read loop and transitions to `Detached`.
    /// Does not forcibly abort an in-flight handler invocation.
    pub fn dispose(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == SubscriptionState::Active {
            *state = SubscriptionState::Detached;
            self.signal.cancel();
            drop(state);
            if let Some(cb) = &self.on_detach {
                cb(self.id);
            }
        }
    }

    pub(crate) fn mark_faulted(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == SubscriptionState::Active {
            *state = SubscriptionState::Faulted;
            self.faulted.store(true, Ordering::SeqCst);
            self.signal.cancel();
            drop(state);
            if let Some(cb) = &self.on_detach {
                cb(self.id);
            }
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.dispose();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_stub_handle() -> Subscription<String> {
        let signal = CancellationSignal::new();
        let stats = Arc::new(SubscriptionStats::new(
            crate::subscription::options::StatsOptions::default(),
        ));
        let faulted = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(async {});
        Subscription::new(
            SubscriptionId::new(),
            "orders.*".to_string(),
            Some("diag".to_string()),
            true,
            signal,
            stats,
            faulted,
            task,
        )
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let sub = make_stub_handle();
        assert!(sub.is_active());
        sub.dispose();
        assert_eq!(sub.state(), SubscriptionState::Detached);
        sub.dispose();
        assert_eq!(sub.state(), SubscriptionState::Detached);
    }

    #[tokio::test]
    async fn mark_faulted_is_terminal() {
        let sub = make_stub_handle();
        sub.mark_faulted();
        assert_eq!(sub.state(), SubscriptionState::Faulted);
        sub.dispose();
        assert_eq!(sub.state(), SubscriptionState::Faulted);
    }

    #[tokio::test]
    async fn pipeline_fault_flag_surfaces_as_faulted_state_without_mark_faulted() {
        let signal = CancellationSignal::new();
        let stats = Arc::new(SubscriptionStats::new(
            crate::subscription::options::StatsOptions::default(),
        ));
        let faulted = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(async {});
        let sub = Subscription::new(
            SubscriptionId::new(),
            "orders.*".to_string(),
            None,
            false,
            signal,
            stats,
            faulted.clone(),
            task,
        );
        assert!(sub.is_active());

        faulted.store(true, Ordering::SeqCst);

        assert_eq!(sub.state(), SubscriptionState::Faulted);
        assert!(!sub.is_active());
    }
}
