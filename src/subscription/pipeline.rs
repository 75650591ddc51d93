//! The subscriber-side delivery pipeline: the bounded/unbounded queue, the
//! conflation offer path, and the single-reader read loop that drains both and
//! invokes the handler serially.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::conflation::{ConflationMap, OfferOutcome};
use crate::message::{Message, TimeoutFailure};
use crate::stats::SubscriptionStats;
use crate::subscription::context::CancellationSignal;
use crate::subscription::options::{BufferCapacity, SlowConsumerStrategy, SubscribeOptions};
use crate::system_channels::{ErrorSeverity, ErrorType};

/// A runtime (non-caller-visible) failure observed by a read loop, handed to
/// whatever sink the owning `CrossBar` wired up. Handler timeouts and faults
/// never propagate to the publisher — they are routed to the error-report
/// stream and to subscription stats instead.
pub struct RuntimeFailure {
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub message: String,
    pub channel: String,
    pub subscription: crate::ids::SubscriptionId,
}

pub type ErrorSink = Arc<dyn Fn(RuntimeFailure) + Send + Sync>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type Handler<T> = Arc<dyn Fn(Message<T>) -> HandlerFuture + Send + Sync>;

enum Sender<T> {
    Bounded(mpsc::Sender<Message<T>>),
    Unbounded(mpsc::UnboundedSender<Message<T>>),
}

enum Receiver<T> {
    Bounded(mpsc::Receiver<Message<T>>),
    Unbounded(mpsc::UnboundedReceiver<Message<T>>),
}

impl<T> Receiver<T> {
    async fn recv(&mut self) -> Option<Message<T>> {
        match self {
            Receiver::Bounded(rx) => rx.recv().await,
            Receiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

fn channel<T>(capacity: BufferCapacity) -> (Sender<T>, Receiver<T>) {
    match capacity {
        BufferCapacity::Bounded(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (Sender::Bounded(tx), Receiver::Bounded(rx))
        }
        BufferCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Sender::Unbounded(tx), Receiver::Unbounded(rx))
        }
    }
}

/// The publisher-facing side of a subscription: offered a message per publish,
/// applies conflation and the slow-consumer policy, never blocks the caller
/// except under `WaitForSpace`.
pub struct SubscriberInbox<T> {
    sender: Sender<T>,
    conflation: Option<Arc<ConflationMap<T>>>,
    strategy: SlowConsumerStrategy,
    stats: Arc<SubscriptionStats>,
    faulted: Arc<AtomicBool>,
    signal: Arc<CancellationSignal>,
}

impl<T: Send + 'static> SubscriberInbox<T> {
    pub async fn offer(&self, msg: Message<T>) {
        if self.faulted.load(Ordering::SeqCst) || self.signal.is_cancelled() {
            return;
        }

        self.stats.record_offer();

        if let (Some(conflation), Some(key)) = (&self.conflation, msg.key.clone()) {
            match conflation.offer(key, msg).await {
                OfferOutcome::NewKey => self.stats.record_enqueue(),
                OfferOutcome::ConflationHit => self.stats.record_conflation_hit(),
            }
            return;
        }

        self.enqueue_direct(msg).await;
    }

    /// Delivers a state-store replay snapshot straight into the buffer,
    /// bypassing conflation: these are synthetic one-shot messages, not
    /// updates that should be collapsed against later live traffic.
    pub async fn deliver_replay(&self, messages: Vec<Message<T>>) {
        for msg in messages {
            if self.faulted.load(Ordering::SeqCst) || self.signal.is_cancelled() {
                return;
            }
            self.enqueue_direct(msg).await;
        }
    }

    async fn enqueue_direct(&self, msg: Message<T>) {
        match (&self.sender, self.strategy) {
            (Sender::Unbounded(tx), _) => {
                if tx.send(msg).is_ok() {
                    self.stats.record_enqueue();
                }
            }
            (Sender::Bounded(tx), SlowConsumerStrategy::SkipUpdates) => {
                match tx.try_send(msg) {
                    Ok(()) => self.stats.record_enqueue(),
                    Err(mpsc::error::TrySendError::Full(_)) => self.stats.record_dropped(),
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
            (Sender::Bounded(tx), SlowConsumerStrategy::FailSubscriber) => {
                match tx.try_send(msg) {
                    Ok(()) => self.stats.record_enqueue(),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.faulted.store(true, Ordering::SeqCst);
                        self.signal.cancel();
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                }
            }
            (Sender::Bounded(tx), SlowConsumerStrategy::WaitForSpace) => {
                // A waiting publisher is released, not silently satisfied, when the
                // subscription is disposed or CrossBar shuts down while it waits
                // for space.
                tokio::select! {
                    res = tx.send(msg) => {
                        if res.is_ok() {
                            self.stats.record_enqueue();
                        }
                    }
                    _ = self.signal.cancelled() => {
                        self.stats.record_dropped();
                    }
                }
            }
        }
    }
}

pub struct PipelineHandles<T> {
    pub inbox: Arc<SubscriberInbox<T>>,
    pub task: JoinHandle<()>,
}

/// Builds the buffer/conflation pair and spawns the read loop, returning the
/// publisher-facing inbox and the task handle owning the loop.
#[allow(clippy::too_many_arguments)]
pub fn spawn<T>(
    subscription_id: crate::ids::SubscriptionId,
    channel_name: String,
    options: &SubscribeOptions,
    signal: Arc<CancellationSignal>,
    stats: Arc<SubscriptionStats>,
    faulted: Arc<AtomicBool>,
    replay: Vec<Message<T>>,
    handler: Handler<T>,
    error_sink: Option<ErrorSink>,
) -> PipelineHandles<T>
where
    T: Clone + Send + 'static,
{
    let (tx, rx) = channel(options.buffer_capacity);
    let conflation = if options.conflation_enabled() {
        Some(Arc::new(ConflationMap::new()))
    } else {
        None
    };

    let inbox = Arc::new(SubscriberInbox {
        sender: tx,
        conflation: conflation.clone(),
        strategy: options.slow_consumer_strategy,
        stats: stats.clone(),
        faulted: faulted.clone(),
        signal: signal.clone(),
    });

    let flush_interval = match options.conflation_interval {
        crate::subscription::options::ConflationInterval::Every(d) => Some(d),
        crate::subscription::options::ConflationInterval::Disabled => None,
    };
    let handler_timeout = options.handler_timeout;
    let on_timeout = options.on_timeout.clone();

    let task = tokio::spawn(run_read_loop(
        subscription_id,
        channel_name,
        rx,
        conflation,
        flush_interval,
        handler_timeout,
        on_timeout,
        signal,
        stats,
        faulted,
        replay,
        handler,
        error_sink,
    ));

    PipelineHandles { inbox, task }
}

#[allow(clippy::too_many_arguments)]
async fn run_read_loop<T: Clone + Send + 'static>(
    subscription_id: crate::ids::SubscriptionId,
    channel_name: String,
    mut rx: Receiver<T>,
    conflation: Option<Arc<ConflationMap<T>>>,
    flush_interval: Option<Duration>,
    handler_timeout: Option<Duration>,
    on_timeout: Option<crate::subscription::options::OnTimeout>,
    signal: Arc<CancellationSignal>,
    stats: Arc<SubscriptionStats>,
    faulted: Arc<AtomicBool>,
    replay: Vec<Message<T>>,
    handler: Handler<T>,
    error_sink: Option<ErrorSink>,
) {
    for msg in replay {
        invoke_handler(
            subscription_id,
            &channel_name,
            &msg,
            &handler,
            handler_timeout,
            &on_timeout,
            &stats,
            &error_sink,
        )
        .await;
        stats.record_processed();
    }

    let mut ticker = flush_interval.map(tokio::time::interval);

    loop {
        if faulted.load(Ordering::SeqCst) || signal.is_cancelled() {
            break;
        }

        let next = match (&mut ticker, &conflation) {
            (Some(ticker), Some(_)) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => None,
                    msg = rx.recv() => msg.map(Step::Direct),
                    _ = ticker.tick() => Some(Step::Flush),
                }
            }
            _ => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => None,
                    msg = rx.recv() => msg.map(Step::Direct),
                }
            }
        };

        match next {
            None => break,
            Some(Step::Flush) => {
                if let Some(conflation) = &conflation {
                    let flushed = conflation.flush().await;
                    for msg in flushed {
                        stats.record_dequeue();
                        record_latency(&stats, &msg);
                        invoke_handler(
                            subscription_id,
                            &channel_name,
                            &msg,
                            &handler,
                            handler_timeout,
                            &on_timeout,
                            &stats,
                            &error_sink,
                        )
                        .await;
                        stats.record_processed();
                    }
                }
            }
            Some(Step::Direct(msg)) => {
                stats.record_dequeue();
                record_latency(&stats, &msg);
                invoke_handler(
                    subscription_id,
                    &channel_name,
                    &msg,
                    &handler,
                    handler_timeout,
                    &on_timeout,
                    &stats,
                    &error_sink,
                )
                .await;
                stats.record_processed();
            }
        }
    }
}

enum Step<T> {
    Direct(Message<T>),
    Flush,
}

/// Enqueue-to-dequeue latency, derived from the publish-time tick captured in
/// the message itself rather than a separate enqueue timestamp.
fn record_latency<T>(stats: &SubscriptionStats, msg: &Message<T>) {
    let elapsed_nanos = crate::message::now_ticks().saturating_sub(msg.inception_ticks);
    stats.record_latency(Duration::from_nanos(elapsed_nanos.min(u64::MAX as u128) as u64));
}

/// Runs the handler as its own task so a panic surfaces as a `JoinError`
/// rather than unwinding the read loop, then reports `HandlerFault`/
/// `HandlerTimeout` to the error sink without ever propagating to the caller.
#[allow(clippy::too_many_arguments)]
async fn invoke_handler<T: Clone + Send + 'static>(
    subscription_id: crate::ids::SubscriptionId,
    channel_name: &str,
    msg: &Message<T>,
    handler: &Handler<T>,
    handler_timeout: Option<Duration>,
    on_timeout: &Option<crate::subscription::options::OnTimeout>,
    stats: &Arc<SubscriptionStats>,
    error_sink: &Option<ErrorSink>,
) {
    let start = tokio::time::Instant::now();
    let task = tokio::spawn((handler)(msg.clone()));
    match handler_timeout {
        None => {
            match task.await {
                Ok(()) => stats.record_service_time(start.elapsed()),
                Err(join_err) => report_handler_fault(channel_name, subscription_id, &join_err, error_sink),
            }
        }
        Some(timeout) => {
            tokio::select! {
                res = task => {
                    match res {
                        Ok(()) => stats.record_service_time(start.elapsed()),
                        Err(join_err) => report_handler_fault(channel_name, subscription_id, &join_err, error_sink),
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    stats.record_timeout();
                    if let Some(cb) = on_timeout {
                        cb(TimeoutFailure {
                            subscription: subscription_id,
                            channel: channel_name.to_string(),
                            message_id: msg.id,
                            correlation_id: msg.correlation_id,
                        });
                    }
                    if let Some(sink) = error_sink {
                        sink(RuntimeFailure {
                            error_type: ErrorType::Timeout,
                            severity: ErrorSeverity::Warning,
                            message: format!(
                                "handler for message {} on {channel_name:?} exceeded {timeout:?}",
                                msg.id
                            ),
                            channel: channel_name.to_string(),
                            subscription: subscription_id,
                        });
                    }
                    // task keeps running detached; we never abort it.
                }
            }
        }
    }
}

fn report_handler_fault(
    channel_name: &str,
    subscription_id: crate::ids::SubscriptionId,
    join_err: &tokio::task::JoinError,
    error_sink: &Option<ErrorSink>,
) {
    tracing::warn!(
        subscription = %subscription_id,
        channel = %channel_name,
        error = %join_err,
        "handler fault"
    );
    if let Some(sink) = error_sink {
        sink(RuntimeFailure {
            error_type: ErrorType::Other,
            severity: ErrorSeverity::Critical,
            message: format!("handler for subscription {subscription_id} on {channel_name:?} panicked: {join_err}"),
            channel: channel_name.to_string(),
            subscription: subscription_id,
        });
    }
}
