//! Stats trackers: per-subscription latency/throughput counters and per-channel
//! publish counters. Percentiles are tracked with a fixed-size reservoir so the hot
//! path never allocates per message.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::subscription::options::StatsOptions;

/// Exponentially-weighted moving average over a bounded window, with a fixed-size
/// reservoir for percentile estimation. Both run in O(1) per observation.
pub struct PercentileTracker {
    alpha: f64,
    percentile: f64,
    ewma_micros: Mutex<f64>,
    reservoir: Mutex<Vec<f64>>,
    reservoir_cap: usize,
    count: AtomicU64,
}

impl PercentileTracker {
    pub fn new(options: StatsOptions) -> Self {
        Self {
            alpha: options.alpha,
            percentile: options.percentile,
            ewma_micros: Mutex::new(0.0),
            reservoir: Mutex::new(Vec::with_capacity(options.ewma_window_size)),
            reservoir_cap: options.ewma_window_size.max(1),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, d: Duration) {
        let micros = d.as_micros() as f64;
        let n = self.count.fetch_add(1, Ordering::Relaxed);

        let mut ewma = self.ewma_micros.lock().unwrap();
        *ewma = if n == 0 {
            micros
        } else {
            self.alpha * micros + (1.0 - self.alpha) * *ewma
        };
        drop(ewma);

        let mut reservoir = self.reservoir.lock().unwrap();
        if reservoir.len() < self.reservoir_cap {
            reservoir.push(micros);
        } else {
            let idx = (n as usize) % self.reservoir_cap;
            reservoir[idx] = micros;
        }
    }

    pub fn ewma(&self) -> Duration {
        Duration::from_micros(*self.ewma_micros.lock().unwrap() as u64)
    }

    pub fn percentile(&self) -> Duration {
        let mut sorted: Vec<f64> = self.reservoir.lock().unwrap().clone();
        if sorted.is_empty() {
            return Duration::ZERO;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((self.percentile * sorted.len() as f64) as usize).min(sorted.len() - 1);
        Duration::from_micros(sorted[idx] as u64)
    }

    pub fn min(&self) -> Duration {
        let reservoir = self.reservoir.lock().unwrap();
        let min_micros = reservoir.iter().cloned().fold(f64::INFINITY, f64::min);
        if min_micros.is_finite() {
            Duration::from_micros(min_micros as u64)
        } else {
            Duration::ZERO
        }
    }

    pub fn max(&self) -> Duration {
        let reservoir = self.reservoir.lock().unwrap();
        let max_micros = reservoir.iter().cloned().fold(0.0, f64::max);
        Duration::from_micros(max_micros as u64)
    }
}

/// Per-subscription counters and latency/service-time trackers.
pub struct SubscriptionStats {
    pub offered: AtomicU64,
    pub enqueued: AtomicU64,
    pub dequeued: AtomicU64,
    pub processed: AtomicU64,
    pub dropped: AtomicU64,
    pub timeouts: AtomicU64,
    pub conflation_hits: AtomicU64,
    pub queue_depth: AtomicUsize,
    latency: PercentileTracker,
    service_time: PercentileTracker,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriptionStatsSnapshot {
    pub offered: u64,
    pub enqueued: u64,
    pub dequeued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub timeouts: u64,
    pub conflation_hits: u64,
    pub queue_depth: usize,
    pub conflation_ratio: f64,
    pub latency_ewma: Duration,
    pub latency_percentile: Duration,
    pub latency_min: Duration,
    pub latency_max: Duration,
    pub service_time_ewma: Duration,
    pub service_time_percentile: Duration,
    pub service_time_min: Duration,
    pub service_time_max: Duration,
}

impl SubscriptionStats {
    pub fn new(options: StatsOptions) -> Self {
        Self {
            offered: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            conflation_hits: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            latency: PercentileTracker::new(options),
            service_time: PercentileTracker::new(options),
        }
    }

    pub fn record_offer(&self) {
        self.offered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_enqueue(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflation_hit(&self) {
        self.conflation_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dequeue(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records the enqueue-to-dequeue latency for a message taken off the buffer.
    pub fn record_latency(&self, d: Duration) {
        self.latency.observe(d);
    }

    /// Records the dequeue-to-handler-complete service time.
    pub fn record_service_time(&self, d: Duration) {
        self.service_time.observe(d);
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SubscriptionStatsSnapshot {
        let offered = self.offered.load(Ordering::Relaxed);
        let dequeued = self.dequeued.load(Ordering::Relaxed);
        // 1 - delivered/offered: the fraction of keyed offers that got conflated away.
        let conflation_ratio = if offered > 0 {
            1.0 - (dequeued as f64 / offered as f64)
        } else {
            0.0
        };
        SubscriptionStatsSnapshot {
            offered,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued,
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            conflation_hits: self.conflation_hits.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
            conflation_ratio,
            latency_ewma: self.latency.ewma(),
            latency_percentile: self.latency.percentile(),
            latency_min: self.latency.min(),
            latency_max: self.latency.max(),
            service_time_ewma: self.service_time.ewma(),
            service_time_percentile: self.service_time.percentile(),
            service_time_min: self.service_time.min(),
            service_time_max: self.service_time.max(),
        }
    }
}

/// Per-channel publish-side counters.
#[derive(Default)]
pub struct ChannelStats {
    pub total_published: AtomicU64,
    pub last_published_at: AtomicU64,
    first_published_at: AtomicU64,
    last_publisher_tag: Mutex<Option<std::sync::Arc<str>>>,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_publish(&self, at: u128, from_tag: Option<std::sync::Arc<str>>) {
        self.total_published.fetch_add(1, Ordering::Relaxed);
        self.last_published_at.store(at as u64, Ordering::Relaxed);
        self.first_published_at
            .compare_exchange(0, at as u64, Ordering::Relaxed, Ordering::Relaxed)
            .ok();
        if from_tag.is_some() {
            *self.last_publisher_tag.lock().unwrap() = from_tag;
        }
    }

    pub fn total_published(&self) -> u64 {
        self.total_published.load(Ordering::Relaxed)
    }

    pub fn last_published_at(&self) -> Option<u128> {
        let v = self.last_published_at.load(Ordering::Relaxed);
        if v == 0 { None } else { Some(v as u128) }
    }

    pub fn last_publisher_tag(&self) -> Option<std::sync::Arc<str>> {
        self.last_publisher_tag.lock().unwrap().clone()
    }

    /// Messages per second since this channel's first publish, in nanosecond ticks.
    pub fn publish_rate(&self) -> f64 {
        let total = self.total_published();
        if total == 0 {
            return 0.0;
        }
        let first = self.first_published_at.load(Ordering::Relaxed);
        let last = self.last_published_at.load(Ordering::Relaxed);
        let elapsed_secs = (last.saturating_sub(first)) as f64 / 1_000_000_000.0;
        if elapsed_secs <= 0.0 {
            total as f64
        } else {
            total as f64 / elapsed_secs
        }
    }
}
