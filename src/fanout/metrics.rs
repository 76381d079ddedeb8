use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Counters for messages handed to connection queues
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    messages: AtomicU64,
    bytes: AtomicU64,
}

/// Point-in-time copy of the delivery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages: u64,
    pub bytes: u64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one queued message of `bytes` length
    pub fn record(&self, bytes: usize) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Counts accumulated since `earlier`
    pub fn since(&self, earlier: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            messages: self.messages.saturating_sub(earlier.messages),
            bytes: self.bytes.saturating_sub(earlier.bytes),
        }
    }

    /// Messages per second over `elapsed`
    pub fn rate(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.messages as f64 / secs
    }
}

/// Log totals and the per-second message rate every `period`
pub async fn run_metrics_reporter(metrics: Arc<DeliveryMetrics>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    let mut last = metrics.snapshot();
    let mut last_at = Instant::now();
    loop {
        ticker.tick().await;
        let now = metrics.snapshot();
        let rate = now.since(&last).rate(last_at.elapsed());
        info!(
            messages = now.messages,
            per_sec = (rate * 10.0).round() / 10.0,
            megabytes = now.bytes / 1024 / 1024,
            "Outbound messages"
        );
        last = now;
        last_at = Instant::now();
    }
}
