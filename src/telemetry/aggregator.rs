use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use super::geo::DistanceMode;
use super::sample::{PositionSample, TelemetrySummary};

pub const DEFAULT_WINDOW_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Ring buffer size. Values below 1 are treated as 1.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default)]
    pub distance_mode: DistanceMode,

    /// Ignore fixes whose reported accuracy radius exceeds this many meters.
    #[serde(default)]
    pub max_accuracy_m: Option<f64>,
}

fn default_capacity() -> usize {
    DEFAULT_WINDOW_CAPACITY
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            distance_mode: DistanceMode::default(),
            max_accuracy_m: None,
        }
    }
}

/// Folds an ordered stream of samples into a [`TelemetrySummary`].
///
/// Distance and average speed are running accumulators over every accepted
/// sample, so evicting old samples from the window never changes them.
/// There is one writer (`&mut self`); any number of [`TelemetryReader`]s see
/// each new snapshot without blocking it.
#[derive(Debug)]
pub struct TelemetryAggregator {
    config: AggregatorConfig,
    // Oldest at the front.
    window: VecDeque<PositionSample>,
    last_accepted: Option<PositionSample>,
    total_distance_km: f64,
    speed_sum_kmh: f64,
    speed_count: u64,
    sample_count: u64,
    published: watch::Sender<Arc<TelemetrySummary>>,
}

impl TelemetryAggregator {
    pub fn new(mut config: AggregatorConfig) -> Self {
        config.capacity = config.capacity.max(1);
        let (published, _) = watch::channel(Arc::new(TelemetrySummary::empty(config.capacity)));
        Self {
            window: VecDeque::with_capacity(config.capacity),
            config,
            last_accepted: None,
            total_distance_km: 0.0,
            speed_sum_kmh: 0.0,
            speed_count: 0,
            sample_count: 0,
            published,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Feed one sample and return the resulting summary.
    ///
    /// Samples not newer than the last accepted one, with unusable
    /// coordinates, or less accurate than `max_accuracy_m` are dropped
    /// silently and the current summary is returned unchanged.
    pub fn observe(&mut self, sample: PositionSample) -> Arc<TelemetrySummary> {
        if let Some(reason) = self.rejection(&sample) {
            debug!(timestamp_ms = sample.timestamp_ms, reason, "sample ignored");
            return self.summary();
        }

        if let Some(prev) = &self.last_accepted {
            self.total_distance_km += self.config.distance_mode.distance_km(prev, &sample);
        }
        if let Some(speed) = sample.speed_mps.filter(|s| s.is_finite()) {
            self.speed_sum_kmh += speed * 3.6;
            self.speed_count += 1;
        }
        self.sample_count += 1;
        self.last_accepted = Some(sample);

        if self.window.len() == self.config.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);

        let summary = Arc::new(self.build_summary());
        self.published.send_replace(Arc::clone(&summary));
        summary
    }

    fn rejection(&self, sample: &PositionSample) -> Option<&'static str> {
        if let Some(prev) = &self.last_accepted
            && sample.timestamp_ms <= prev.timestamp_ms
        {
            return Some("stale or duplicate timestamp");
        }
        if !sample.latitude.is_finite()
            || !sample.longitude.is_finite()
            || sample.latitude.abs() > 90.0
            || sample.longitude.abs() > 180.0
        {
            return Some("coordinates out of range");
        }
        if let (Some(limit), Some(accuracy)) = (self.config.max_accuracy_m, sample.accuracy)
            && accuracy > limit
        {
            return Some("accuracy below threshold");
        }
        None
    }

    fn build_summary(&self) -> TelemetrySummary {
        TelemetrySummary {
            total_distance_km: self.total_distance_km,
            average_speed_kmh: (self.speed_count > 0)
                .then(|| self.speed_sum_kmh / self.speed_count as f64),
            sample_count: self.sample_count,
            last_sample: self.last_accepted,
            window_size: self.window.len(),
            capacity: self.config.capacity,
            recent: self.recent().copied().collect(),
        }
    }

    /// The latest published snapshot.
    pub fn summary(&self) -> Arc<TelemetrySummary> {
        Arc::clone(&self.published.borrow())
    }

    /// Window contents, newest first.
    pub fn recent(&self) -> impl Iterator<Item = &PositionSample> {
        self.window.iter().rev()
    }

    pub fn reader(&self) -> TelemetryReader {
        TelemetryReader {
            rx: self.published.subscribe(),
        }
    }
}

/// Read side of an aggregator. Cheap to clone; never blocks the writer for
/// longer than an `Arc` clone.
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    rx: watch::Receiver<Arc<TelemetrySummary>>,
}

impl TelemetryReader {
    pub fn current(&self) -> Arc<TelemetrySummary> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next snapshot. `None` once the aggregator is gone.
    pub async fn changed(&mut self) -> Option<Arc<TelemetrySummary>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}
