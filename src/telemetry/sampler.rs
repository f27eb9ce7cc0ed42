use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::geo::distance_m;
use super::sample::PositionSample;
use super::source::{AccuracyTier, PermissionGrant, PositionEvent, PositionSource};
use crate::error::TrackingError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: i64,

    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f64,

    #[serde(default)]
    pub accuracy: AccuracyTier,
}

fn default_min_interval_ms() -> i64 {
    5_000
}

fn default_min_distance_m() -> f64 {
    10.0
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            min_distance_m: default_min_distance_m(),
            accuracy: AccuracyTier::default(),
        }
    }
}

/// Passes a fix on when enough time has elapsed OR enough ground has been
/// covered since the last fix it passed on. The first fix always passes;
/// fixes not newer than the last one passed never do.
#[derive(Debug, Clone)]
pub struct SampleGate {
    config: SamplerConfig,
    last: Option<PositionSample>,
}

impl SampleGate {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config, last: None }
    }

    pub fn admit(&mut self, sample: &PositionSample) -> bool {
        let pass = match &self.last {
            None => true,
            Some(last) if sample.timestamp_ms <= last.timestamp_ms => false,
            Some(last) => {
                sample.timestamp_ms - last.timestamp_ms >= self.config.min_interval_ms
                    || distance_m(last, sample) >= self.config.min_distance_m
            }
        };
        if pass {
            self.last = Some(*sample);
        }
        pass
    }
}

type SampleCallback = Arc<dyn Fn(&PositionEvent) + Send + Sync>;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Wraps a [`PositionSource`] with gating and a start/stop lifecycle.
///
/// Subscribers registered with [`on_sample`](Self::on_sample) are called on
/// the sampler's background task, one event at a time.
pub struct TelemetrySampler {
    source: Arc<dyn PositionSource>,
    subscribers: Arc<RwLock<Vec<SampleCallback>>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl TelemetrySampler {
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self {
            source,
            subscribers: Arc::new(RwLock::new(Vec::new())),
            running: tokio::sync::Mutex::new(None),
        }
    }

    pub fn on_sample<F>(&self, callback: F)
    where
        F: Fn(&PositionEvent) + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// False once stopped, and also once the background task has ended on
    /// its own because the source closed.
    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Subscribe to the source and start delivering gated fixes. Does
    /// nothing if already started.
    pub async fn start(
        &self,
        config: SamplerConfig,
        _grant: &PermissionGrant,
    ) -> Result<(), TrackingError> {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("sampler already running");
            return Ok(());
        }

        let rx = self.source.subscribe(config.accuracy).await?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_sampler(
            rx,
            SampleGate::new(config),
            Arc::clone(&self.subscribers),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, task });

        info!(
            min_interval_ms = config.min_interval_ms,
            min_distance_m = config.min_distance_m,
            accuracy = ?config.accuracy,
            "sampler started"
        );
        Ok(())
    }

    /// Stop sampling. Returns once the background task has finished, so no
    /// callback runs after this returns. Safe to call repeatedly.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "sampler task ended abnormally");
        }
        info!("sampler stopped");
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

async fn run_sampler(
    mut rx: mpsc::Receiver<PositionEvent>,
    mut gate: SampleGate,
    subscribers: Arc<RwLock<Vec<SampleCallback>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(Ok(sample)) => {
                    if gate.admit(&sample) {
                        deliver(&subscribers, &Ok(sample));
                    } else {
                        trace!(timestamp_ms = sample.timestamp_ms, "fix gated");
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "position source reported a failure");
                    deliver(&subscribers, &Err(e));
                }
                None => {
                    deliver(&subscribers, &Err(TrackingError::SourceClosed));
                    break;
                }
            }
        }
    }
}

fn deliver(subscribers: &RwLock<Vec<SampleCallback>>, event: &PositionEvent) {
    let callbacks: Vec<SampleCallback> = subscribers
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    for callback in callbacks {
        callback(event);
    }
}
