use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::aggregator::{AggregatorConfig, TelemetryAggregator, TelemetryReader};
use super::sample::TelemetrySummary;
use super::sampler::{SamplerConfig, TelemetrySampler};
use super::source::{PermissionGrant, PositionSource};
use crate::error::TrackingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Tracking,
    /// No longer sampling (source closed or halted) but its summary has not
    /// been discarded yet.
    Ended,
}

/// Identifies one tracking session. A handle from an earlier session of the
/// same work order does not stop a later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingHandle {
    work_order_id: String,
    session_id: Uuid,
    started_at: DateTime<Utc>,
}

impl TrackingHandle {
    pub fn work_order_id(&self) -> &str {
        &self.work_order_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

struct Session {
    handle: TrackingHandle,
    sampler: TelemetrySampler,
    reader: TelemetryReader,
    last_error: Arc<Mutex<Option<TrackingError>>>,
}

impl Session {
    fn last_error(&self) -> Option<TrackingError> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// One telemetry session per work order, each with its own sampler and
/// aggregator.
///
/// Stopping is two steps: [`halt`](Self::halt) ends sampling and hands back
/// the final summary, [`discard`](Self::discard) forgets the session once
/// that summary is stored elsewhere.
pub struct TrackingRegistry {
    source: Arc<dyn PositionSource>,
    aggregator_config: AggregatorConfig,
    sessions: AsyncMutex<HashMap<String, Session>>,
}

impl TrackingRegistry {
    pub fn new(source: Arc<dyn PositionSource>, aggregator_config: AggregatorConfig) -> Self {
        Self {
            source,
            aggregator_config,
            sessions: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &dyn PositionSource {
        self.source.as_ref()
    }

    /// Start tracking a work order. If a session is still sampling for it,
    /// its handle is returned and nothing restarts. An ended session is
    /// replaced, so callers that need its summary take it first.
    pub async fn start(
        &self,
        work_order_id: &str,
        config: SamplerConfig,
        grant: &PermissionGrant,
    ) -> Result<TrackingHandle, TrackingError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(work_order_id)
            && existing.sampler.is_running().await
        {
            return Ok(existing.handle.clone());
        }

        let aggregator = TelemetryAggregator::new(self.aggregator_config);
        let reader = aggregator.reader();
        let aggregator = Arc::new(Mutex::new(aggregator));
        let last_error = Arc::new(Mutex::new(None));

        let sampler = TelemetrySampler::new(Arc::clone(&self.source));
        let sink = Arc::clone(&aggregator);
        let errors = Arc::clone(&last_error);
        let id = work_order_id.to_string();
        sampler.on_sample(move |event| match event {
            Ok(sample) => {
                sink.lock().unwrap_or_else(|e| e.into_inner()).observe(*sample);
            }
            Err(e) => {
                warn!(work_order_id = %id, error = %e, "tracking error");
                *errors.lock().unwrap_or_else(|p| p.into_inner()) = Some(e.clone());
            }
        });
        sampler.start(config, grant).await?;

        let handle = TrackingHandle {
            work_order_id: work_order_id.to_string(),
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        info!(work_order_id, session_id = %handle.session_id, "tracking started");
        sessions.insert(
            work_order_id.to_string(),
            Session {
                handle: handle.clone(),
                sampler,
                reader,
                last_error,
            },
        );
        Ok(handle)
    }

    /// Stop sampling for the session the handle refers to and return its
    /// final summary. The session stays registered until discarded. `None`
    /// if that session is gone.
    pub async fn halt(&self, handle: &TrackingHandle) -> Option<TelemetrySummary> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(&handle.work_order_id)
            .filter(|s| s.handle.session_id == handle.session_id)?;
        Some(Self::finish(session).await)
    }

    /// Halt whatever session is registered for a work order.
    pub async fn halt_work_order(
        &self,
        work_order_id: &str,
    ) -> Option<(TrackingHandle, TelemetrySummary)> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(work_order_id)?;
        Some((session.handle.clone(), Self::finish(session).await))
    }

    /// Forget a session. Only the session the handle refers to is removed.
    pub async fn discard(&self, handle: &TrackingHandle) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&handle.work_order_id) {
            Some(s) if s.handle.session_id == handle.session_id => {
                sessions.remove(&handle.work_order_id);
                true
            }
            _ => false,
        }
    }

    /// Halt and discard in one step. Use when the summary is not persisted.
    pub async fn stop(&self, handle: &TrackingHandle) -> Option<TelemetrySummary> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get(&handle.work_order_id)
            .filter(|s| s.handle.session_id == handle.session_id)?;
        let summary = Self::finish(session).await;
        sessions.remove(&handle.work_order_id);
        Some(summary)
    }

    pub async fn stop_work_order(&self, work_order_id: &str) -> Option<TelemetrySummary> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.remove(work_order_id)?;
        Some(Self::finish(&session).await)
    }

    async fn finish(session: &Session) -> TelemetrySummary {
        session.sampler.stop().await;
        let summary = (*session.reader.current()).clone();
        info!(
            work_order_id = %session.handle.work_order_id,
            session_id = %session.handle.session_id,
            total_distance_km = summary.total_distance_km,
            samples = summary.sample_count,
            "tracking stopped"
        );
        summary
    }

    pub async fn state(&self, work_order_id: &str) -> SessionState {
        match self.sessions.lock().await.get(work_order_id) {
            None => SessionState::Idle,
            Some(s) if s.sampler.is_running().await => SessionState::Tracking,
            Some(_) => SessionState::Ended,
        }
    }

    pub async fn handle(&self, work_order_id: &str) -> Option<TrackingHandle> {
        self.sessions
            .lock()
            .await
            .get(work_order_id)
            .map(|s| s.handle.clone())
    }

    /// The most recent failure reported by the position source for this
    /// work order's session.
    pub async fn last_error(&self, work_order_id: &str) -> Option<TrackingError> {
        self.sessions
            .lock()
            .await
            .get(work_order_id)
            .and_then(Session::last_error)
    }

    /// A reader for the registered session. Hold on to it to poll without
    /// touching the registry again.
    pub async fn reader(&self, work_order_id: &str) -> Option<TelemetryReader> {
        self.sessions
            .lock()
            .await
            .get(work_order_id)
            .map(|s| s.reader.clone())
    }

    pub async fn telemetry(&self, work_order_id: &str) -> Option<Arc<TelemetrySummary>> {
        self.reader(work_order_id).await.map(|r| r.current())
    }

    pub async fn active_work_orders(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
