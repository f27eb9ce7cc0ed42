//! Entry point for the rest of the app: status changes, history and GPS
//! tracking for work orders.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::FieldtrackConfig;
use crate::error::{FieldtrackError, StorageError, TrackingError, TransitionFailure};
use crate::lifecycle::{AuditEntry, StatusEngine, Status, TransitionOptions, Transitioned, WorkOrder};
use crate::repository::WorkOrderRepository;
use crate::telemetry::{
    PermissionGrant, PositionSource, SamplerConfig, SessionState, TelemetryReader,
    TelemetrySummary, TrackingHandle, TrackingRegistry,
};

/// Ties the status engine to per-work-order tracking sessions.
///
/// Tracking may only start while a work order is in an active status. A
/// committed transition out of that status stops the session and archives
/// its summary on the work order.
pub struct Dispatcher {
    engine: StatusEngine,
    tracking: TrackingRegistry,
    sampler: SamplerConfig,
}

impl Dispatcher {
    pub fn new(
        repo: Arc<dyn WorkOrderRepository>,
        source: Arc<dyn PositionSource>,
        clock: Arc<dyn Clock>,
        config: &FieldtrackConfig,
    ) -> Self {
        Self {
            engine: StatusEngine::new(repo, clock)
                .with_repair_policy(config.lifecycle.repair_policy),
            tracking: TrackingRegistry::new(source, config.aggregator),
            sampler: config.sampler,
        }
    }

    pub fn engine(&self) -> &StatusEngine {
        &self.engine
    }

    /// Run a transition. When it leaves an active status, tracking stops and
    /// the summary is archived on the work order. A failed archive does not
    /// undo the transition: it is reported in `telemetry_error` and the
    /// summary stays with the ended session until [`stop_tracking`] stores it.
    ///
    /// [`stop_tracking`]: Self::stop_tracking
    pub async fn request_transition(
        &self,
        work_order_id: &str,
        target: Status,
        opts: TransitionOptions,
    ) -> Result<Transitioned, TransitionFailure> {
        let mut done = self
            .engine
            .request_transition(work_order_id, target, opts)
            .await?;

        let left_active = done
            .entry
            .as_ref()
            .is_some_and(|entry| !entry.to_status.is_active());
        if left_active
            && let Some((handle, summary)) = self.tracking.halt_work_order(work_order_id).await
        {
            match self.archive_session(&handle, summary).await {
                Ok(order) => done.work_order = order,
                Err(e) => {
                    warn!(
                        work_order_id,
                        error = %e,
                        "status changed but telemetry could not be archived"
                    );
                    done.telemetry_error = Some(e);
                }
            }
        }
        Ok(done)
    }

    /// Audit entries for a work order, oldest first.
    pub async fn status_history(&self, work_order_id: &str) -> Result<Vec<AuditEntry>, StorageError> {
        self.engine.history(work_order_id).await
    }

    pub async fn work_order(&self, work_order_id: &str) -> Result<WorkOrder, StorageError> {
        self.engine.work_order(work_order_id).await
    }

    /// Ask the position source for permission, prompting if needed.
    pub async fn acquire_permission(&self) -> Result<PermissionGrant, TrackingError> {
        PermissionGrant::acquire(self.tracking.source()).await
    }

    /// Start a tracking session. `config` falls back to the configured
    /// sampler rules. A session that ended on its own is archived before a
    /// new one replaces it.
    pub async fn start_tracking(
        &self,
        work_order_id: &str,
        config: Option<SamplerConfig>,
        grant: &PermissionGrant,
    ) -> Result<TrackingHandle, FieldtrackError> {
        let order = self.engine.work_order(work_order_id).await?;
        ensure_active(&order)?;

        if self.tracking.state(work_order_id).await == SessionState::Ended
            && let Some((ended, summary)) = self.tracking.halt_work_order(work_order_id).await
        {
            self.archive_session(&ended, summary).await?;
        }

        let handle = self
            .tracking
            .start(work_order_id, config.unwrap_or(self.sampler), grant)
            .await?;

        // A transition may have left the active status while the session was
        // starting, before there was anything for it to stop.
        let recheck = self
            .engine
            .work_order(work_order_id)
            .await
            .map_err(FieldtrackError::from)
            .and_then(|order| ensure_active(&order).map_err(Into::into));
        if let Err(e) = recheck {
            self.tracking.stop(&handle).await;
            debug!(work_order_id, error = %e, "tracking rolled back");
            return Err(e);
        }
        Ok(handle)
    }

    /// Stop a session and archive its summary. Returns `None` if the session
    /// is already gone. If archiving fails the session is kept, so calling
    /// again retries.
    pub async fn stop_tracking(
        &self,
        handle: &TrackingHandle,
    ) -> Result<Option<TelemetrySummary>, FieldtrackError> {
        let Some(summary) = self.tracking.halt(handle).await else {
            return Ok(None);
        };
        self.archive_session(handle, summary.clone()).await?;
        Ok(Some(summary))
    }

    async fn archive_session(
        &self,
        handle: &TrackingHandle,
        summary: TelemetrySummary,
    ) -> Result<WorkOrder, StorageError> {
        let order = self
            .engine
            .archive_telemetry(handle.work_order_id(), summary)
            .await?;
        self.tracking.discard(handle).await;
        info!(
            work_order_id = handle.work_order_id(),
            session_id = %handle.session_id(),
            "tracking summary archived"
        );
        Ok(order)
    }

    /// Summary of the registered session, running or ended, else the
    /// archived one.
    pub async fn telemetry(&self, work_order_id: &str) -> Result<TelemetrySummary, FieldtrackError> {
        if let Some(live) = self.tracking.telemetry(work_order_id).await {
            return Ok((*live).clone());
        }
        let order = self.engine.work_order(work_order_id).await?;
        order
            .telemetry
            .ok_or_else(|| TrackingError::NotTracking(work_order_id.to_string()).into())
    }

    pub async fn telemetry_reader(&self, work_order_id: &str) -> Option<TelemetryReader> {
        self.tracking.reader(work_order_id).await
    }

    pub async fn tracking_state(&self, work_order_id: &str) -> SessionState {
        self.tracking.state(work_order_id).await
    }

    pub async fn tracking_handle(&self, work_order_id: &str) -> Option<TrackingHandle> {
        self.tracking.handle(work_order_id).await
    }

    /// Last failure the position source reported for this work order's
    /// session, such as `SourceClosed` once a route has run out.
    pub async fn tracking_error(&self, work_order_id: &str) -> Option<TrackingError> {
        self.tracking.last_error(work_order_id).await
    }
}

fn ensure_active(order: &WorkOrder) -> Result<(), TrackingError> {
    if order.status.is_active() {
        Ok(())
    } else {
        Err(TrackingError::NotActive {
            work_order_id: order.id.clone(),
            status: order.status.to_string(),
        })
    }
}
