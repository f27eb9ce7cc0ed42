use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::status::{DeliveryStatus, Domain, RepairStatus, Status};
use super::work_order::{AuditEntry, TransitionEdge, TransitionOptions, Transitioned, WorkOrder};
use crate::audit::{AuditLog, next_entry};
use crate::clock::Clock;
use crate::error::{StorageError, TransitionError, TransitionFailure};
use crate::repository::WorkOrderRepository;
use crate::telemetry::TelemetrySummary;

/// How strictly repair-job statuses are policed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Any status may follow any other, so operators can always correct a
    /// mistaken status.
    #[default]
    Permissive,
    /// Work moves forward only; completed and cancelled jobs stay closed.
    Forward,
}

/// The verdict of the transition table for one `(from, to)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Target equals the current status; nothing to record.
    Stay,
    Move,
    /// Terminal delivery back to `assigned`.
    Reopen,
    Denied(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionTable {
    repair_policy: RepairPolicy,
}

impl TransitionTable {
    pub fn new(repair_policy: RepairPolicy) -> Self {
        Self { repair_policy }
    }

    pub fn repair_policy(&self) -> RepairPolicy {
        self.repair_policy
    }

    /// Evaluate a requested edge. Terminal delivery statuses are checked
    /// before the same-status rule, so `completed -> completed` is denied
    /// rather than ignored.
    pub fn evaluate(&self, from: Status, to: Status) -> Transition {
        match (from, to) {
            (Status::Delivery(from), Status::Delivery(to)) => {
                if from.is_terminal() {
                    if to == DeliveryStatus::Assigned {
                        Transition::Reopen
                    } else {
                        Transition::Denied("already finished".into())
                    }
                } else if from == to {
                    Transition::Stay
                } else {
                    Transition::Move
                }
            }
            (Status::Repair(from), Status::Repair(to)) => {
                if from == to {
                    Transition::Stay
                } else if self.repair_allows(from, to) {
                    Transition::Move
                } else {
                    Transition::Denied(format!(
                        "{} -> {} is not allowed",
                        Status::Repair(from),
                        Status::Repair(to)
                    ))
                }
            }
            (from, to) => Transition::Denied(format!(
                "status {to} does not belong to the {} domain",
                from.domain()
            )),
        }
    }

    fn repair_allows(&self, from: RepairStatus, to: RepairStatus) -> bool {
        use RepairStatus::*;
        match self.repair_policy {
            RepairPolicy::Permissive => true,
            RepairPolicy::Forward => matches!(
                (from, to),
                (Pending, InProgress | Cancelled)
                    | (InProgress, WaitingParts | Completed | Cancelled)
                    | (WaitingParts, InProgress | Cancelled)
            ),
        }
    }

    /// Every permitted edge of a domain, for display.
    pub fn edges(&self, domain: Domain) -> Vec<(Status, Status, TransitionEdge)> {
        let statuses = domain.statuses();
        let mut edges = Vec::new();
        for &from in &statuses {
            for &to in &statuses {
                match self.evaluate(from, to) {
                    Transition::Move => edges.push((from, to, TransitionEdge::Move)),
                    Transition::Reopen => edges.push((from, to, TransitionEdge::Reopen)),
                    Transition::Stay | Transition::Denied(_) => {}
                }
            }
        }
        edges
    }
}

/// Caller-supplied preconditions that must hold before anything is written.
fn check_preconditions(target: Status, opts: &TransitionOptions) -> Result<(), TransitionError> {
    match target {
        Status::Delivery(DeliveryStatus::Completed) => {
            if !opts.evidence.as_ref().is_some_and(|e| e.is_present()) {
                return Err(TransitionError::Validation(
                    "missing completion evidence".into(),
                ));
            }
        }
        Status::Delivery(DeliveryStatus::Cancelled) => {
            if opts.reason().is_none() {
                return Err(TransitionError::Validation(
                    "missing cancellation reason".into(),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

type LockMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Gates status changes and keeps the audit log and status projection in
/// step.
///
/// The audit log is the source of truth: an entry is appended first, then
/// the work order's `status` is saved as its projection. If the process dies
/// between the two writes the next load rewrites the projection from the log.
pub struct StatusEngine {
    repo: Arc<dyn WorkOrderRepository>,
    audit: AuditLog,
    table: TransitionTable,
    clock: Arc<dyn Clock>,
    locks: LockMap,
}

impl StatusEngine {
    pub fn new(repo: Arc<dyn WorkOrderRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            audit: AuditLog::new(Arc::clone(&repo)),
            repo,
            table: TransitionTable::default(),
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_repair_policy(mut self, policy: RepairPolicy) -> Self {
        self.table = TransitionTable::new(policy);
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Request a status change.
    ///
    /// Requests for the same work order are serialized. On failure nothing
    /// has been written and the failure carries the work order as loaded.
    pub async fn request_transition(
        &self,
        work_order_id: &str,
        target: Status,
        opts: TransitionOptions,
    ) -> Result<Transitioned, TransitionFailure> {
        let result = {
            let slot = self.lock_for(work_order_id);
            let _guard = slot.lock.lock().await;
            match self.load_projected(work_order_id).await {
                Ok((order, tail)) => self
                    .apply(&order, tail.as_ref(), target, &opts)
                    .await
                    .map_err(|error| TransitionFailure::new(Some(order), error)),
                Err(err) => Err(TransitionFailure::new(None, err.into())),
            }
        };

        if let Err(failure) = &result {
            warn!(
                work_order_id,
                target = %target,
                error = %failure.error,
                "transition rejected"
            );
        }
        result
    }

    /// The current work order, with its status projection repaired if needed.
    pub async fn work_order(&self, work_order_id: &str) -> Result<WorkOrder, StorageError> {
        let slot = self.lock_for(work_order_id);
        let _guard = slot.lock.lock().await;
        self.load_projected(work_order_id).await.map(|(order, _)| order)
    }

    /// Store a finished tracking summary on the work order. Serialized with
    /// transitions; does not touch the audit log.
    pub async fn archive_telemetry(
        &self,
        work_order_id: &str,
        summary: TelemetrySummary,
    ) -> Result<WorkOrder, StorageError> {
        let slot = self.lock_for(work_order_id);
        let _guard = slot.lock.lock().await;
        self.store_telemetry(work_order_id, summary).await
    }

    /// Status history, oldest first.
    pub async fn history(&self, work_order_id: &str) -> Result<Vec<AuditEntry>, StorageError> {
        self.audit.history(work_order_id).await
    }

    async fn apply(
        &self,
        order: &WorkOrder,
        tail: Option<&AuditEntry>,
        target: Status,
        opts: &TransitionOptions,
    ) -> Result<Transitioned, TransitionError> {
        if target.domain() != order.domain {
            return Err(TransitionError::InvalidTransition(format!(
                "status {target} does not belong to the {} domain",
                order.domain
            )));
        }
        if let Some(expected) = opts.expected_version
            && expected != order.version
        {
            return Err(TransitionError::ConcurrencyConflict {
                expected,
                actual: order.version,
            });
        }

        let edge = match self.table.evaluate(order.status, target) {
            Transition::Stay => {
                debug!(work_order_id = %order.id, status = %order.status, "same-status request ignored");
                return Ok(Transitioned {
                    work_order: order.clone(),
                    entry: None,
                    telemetry_error: None,
                });
            }
            Transition::Move => TransitionEdge::Move,
            Transition::Reopen => TransitionEdge::Reopen,
            Transition::Denied(reason) => return Err(TransitionError::InvalidTransition(reason)),
        };
        check_preconditions(target, opts)?;

        let entry = next_entry(
            tail,
            &order.id,
            order.status,
            target,
            edge,
            self.clock.now(),
            opts,
        );
        self.audit.append(&entry).await?;

        let mut next = order.clone();
        next.status = target;
        next.version = order.version + 1;
        next.updated_at = entry.timestamp;
        self.repo.save_work_order(&next, order.version).await?;

        info!(
            work_order_id = %next.id,
            from = %entry.from_status,
            to = %entry.to_status,
            edge = ?entry.edge,
            seq = entry.seq,
            actor = entry.actor_id.as_deref().unwrap_or("-"),
            "status transition committed"
        );
        Ok(Transitioned {
            work_order: next,
            entry: Some(entry),
            telemetry_error: None,
        })
    }

    async fn store_telemetry(
        &self,
        work_order_id: &str,
        summary: TelemetrySummary,
    ) -> Result<WorkOrder, StorageError> {
        let (mut order, _) = self.load_projected(work_order_id).await?;
        let expected = order.version;
        order.telemetry = Some(summary);
        order.version = expected + 1;
        order.updated_at = self.clock.now().max(order.updated_at);
        self.repo.save_work_order(&order, expected).await?;
        debug!(work_order_id, version = order.version, "telemetry archived");
        Ok(order)
    }

    async fn load_projected(
        &self,
        work_order_id: &str,
    ) -> Result<(WorkOrder, Option<AuditEntry>), StorageError> {
        let mut order = self.repo.load_work_order(work_order_id).await?;
        let tail = self.audit.latest(work_order_id).await?;

        if let Some(tail) = &tail
            && tail.to_status != order.status
        {
            warn!(
                work_order_id,
                stored = %order.status,
                logged = %tail.to_status,
                "status projection behind audit log, repairing"
            );
            let expected = order.version;
            order.status = tail.to_status;
            order.version = expected + 1;
            order.updated_at = tail.timestamp;
            self.repo.save_work_order(&order, expected).await?;
        }
        Ok((order, tail))
    }

    fn lock_for(&self, work_order_id: &str) -> LockSlot<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = Arc::clone(locks.entry(work_order_id.to_string()).or_default());
        LockSlot {
            locks: &self.locks,
            work_order_id: work_order_id.to_string(),
            lock,
        }
    }
}

/// A claim on one work order's lock. Dropping it, including when the
/// request future is dropped mid-wait, removes the map entry once no other
/// request holds a claim.
struct LockSlot<'a> {
    locks: &'a LockMap,
    work_order_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map and this slot hold it.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.work_order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::CompletionEvidence;
    use crate::repository::{InMemoryWorkOrderStore, MockWorkOrderRepository};
    use chrono::{Duration, Utc};

    async fn engine_with(order: WorkOrder) -> (StatusEngine, Arc<InMemoryWorkOrderStore>) {
        let store = Arc::new(InMemoryWorkOrderStore::new());
        store.insert(order).await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = StatusEngine::new(store.clone(), clock);
        (engine, store)
    }

    fn delivery(s: DeliveryStatus) -> Status {
        Status::Delivery(s)
    }

    fn repair(s: RepairStatus) -> Status {
        Status::Repair(s)
    }

    fn evidence() -> TransitionOptions {
        TransitionOptions::by("driver-1").with_evidence(CompletionEvidence::photos(["p1"]))
    }

    fn options_for(target: Status) -> TransitionOptions {
        match target {
            Status::Delivery(DeliveryStatus::Completed) => evidence(),
            Status::Delivery(DeliveryStatus::Cancelled) => {
                TransitionOptions::by("ops").with_note("customer request")
            }
            _ => TransitionOptions::by("ops"),
        }
    }

    /// Put a fresh work order into `status` through real transitions.
    async fn engine_at(status: Status) -> StatusEngine {
        let domain = status.domain();
        let (engine, _) = engine_with(WorkOrder::new("WO-1", domain)).await;
        if status != domain.initial_status() {
            engine
                .request_transition("WO-1", status, options_for(status))
                .await
                .unwrap();
        }
        engine
    }

    #[test]
    fn terminal_delivery_only_reopens() {
        let table = TransitionTable::default();
        for terminal in [
            DeliveryStatus::Completed,
            DeliveryStatus::Failed,
            DeliveryStatus::Cancelled,
        ] {
            for target in DeliveryStatus::ALL {
                let verdict = table.evaluate(delivery(terminal), delivery(target));
                if target == DeliveryStatus::Assigned {
                    assert_eq!(verdict, Transition::Reopen);
                } else {
                    assert_eq!(verdict, Transition::Denied("already finished".into()));
                }
            }
        }
    }

    #[test]
    fn forward_repair_policy_closes_finished_jobs() {
        let table = TransitionTable::new(RepairPolicy::Forward);
        assert_eq!(
            table.evaluate(repair(RepairStatus::Pending), repair(RepairStatus::InProgress)),
            Transition::Move
        );
        assert!(matches!(
            table.evaluate(repair(RepairStatus::Completed), repair(RepairStatus::InProgress)),
            Transition::Denied(_)
        ));
        assert!(matches!(
            table.evaluate(repair(RepairStatus::Pending), repair(RepairStatus::Completed)),
            Transition::Denied(_)
        ));
        let permissive = TransitionTable::default();
        assert_eq!(
            permissive.evaluate(repair(RepairStatus::Completed), repair(RepairStatus::Pending)),
            Transition::Move
        );
    }

    #[test]
    fn edges_list_reopen_separately() {
        let edges = TransitionTable::default().edges(Domain::Delivery);
        let reopens: Vec<_> = edges
            .iter()
            .filter(|(_, _, e)| *e == TransitionEdge::Reopen)
            .collect();
        assert_eq!(reopens.len(), 3);
        // 3 live statuses x 5 other targets + 3 reopen edges.
        assert_eq!(edges.len(), 18);
    }

    #[tokio::test]
    async fn repeated_target_is_noop_or_invalid_for_every_pair() {
        for domain in [Domain::Delivery, Domain::Repair] {
            for current in domain.statuses() {
                for target in domain.statuses() {
                    let engine = engine_at(current).await;
                    let first = engine
                        .request_transition("WO-1", target, options_for(target))
                        .await;
                    if first.is_err() {
                        continue;
                    }
                    let before = engine.history("WO-1").await.unwrap().len();
                    let second = engine
                        .request_transition("WO-1", target, options_for(target))
                        .await;
                    let after = engine.history("WO-1").await.unwrap().len();
                    assert_eq!(before, after, "{current} -> {target} appended twice");
                    match second {
                        Ok(t) => assert!(t.is_noop()),
                        Err(f) => assert!(
                            matches!(f.error, TransitionError::InvalidTransition(_)),
                            "{current} -> {target}: {}",
                            f.error
                        ),
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn reopen_from_every_terminal_appends_one_entry() {
        for terminal in [
            DeliveryStatus::Completed,
            DeliveryStatus::Failed,
            DeliveryStatus::Cancelled,
        ] {
            let engine = engine_at(delivery(terminal)).await;
            let done = engine
                .request_transition("WO-1", delivery(DeliveryStatus::Assigned), TransitionOptions::default())
                .await
                .unwrap();
            let entry = done.entry.unwrap();
            assert_eq!(entry.edge, TransitionEdge::Reopen);
            assert_eq!(entry.from_status, delivery(terminal));
            assert_eq!(engine.history("WO-1").await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn missing_evidence_writes_nothing() {
        let (engine, store) = engine_with(WorkOrder::new("WO-1", Domain::Delivery)).await;
        let failure = engine
            .request_transition("WO-1", delivery(DeliveryStatus::Completed), TransitionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            failure.error,
            TransitionError::Validation("missing completion evidence".into())
        );
        assert_eq!(failure.work_order.unwrap().status, delivery(DeliveryStatus::Pending));
        assert!(engine.history("WO-1").await.unwrap().is_empty());
        let stored = store.load_work_order("WO-1").await.unwrap();
        assert_eq!(stored.version, 0);
    }

    #[tokio::test]
    async fn cancellation_needs_a_reason() {
        let (engine, _) = engine_with(WorkOrder::new("WO-1", Domain::Delivery)).await;
        let failure = engine
            .request_transition(
                "WO-1",
                delivery(DeliveryStatus::Cancelled),
                TransitionOptions::by("ops").with_note("   "),
            )
            .await
            .unwrap_err();
        assert_eq!(
            failure.error,
            TransitionError::Validation("missing cancellation reason".into())
        );

        let done = engine
            .request_transition(
                "WO-1",
                delivery(DeliveryStatus::Cancelled),
                TransitionOptions::by("ops").with_note("address invalid"),
            )
            .await
            .unwrap();
        assert_eq!(done.entry.unwrap().note.as_deref(), Some("address invalid"));
    }

    #[tokio::test]
    async fn foreign_domain_status_is_invalid() {
        let (engine, _) = engine_with(WorkOrder::new("WO-1", Domain::Repair)).await;
        let failure = engine
            .request_transition("WO-1", delivery(DeliveryStatus::Assigned), TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(failure.error, TransitionError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (engine, _) = engine_with(WorkOrder::new("WO-1", Domain::Repair)).await;
        let first = engine
            .request_transition(
                "WO-1",
                repair(RepairStatus::InProgress),
                TransitionOptions::by("tech-1").at_version(0),
            )
            .await
            .unwrap();
        assert_eq!(first.work_order.version, 1);

        let failure = engine
            .request_transition(
                "WO-1",
                repair(RepairStatus::Completed),
                TransitionOptions::by("tech-2").at_version(0),
            )
            .await
            .unwrap_err();
        assert_eq!(
            failure.error,
            TransitionError::ConcurrencyConflict {
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(engine.history("WO-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_are_serialized() {
        let (engine, _) = engine_with(WorkOrder::new("WO-1", Domain::Delivery)).await;
        let engine = Arc::new(engine);
        engine
            .request_transition("WO-1", delivery(DeliveryStatus::InTransit), TransitionOptions::default())
            .await
            .unwrap();

        // Both callers saw version 1; exactly one may win.
        let a = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .request_transition("WO-1", delivery(DeliveryStatus::Completed), evidence().at_version(1))
                    .await
            })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .request_transition(
                        "WO-1",
                        delivery(DeliveryStatus::Cancelled),
                        TransitionOptions::by("ops").with_note("no show").at_version(1),
                    )
                    .await
            })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(engine.history("WO-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn projection_is_repaired_from_log() {
        let (engine, store) = engine_with(WorkOrder::new("WO-1", Domain::Delivery)).await;
        // Simulate a crash after the append but before the projection save.
        let entry = next_entry(
            None,
            "WO-1",
            delivery(DeliveryStatus::Pending),
            delivery(DeliveryStatus::Assigned),
            TransitionEdge::Move,
            Utc::now(),
            &TransitionOptions::default(),
        );
        store.append_audit_entry(&entry).await.unwrap();

        let order = engine.work_order("WO-1").await.unwrap();
        assert_eq!(order.status, delivery(DeliveryStatus::Assigned));
        assert_eq!(store.load_work_order("WO-1").await.unwrap().version, 1);

        let next = engine
            .request_transition("WO-1", delivery(DeliveryStatus::InTransit), TransitionOptions::default())
            .await
            .unwrap();
        assert_eq!(next.entry.unwrap().seq, 2);
    }

    #[tokio::test]
    async fn clock_going_backwards_keeps_history_monotonic() {
        let store = Arc::new(InMemoryWorkOrderStore::new());
        store.insert(WorkOrder::new("WO-1", Domain::Repair)).await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = StatusEngine::new(store, clock.clone());

        engine
            .request_transition("WO-1", repair(RepairStatus::InProgress), TransitionOptions::default())
            .await
            .unwrap();
        clock.advance(Duration::minutes(-10));
        engine
            .request_transition("WO-1", repair(RepairStatus::WaitingParts), TransitionOptions::default())
            .await
            .unwrap();

        let history = engine.history("WO-1").await.unwrap();
        assert!(history[0].timestamp <= history[1].timestamp);
        assert_eq!(history[1].to_status, repair(RepairStatus::WaitingParts));
    }

    #[tokio::test]
    async fn storage_errors_surface_unchanged() {
        let mut repo = MockWorkOrderRepository::new();
        repo.expect_load_work_order()
            .returning(|_| Err(StorageError::Unavailable("timeout".into())));
        let engine = StatusEngine::new(Arc::new(repo), Arc::new(ManualClock::new(Utc::now())));

        let failure = engine
            .request_transition("WO-1", repair(RepairStatus::InProgress), TransitionOptions::default())
            .await
            .unwrap_err();
        assert!(failure.work_order.is_none());
        assert_eq!(
            failure.error,
            TransitionError::Storage(StorageError::Unavailable("timeout".into()))
        );
    }

    #[tokio::test]
    async fn failed_append_leaves_status_alone() {
        let order = WorkOrder::new("WO-1", Domain::Repair);
        let loaded = order.clone();
        let mut repo = MockWorkOrderRepository::new();
        repo.expect_load_work_order()
            .returning(move |_| Ok(loaded.clone()));
        repo.expect_load_audit_entries().returning(|_| Ok(Vec::new()));
        repo.expect_append_audit_entry()
            .returning(|_| Err(StorageError::Unavailable("write failed".into())));
        repo.expect_save_work_order().never();

        let engine = StatusEngine::new(Arc::new(repo), Arc::new(ManualClock::new(Utc::now())));
        let failure = engine
            .request_transition("WO-1", repair(RepairStatus::InProgress), TransitionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(failure.work_order, Some(order));
        assert!(matches!(failure.error, TransitionError::Storage(_)));
    }

    #[tokio::test]
    async fn archived_telemetry_bumps_version_without_audit_entry() {
        let (engine, store) = engine_with(WorkOrder::new("WO-1", Domain::Delivery)).await;
        let summary = TelemetrySummary {
            total_distance_km: 4.2,
            sample_count: 7,
            ..TelemetrySummary::empty(50)
        };
        let order = engine.archive_telemetry("WO-1", summary.clone()).await.unwrap();
        assert_eq!(order.version, 1);
        assert_eq!(store.load_work_order("WO-1").await.unwrap().telemetry, Some(summary));
        assert!(engine.history("WO-1").await.unwrap().is_empty());

        let stale = engine
            .request_transition(
                "WO-1",
                delivery(DeliveryStatus::Assigned),
                TransitionOptions::default().at_version(0),
            )
            .await
            .unwrap_err();
        assert_eq!(
            stale.error,
            TransitionError::ConcurrencyConflict {
                expected: 0,
                actual: 1
            }
        );
    }

    fn lock_entries(engine: &StatusEngine) -> usize {
        engine.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn abandoned_request_releases_its_lock_entry() {
        let (engine, _) = engine_with(WorkOrder::new("WO-1", Domain::Delivery)).await;
        let slot = engine.lock_for("WO-1");
        let guard = slot.lock.lock().await;

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            engine.request_transition(
                "WO-1",
                delivery(DeliveryStatus::Assigned),
                TransitionOptions::by("ops"),
            ),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(lock_entries(&engine), 1);

        drop(guard);
        drop(slot);
        assert_eq!(lock_entries(&engine), 0);

        engine
            .request_transition("WO-1", delivery(DeliveryStatus::Assigned), TransitionOptions::by("ops"))
            .await
            .unwrap();
        assert_eq!(lock_entries(&engine), 0);
    }
}
