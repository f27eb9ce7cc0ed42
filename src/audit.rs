//! Append-only status history per work order.
//!
//! Entries are ordered by `(timestamp, seq)`. The log never edits or deletes
//! an entry; retention is somebody else's problem.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::lifecycle::{AuditEntry, Status, TransitionEdge, TransitionOptions};
use crate::repository::WorkOrderRepository;

pub struct AuditLog {
    repo: Arc<dyn WorkOrderRepository>,
}

impl AuditLog {
    pub fn new(repo: Arc<dyn WorkOrderRepository>) -> Self {
        Self { repo }
    }

    /// Append one entry. It must directly follow the current tail: next `seq`
    /// and a timestamp no earlier than the tail's.
    ///
    /// Callers serialize appends per work order; the check here only guards
    /// the ordering contract, it is not a lock.
    pub async fn append(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let tail = self.latest(&entry.work_order_id).await?;
        check_follows(tail.as_ref(), entry)?;
        self.repo.append_audit_entry(entry).await
    }

    /// Full history, oldest first.
    pub async fn history(&self, work_order_id: &str) -> Result<Vec<AuditEntry>, StorageError> {
        let mut entries = self.repo.load_audit_entries(work_order_id).await?;
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        Ok(entries)
    }

    pub async fn latest(&self, work_order_id: &str) -> Result<Option<AuditEntry>, StorageError> {
        Ok(self.history(work_order_id).await?.pop())
    }
}

fn check_follows(tail: Option<&AuditEntry>, entry: &AuditEntry) -> Result<(), StorageError> {
    let expected_seq = tail.map_or(1, |t| t.seq + 1);
    if entry.seq != expected_seq {
        return Err(StorageError::OutOfOrder(format!(
            "work order {}: expected seq {expected_seq}, got {}",
            entry.work_order_id, entry.seq
        )));
    }
    if let Some(tail) = tail
        && entry.timestamp < tail.timestamp
    {
        return Err(StorageError::OutOfOrder(format!(
            "work order {}: timestamp {} precedes {}",
            entry.work_order_id, entry.timestamp, tail.timestamp
        )));
    }
    Ok(())
}

/// Build the entry that follows `tail`. The timestamp is clamped to the
/// tail's so a clock stepping backwards cannot break ordering.
pub fn next_entry(
    tail: Option<&AuditEntry>,
    work_order_id: &str,
    from: Status,
    to: Status,
    edge: TransitionEdge,
    now: DateTime<Utc>,
    opts: &TransitionOptions,
) -> AuditEntry {
    let timestamp = match tail {
        Some(t) if t.timestamp > now => t.timestamp,
        _ => now,
    };
    AuditEntry {
        id: Uuid::new_v4(),
        work_order_id: work_order_id.to_string(),
        seq: tail.map_or(1, |t| t.seq + 1),
        from_status: from,
        to_status: to,
        edge,
        timestamp,
        actor_id: opts.actor_id.clone(),
        note: opts.reason().map(str::to_string),
    }
}
