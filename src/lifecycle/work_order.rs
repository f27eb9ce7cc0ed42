use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{Domain, Status};
use crate::error::StorageError;
use crate::telemetry::TelemetrySummary;

/// A delivery or repair job tracked through its status lifecycle.
///
/// `status` is a projection of the audit log and is only ever written by the
/// [`StatusEngine`](super::StatusEngine). `version` is bumped on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    pub domain: Domain,
    pub status: Status,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    /// A newly booked work order in its domain's initial status.
    pub fn new(id: impl Into<String>, domain: Domain) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            domain,
            status: domain.initial_status(),
            version: 0,
            telemetry: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// How an audit entry left its source status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEdge {
    /// An ordinary status change.
    Move,
    /// Re-entry into `assigned` from a terminal delivery status.
    Reopen,
}

/// One immutable record of a status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub work_order_id: String,
    /// Per-work-order insertion sequence, starting at 1. Breaks timestamp ties.
    pub seq: u64,
    pub from_status: Status,
    pub to_status: Status,
    pub edge: TransitionEdge,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Proof supplied by the caller that a delivery was handed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvidence {
    pub photo_ids: Vec<String>,
}

impl CompletionEvidence {
    pub fn photos<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            photo_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_present(&self) -> bool {
        self.photo_ids.iter().any(|id| !id.trim().is_empty())
    }
}

/// Caller-supplied context for a transition request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOptions {
    pub actor_id: Option<String>,
    pub note: Option<String>,
    pub evidence: Option<CompletionEvidence>,
    /// When set, the request fails with a concurrency conflict unless the
    /// stored work order still has this version.
    pub expected_version: Option<u64>,
}

impl TransitionOptions {
    pub fn by(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Default::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_evidence(mut self, evidence: CompletionEvidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// The note, if it carries any non-whitespace text.
    pub fn reason(&self) -> Option<&str> {
        self.note.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// A successful transition request.
#[derive(Debug, Clone, PartialEq)]
pub struct Transitioned {
    pub work_order: WorkOrder,
    /// `None` when the request was a same-status no-op.
    pub entry: Option<AuditEntry>,
    /// Set when the transition stopped tracking but its summary could not be
    /// stored on the work order. The summary stays readable until a later
    /// stop archives it.
    pub telemetry_error: Option<StorageError>,
}

impl Transitioned {
    pub fn is_noop(&self) -> bool {
        self.entry.is_none()
    }
}
