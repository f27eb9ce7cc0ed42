use thiserror::Error;

use crate::lifecycle::WorkOrder;

/// Top-level error for the binary and configuration loading.
#[derive(Debug, Error)]
pub enum FieldtrackError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Tracking error: {0}")]
    Tracking(#[from] TrackingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Failures raised by a [`WorkOrderRepository`](crate::repository::WorkOrderRepository).
///
/// The core never retries these; they are handed to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("work order not found: {0}")]
    NotFound(String),

    #[error("work order already exists: {0}")]
    AlreadyExists(String),

    #[error("version mismatch (expected {expected}, found {actual})")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("audit entry out of order: {0}")]
    OutOfOrder(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Why a status transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// A precondition for the transition is missing (evidence, reason).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The edge is not permitted from the current status.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The caller acted on a stale version; refetch and retry.
    #[error("concurrency conflict (expected version {expected}, current {actual})")]
    ConcurrencyConflict { expected: u64, actual: u64 },

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for TransitionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionMismatch { expected, actual } => {
                TransitionError::ConcurrencyConflict { expected, actual }
            }
            other => TransitionError::Storage(other),
        }
    }
}

/// A refused transition together with the untouched work order, when it
/// could be loaded.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TransitionFailure {
    pub work_order: Option<WorkOrder>,
    #[source]
    pub error: TransitionError,
}

impl TransitionFailure {
    pub fn new(work_order: Option<WorkOrder>, error: TransitionError) -> Self {
        Self { work_order, error }
    }
}

/// Position-source and tracking-session failures. Scoped to one session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("position request timed out")]
    Timeout,

    #[error("position source closed")]
    SourceClosed,

    #[error("no tracking session for work order {0}")]
    NotTracking(String),

    #[error("work order {work_order_id} is {status}, tracking needs an active status")]
    NotActive {
        work_order_id: String,
        status: String,
    },
}
