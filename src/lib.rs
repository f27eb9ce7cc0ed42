//! Work-order status lifecycle with an append-only audit trail, plus GPS
//! telemetry sampling and aggregation for active work orders.

pub mod audit;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod repository;
pub mod telemetry;

pub use dispatcher::Dispatcher;
pub use error::{FieldtrackError, StorageError, TrackingError, TransitionError, TransitionFailure};
