//! GPS sampling and per-work-order aggregation.

mod aggregator;
mod geo;
mod sample;
mod sampler;
mod session;
mod source;

pub use aggregator::{AggregatorConfig, DEFAULT_WINDOW_CAPACITY, TelemetryAggregator, TelemetryReader};
pub use geo::{DistanceMode, EARTH_RADIUS_KM, distance_m, haversine_km, planar_km};
pub use sample::{PositionSample, TelemetrySummary};
pub use sampler::{SampleGate, SamplerConfig, TelemetrySampler};
pub use session::{SessionState, TrackingHandle, TrackingRegistry};
pub use source::{
    AccuracyTier, PermissionGrant, PermissionState, PositionEvent, PositionSource,
    SimulatedPositionSource,
};
