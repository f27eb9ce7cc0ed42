use serde::{Deserialize, Serialize};

/// One position reading from the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// `None` when the device could not measure speed. Not the same as 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    pub timestamp_ms: i64,
}

impl PositionSample {
    pub fn at(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            heading: None,
            speed_mps: None,
            timestamp_ms,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy = Some(accuracy_m);
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }
}

/// Immutable snapshot of a tracking session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    pub total_distance_km: f64,
    /// Mean of measured speeds only; `None` until one arrives.
    pub average_speed_kmh: Option<f64>,
    /// Samples accepted over the whole session, including evicted ones.
    pub sample_count: u64,
    pub last_sample: Option<PositionSample>,
    /// Samples currently held in the window.
    pub window_size: usize,
    pub capacity: usize,
    /// The window, newest first.
    pub recent: Vec<PositionSample>,
}

impl TelemetrySummary {
    pub fn empty(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }
}
