//! The device positioning capability the sampler consumes.
//!
//! Real devices implement [`PositionSource`] outside this crate.
//! [`SimulatedPositionSource`] replays a scripted route for tests and the
//! demo binary.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::sample::PositionSample;
use crate::error::TrackingError;

/// One item from a position source: a fix or a recoverable failure.
pub type PositionEvent = Result<PositionSample, TrackingError>;

const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    Undetermined,
}

/// Requested fix quality. Higher tiers cost more battery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    Lowest,
    Low,
    Balanced,
    #[default]
    High,
    Highest,
    BestForNavigation,
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn permission_state(&self) -> PermissionState;

    /// Prompt for permission and return the resulting state.
    async fn request_permission(&self) -> PermissionState;

    /// Start delivering fixes. Dropping the receiver unsubscribes.
    async fn subscribe(
        &self,
        accuracy: AccuracyTier,
    ) -> Result<mpsc::Receiver<PositionEvent>, TrackingError>;
}

/// Proof that location permission was granted. Tracking cannot start
/// without one.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    _private: (),
}

impl PermissionGrant {
    /// Check permission, prompting once if it is not granted yet.
    pub async fn acquire(source: &dyn PositionSource) -> Result<Self, TrackingError> {
        if source.permission_state().await == PermissionState::Granted {
            return Ok(Self { _private: () });
        }
        match source.request_permission().await {
            PermissionState::Granted => Ok(Self { _private: () }),
            state => {
                debug!(?state, "location permission not granted");
                Err(TrackingError::PermissionDenied)
            }
        }
    }
}

/// Replays a fixed list of events, one per `interval`.
#[derive(Debug)]
pub struct SimulatedPositionSource {
    events: Vec<PositionEvent>,
    interval: Duration,
    permission: Mutex<PermissionState>,
    grant_on_request: bool,
}

impl SimulatedPositionSource {
    pub fn new(events: Vec<PositionEvent>) -> Self {
        Self {
            events,
            interval: Duration::from_millis(10),
            permission: Mutex::new(PermissionState::Granted),
            grant_on_request: true,
        }
    }

    /// A route of fixes only.
    pub fn route(samples: impl IntoIterator<Item = PositionSample>) -> Self {
        Self::new(samples.into_iter().map(Ok).collect())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start in `state`; `grant_on_request` decides what a prompt yields.
    pub fn with_permission(mut self, state: PermissionState, grant_on_request: bool) -> Self {
        self.permission = Mutex::new(state);
        self.grant_on_request = grant_on_request;
        self
    }
}

#[async_trait]
impl PositionSource for SimulatedPositionSource {
    async fn permission_state(&self) -> PermissionState {
        *self.permission.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn request_permission(&self) -> PermissionState {
        let mut state = self.permission.lock().unwrap_or_else(|e| e.into_inner());
        *state = if self.grant_on_request {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        *state
    }

    async fn subscribe(
        &self,
        accuracy: AccuracyTier,
    ) -> Result<mpsc::Receiver<PositionEvent>, TrackingError> {
        if self.permission_state().await != PermissionState::Granted {
            return Err(TrackingError::PermissionDenied);
        }
        debug!(?accuracy, events = self.events.len(), "simulated source subscribed");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let events = self.events.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            for event in events {
                tokio::time::sleep(interval).await;
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn granted_source_yields_grant() {
        let source = SimulatedPositionSource::route([]);
        assert!(PermissionGrant::acquire(&source).await.is_ok());
    }

    #[tokio::test]
    async fn undetermined_permission_prompts_once() {
        let source = SimulatedPositionSource::route([])
            .with_permission(PermissionState::Undetermined, true);
        assert!(PermissionGrant::acquire(&source).await.is_ok());
        assert_eq!(source.permission_state().await, PermissionState::Granted);
    }

    #[tokio::test]
    async fn refused_prompt_is_permission_denied() {
        let source =
            SimulatedPositionSource::route([]).with_permission(PermissionState::Denied, false);
        assert_eq!(
            PermissionGrant::acquire(&source).await.unwrap_err(),
            TrackingError::PermissionDenied
        );
        assert!(source.subscribe(AccuracyTier::High).await.is_err());
    }

    #[tokio::test]
    async fn subscription_replays_script_in_order() {
        let source = SimulatedPositionSource::new(vec![
            Ok(PositionSample::at(1.0, 1.0, 1)),
            Err(TrackingError::Timeout),
            Ok(PositionSample::at(1.0, 1.1, 2)),
        ])
        .with_interval(Duration::from_millis(1));

        let mut rx = source.subscribe(AccuracyTier::Balanced).await.unwrap();
        let mut got = Vec::new();
        while let Some(event) = rx.recv().await {
            got.push(event);
        }
        assert_eq!(got.len(), 3);
        assert_eq!(got[1], Err(TrackingError::Timeout));
        assert_eq!(got[2].as_ref().unwrap().timestamp_ms, 2);
    }
}
