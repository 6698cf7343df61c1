//! Clock used for step timestamps and workflow ids
//!
//! Real time by default. Tests pin it to a virtual instant with `set`; while
//! virtual, the orchestrator advances it by the step duration after every
//! step so timestamps stay strictly ordered.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Default virtual advance per step
pub const DEFAULT_STEP_DURATION: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct Clock {
    inner: Arc<RwLock<ClockState>>,
}

#[derive(Debug, Clone)]
struct ClockState {
    /// The current virtual time, or None if using real time
    virtual_time: Option<DateTime<Utc>>,
    step_duration: Duration,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

impl Clock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ClockState {
                virtual_time: None,
                step_duration: DEFAULT_STEP_DURATION,
            })),
        }
    }

    /// A clock frozen at `time`
    pub fn fixed(time: DateTime<Utc>) -> Self {
        let clock = Self::new();
        if let Ok(mut state) = clock.inner.try_write() {
            state.virtual_time = Some(time);
        }
        clock
    }

    /// Get the current time (virtual or real)
    pub async fn now(&self) -> DateTime<Utc> {
        let state = self.inner.read().await;
        state.virtual_time.unwrap_or_else(Utc::now)
    }

    pub async fn is_virtual(&self) -> bool {
        self.inner.read().await.virtual_time.is_some()
    }

    /// Set the clock to a specific time (enables virtual time)
    pub async fn set(&self, time: DateTime<Utc>) {
        self.inner.write().await.virtual_time = Some(time);
    }

    /// Advance the clock by a duration (enables virtual time)
    pub async fn forward(&self, duration: Duration) {
        let mut state = self.inner.write().await;
        let current = state.virtual_time.unwrap_or_else(Utc::now);
        state.virtual_time = Some(current + to_chrono(duration));
    }

    /// Return to real time
    pub async fn reset(&self) {
        self.inner.write().await.virtual_time = None;
    }

    pub async fn set_step_duration(&self, duration: Duration) {
        self.inner.write().await.step_duration = duration;
    }

    /// Called after each step; no-op on real time
    pub async fn advance_step(&self) {
        let mut state = self.inner.write().await;
        let step = to_chrono(state.step_duration);
        if let Some(current) = state.virtual_time {
            state.virtual_time = Some(current + step);
        }
    }
}
