//! Observer lifecycle.
//!
//! `Uninitialized -> Starting -> Observing -> Stopped`. Mount starts the
//! settle delay; once it has elapsed mutations are admitted through the
//! throttle. Only an unmount with the shutdown flag stops observation.

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info};

use crate::throttle::Throttle;

/// Lifecycle state of the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverState {
    Uninitialized,
    /// Mounted, waiting for the UI to finish its initial paint.
    Starting { ready_at: NaiveDateTime },
    Observing,
    Stopped,
}

/// Mount/unmount state machine plus the mutation throttle.
#[derive(Debug, Clone)]
pub struct Observer {
    state: ObserverState,
    settle_delay: Duration,
    throttle: Throttle,
}

impl Observer {
    pub fn new(settle_delay: Duration, throttle: Duration) -> Self {
        Self {
            state: ObserverState::Uninitialized,
            settle_delay,
            throttle: Throttle::new(throttle),
        }
    }

    pub fn state(&self) -> ObserverState {
        self.state
    }

    pub fn is_observing(&self) -> bool {
        self.state == ObserverState::Observing
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ObserverState::Stopped
    }

    /// When the settle delay ends, if the observer is starting.
    pub fn ready_at(&self) -> Option<NaiveDateTime> {
        match self.state {
            ObserverState::Starting { ready_at } => Some(ready_at),
            _ => None,
        }
    }

    /// Handle a mount signal. Ignored unless uninitialized.
    pub fn mount(&mut self, now: NaiveDateTime) -> bool {
        if self.state != ObserverState::Uninitialized {
            debug!(state = ?self.state, "Mount ignored, observer already initialized");
            return false;
        }
        let ready_at = now + self.settle_delay;
        self.state = ObserverState::Starting { ready_at };
        info!(%ready_at, "Observer mounted, waiting for settle delay");
        true
    }

    /// Move from Starting to Observing once the settle delay has elapsed.
    /// Returns true on the transition.
    pub fn poll_ready(&mut self, now: NaiveDateTime) -> bool {
        match self.state {
            ObserverState::Starting { ready_at } if now >= ready_at => {
                self.state = ObserverState::Observing;
                true
            }
            _ => false,
        }
    }

    /// Whether a mutation callback at `now` should be processed.
    pub fn admit_mutation(&mut self, now: NaiveDateTime) -> bool {
        if !self.is_observing() {
            return false;
        }
        let admitted = self.throttle.admit(now);
        if !admitted {
            debug!("Mutation callback throttled");
        }
        admitted
    }

    /// Stop for good. Returns false if already stopped.
    pub fn stop(&mut self) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.state = ObserverState::Stopped;
        true
    }
}
