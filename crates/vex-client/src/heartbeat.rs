//! Connection liveness.
//!
//! Every tick checks whether the previous probe was answered. An answered
//! probe resets the failure count; an unanswered one increments it. Once
//! the count reaches the threshold the connection is declared dead,
//! otherwise a new probe goes out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

/// What the connection should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Probe,
    Dead,
}

#[derive(Debug)]
pub struct Heartbeat {
    alive: Arc<AtomicBool>,
    failures: u32,
    threshold: u32,
}

impl Heartbeat {
    /// A fresh monitor. The connection counts as alive until the first
    /// probe goes unanswered.
    pub fn new(threshold: u32) -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            failures: 0,
            threshold: threshold.max(1),
        }
    }

    /// Flag the reply handler of a probe sets.
    pub fn pong_flag(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn on_tick(&mut self) -> Beat {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.failures = 0;
        } else {
            self.failures += 1;
            debug!(failures = self.failures, "Heartbeat probe went unanswered");
        }

        if self.failures >= self.threshold {
            warn!(failures = self.failures, "Heartbeat dead");
            Beat::Dead
        } else {
            Beat::Probe
        }
    }
}
