//! # Deadline Accounting
//!
//! Counts met and missed deadlines. Each real-time process is recorded
//! exactly once, when it finishes; suspension never touches the counters.
//! A process finishing exactly at its deadline has met it.

use crate::time::{Duration, Instant};

/// Result of checking a finished real-time process against its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Met,
    Missed { late_by: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeadlineStats {
    pub met: u32,
    pub missed: u32,
}

impl DeadlineStats {
    pub const fn new() -> Self {
        Self { met: 0, missed: 0 }
    }

    /// Record a real-time process that finished at `finished_at`.
    pub fn record(&mut self, finished_at: Instant, deadline: Instant) -> Outcome {
        if finished_at <= deadline {
            self.met += 1;
            Outcome::Met
        } else {
            self.missed += 1;
            Outcome::Missed {
                late_by: Duration::from_ticks(finished_at.ticks().wrapping_sub(deadline.ticks())),
            }
        }
    }

    /// Number of real-time processes that have finished.
    pub const fn completed(&self) -> u32 {
        self.met + self.missed
    }
}
