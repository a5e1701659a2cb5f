use std::sync::atomic::{AtomicU64, Ordering};

use crate::controller::Outcome;

/// Running totals for one processor
#[derive(Debug, Default)]
pub struct ProcessorStats {
    completed: AtomicU64,
    rescheduled: AtomicU64,
    dead_lettered: AtomicU64,
    tripped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ProcessorStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub rescheduled: u64,
    pub dead_lettered: u64,
    pub tripped: u64,
    pub failed: u64,
}

impl StatsSnapshot {
    #[must_use]
    pub const fn handled(&self) -> u64 {
        self.completed + self.rescheduled + self.dead_lettered + self.tripped
    }
}

impl ProcessorStats {
    pub fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Completed { .. } => &self.completed,
            Outcome::Rescheduled { .. } => &self.rescheduled,
            Outcome::DeadLettered { .. } => &self.dead_lettered,
            Outcome::CircuitTripped { .. } => &self.tripped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            rescheduled: self.rescheduled.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            tripped: self.tripped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
