use crate::membership::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Source of protocol time. Must never go backwards.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Shared round counter, advanced explicitly by the simulation driver.
#[derive(Debug, Default)]
pub struct RoundClock {
    round: AtomicU64,
}

impl RoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves to the next round and returns it.
    pub fn advance(&self) -> Timestamp {
        self.round.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Clock for RoundClock {
    fn now(&self) -> Timestamp {
        self.round.load(Ordering::SeqCst)
    }
}

/// Wall time since creation, counted in whole tick periods.
#[derive(Debug, Clone)]
pub struct IntervalClock {
    started: Instant,
    period: Duration,
}

impl IntervalClock {
    pub fn new(period: Duration) -> Self {
        Self {
            started: Instant::now(),
            period: period.max(Duration::from_millis(1)),
        }
    }
}

impl Clock for IntervalClock {
    fn now(&self) -> Timestamp {
        (self.started.elapsed().as_nanos() / self.period.as_nanos()) as Timestamp
    }
}
