//! Cooperative cancellation for the search.

use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How often (in nodes) the wall clock is consulted.
const DEADLINE_STRIDE: u64 = 256;

/// Why a search stopped before proving optimality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    Flag,
    Deadline,
    NodeBudget,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Flag => "flag",
            StopReason::Deadline => "deadline",
            StopReason::NodeBudget => "node_budget",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared flag a caller flips to stop a running search.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Stop conditions plus the node counter, shared by all search workers.
///
/// Once any condition trips, every later [`SearchControl::tick`] reports the same
/// reason so all workers wind down together.
#[derive(Debug, Default)]
pub struct SearchControl {
    flag: CancelFlag,
    deadline: Option<Instant>,
    node_budget: Option<u64>,
    nodes: AtomicU64,
    stopped: OnceLock<StopReason>,
}

impl SearchControl {
    /// No limits: the search runs to completion.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, flag: CancelFlag) -> Self {
        self.flag = flag;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_time_limit(self, limit: Duration) -> Self {
        self.with_deadline(Instant::now() + limit)
    }

    pub fn with_node_budget(mut self, budget: u64) -> Self {
        self.node_budget = Some(budget);
        self
    }

    pub fn flag(&self) -> &CancelFlag {
        &self.flag
    }

    /// Counts one branch expansion and checks every stop condition.
    pub fn tick(&self) -> Result<(), StopReason> {
        if let Some(reason) = self.stopped.get() {
            return Err(*reason);
        }
        let n = self.nodes.fetch_add(1, Ordering::Relaxed) + 1;

        let reason = if self.flag.is_cancelled() {
            Some(StopReason::Flag)
        } else if self.node_budget.is_some_and(|budget| n > budget) {
            Some(StopReason::NodeBudget)
        } else if (n - 1) % DEADLINE_STRIDE == 0
            && self.deadline.is_some_and(|d| Instant::now() >= d)
        {
            Some(StopReason::Deadline)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let _ = self.stopped.set(reason);
                Err(self.stopped.get().copied().unwrap_or(reason))
            }
            None => Ok(()),
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped.get().copied()
    }

    pub fn nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_stops() {
        let control = SearchControl::unlimited();
        for _ in 0..1000 {
            assert!(control.tick().is_ok());
        }
        assert_eq!(control.nodes(), 1000);
        assert_eq!(control.stop_reason(), None);
    }

    #[test]
    fn node_budget_trips_after_budget_and_sticks() {
        let control = SearchControl::unlimited().with_node_budget(2);
        assert!(control.tick().is_ok());
        assert!(control.tick().is_ok());
        assert_eq!(control.tick(), Err(StopReason::NodeBudget));
        assert_eq!(control.tick(), Err(StopReason::NodeBudget));
        assert_eq!(control.stop_reason(), Some(StopReason::NodeBudget));
    }

    #[test]
    fn flag_is_seen_by_clones() {
        let flag = CancelFlag::new();
        let control = SearchControl::unlimited().with_flag(flag.clone());
        assert!(control.tick().is_ok());
        flag.cancel();
        assert_eq!(control.tick(), Err(StopReason::Flag));
        assert!(control.flag().is_cancelled());
    }

    #[test]
    fn past_deadline_stops_on_first_tick() {
        let control = SearchControl::unlimited().with_deadline(Instant::now());
        assert_eq!(control.tick(), Err(StopReason::Deadline));
    }
}
