//! Stage A: the smallest spread any plan can reach.

use crate::constraints::ConstraintModel;
use crate::control::{SearchControl, StopReason};
use crate::error::SettleError;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EpsilonSearch {
    /// Smallest spread proven achievable so far; exact unless `stopped` is set.
    pub epsilon: i64,
    pub stopped: Option<StopReason>,
}

/// Bisects the spread between 0 and the widest reachable band, tightening the
/// upper bound every time a narrower width still admits a window.
pub(crate) fn minimize(
    model: &ConstraintModel<'_>,
    control: &SearchControl,
) -> Result<EpsilonSearch, SettleError> {
    let ceiling = model.epsilon_ceiling();
    if model.feasible_floors(ceiling).is_none() {
        debug!(ceiling, "no window holds every final spend");
        return Err(SettleError::Infeasible);
    }

    let (mut low, mut high) = (0i64, ceiling);
    while low < high {
        if let Err(reason) = control.tick() {
            return Ok(EpsilonSearch {
                epsilon: high,
                stopped: Some(reason),
            });
        }
        let mid = low + (high - low) / 2;
        if model.feasible_floors(mid).is_some() {
            high = mid;
            debug!(epsilon = high, "spread bound tightened");
        } else {
            low = mid + 1;
        }
    }

    Ok(EpsilonSearch {
        epsilon: high,
        stopped: None,
    })
}
