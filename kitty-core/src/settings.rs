//! Clap-free settings for the settle and check pipelines.

use camino::Utf8PathBuf;
use kitty_domain::{DEFAULT_MAX_PARTICIPANTS, EpsilonScope, SearchControl, SolverOptions};
use kitty_types::input::SettleParams;
use std::time::Duration;

/// Branch expansions a settle run may spend unless configured otherwise.
pub const DEFAULT_NODE_BUDGET: u64 = 5_000_000;

/// Settle parameters where each field may be left unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParamOverrides {
    pub max_transaction_amount: Option<i64>,
    pub fixed_epsilon: Option<i64>,
}

impl ParamOverrides {
    /// Fields set in `other` win.
    pub fn overlay(self, other: ParamOverrides) -> ParamOverrides {
        ParamOverrides {
            max_transaction_amount: other.max_transaction_amount.or(self.max_transaction_amount),
            fixed_epsilon: other.fixed_epsilon.or(self.fixed_epsilon),
        }
    }
}

impl From<SettleParams> for ParamOverrides {
    fn from(p: SettleParams) -> Self {
        Self {
            max_transaction_amount: Some(p.max_transaction_amount),
            fixed_epsilon: Some(p.fixed_epsilon),
        }
    }
}

/// Search limits and solver knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    /// Worker threads; `0` lets rayon pick.
    pub threads: usize,
    pub node_budget: Option<u64>,
    pub time_limit: Option<Duration>,
    pub max_participants: usize,
    pub epsilon_scope: EpsilonScope,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            threads: 0,
            node_budget: Some(DEFAULT_NODE_BUDGET),
            time_limit: None,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            epsilon_scope: EpsilonScope::Optimal,
        }
    }
}

impl SearchSettings {
    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            threads: self.threads,
            epsilon_scope: self.epsilon_scope,
            max_participants: self.max_participants,
        }
    }

    /// Starts the clock: a time limit counts from this call.
    pub fn control(&self) -> SearchControl {
        let mut control = SearchControl::unlimited();
        if let Some(limit) = self.time_limit {
            control = control.with_time_limit(limit);
        }
        if let Some(budget) = self.node_budget {
            control = control.with_node_budget(budget);
        }
        control
    }
}

/// Settings for the settle pipeline.
///
/// Parameters resolve in order: `defaults` (config file), then the input
/// document's own `params`, then `overrides` (command line).
#[derive(Debug, Clone)]
pub struct SettleSettings {
    pub out_dir: Utf8PathBuf,
    pub defaults: ParamOverrides,
    pub overrides: ParamOverrides,
    pub search: SearchSettings,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            out_dir: Utf8PathBuf::from("artifacts/kitty"),
            defaults: ParamOverrides::default(),
            overrides: ParamOverrides::default(),
            search: SearchSettings::default(),
        }
    }
}

/// Settings for the check pipeline.
///
/// A plan is checked against the parameters recorded in it unless `overrides`
/// replaces them.
#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    pub overrides: ParamOverrides,
}
