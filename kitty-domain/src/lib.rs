//! Domain logic: turn contribution and participation records into a validated,
//! deterministic settlement plan.
//!
//! The flow is strictly one-way: [`Balances`] derives spends and caps from the raw
//! records, [`ConstraintModel`] encodes the hard rules over them, [`Solver`]
//! searches for the fairest plan with the fewest transfers, and [`PlanValidator`]
//! re-checks the result from scratch before [`Settler`] hands it out.
//!
//! This crate does no I/O. Reading input documents and writing artifacts is
//! `kitty-core`'s job.

mod balance;
mod constraints;
mod control;
mod error;
mod plan;
mod settle;
mod solver;
mod validator;

pub use balance::Balances;
pub use constraints::{ConstraintModel, Rule, Signature, Violation, Window, WindowFit, water_fill};
pub use control::{CancelFlag, SearchControl, StopReason};
pub use error::{InputError, RecordKind, SettleError};
pub use plan::{TransactionPlan, spread};
pub use settle::{Settlement, Settler, check_transfers, fairness_ceiling};
pub use solver::{
    DEFAULT_MAX_PARTICIPANTS, EpsilonScope, MAX_GROUP_SIZE, SearchStats, SolveStatus, Solution,
    Solver, SolverOptions,
};
pub use validator::{Audit, Claim, PlanValidator};
