use crate::balance::Balances;
use crate::constraints::ConstraintModel;
use crate::control::SearchControl;
use crate::error::{InputError, SettleError};
use crate::plan::TransactionPlan;
use crate::solver::{MAX_GROUP_SIZE, SearchStats, SolveStatus, Solver, SolverOptions};
use crate::validator::{Audit, Claim, PlanValidator};
use kitty_types::input::{KittyInput, SettleParams};
use kitty_types::plan::Transfer;
use tracing::debug;

/// A validated plan together with the balances it was computed from.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub balances: Balances,
    pub plan: TransactionPlan,
    pub audit: Audit,
    pub epsilon: i64,
    pub optimal_epsilon: i64,
    pub status: SolveStatus,
    pub stats: SearchStats,
}

impl Settlement {
    pub fn transfers(&self) -> Vec<Transfer> {
        self.plan.to_transfers(&self.balances)
    }
}

/// Entry point: raw records in, validated plan out.
#[derive(Debug, Clone, Default)]
pub struct Settler {
    options: SolverOptions,
}

impl Settler {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn settle(
        &self,
        input: &KittyInput,
        params: SettleParams,
        control: &SearchControl,
    ) -> Result<Settlement, SettleError> {
        check_params(params)?;
        let max = self.options.max_participants.min(MAX_GROUP_SIZE);
        if input.people.len() > max {
            return Err(InputError::TooManyPeople {
                count: input.people.len(),
                max,
            }
            .into());
        }

        let balances = Balances::compute(input)?;
        let model = ConstraintModel::new(&balances, params);
        let solution = Solver::new(&model, self.options.clone()).solve(control)?;

        let stopped = matches!(solution.status, SolveStatus::Cancelled(_));
        let claim = Claim {
            epsilon: solution.epsilon,
            exchange_count: solution.plan.exchange_count(),
            fairness_ceiling: fairness_ceiling(params, stopped, solution.epsilon),
        };
        let audit = PlanValidator::new(&model).validate(&solution.plan, &claim)?;
        debug!(
            epsilon = audit.epsilon,
            exchanges = audit.exchange_count,
            "plan accepted"
        );

        Ok(Settlement {
            plan: solution.plan,
            audit,
            epsilon: solution.epsilon,
            optimal_epsilon: solution.optimal_epsilon,
            status: solution.status,
            stats: solution.stats,
            balances,
        })
    }
}

/// Re-validates externally supplied transfers against the input they claim to
/// settle.
pub fn check_transfers(
    input: &KittyInput,
    params: SettleParams,
    transfers: &[Transfer],
    claim: &Claim,
) -> Result<Audit, SettleError> {
    check_params(params)?;
    let balances = Balances::compute(input)?;
    let plan = TransactionPlan::from_transfers(&balances, transfers)?;
    let model = ConstraintModel::new(&balances, params);
    Ok(PlanValidator::new(&model).validate(&plan, claim)?)
}

/// Spread a plan may reach: a stopped search can hand back an incumbent wider
/// than `fixed_epsilon`.
pub fn fairness_ceiling(params: SettleParams, stopped: bool, epsilon: i64) -> i64 {
    if stopped {
        params.fixed_epsilon.max(epsilon)
    } else {
        params.fixed_epsilon
    }
}

fn check_params(params: SettleParams) -> Result<(), InputError> {
    for (name, value) in [
        ("max_transaction_amount", params.max_transaction_amount),
        ("fixed_epsilon", params.fixed_epsilon),
    ] {
        if value < 0 {
            return Err(InputError::NegativeParameter { name, value });
        }
    }
    Ok(())
}
