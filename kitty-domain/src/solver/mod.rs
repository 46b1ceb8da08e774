//! Two-stage lexicographic search: smallest spread first, then fewest transfers.

mod epsilon;
mod grouping;
mod routing;

use crate::constraints::{ConstraintModel, Window};
use crate::control::{SearchControl, StopReason};
use crate::error::SettleError;
use crate::error::InputError;
use crate::plan::{TransactionPlan, spread};
use tracing::{debug, warn};

/// Default cap on group size; search cost grows combinatorially with it.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 24;

/// Largest group the search can represent, whatever `max_participants` says.
pub const MAX_GROUP_SIZE: usize = u16::MAX as usize;

/// Which spreads Stage B may use when minimizing the transfer count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EpsilonScope {
    /// Only plans whose spread equals the Stage A optimum.
    #[default]
    Optimal,
    /// Any plan whose spread stays within `fixed_epsilon`.
    WithinBound,
}

impl EpsilonScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpsilonScope::Optimal => "optimal",
            EpsilonScope::WithinBound => "within-bound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "optimal" => Some(EpsilonScope::Optimal),
            "within-bound" | "within_bound" => Some(EpsilonScope::WithinBound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverOptions {
    /// Worker threads for Stage B; `0` lets rayon pick.
    pub threads: usize,
    pub epsilon_scope: EpsilonScope,
    pub max_participants: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            epsilon_scope: EpsilonScope::Optimal,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    /// Ran to completion, but a sub-group too large to cost exactly needed more
    /// transfers than it has people: the count is an upper bound.
    Approximate,
    /// Stopped early: the plan is valid but not proven optimal.
    Cancelled(StopReason),
}

impl SolveStatus {
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Stage B windows solved to completion.
    pub windows: u64,
    /// Branch expansions across both stages.
    pub nodes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub plan: TransactionPlan,
    /// Realized spread of `plan`.
    pub epsilon: i64,
    /// Smallest spread proven achievable (equals `epsilon` under the default scope
    /// unless the search was cancelled during Stage A).
    pub optimal_epsilon: i64,
    pub status: SolveStatus,
    pub stats: SearchStats,
}

pub struct Solver<'m, 'b> {
    model: &'m ConstraintModel<'b>,
    options: SolverOptions,
}

impl<'m, 'b> Solver<'m, 'b> {
    pub fn new(model: &'m ConstraintModel<'b>, options: SolverOptions) -> Self {
        Self { model, options }
    }

    pub fn solve(&self, control: &SearchControl) -> Result<Solution, SettleError> {
        let model = self.model;
        if model.is_empty() {
            let plan = TransactionPlan::zeros(0);
            return Ok(self.finish(plan, 0, SolveStatus::Optimal, 0, control));
        }
        if model.len() > MAX_GROUP_SIZE {
            return Err(InputError::TooManyPeople {
                count: model.len(),
                max: MAX_GROUP_SIZE,
            }
            .into());
        }

        let stage_a = epsilon::minimize(model, control)?;
        if let Some(reason) = stage_a.stopped {
            warn!(
                %reason,
                epsilon = stage_a.epsilon,
                "search stopped while minimizing spread"
            );
            let plan = self.single_group(stage_a.epsilon)?;
            let status = SolveStatus::Cancelled(reason);
            return Ok(self.finish(plan, stage_a.epsilon, status, 0, control));
        }

        let optimal = stage_a.epsilon;
        debug!(epsilon = optimal, "smallest spread found");
        if optimal > model.fixed_epsilon() {
            return Err(SettleError::InfeasibleBound {
                requested: model.fixed_epsilon(),
                achievable: optimal,
            });
        }

        let width = match self.options.epsilon_scope {
            EpsilonScope::Optimal => optimal,
            EpsilonScope::WithinBound => model.fixed_epsilon(),
        };
        let floors = model
            .feasible_floors(width)
            .ok_or(SettleError::Infeasible)?;
        debug!(
            width,
            first = *floors.start(),
            last = *floors.end(),
            "searching windows for fewest transfers"
        );

        let outcome = grouping::search(model, floors, width, self.options.threads, control)?;
        let status = match outcome.stopped {
            Some(reason) => {
                warn!(
                    %reason,
                    windows = outcome.windows,
                    "search stopped while minimizing transfers"
                );
                SolveStatus::Cancelled(reason)
            }
            None if !outcome.exact => {
                warn!(windows = outcome.windows, "transfer count not proven minimal");
                SolveStatus::Approximate
            }
            None => SolveStatus::Optimal,
        };

        let plan = match outcome.best {
            Some(best) => {
                debug!(
                    lo = best.window.lo,
                    hi = best.window.hi,
                    exchanges = best.edges.len(),
                    "best window"
                );
                let mut plan = TransactionPlan::zeros(model.len());
                for (from, to, amount) in best.edges {
                    plan.set(from, to, amount);
                }
                plan
            }
            None => self.single_group(width)?,
        };

        Ok(self.finish(plan, optimal, status, outcome.windows, control))
    }

    /// Everyone settles as one group in the lowest window of width `width`.
    fn single_group(&self, width: i64) -> Result<TransactionPlan, SettleError> {
        let model = self.model;
        let floors = model
            .feasible_floors(width)
            .ok_or(SettleError::Infeasible)?;
        let members: Vec<usize> = (0..model.len()).collect();
        let window = Window::with_width(*floors.start(), width);
        let edges = routing::route_group(model, &members, window)
            .ok_or(SettleError::Infeasible)?;

        let mut plan = TransactionPlan::zeros(model.len());
        for (from, to, amount) in edges {
            plan.set(from, to, amount);
        }
        Ok(plan)
    }

    fn finish(
        &self,
        plan: TransactionPlan,
        optimal_epsilon: i64,
        status: SolveStatus,
        windows: u64,
        control: &SearchControl,
    ) -> Solution {
        let realized = spread(&plan.final_spends(self.model.balances()));
        let epsilon = i64::try_from(realized).unwrap_or(i64::MAX);
        Solution {
            plan,
            epsilon,
            optimal_epsilon: optimal_epsilon.min(epsilon),
            status,
            stats: SearchStats {
                windows,
                nodes: control.nodes(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::Balances;
    use crate::validator::{Claim, PlanValidator};
    use kitty_types::input::{GiftId, KittyInput, Person, SettleParams};
    use pretty_assertions::assert_eq;

    fn shared(people: Vec<Person>, spends: &[(&str, i64)]) -> Balances {
        let mut input = KittyInput::new(people.clone(), vec![GiftId::new("g")]);
        for (p, amount) in spends {
            input = input.contribute(p, "g", *amount);
        }
        for p in &people {
            input = input.participate(p.id.as_str(), "g");
        }
        Balances::compute(&input).expect("balances")
    }

    fn params(max: i64, eps: i64) -> SettleParams {
        SettleParams {
            max_transaction_amount: max,
            fixed_epsilon: eps,
        }
    }

    #[test]
    fn two_people_one_transfer() {
        let balances = shared(vec![Person::new("a"), Person::new("b")], &[("a", 100)]);
        let model = ConstraintModel::new(&balances, params(180, 0));
        let solution = Solver::new(&model, SolverOptions::default())
            .solve(&SearchControl::unlimited())
            .expect("solve");

        assert_eq!(solution.plan.transfers().collect::<Vec<_>>(), vec![(1, 0, 50)]);
        assert_eq!(solution.epsilon, 0);
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.stats.windows, 1);
    }

    #[test]
    fn tight_bound_reports_achievable_spread() {
        let balances = shared(vec![Person::new("a"), Person::new("b")], &[("a", 100)]);
        let model = ConstraintModel::new(&balances, params(30, 0));
        let err = Solver::new(&model, SolverOptions::default())
            .solve(&SearchControl::unlimited())
            .unwrap_err();
        assert_eq!(
            err,
            SettleError::InfeasibleBound {
                requested: 0,
                achievable: 40
            }
        );
    }

    #[test]
    fn within_bound_scope_trades_spread_for_fewer_transfers() {
        // Spends 21, 20, 19: equalizing takes one transfer, a spread of 2 takes none.
        let balances = shared(
            vec![Person::new("a"), Person::new("b"), Person::new("c")],
            &[("a", 21), ("b", 20), ("c", 19)],
        );

        let model = ConstraintModel::new(&balances, params(1000, 2));
        let optimal = Solver::new(&model, SolverOptions::default())
            .solve(&SearchControl::unlimited())
            .expect("solve");
        assert_eq!(optimal.epsilon, 0);
        assert_eq!(optimal.plan.transfers().collect::<Vec<_>>(), vec![(2, 0, 1)]);

        let relaxed = Solver::new(
            &model,
            SolverOptions {
                epsilon_scope: EpsilonScope::WithinBound,
                ..SolverOptions::default()
            },
        )
        .solve(&SearchControl::unlimited())
        .expect("solve");
        assert_eq!(relaxed.epsilon, 2);
        assert_eq!(relaxed.plan.exchange_count(), 0);
        assert_eq!(relaxed.optimal_epsilon, 0);
    }

    #[test]
    fn cancelled_search_still_returns_a_plan() {
        let balances = shared(
            vec![Person::new("a"), Person::new("b"), Person::new("c")],
            &[("a", 90)],
        );
        let model = ConstraintModel::new(&balances, params(100, 0));
        let flag = crate::control::CancelFlag::new();
        flag.cancel();
        let control = SearchControl::unlimited().with_flag(flag);

        let solution = Solver::new(&model, SolverOptions::default())
            .solve(&control)
            .expect("solve");
        assert_eq!(solution.status, SolveStatus::Cancelled(StopReason::Flag));
        let ceiling = model.fixed_epsilon().max(solution.epsilon);
        assert!(model.violations_within(&solution.plan, ceiling).is_empty());
    }

    #[test]
    fn budget_stop_in_stage_b_keeps_the_finished_window() {
        // Spends 21, 20, 19 with a spread of up to 2: the lowest window needs one
        // transfer, the next one none.
        let balances = shared(
            vec![Person::new("a"), Person::new("b"), Person::new("c")],
            &[("a", 21), ("b", 20), ("c", 19)],
        );
        let model = ConstraintModel::new(&balances, params(1000, 2));
        let options = SolverOptions {
            threads: 1,
            epsilon_scope: EpsilonScope::WithinBound,
            ..SolverOptions::default()
        };
        let floors = model.feasible_floors(2).expect("floors");
        let lowest = *floors.start();
        assert!(floors.end() > floors.start());

        let stage_a = SearchControl::unlimited();
        epsilon::minimize(&model, &stage_a).expect("stage a");
        let first_window = SearchControl::unlimited();
        let finished = grouping::search(&model, lowest..=lowest, 2, 1, &first_window)
            .expect("search")
            .best
            .expect("first window settles");
        assert_eq!(finished.edges.len(), 1);

        let control =
            SearchControl::unlimited().with_node_budget(stage_a.nodes() + first_window.nodes());
        let solution = Solver::new(&model, options.clone())
            .solve(&control)
            .expect("solve");

        assert_eq!(solution.status, SolveStatus::Cancelled(StopReason::NodeBudget));
        assert_eq!(solution.stats.windows, 1);
        let mut expected = TransactionPlan::zeros(3);
        for (from, to, amount) in finished.edges {
            expected.set(from, to, amount);
        }
        assert_eq!(solution.plan, expected);

        let claim = Claim {
            epsilon: solution.epsilon,
            exchange_count: solution.plan.exchange_count(),
            fairness_ceiling: model.fixed_epsilon(),
        };
        let audit = PlanValidator::new(&model)
            .validate(&solution.plan, &claim)
            .expect("stopped plan is valid");
        assert_eq!(audit.exchange_count, 1);

        let complete = Solver::new(&model, options)
            .solve(&SearchControl::unlimited())
            .expect("solve");
        assert_eq!(complete.plan.exchange_count(), 0);
        assert_eq!(complete.status, SolveStatus::Optimal);
    }

    #[test]
    fn large_capped_group_is_marked_approximate() {
        // p0 owes p1 5 in transfers of 1; nobody else is off balance.
        let people = (0..6).map(|i| Person::new(format!("p{i}"))).collect();
        let balances = shared(
            people,
            &[("p1", 10), ("p2", 5), ("p3", 5), ("p4", 5), ("p5", 5)],
        );
        let model = ConstraintModel::new(&balances, params(1, 0));
        let solution = Solver::new(&model, SolverOptions::default())
            .solve(&SearchControl::unlimited())
            .expect("solve");

        assert_eq!(solution.status, SolveStatus::Approximate);
        assert!(!solution.status.is_optimal());
        assert_eq!(solution.epsilon, 0);
        assert_eq!(solution.plan.exchange_count(), 9);
        assert!(model.is_feasible(&solution.plan));
    }

    #[test]
    fn empty_group_is_trivially_settled() {
        let balances = Balances::compute(&KittyInput::default()).expect("balances");
        let model = ConstraintModel::new(&balances, params(10, 0));
        let solution = Solver::new(&model, SolverOptions::default())
            .solve(&SearchControl::unlimited())
            .expect("solve");
        assert_eq!(solution.plan.exchange_count(), 0);
        assert_eq!(solution.status, SolveStatus::Optimal);
    }

    #[test]
    fn scope_names_round_trip() {
        for scope in [EpsilonScope::Optimal, EpsilonScope::WithinBound] {
            assert_eq!(EpsilonScope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(EpsilonScope::parse("loose"), None);
    }
}
