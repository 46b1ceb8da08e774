//! Independent acceptance check for finished plans.

use crate::constraints::{ConstraintModel, Rule, Violation};
use crate::plan::{TransactionPlan, spread};

/// Figures a plan is claimed to have, checked against the plan itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub epsilon: i64,
    pub exchange_count: u64,
    /// Spread the plan may not exceed: `fixed_epsilon`, or the realized spread of
    /// a cancelled incumbent when that is wider.
    pub fairness_ceiling: i64,
}

/// Figures re-derived from the plan and the balances alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub final_spends: Vec<i64>,
    pub epsilon: i64,
    pub exchange_count: u64,
    pub total_transferred: i64,
}

pub struct PlanValidator<'m, 'b> {
    model: &'m ConstraintModel<'b>,
}

impl<'m, 'b> PlanValidator<'m, 'b> {
    pub fn new(model: &'m ConstraintModel<'b>) -> Self {
        Self { model }
    }

    /// Re-checks every hard rule and accounting identity; the first failure wins.
    pub fn validate(&self, plan: &TransactionPlan, claim: &Claim) -> Result<Audit, Violation> {
        if let Some(violation) = self
            .model
            .violations_within(plan, claim.fairness_ceiling)
            .into_iter()
            .next()
        {
            return Err(violation);
        }

        let balances = self.model.balances();
        let given: i128 = (0..plan.size()).map(|p| plan.given(p)).sum();
        let received: i128 = (0..plan.size()).map(|p| plan.received(p)).sum();
        if given != received {
            return Err(Violation::new(
                Rule::Accounting,
                format!("{given} given but {received} received"),
            ));
        }

        let finals = plan.final_spends(balances);
        let epsilon = spread(&finals);
        if epsilon != claim.epsilon as i128 {
            return Err(Violation::new(
                Rule::Accounting,
                format!("claimed spread {} but plan has {}", claim.epsilon, epsilon),
            ));
        }
        let exchange_count = plan.exchange_count();
        if exchange_count != claim.exchange_count {
            return Err(Violation::new(
                Rule::Accounting,
                format!(
                    "claimed {} transfers but plan has {}",
                    claim.exchange_count, exchange_count
                ),
            ));
        }

        let out_of_range =
            |what: &str| Violation::new(Rule::Accounting, format!("{what} out of range"));
        let final_spends = finals
            .iter()
            .map(|f| i64::try_from(*f).map_err(|_| out_of_range("final spend")))
            .collect::<Result<Vec<_>, _>>()?;
        let total_transferred =
            i64::try_from(given).map_err(|_| out_of_range("total transferred"))?;

        Ok(Audit {
            final_spends,
            epsilon: claim.epsilon,
            exchange_count,
            total_transferred,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::Balances;
    use kitty_types::input::{GiftId, KittyInput, Person, SettleParams};
    use pretty_assertions::assert_eq;

    fn balances() -> Balances {
        let input = KittyInput::new(
            vec![Person::new("a"), Person::new("b")],
            vec![GiftId::new("g")],
        )
        .contribute("a", "g", 100)
        .participate("a", "g")
        .participate("b", "g");
        Balances::compute(&input).expect("balances")
    }

    fn model(balances: &Balances) -> ConstraintModel<'_> {
        ConstraintModel::new(
            balances,
            SettleParams {
                max_transaction_amount: 180,
                fixed_epsilon: 0,
            },
        )
    }

    fn settled() -> TransactionPlan {
        let mut plan = TransactionPlan::zeros(2);
        plan.set(1, 0, 50);
        plan
    }

    fn claim(epsilon: i64, exchange_count: u64) -> Claim {
        Claim {
            epsilon,
            exchange_count,
            fairness_ceiling: 0,
        }
    }

    #[test]
    fn accepts_and_audits_a_valid_plan() {
        let balances = balances();
        let model = model(&balances);
        let audit = PlanValidator::new(&model)
            .validate(&settled(), &claim(0, 1))
            .expect("valid");
        assert_eq!(
            audit,
            Audit {
                final_spends: vec![50, 50],
                epsilon: 0,
                exchange_count: 1,
                total_transferred: 50,
            }
        );
    }

    #[test]
    fn validation_is_idempotent() {
        let balances = balances();
        let model = model(&balances);
        let validator = PlanValidator::new(&model);
        let plan = settled();
        let first = validator.validate(&plan, &claim(0, 1));
        let second = validator.validate(&plan, &claim(0, 1));
        assert_eq!(first, second);
        assert!(second.is_ok());
    }

    #[test]
    fn rejects_wrong_claims() {
        let balances = balances();
        let model = model(&balances);
        let validator = PlanValidator::new(&model);

        let err = validator.validate(&settled(), &claim(0, 2)).unwrap_err();
        assert_eq!(err.rule, Rule::Accounting);

        // Within the ceiling, but the claimed spread is not the plan's.
        let loose = Claim {
            fairness_ceiling: 100,
            ..claim(0, 1)
        };
        let mut plan = TransactionPlan::zeros(2);
        plan.set(1, 0, 40);
        let err = validator.validate(&plan, &loose).unwrap_err();
        assert_eq!(err.rule, Rule::Accounting);
    }

    #[test]
    fn rejects_unfair_plan_with_fairness_rule() {
        let balances = balances();
        let model = model(&balances);
        let mut plan = TransactionPlan::zeros(2);
        plan.set(1, 0, 40);
        let err = PlanValidator::new(&model)
            .validate(&plan, &claim(20, 1))
            .unwrap_err();
        assert_eq!(err.rule, Rule::Fairness);
    }
}
