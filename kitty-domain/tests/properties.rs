//! Property-based tests for accepted plans.
//!
//! These tests verify that, for random small groups:
//! - Money is only redistributed (conservation)
//! - The exempt person never receives, nobody pays themselves
//! - Every transfer respects the cap
//! - Validation is idempotent
//! - The plan does not depend on the number of worker threads

use kitty_domain::{
    Claim, ConstraintModel, PlanValidator, SearchControl, SettleError, Settlement, Settler,
    SolverOptions, spread,
};
use kitty_types::input::{GiftId, KittyInput, Person, SettleParams};
use proptest::prelude::*;

/// One gift: who paid how much, and a bitmask of who it was bought for.
#[derive(Debug, Clone)]
struct GiftCase {
    payer: usize,
    price: i64,
    buyers: u8,
}

#[derive(Debug, Clone)]
struct Case {
    people: usize,
    exempt: Option<usize>,
    gifts: Vec<GiftCase>,
    max_transaction_amount: i64,
}

impl Case {
    fn input(&self) -> KittyInput {
        let people = (0..self.people)
            .map(|i| {
                let id = format!("p{i}");
                if self.exempt == Some(i) {
                    Person::exempt(id)
                } else {
                    Person::new(id)
                }
            })
            .collect();
        let gifts = (0..self.gifts.len())
            .map(|g| GiftId::new(format!("g{g}")))
            .collect();

        let mut input = KittyInput::new(people, gifts);
        for (g, gift) in self.gifts.iter().enumerate() {
            let gift_id = format!("g{g}");
            input = input.contribute(&format!("p{}", gift.payer), &gift_id, gift.price);
            for p in 0..self.people {
                if gift.buyers & (1 << p) != 0 {
                    input = input.participate(&format!("p{p}"), &gift_id);
                }
            }
        }
        input
    }

    fn params(&self) -> SettleParams {
        SettleParams {
            max_transaction_amount: self.max_transaction_amount,
            fixed_epsilon: 1_000,
        }
    }
}

fn arb_case() -> impl Strategy<Value = Case> {
    (2usize..=5).prop_flat_map(|people| {
        let gift = (0..people, 0i64..=40, 1u8..(1 << people))
            .prop_map(|(payer, price, buyers)| GiftCase {
                payer,
                price,
                buyers,
            });
        (
            Just(people),
            prop::option::of(0..people),
            prop::collection::vec(gift, 1..=3),
            1i64..=60,
        )
            .prop_map(|(people, exempt, gifts, max_transaction_amount)| Case {
                people,
                exempt,
                gifts,
                max_transaction_amount,
            })
    })
}

fn settle(case: &Case, threads: usize) -> Result<Settlement, SettleError> {
    let settler = Settler::new(SolverOptions {
        threads,
        ..SolverOptions::default()
    });
    settler.settle(&case.input(), case.params(), &SearchControl::unlimited())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Accepted plans satisfy every hard rule.
    #[test]
    fn accepted_plans_hold_hard_rules(case in arb_case()) {
        let settlement = match settle(&case, 1) {
            Ok(s) => s,
            Err(SettleError::Infeasible | SettleError::InfeasibleBound { .. }) => return Ok(()),
            Err(other) => return Err(TestCaseError::fail(format!("unexpected error: {other}"))),
        };
        let balances = &settlement.balances;
        let plan = &settlement.plan;

        let finals = plan.final_spends(balances);
        prop_assert_eq!(finals.iter().sum::<i128>(), i128::from(balances.total_spend()));
        prop_assert_eq!(spread(&finals), i128::from(settlement.epsilon));

        for (from, to, amount) in plan.transfers() {
            prop_assert_ne!(from, to);
            prop_assert!(amount <= case.max_transaction_amount);
            prop_assert!(!balances.is_exempt(to));
        }
        if let Some(exempt) = balances.exempt() {
            prop_assert_eq!(plan.received(exempt), 0);
        }
        for (p, f) in finals.iter().enumerate() {
            prop_assert!(*f <= i128::from(balances.participation_cap()[p]));
        }
    }

    /// Re-validating an accepted plan gives the same audit.
    #[test]
    fn validation_is_idempotent(case in arb_case()) {
        let Ok(settlement) = settle(&case, 1) else {
            return Ok(());
        };
        let model = ConstraintModel::new(&settlement.balances, case.params());
        let claim = Claim {
            epsilon: settlement.epsilon,
            exchange_count: settlement.audit.exchange_count,
            fairness_ceiling: case.params().fixed_epsilon,
        };
        let validator = PlanValidator::new(&model);
        let first = validator.validate(&settlement.plan, &claim);
        let second = validator.validate(&settlement.plan, &claim);
        prop_assert_eq!(first.as_ref(), Ok(&settlement.audit));
        prop_assert_eq!(first, second);
    }

    /// The same plan comes out for one worker and for several.
    #[test]
    fn plan_is_independent_of_thread_count(case in arb_case()) {
        let single = settle(&case, 1).map(|s| (s.plan, s.epsilon));
        let several = settle(&case, 4).map(|s| (s.plan, s.epsilon));
        prop_assert_eq!(single, several);
    }
}
