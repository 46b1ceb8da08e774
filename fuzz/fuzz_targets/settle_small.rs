#![no_main]

//! Fuzz target for the settlement engine on small structured groups.
//!
//! Any accepted plan must respect the hard rules; the validator must never
//! reject what the solver hands back.

use kitty_domain::{SearchControl, SettleError, Settler};
use kitty_types::input::{GiftId, KittyInput, Person, SettleParams};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, arbitrary::Arbitrary)]
struct Group {
    people: u8,
    exempt: Option<u8>,
    gifts: Vec<Gift>,
    max_transaction_amount: u8,
    fixed_epsilon: u8,
}

#[derive(Debug, arbitrary::Arbitrary)]
struct Gift {
    payer: u8,
    price: u8,
    buyers: u8,
}

fuzz_target!(|group: Group| {
    let n = usize::from(group.people % 5) + 2;
    let name = |i: usize| format!("p{i}");
    let people = (0..n)
        .map(|i| {
            if group.exempt.map(usize::from) == Some(i) {
                Person::exempt(name(i))
            } else {
                Person::new(name(i))
            }
        })
        .collect();
    let gift_ids = (0..group.gifts.len().min(3))
        .map(|g| GiftId::new(format!("g{g}")))
        .collect();

    let mut input = KittyInput::new(people, gift_ids);
    for (g, gift) in group.gifts.iter().take(3).enumerate() {
        let gift_id = format!("g{g}");
        input = input.contribute(
            &name(usize::from(gift.payer) % n),
            &gift_id,
            i64::from(gift.price),
        );
        for b in 0..n {
            if gift.buyers & (1 << b) != 0 {
                input = input.participate(&name(b), &gift_id);
            }
        }
    }

    let params = SettleParams {
        max_transaction_amount: i64::from(group.max_transaction_amount),
        fixed_epsilon: i64::from(group.fixed_epsilon),
    };
    let control = SearchControl::unlimited().with_node_budget(200_000);
    match Settler::default().settle(&input, params, &control) {
        Ok(settlement) => {
            for t in settlement.transfers() {
                assert!(t.amount > 0 && t.amount <= params.max_transaction_amount);
                assert_ne!(t.from, t.to);
            }
        }
        Err(SettleError::ConstraintViolation(v)) => panic!("solver produced an invalid plan: {v}"),
        Err(_) => {}
    }
});
