//! Balance computation: gift prices, initial spends and participation caps.

use crate::error::{InputError, RecordKind};
use kitty_types::input::{GiftId, KittyInput, PersonId};
use std::collections::HashMap;

/// Derived per-person and per-gift figures for one group.
///
/// Everything here is a pure function of the input records; people keep their
/// declaration order, which is the tie-break order everywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balances {
    people: Vec<PersonId>,
    gifts: Vec<GiftId>,
    exempt: Option<usize>,
    initial_spend: Vec<i64>,
    participation_cap: Vec<i64>,
    gift_price: Vec<i64>,
    total_spend: i64,
}

impl Balances {
    pub fn compute(input: &KittyInput) -> Result<Self, InputError> {
        let mut person_index: HashMap<&PersonId, usize> = HashMap::new();
        let mut exempt: Option<usize> = None;
        for (index, person) in input.people.iter().enumerate() {
            if let Some(&first) = person_index.get(&person.id) {
                return Err(InputError::Duplicate {
                    kind: RecordKind::Person,
                    index,
                    first,
                });
            }
            person_index.insert(&person.id, index);

            if person.receiver_exempt {
                if let Some(first) = exempt {
                    return Err(InputError::MultipleExempt {
                        index,
                        person: person.id.clone(),
                        first: input.people[first].id.clone(),
                    });
                }
                exempt = Some(index);
            }
        }

        let mut gift_index: HashMap<&GiftId, usize> = HashMap::new();
        for (index, gift) in input.gifts.iter().enumerate() {
            if let Some(&first) = gift_index.get(gift) {
                return Err(InputError::Duplicate {
                    kind: RecordKind::Gift,
                    index,
                    first,
                });
            }
            gift_index.insert(gift, index);
        }

        let lookup = |kind: RecordKind,
                      index: usize,
                      person: &PersonId,
                      gift: &GiftId|
         -> Result<(usize, usize), InputError> {
            let p = *person_index
                .get(person)
                .ok_or_else(|| InputError::UnknownPerson {
                    kind,
                    index,
                    person: person.clone(),
                })?;
            let g = *gift_index
                .get(gift)
                .ok_or_else(|| InputError::UnknownGift {
                    kind,
                    index,
                    gift: gift.clone(),
                })?;
            Ok((p, g))
        };

        let n = input.people.len();
        let mut initial_spend = vec![0i64; n];
        let mut gift_price = vec![0i64; input.gifts.len()];
        let mut total_spend = 0i64;
        let mut seen: HashMap<(usize, usize), usize> = HashMap::new();

        for (index, record) in input.contributions.iter().enumerate() {
            let kind = RecordKind::Contribution;
            let (p, g) = lookup(kind, index, &record.person, &record.gift)?;
            if record.amount < 0 {
                return Err(InputError::NegativeAmount {
                    kind,
                    index,
                    amount: record.amount,
                });
            }
            if let Some(&first) = seen.get(&(p, g)) {
                return Err(InputError::Duplicate { kind, index, first });
            }
            seen.insert((p, g), index);

            let overflow = || InputError::Overflow { kind, index };
            initial_spend[p] = initial_spend[p]
                .checked_add(record.amount)
                .ok_or_else(overflow)?;
            gift_price[g] = gift_price[g]
                .checked_add(record.amount)
                .ok_or_else(overflow)?;
            total_spend = total_spend
                .checked_add(record.amount)
                .ok_or_else(overflow)?;
        }

        let mut participation_cap = vec![0i64; n];
        seen.clear();
        for (index, record) in input.participations.iter().enumerate() {
            let kind = RecordKind::Participation;
            let (p, g) = lookup(kind, index, &record.person, &record.gift)?;
            if let Some(&first) = seen.get(&(p, g)) {
                return Err(InputError::Duplicate { kind, index, first });
            }
            seen.insert((p, g), index);

            if record.participates {
                participation_cap[p] = participation_cap[p]
                    .checked_add(gift_price[g])
                    .ok_or(InputError::Overflow { kind, index })?;
            }
        }

        Ok(Self {
            people: input.people.iter().map(|p| p.id.clone()).collect(),
            gifts: input.gifts.clone(),
            exempt,
            initial_spend,
            participation_cap,
            gift_price,
            total_spend,
        })
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn people(&self) -> &[PersonId] {
        &self.people
    }

    pub fn person(&self, index: usize) -> &PersonId {
        &self.people[index]
    }

    pub fn index_of(&self, person: &PersonId) -> Option<usize> {
        self.people.iter().position(|p| p == person)
    }

    pub fn gifts(&self) -> &[GiftId] {
        &self.gifts
    }

    /// Index of the person who must never receive a transfer.
    pub fn exempt(&self) -> Option<usize> {
        self.exempt
    }

    pub fn is_exempt(&self, index: usize) -> bool {
        self.exempt == Some(index)
    }

    pub fn initial_spend(&self) -> &[i64] {
        &self.initial_spend
    }

    pub fn participation_cap(&self) -> &[i64] {
        &self.participation_cap
    }

    pub fn gift_price(&self) -> &[i64] {
        &self.gift_price
    }

    pub fn total_spend(&self) -> i64 {
        self.total_spend
    }
}
