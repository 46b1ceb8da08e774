use crate::balance::Balances;
use crate::error::{InputError, RecordKind};
use kitty_types::input::PersonId;
use kitty_types::plan::Transfer;
use std::collections::HashMap;

/// Dense payer × payee amount matrix, row-major by declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    size: usize,
    amounts: Vec<i64>,
}

impl TransactionPlan {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            amounts: vec![0; size * size],
        }
    }

    /// Builds a plan from externally supplied transfers (e.g. a plan file under
    /// review). Each payer/payee pair may appear once.
    pub fn from_transfers(balances: &Balances, transfers: &[Transfer]) -> Result<Self, InputError> {
        let kind = RecordKind::Transfer;
        let mut plan = Self::zeros(balances.len());
        let mut seen: HashMap<(usize, usize), usize> = HashMap::new();

        for (index, t) in transfers.iter().enumerate() {
            let resolve = |person: &PersonId| {
                balances
                    .index_of(person)
                    .ok_or_else(|| InputError::UnknownPerson {
                        kind,
                        index,
                        person: person.clone(),
                    })
            };
            let from = resolve(&t.from)?;
            let to = resolve(&t.to)?;
            if t.amount < 0 {
                return Err(InputError::NegativeAmount {
                    kind,
                    index,
                    amount: t.amount,
                });
            }
            if let Some(&first) = seen.get(&(from, to)) {
                return Err(InputError::Duplicate { kind, index, first });
            }
            seen.insert((from, to), index);
            plan.set(from, to, t.amount);
        }

        Ok(plan)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn amount(&self, from: usize, to: usize) -> i64 {
        self.amounts[from * self.size + to]
    }

    pub fn set(&mut self, from: usize, to: usize, amount: i64) {
        self.amounts[from * self.size + to] = amount;
    }

    /// Strictly positive entries as `(from, to, amount)`, payer-major.
    pub fn transfers(&self) -> impl Iterator<Item = (usize, usize, i64)> + '_ {
        self.amounts
            .iter()
            .enumerate()
            .filter(|(_, amount)| **amount > 0)
            .map(|(cell, amount)| (cell / self.size, cell % self.size, *amount))
    }

    /// Every entry, including zero and negative ones, payer-major.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, i64)> + '_ {
        self.amounts
            .iter()
            .enumerate()
            .map(|(cell, amount)| (cell / self.size, cell % self.size, *amount))
    }

    pub fn exchange_count(&self) -> u64 {
        self.amounts.iter().filter(|a| **a > 0).count() as u64
    }

    pub fn given(&self, person: usize) -> i128 {
        (0..self.size)
            .map(|to| self.amount(person, to) as i128)
            .sum()
    }

    pub fn received(&self, person: usize) -> i128 {
        (0..self.size)
            .map(|from| self.amount(from, person) as i128)
            .sum()
    }

    /// `InitialSpend + given − received` per person.
    pub fn final_spends(&self, balances: &Balances) -> Vec<i128> {
        balances
            .initial_spend()
            .iter()
            .enumerate()
            .map(|(p, init)| *init as i128 + self.given(p) - self.received(p))
            .collect()
    }

    pub fn total_transferred(&self) -> i128 {
        self.amounts.iter().map(|a| *a as i128).sum()
    }

    pub fn to_transfers(&self, balances: &Balances) -> Vec<Transfer> {
        self.transfers()
            .map(|(from, to, amount)| Transfer {
                from: balances.person(from).clone(),
                to: balances.person(to).clone(),
                amount,
            })
            .collect()
    }
}

/// `max − min`; zero for an empty slice.
pub fn spread(values: &[i128]) -> i128 {
    let max = values.iter().copied().max().unwrap_or(0);
    let min = values.iter().copied().min().unwrap_or(0);
    max - min
}
