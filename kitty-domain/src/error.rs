use crate::constraints::Violation;
use kitty_types::input::{GiftId, PersonId};
use std::fmt;
use thiserror::Error;

/// Typed failures of a settlement run.
///
/// A search stopped by the caller is not an error: it is reported through
/// [`crate::SolveStatus::Cancelled`] on a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettleError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("fixed_epsilon {requested} is unattainable; smallest achievable spread is {achievable}")]
    InfeasibleBound { requested: i64, achievable: i64 },

    #[error("no plan satisfies the hard constraints for any spread")]
    Infeasible,

    #[error("plan rejected by validator: {0}")]
    ConstraintViolation(#[from] Violation),
}

/// Which record list an [`InputError`] points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Person,
    Gift,
    Contribution,
    Participation,
    Transfer,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Person => "people",
            RecordKind::Gift => "gifts",
            RecordKind::Contribution => "contributions",
            RecordKind::Participation => "participations",
            RecordKind::Transfer => "transfers",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("{kind}[{index}]: negative amount {amount}")]
    NegativeAmount {
        kind: RecordKind,
        index: usize,
        amount: i64,
    },

    #[error("{kind}[{index}]: unknown person `{person}`")]
    UnknownPerson {
        kind: RecordKind,
        index: usize,
        person: PersonId,
    },

    #[error("{kind}[{index}]: unknown gift `{gift}`")]
    UnknownGift {
        kind: RecordKind,
        index: usize,
        gift: GiftId,
    },

    #[error("{kind}[{index}]: duplicate of {kind}[{first}]")]
    Duplicate {
        kind: RecordKind,
        index: usize,
        first: usize,
    },

    #[error("people[{index}]: `{person}` is receiver_exempt but `{first}` already is")]
    MultipleExempt {
        index: usize,
        person: PersonId,
        first: PersonId,
    },

    #[error("parameter {name} must be non-negative, got {value}")]
    NegativeParameter { name: &'static str, value: i64 },

    #[error("{kind}[{index}]: amount sum overflows")]
    Overflow { kind: RecordKind, index: usize },

    #[error("group has {count} people; at most {max} are searched")]
    TooManyPeople { count: usize, max: usize },
}
