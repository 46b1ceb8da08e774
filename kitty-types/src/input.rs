use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque person identifier, unique within a group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub String);

/// Opaque identifier of a shared purchase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GiftId(pub String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl GiftId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for GiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,

    /// Policy flag: this person must never receive a transfer.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub receiver_exempt: bool,
}

impl Person {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: PersonId::new(id),
            receiver_exempt: false,
        }
    }

    pub fn exempt(id: impl Into<String>) -> Self {
        Self {
            id: PersonId::new(id),
            receiver_exempt: true,
        }
    }
}

/// Amount a person spent on a gift, in the currency's smallest unit.
///
/// Kept signed on the wire so that a negative amount is reported as invalid input
/// instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub person: PersonId,
    pub gift: GiftId,
    pub amount: i64,
}

/// Marks a person as one of the buyers a gift was bought on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub person: PersonId,
    pub gift: GiftId,

    #[serde(default = "default_participates")]
    pub participates: bool,
}

fn default_participates() -> bool {
    true
}

/// Hard limits for a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleParams {
    /// Upper bound for every single transfer.
    pub max_transaction_amount: i64,

    /// Ceiling for the spread between the largest and smallest final spend.
    pub fixed_epsilon: i64,
}

/// Raw contribution and participation records for one group.
///
/// Missing contribution entries mean zero; missing participation entries mean
/// "does not participate".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KittyInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub people: Vec<Person>,

    #[serde(default)]
    pub gifts: Vec<GiftId>,

    #[serde(default)]
    pub contributions: Vec<ContributionRecord>,

    #[serde(default)]
    pub participations: Vec<ParticipationRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<SettleParams>,
}

impl KittyInput {
    pub fn new(people: Vec<Person>, gifts: Vec<GiftId>) -> Self {
        Self {
            schema: Some(crate::schema::KITTY_INPUT_V1.to_string()),
            people,
            gifts,
            contributions: vec![],
            participations: vec![],
            params: None,
        }
    }

    /// Builder helper: `person` spent `amount` on `gift`.
    pub fn contribute(mut self, person: &str, gift: &str, amount: i64) -> Self {
        self.contributions.push(ContributionRecord {
            person: PersonId::new(person),
            gift: GiftId::new(gift),
            amount,
        });
        self
    }

    /// Builder helper: `person` is one of the buyers of `gift`.
    pub fn participate(mut self, person: &str, gift: &str) -> Self {
        self.participations.push(ParticipationRecord {
            person: PersonId::new(person),
            gift: GiftId::new(gift),
            participates: true,
        });
        self
    }

    pub fn exempt_person(&self) -> Option<&PersonId> {
        self.people
            .iter()
            .find(|p| p.receiver_exempt)
            .map(|p| &p.id)
    }
}
