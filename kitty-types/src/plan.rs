use crate::ToolInfo;
use crate::input::{PersonId, SettleParams};
use serde::{Deserialize, Serialize};

/// Settlement plan artifact (`plan.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KittyPlan {
    pub schema: String,
    pub tool: ToolInfo,

    /// Deterministic id derived from the input fingerprint and parameters.
    pub plan_id: String,

    /// SHA-256 of the canonical input document.
    pub input_sha256: String,

    pub params: SettleParams,
    pub status: PlanStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(default)]
    pub transfers: Vec<Transfer>,

    #[serde(default)]
    pub people: Vec<PersonSummary>,

    pub summary: PlanSummary,

    #[serde(default)]
    pub search: SearchSummary,
}

impl KittyPlan {
    pub fn new(tool: ToolInfo, params: SettleParams) -> Self {
        Self {
            schema: crate::schema::KITTY_PLAN_V1.to_string(),
            tool,
            plan_id: String::new(),
            input_sha256: String::new(),
            params,
            status: PlanStatus::Optimal,
            stop_reason: None,
            transfers: vec![],
            people: vec![],
            summary: PlanSummary::default(),
            search: SearchSummary::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Search ran to completion.
    Optimal,
    /// Search ran to completion, but the transfer count is an upper bound.
    Approximate,
    /// Search was stopped early; the plan is the best incumbent and is valid but
    /// not proven optimal.
    Cancelled,
}

/// One payer → payee transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: PersonId,
    pub to: PersonId,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub person: PersonId,
    pub initial_spend: i64,
    pub participation_cap: i64,
    pub given: i64,
    pub received: i64,
    pub final_spend: i64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub receiver_exempt: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Realized spread `max(final) - min(final)`.
    pub epsilon: i64,

    /// Smallest spread achievable under the hard constraints.
    pub optimal_epsilon: i64,

    pub exchange_count: u64,
    pub total_transferred: i64,
    pub total_spend: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSummary {
    pub windows: u64,
    pub nodes: u64,
}
