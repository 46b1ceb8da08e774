use crate::ToolInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run report artifact (`report.json`), written for every run including blocked ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KittyReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunInfo,
    pub verdict: Verdict,

    /// Pointers to related artifact files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ReportArtifacts>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_md: Option<String>,
}

/// Stable reason tokens used in `verdict.reasons`.
pub mod reason_tokens {
    pub const INFEASIBLE: &str = "infeasible";
    pub const INFEASIBLE_BOUND: &str = "infeasible_bound";
    pub const CANCELLED: &str = "cancelled";
    pub const APPROXIMATE: &str = "approximate";
    pub const PLAN_REJECTED: &str = "plan_rejected";
    pub const INPUT_MISMATCH: &str = "input_mismatch";
}
