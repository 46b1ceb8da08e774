//! Shared DTOs (schemas-as-code) for the kitty workspace.
//!
//! # Design constraints
//! - These types are read from and written to disk.
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod input;
pub mod plan;
pub mod report;

/// Schema identifiers.
pub mod schema {
    pub const KITTY_INPUT_V1: &str = "kitty.input.v1";
    pub const KITTY_PLAN_V1: &str = "kitty.plan.v1";
    pub const KITTY_REPORT_V1: &str = "kitty.report.v1";
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
