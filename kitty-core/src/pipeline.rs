//! Core settle and check pipelines, extracted from the CLI.
//!
//! These entry points are I/O-agnostic: all filesystem operations are
//! performed through the port traits.

use crate::ports::{InputSource, PlanSource, WritePort};
use crate::settings::{CheckSettings, ParamOverrides, SettleSettings};
use anyhow::Context;
use chrono::{DateTime, Utc};
use kitty_domain::{Audit, Claim, SettleError, Settlement, Settler, SolveStatus, check_transfers};
use kitty_render::render_plan_md;
use kitty_types::ToolInfo;
use kitty_types::input::{KittyInput, SettleParams};
use kitty_types::plan::{KittyPlan, PersonSummary, PlanStatus, PlanSummary, SearchSummary};
use kitty_types::report::{
    KittyReport, ReportArtifacts, RunInfo, Verdict, VerdictStatus, reason_tokens,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error type for pipeline results.  Exit code 2 = blocked, 1 = tool error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// No acceptable plan: infeasible limits, or a rejected plan under `check`.
    #[error("blocked")]
    Blocked,
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolError::Blocked => 2,
            ToolError::Internal(_) => 1,
        }
    }
}

/// Outcome of `run_settle`.
pub struct SettleOutcome {
    /// `None` when the run is blocked.
    pub plan: Option<KittyPlan>,
    pub report: KittyReport,
    pub blocked: bool,
}

/// Run the settle pipeline. Returns the plan (if any) and the report.
///
/// Infeasible limits are not an error here: they produce a blocked outcome whose
/// report says why. The caller writes artifacts (see `write_settle_artifacts`).
pub fn run_settle(
    settings: &SettleSettings,
    source: &dyn InputSource,
    tool: ToolInfo,
) -> Result<SettleOutcome, ToolError> {
    let started_at = Utc::now();
    let input = source.load_input()?;
    let input_sha256 = fingerprint(&input)?;
    let params = resolve_params(
        settings
            .defaults
            .overlay(input.params.map(ParamOverrides::from).unwrap_or_default())
            .overlay(settings.overrides),
    )?;
    debug!(
        max_transaction_amount = params.max_transaction_amount,
        fixed_epsilon = params.fixed_epsilon,
        "resolved parameters"
    );

    let settler = Settler::new(settings.search.solver_options());
    let control = settings.search.control();
    let settlement = match settler.settle(&input, params, &control) {
        Ok(s) => s,
        Err(err @ (SettleError::Infeasible | SettleError::InfeasibleBound { .. })) => {
            warn!(%err, "no plan within the requested limits");
            let report = blocked_report(&err, tool, started_at);
            return Ok(SettleOutcome {
                plan: None,
                report,
                blocked: true,
            });
        }
        Err(err) => return Err(anyhow::Error::new(err).context("settle").into()),
    };

    let plan = build_plan(&settlement, params, tool.clone(), &input_sha256, settings)?;
    let report = settle_report(&plan, tool, started_at);
    Ok(SettleOutcome {
        plan: Some(plan),
        report,
        blocked: false,
    })
}

/// Write all settle artifacts to the output directory.
///
/// Blocked runs only get `report.json`.
pub fn write_settle_artifacts(
    outcome: &SettleOutcome,
    out_dir: &camino::Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;

    if let Some(plan) = &outcome.plan {
        let plan_json = serde_json::to_string_pretty(plan).context("serialize plan")?;
        writer.write_file(&out_dir.join("plan.json"), plan_json.as_bytes())?;

        let plan_md = render_plan_md(plan);
        writer.write_file(&out_dir.join("plan.md"), plan_md.as_bytes())?;
    }

    write_report(&outcome.report, &out_dir.join("report.json"), writer)?;
    info!(out_dir = out_dir.as_str(), "artifacts written");
    Ok(())
}

pub fn write_report(
    report: &KittyReport,
    path: &camino::Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<()> {
    let report_json = serde_json::to_string_pretty(report).context("serialize report")?;
    writer.write_file(path, report_json.as_bytes())
}

/// Outcome of `run_check`.
pub struct CheckOutcome {
    /// Present when the plan was accepted.
    pub audit: Option<Audit>,
    pub report: KittyReport,
    pub blocked: bool,
}

/// Re-validate a plan artifact against the input it claims to settle.
pub fn run_check(
    settings: &CheckSettings,
    input_source: &dyn InputSource,
    plan_source: &dyn PlanSource,
    tool: ToolInfo,
) -> Result<CheckOutcome, ToolError> {
    let started_at = Utc::now();
    let input = input_source.load_input()?;
    let plan = plan_source.load_plan()?;

    let input_sha256 = fingerprint(&input)?;
    if !plan.input_sha256.is_empty() && plan.input_sha256 != input_sha256 {
        let data = serde_json::json!({
            "expected_input_sha256": plan.input_sha256,
            "actual_input_sha256": input_sha256,
        });
        return Ok(rejected(
            reason_tokens::INPUT_MISMATCH,
            data,
            tool,
            started_at,
        ));
    }

    // Fairness is held to `fixed_epsilon` whatever status or spread the plan claims.
    let params = resolve_params(ParamOverrides::from(plan.params).overlay(settings.overrides))?;
    let claim = Claim {
        epsilon: plan.summary.epsilon,
        exchange_count: plan.summary.exchange_count,
        fairness_ceiling: params.fixed_epsilon,
    };

    match check_transfers(&input, params, &plan.transfers, &claim) {
        Ok(audit) if audit.total_transferred != plan.summary.total_transferred => {
            let data = serde_json::json!({
                "rule": "accounting",
                "detail": format!(
                    "claimed {} transferred but plan moves {}",
                    plan.summary.total_transferred, audit.total_transferred
                ),
            });
            Ok(rejected(reason_tokens::PLAN_REJECTED, data, tool, started_at))
        }
        Ok(audit) => {
            let report = KittyReport {
                schema: kitty_types::schema::KITTY_REPORT_V1.to_string(),
                tool,
                run: run_info(started_at),
                verdict: Verdict {
                    status: VerdictStatus::Pass,
                    reasons: vec![],
                },
                artifacts: None,
                data: Some(serde_json::json!({
                    "epsilon": audit.epsilon,
                    "exchange_count": audit.exchange_count,
                    "total_transferred": audit.total_transferred,
                    "final_spends": audit.final_spends,
                })),
            };
            Ok(CheckOutcome {
                audit: Some(audit),
                report,
                blocked: false,
            })
        }
        Err(SettleError::ConstraintViolation(violation)) => {
            warn!(%violation, "plan rejected");
            let data = serde_json::json!({
                "rule": violation.rule.as_str(),
                "detail": violation.detail,
            });
            Ok(rejected(reason_tokens::PLAN_REJECTED, data, tool, started_at))
        }
        Err(err) => Err(anyhow::Error::new(err).context("check plan").into()),
    }
}

/// SHA-256 over the canonical (compact, field-ordered) JSON of the input.
pub fn fingerprint(input: &KittyInput) -> anyhow::Result<String> {
    let canonical = serde_json::to_vec(input).context("serialize input")?;
    Ok(sha256_hex(&canonical))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic plan id: v5(namespace, fingerprint + parameters + scope).
pub fn plan_id(input_sha256: &str, params: SettleParams, scope: &str) -> Uuid {
    const NAMESPACE: Uuid = Uuid::from_bytes([
        0x6b, 0x69, 0x74, 0x74, 0x79, 0x2d, 0x4f, 0x1a, 0x9c, 0x3e, 0x52, 0x0d, 0x17, 0xa4, 0x8b,
        0x61,
    ]);
    let key = format!(
        "{}:{}:{}:{}",
        input_sha256, params.max_transaction_amount, params.fixed_epsilon, scope
    );
    Uuid::new_v5(&NAMESPACE, key.as_bytes())
}

fn resolve_params(merged: ParamOverrides) -> anyhow::Result<SettleParams> {
    let missing = |name: &str, flag: &str| {
        anyhow::anyhow!("{name} is not set (input `params`, kitty.toml [params] or --{flag})")
    };
    Ok(SettleParams {
        max_transaction_amount: merged
            .max_transaction_amount
            .ok_or_else(|| missing("max_transaction_amount", "max-transaction-amount"))?,
        fixed_epsilon: merged
            .fixed_epsilon
            .ok_or_else(|| missing("fixed_epsilon", "fixed-epsilon"))?,
    })
}

fn build_plan(
    settlement: &Settlement,
    params: SettleParams,
    tool: ToolInfo,
    input_sha256: &str,
    settings: &SettleSettings,
) -> anyhow::Result<KittyPlan> {
    let balances = &settlement.balances;
    let audit = &settlement.audit;

    let mut people = Vec::with_capacity(balances.len());
    for (p, person) in balances.people().iter().enumerate() {
        people.push(PersonSummary {
            person: person.clone(),
            initial_spend: balances.initial_spend()[p],
            participation_cap: balances.participation_cap()[p],
            given: i64::try_from(settlement.plan.given(p)).context("amount given out of range")?,
            received: i64::try_from(settlement.plan.received(p))
                .context("amount received out of range")?,
            final_spend: audit.final_spends[p],
            receiver_exempt: balances.is_exempt(p),
        });
    }

    let mut plan = KittyPlan::new(tool, params);
    let scope = settings.search.epsilon_scope.as_str();
    plan.plan_id = plan_id(input_sha256, params, scope).to_string();
    plan.input_sha256 = input_sha256.to_string();
    match settlement.status {
        SolveStatus::Optimal => plan.status = PlanStatus::Optimal,
        SolveStatus::Approximate => plan.status = PlanStatus::Approximate,
        SolveStatus::Cancelled(reason) => {
            plan.status = PlanStatus::Cancelled;
            plan.stop_reason = Some(reason.as_str().to_string());
        }
    }
    plan.transfers = settlement.transfers();
    plan.people = people;
    plan.summary = PlanSummary {
        epsilon: audit.epsilon,
        optimal_epsilon: settlement.optimal_epsilon,
        exchange_count: audit.exchange_count,
        total_transferred: audit.total_transferred,
        total_spend: balances.total_spend(),
    };
    plan.search = SearchSummary {
        windows: settlement.stats.windows,
        nodes: settlement.stats.nodes,
    };
    Ok(plan)
}

fn settle_report(plan: &KittyPlan, tool: ToolInfo, started_at: DateTime<Utc>) -> KittyReport {
    let (status, reasons) = match plan.status {
        PlanStatus::Optimal => (VerdictStatus::Pass, vec![]),
        PlanStatus::Approximate => (
            VerdictStatus::Warn,
            vec![reason_tokens::APPROXIMATE.to_string()],
        ),
        PlanStatus::Cancelled => (
            VerdictStatus::Warn,
            vec![reason_tokens::CANCELLED.to_string()],
        ),
    };

    KittyReport {
        schema: kitty_types::schema::KITTY_REPORT_V1.to_string(),
        tool,
        run: run_info(started_at),
        verdict: Verdict { status, reasons },
        artifacts: Some(ReportArtifacts {
            plan: Some("plan.json".to_string()),
            plan_md: Some("plan.md".to_string()),
        }),
        data: Some(serde_json::json!({
            "plan_id": plan.plan_id,
            "epsilon": plan.summary.epsilon,
            "optimal_epsilon": plan.summary.optimal_epsilon,
            "exchange_count": plan.summary.exchange_count,
            "stop_reason": plan.stop_reason,
        })),
    }
}

fn blocked_report(err: &SettleError, tool: ToolInfo, started_at: DateTime<Utc>) -> KittyReport {
    let (reason, data) = match err {
        SettleError::InfeasibleBound {
            requested,
            achievable,
        } => (
            reason_tokens::INFEASIBLE_BOUND,
            serde_json::json!({
                "requested_epsilon": requested,
                "achievable_epsilon": achievable,
            }),
        ),
        other => (
            reason_tokens::INFEASIBLE,
            serde_json::json!({ "message": other.to_string() }),
        ),
    };

    KittyReport {
        schema: kitty_types::schema::KITTY_REPORT_V1.to_string(),
        tool,
        run: run_info(started_at),
        verdict: Verdict {
            status: VerdictStatus::Fail,
            reasons: vec![reason.to_string()],
        },
        artifacts: None,
        data: Some(data),
    }
}

fn rejected(
    reason: &str,
    data: serde_json::Value,
    tool: ToolInfo,
    started_at: DateTime<Utc>,
) -> CheckOutcome {
    CheckOutcome {
        audit: None,
        report: KittyReport {
            schema: kitty_types::schema::KITTY_REPORT_V1.to_string(),
            tool,
            run: run_info(started_at),
            verdict: Verdict {
                status: VerdictStatus::Fail,
                reasons: vec![reason.to_string()],
            },
            artifacts: None,
            data: Some(data),
        },
        blocked: true,
    }
}

fn run_info(started_at: DateTime<Utc>) -> RunInfo {
    let ended_at = Utc::now();
    let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
    RunInfo {
        started_at: Some(started_at),
        ended_at: Some(ended_at),
        duration_ms: Some(duration_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryInputSource;
    use kitty_types::input::{GiftId, Person};
    use pretty_assertions::assert_eq;

    fn tool() -> ToolInfo {
        ToolInfo {
            name: "kitty".to_string(),
            version: Some("test".to_string()),
        }
    }

    fn pair(params: Option<SettleParams>) -> KittyInput {
        let mut input =
            KittyInput::new(vec![Person::new("a"), Person::new("b")], vec![GiftId::new("g")])
                .contribute("a", "g", 100)
                .participate("a", "g")
                .participate("b", "g");
        input.params = params;
        input
    }

    fn params(max: i64, eps: i64) -> SettleParams {
        SettleParams {
            max_transaction_amount: max,
            fixed_epsilon: eps,
        }
    }

    #[test]
    fn settle_builds_plan_and_passing_report() {
        let source = InMemoryInputSource::new(pair(Some(params(180, 0))));
        let outcome = run_settle(&SettleSettings::default(), &source, tool()).expect("settle");

        assert!(!outcome.blocked);
        let plan = outcome.plan.expect("plan");
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.summary.total_transferred, 50);
        assert_eq!(plan.people[1].given, 50);
        assert_eq!(plan.people[0].received, 50);
        assert_eq!(outcome.report.verdict.status, VerdictStatus::Pass);
    }

    #[test]
    fn cli_overrides_beat_input_params() {
        let source = InMemoryInputSource::new(pair(Some(params(180, 0))));
        let settings = SettleSettings {
            overrides: ParamOverrides {
                max_transaction_amount: Some(30),
                fixed_epsilon: None,
            },
            ..SettleSettings::default()
        };
        let outcome = run_settle(&settings, &source, tool()).expect("settle");

        assert!(outcome.blocked);
        assert!(outcome.plan.is_none());
        assert_eq!(
            outcome.report.verdict.reasons,
            vec![reason_tokens::INFEASIBLE_BOUND.to_string()]
        );
        assert_eq!(
            outcome.report.data,
            Some(serde_json::json!({ "requested_epsilon": 0, "achievable_epsilon": 40 }))
        );
    }

    #[test]
    fn missing_parameters_are_an_internal_error() {
        let source = InMemoryInputSource::new(pair(None));
        let err = match run_settle(&SettleSettings::default(), &source, tool()) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("max_transaction_amount is not set"));
    }

    #[test]
    fn plan_id_is_deterministic() {
        let a = plan_id("abc", params(10, 0), "optimal");
        let b = plan_id("abc", params(10, 0), "optimal");
        let c = plan_id("abc", params(10, 1), "optimal");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_changes_with_input() {
        let a = fingerprint(&pair(None)).expect("fingerprint");
        let b = fingerprint(&pair(Some(params(1, 1)))).expect("fingerprint");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
