//! Rendering helpers (markdown) for human-readable artifacts.

use kitty_types::plan::{KittyPlan, PlanStatus};
use kitty_types::report::{KittyReport, VerdictStatus};

pub fn render_plan_md(plan: &KittyPlan) -> String {
    let mut out = String::new();
    out.push_str("# kitty plan\n\n");
    match &plan.stop_reason {
        Some(reason) => out.push_str(&format!(
            "- Status: `{}` (stopped: {})\n",
            status_label(plan.status),
            reason
        )),
        None => out.push_str(&format!("- Status: `{}`\n", status_label(plan.status))),
    }
    out.push_str(&format!(
        "- Spread: {} (smallest achievable {})\n",
        plan.summary.epsilon, plan.summary.optimal_epsilon
    ));
    out.push_str(&format!(
        "- Transfers: {} (moving {})\n",
        plan.summary.exchange_count, plan.summary.total_transferred
    ));
    out.push_str(&format!("- Total spend: {}\n", plan.summary.total_spend));
    out.push_str(&format!(
        "- Limits: max transfer {}, fixed epsilon {}\n\n",
        plan.params.max_transaction_amount, plan.params.fixed_epsilon
    ));

    out.push_str("## Transfers\n\n");
    if plan.transfers.is_empty() {
        out.push_str("_No transfers needed._\n");
    } else {
        out.push_str("| From | To | Amount |\n|---|---|---:|\n");
        for t in &plan.transfers {
            out.push_str(&format!("| {} | {} | {} |\n", t.from, t.to, t.amount));
        }
    }

    if !plan.people.is_empty() {
        out.push_str("\n## People\n\n");
        out.push_str("| Person | Initial | Cap | Given | Received | Final |\n");
        out.push_str("|---|---:|---:|---:|---:|---:|\n");
        for p in &plan.people {
            let name = if p.receiver_exempt {
                format!("{} (exempt)", p.person)
            } else {
                p.person.to_string()
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                name, p.initial_spend, p.participation_cap, p.given, p.received, p.final_spend
            ));
        }
    }

    out
}

pub fn render_report_md(report: &KittyReport) -> String {
    let mut out = String::new();
    out.push_str("# kitty report\n\n");
    out.push_str(&format!(
        "- Verdict: `{}`\n",
        verdict_label(report.verdict.status)
    ));
    if !report.verdict.reasons.is_empty() {
        out.push_str(&format!("- Reasons: {}\n", report.verdict.reasons.join(", ")));
    }
    if let Some(ms) = report.run.duration_ms {
        out.push_str(&format!("- Duration: {} ms\n", ms));
    }
    if let Some(plan) = report.artifacts.as_ref().and_then(|a| a.plan.as_deref()) {
        out.push_str(&format!("- Plan: `{}`\n", plan));
    }

    if let Some(data) = &report.data {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        out.push_str("\n## Data\n\n```json\n");
        out.push_str(&pretty);
        out.push_str("\n```\n");
    }

    out
}

fn status_label(s: PlanStatus) -> &'static str {
    match s {
        PlanStatus::Optimal => "optimal",
        PlanStatus::Approximate => "approximate",
        PlanStatus::Cancelled => "cancelled",
    }
}

fn verdict_label(s: VerdictStatus) -> &'static str {
    match s {
        VerdictStatus::Pass => "pass",
        VerdictStatus::Warn => "warn",
        VerdictStatus::Fail => "fail",
    }
}
