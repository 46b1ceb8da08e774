//! End-to-end CLI tests: argument parsing, config merging, exit codes and artifacts.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn kitty() -> Command {
    Command::cargo_bin("kitty").expect("kitty binary")
}

/// A pays 100 for a dinner shared with B.
fn write_pair(dir: &Path, params: Option<(i64, i64)>) {
    let mut input = serde_json::json!({
        "schema": "kitty.input.v1",
        "people": [{ "id": "A" }, { "id": "B" }],
        "gifts": ["dinner"],
        "contributions": [{ "person": "A", "gift": "dinner", "amount": 100 }],
        "participations": [
            { "person": "A", "gift": "dinner" },
            { "person": "B", "gift": "dinner" }
        ]
    });
    if let Some((max, eps)) = params {
        input["params"] = serde_json::json!({
            "max_transaction_amount": max,
            "fixed_epsilon": eps,
        });
    }
    fs::write(
        dir.join("input.json"),
        serde_json::to_string_pretty(&input).unwrap(),
    )
    .unwrap();
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_settle_writes_all_artifacts() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("B -> A: 50"));

    let out = temp.path().join("artifacts").join("kitty");
    assert!(out.join("plan.md").exists());
    let plan = read_json(&out.join("plan.json"));
    assert_eq!(plan["schema"], "kitty.plan.v1");
    assert_eq!(
        plan["transfers"],
        serde_json::json!([{ "from": "B", "to": "A", "amount": 50 }])
    );
    let report = read_json(&out.join("report.json"));
    assert_eq!(report["verdict"]["status"], "pass");
}

#[test]
fn test_settle_custom_out_dir_and_search_flags() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args([
            "settle",
            "--input",
            "input.json",
            "--out-dir",
            "out",
            "--threads",
            "1",
            "--node-budget",
            "1000000",
            "--time-limit-ms",
            "60000",
            "--epsilon-scope",
            "within-bound",
        ])
        .assert()
        .success();

    assert!(temp.path().join("out").join("plan.json").exists());
}

#[test]
fn test_unattainable_bound_is_blocked() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((30, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--out-dir", "out"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("blocked: infeasible_bound"));

    let out = temp.path().join("out");
    assert!(!out.join("plan.json").exists());
    let report = read_json(&out.join("report.json"));
    assert_eq!(report["verdict"]["status"], "fail");
    assert_eq!(report["data"]["achievable_epsilon"], 40);
}

#[test]
fn test_missing_params_is_an_error() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), None);

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json"])
        .assert()
        .code(1);
}

#[test]
fn test_negative_flag_value_is_an_error() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--fixed-epsilon=-1"])
        .assert()
        .code(1);
}

#[test]
fn test_config_supplies_params_and_flags_override() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), None);
    fs::write(
        temp.path().join("kitty.toml"),
        "[params]\nmax_transaction_amount = 180\nfixed_epsilon = 0\n",
    )
    .unwrap();

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json"])
        .assert()
        .success();

    kitty()
        .current_dir(temp.path())
        .args([
            "settle",
            "--input",
            "input.json",
            "--max-transaction-amount",
            "30",
        ])
        .assert()
        .code(2);
}

#[test]
fn test_explicit_config_path() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), None);
    fs::write(
        temp.path().join("limits.toml"),
        "[params]\nmax_transaction_amount = 180\nfixed_epsilon = 0\n",
    )
    .unwrap();

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--config", "limits.toml"])
        .assert()
        .success();

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--config", "absent.toml"])
        .assert()
        .code(1);
}

#[test]
fn test_unknown_epsilon_scope_is_rejected_by_parser() {
    kitty()
        .args([
            "settle",
            "--input",
            "input.json",
            "--epsilon-scope",
            "loose",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_check_accepts_settled_plan() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--out-dir", "out"])
        .assert()
        .success();

    kitty()
        .current_dir(temp.path())
        .args([
            "check",
            "--input",
            "input.json",
            "--plan",
            "out/plan.json",
            "--out-dir",
            "checked",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan accepted"));

    let report = read_json(&temp.path().join("checked").join("report.json"));
    assert_eq!(report["verdict"]["status"], "pass");
    assert_eq!(report["data"]["final_spends"], serde_json::json!([50, 50]));
}

#[test]
fn test_check_rejects_tampered_plan() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--out-dir", "out"])
        .assert()
        .success();

    let plan_path = temp.path().join("out").join("plan.json");
    let mut plan = read_json(&plan_path);
    plan["transfers"][0]["amount"] = serde_json::json!(40);
    fs::write(&plan_path, serde_json::to_string_pretty(&plan).unwrap()).unwrap();

    kitty()
        .current_dir(temp.path())
        .args(["check", "--input", "input.json", "--plan", "out/plan.json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("plan rejected: plan_rejected"));
}

#[test]
fn test_check_holds_cancelled_plans_to_fixed_epsilon() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--out-dir", "out"])
        .assert()
        .success();

    let plan_path = temp.path().join("out").join("plan.json");
    let mut plan = read_json(&plan_path);
    plan["status"] = serde_json::json!("cancelled");
    plan["stop_reason"] = serde_json::json!("node_budget");
    plan["transfers"] = serde_json::json!([]);
    plan["summary"]["epsilon"] = serde_json::json!(100);
    plan["summary"]["exchange_count"] = serde_json::json!(0);
    plan["summary"]["total_transferred"] = serde_json::json!(0);
    fs::write(&plan_path, serde_json::to_string_pretty(&plan).unwrap()).unwrap();

    kitty()
        .current_dir(temp.path())
        .args(["check", "--input", "input.json", "--plan", "out/plan.json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("plan_rejected"))
        .stdout(predicate::str::contains("\"rule\":\"fairness\""));
}

#[test]
fn test_check_rejects_plan_for_other_input() {
    let temp = TempDir::new().unwrap();
    write_pair(temp.path(), Some((180, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["settle", "--input", "input.json", "--out-dir", "out"])
        .assert()
        .success();

    write_pair(temp.path(), Some((200, 0)));

    kitty()
        .current_dir(temp.path())
        .args(["check", "--input", "input.json", "--plan", "out/plan.json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("input_mismatch"));
}

#[test]
fn test_missing_subcommand_fails() {
    kitty().assert().failure();
}
