use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use kitty_cli::config::{self, ConfigMerger, SettleOverrides};
use kitty_core::EpsilonScope;
use kitty_core::adapters::{FsInputSource, FsPlanSource, FsWritePort};
use kitty_core::pipeline::{ToolError, run_check, run_settle, write_report, write_settle_artifacts};
use kitty_core::settings::{CheckSettings, ParamOverrides};
use kitty_types::ToolInfo;
use kitty_types::report::KittyReport;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "kitty",
    version,
    about = "Settles a shared-expense kitty with the fewest, fairest transfers."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute a settlement plan for a group.
    Settle(SettleArgs),
    /// Re-validate an existing plan against the group it claims to settle.
    Check(CheckArgs),
}

#[derive(Debug, Parser)]
struct LimitArgs {
    /// Upper bound for every single transfer.
    #[arg(long)]
    max_transaction_amount: Option<i64>,

    /// Largest allowed spread between final spends.
    #[arg(long)]
    fixed_epsilon: Option<i64>,
}

impl LimitArgs {
    fn overrides(&self) -> ParamOverrides {
        ParamOverrides {
            max_transaction_amount: self.max_transaction_amount,
            fixed_epsilon: self.fixed_epsilon,
        }
    }
}

#[derive(Debug, Parser)]
struct SettleArgs {
    /// Group input document (kitty.input.v1 JSON).
    #[arg(long)]
    input: Utf8PathBuf,

    /// Output directory for plan.json, plan.md and report.json.
    #[arg(long, default_value = "artifacts/kitty")]
    out_dir: Utf8PathBuf,

    /// Config file (default: ./kitty.toml when present).
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[command(flatten)]
    limits: LimitArgs,

    /// Worker threads for the search (0 = rayon default).
    #[arg(long)]
    threads: Option<usize>,

    /// Stop the search after this many explored nodes.
    #[arg(long)]
    node_budget: Option<u64>,

    /// Stop the search after this many milliseconds.
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Which spreads may be traded for fewer transfers.
    #[arg(long, value_enum)]
    epsilon_scope: Option<ScopeArg>,
}

#[derive(Debug, Parser)]
struct CheckArgs {
    /// Group input document the plan was computed from.
    #[arg(long)]
    input: Utf8PathBuf,

    /// Plan artifact to check.
    #[arg(long)]
    plan: Utf8PathBuf,

    /// Write report.json here.
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    /// Check against these limits instead of the ones recorded in the plan.
    #[command(flatten)]
    limits: LimitArgs,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ScopeArg {
    Optimal,
    WithinBound,
}

impl From<ScopeArg> for EpsilonScope {
    fn from(s: ScopeArg) -> Self {
        match s {
            ScopeArg::Optimal => EpsilonScope::Optimal,
            ScopeArg::WithinBound => EpsilonScope::WithinBound,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Settle(args) => cmd_settle(args),
        Command::Check(args) => cmd_check(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let ToolError::Internal(inner) = &e {
                error!("{:?}", inner);
            }
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn cmd_settle(args: SettleArgs) -> Result<(), ToolError> {
    let file_config = config::load_or_default(args.config.as_deref(), &Utf8PathBuf::from("."))
        .context("load kitty.toml config")?;
    let cli = SettleOverrides {
        params: args.limits.overrides(),
        threads: args.threads,
        node_budget: args.node_budget,
        time_limit_ms: args.time_limit_ms,
        epsilon_scope: args.epsilon_scope.map(EpsilonScope::from),
    };
    let settings = ConfigMerger::new(file_config).merge_settle_args(cli, args.out_dir)?;
    debug!(
        "merged config: defaults={:?}, overrides={:?}, search={:?}",
        settings.defaults, settings.overrides, settings.search
    );

    let source = FsInputSource::new(args.input);
    let outcome = run_settle(&settings, &source, tool_info())?;
    write_settle_artifacts(&outcome, &settings.out_dir, &FsWritePort)?;

    match &outcome.plan {
        Some(plan) => {
            for t in &plan.transfers {
                println!("{} -> {}: {}", t.from, t.to, t.amount);
            }
            println!(
                "{} transfer(s), spread {}",
                plan.summary.exchange_count, plan.summary.epsilon
            );
            info!("wrote plan to {}", settings.out_dir);
            Ok(())
        }
        None => {
            print_verdict("blocked", &outcome.report);
            Err(ToolError::Blocked)
        }
    }
}

fn cmd_check(args: CheckArgs) -> Result<(), ToolError> {
    let settings = CheckSettings {
        overrides: args.limits.overrides(),
    };
    let outcome = run_check(
        &settings,
        &FsInputSource::new(args.input),
        &FsPlanSource::new(args.plan),
        tool_info(),
    )?;

    if let Some(out_dir) = &args.out_dir {
        write_report(&outcome.report, &out_dir.join("report.json"), &FsWritePort)?;
        info!("wrote report to {}", out_dir);
    }

    if outcome.blocked {
        print_verdict("plan rejected", &outcome.report);
        return Err(ToolError::Blocked);
    }
    print_verdict("plan accepted", &outcome.report);
    Ok(())
}

fn print_verdict(headline: &str, report: &KittyReport) {
    if report.verdict.reasons.is_empty() {
        println!("{headline}");
    } else {
        println!("{headline}: {}", report.verdict.reasons.join(", "));
    }
    if let Some(data) = &report.data {
        println!("{data}");
    }
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "kitty".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}
