use anyhow::Context;
use clap::{Parser, Subcommand};
use fs_err as fs;
use kitty_types::input::{GiftId, KittyInput, Person, SettleParams};
use std::process::Command as ProcessCommand;

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Workspace helper tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print schema identifiers used by kitty.
    PrintSchemas,
    /// Write a small example input document.
    SampleInput {
        #[arg(long, default_value = "input.json")]
        out: String,
    },
    /// Bless golden fixtures (overwrite expected outputs).
    BlessFixtures,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::PrintSchemas => {
            println!("{}", kitty_types::schema::KITTY_INPUT_V1);
            println!("{}", kitty_types::schema::KITTY_PLAN_V1);
            println!("{}", kitty_types::schema::KITTY_REPORT_V1);
        }
        Command::SampleInput { out } => {
            let json = serde_json::to_string_pretty(&sample_input())
                .context("serialize sample input")?;
            fs::write(&out, json + "\n").with_context(|| format!("write {out}"))?;
            println!("wrote {out}");
        }
        Command::BlessFixtures => {
            let status = ProcessCommand::new("cargo")
                .args(["test", "-p", "kitty-core", "--test", "golden_fixtures"])
                .env("KITTY_BLESS", "1")
                .status()
                .context("run golden fixture blessing")?;
            if !status.success() {
                anyhow::bail!("bless-fixtures failed");
            }
        }
    }
    Ok(())
}

/// Three friends, one of whom never takes money back.
fn sample_input() -> KittyInput {
    let people = vec![Person::exempt("ana"), Person::new("ben"), Person::new("cleo")];
    let gifts = vec![GiftId::new("flowers"), GiftId::new("cake")];
    let mut input = KittyInput::new(people, gifts)
        .contribute("ben", "flowers", 90)
        .contribute("cleo", "cake", 30)
        .participate("ana", "flowers")
        .participate("ben", "flowers")
        .participate("cleo", "flowers")
        .participate("ben", "cake")
        .participate("cleo", "cake");
    input.params = Some(SettleParams {
        max_transaction_amount: 100,
        fixed_epsilon: 0,
    });
    input
}
