//! Configuration file loading for kitty.
//!
//! Discovers and loads `kitty.toml` from the working directory (or an explicit
//! `--config` path) and merges it with CLI arguments. CLI arguments take
//! precedence; a group's own `params` sit between the two.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use kitty_core::{EpsilonScope, MAX_GROUP_SIZE};
use kitty_core::settings::{ParamOverrides, SearchSettings, SettleSettings};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "kitty.toml";

/// Top-level configuration from kitty.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KittyConfig {
    /// Default settlement limits.
    pub params: ParamsConfig,

    /// Search limits and solver knobs.
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamsConfig {
    pub max_transaction_amount: Option<i64>,
    pub fixed_epsilon: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Worker threads; `0` uses the available parallelism.
    pub threads: Option<usize>,

    /// Search node budget shared by all workers.
    pub node_budget: Option<u64>,

    /// Wall-clock limit for one settle run, in milliseconds.
    pub time_limit_ms: Option<u64>,

    /// Largest group the solver accepts.
    pub max_participants: Option<usize>,

    /// `optimal` or `within-bound`.
    pub epsilon_scope: Option<String>,
}

/// Discover the kitty.toml config file in `dir`.
pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a kitty.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<KittyConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<KittyConfig> {
    let config: KittyConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load the explicit config path if given, else kitty.toml from `dir`, else defaults.
pub fn load_or_default(explicit: Option<&Utf8Path>, dir: &Utf8Path) -> anyhow::Result<KittyConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => match discover_config(dir) {
            Some(path) => load_config(&path),
            None => Ok(KittyConfig::default()),
        },
    }
}

/// Values given on the `settle` command line; unset flags are `None`.
#[derive(Debug, Clone, Default)]
pub struct SettleOverrides {
    pub params: ParamOverrides,
    pub threads: Option<usize>,
    pub node_budget: Option<u64>,
    pub time_limit_ms: Option<u64>,
    pub epsilon_scope: Option<EpsilonScope>,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: KittyConfig,
}

impl ConfigMerger {
    pub fn new(config: KittyConfig) -> Self {
        Self { config }
    }

    /// Config `[params]` become defaults under the input's own `params`; CLI
    /// flags override both. Solver settings: CLI over config over built-ins.
    pub fn merge_settle_args(
        self,
        cli: SettleOverrides,
        out_dir: Utf8PathBuf,
    ) -> anyhow::Result<SettleSettings> {
        let solver = self.config.solver;
        let builtin = SearchSettings::default();

        let config_scope = match solver.epsilon_scope.as_deref() {
            Some(s) => Some(EpsilonScope::parse(s).with_context(|| {
                format!("[solver] epsilon_scope: unknown scope `{s}` (use optimal or within-bound)")
            })?),
            None => None,
        };

        let max_participants = solver.max_participants.unwrap_or(builtin.max_participants);
        if max_participants > MAX_GROUP_SIZE {
            anyhow::bail!("[solver] max_participants: {max_participants} exceeds {MAX_GROUP_SIZE}");
        }

        let search = SearchSettings {
            threads: cli.threads.or(solver.threads).unwrap_or(builtin.threads),
            node_budget: cli.node_budget.or(solver.node_budget).or(builtin.node_budget),
            time_limit: cli
                .time_limit_ms
                .or(solver.time_limit_ms)
                .map(Duration::from_millis),
            max_participants,
            epsilon_scope: cli
                .epsilon_scope
                .or(config_scope)
                .unwrap_or(builtin.epsilon_scope),
        };

        Ok(SettleSettings {
            out_dir,
            defaults: ParamOverrides {
                max_transaction_amount: self.config.params.max_transaction_amount,
                fixed_epsilon: self.config.params.fixed_epsilon,
            },
            overrides: cli.params,
            search,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let contents = r#"
[params]
max_transaction_amount = 500
fixed_epsilon = 10

[solver]
threads = 2
node_budget = 100000
time_limit_ms = 2500
max_participants = 32
epsilon_scope = "within-bound"
"#;

        let config = parse_config(contents).unwrap();
        assert_eq!(config.params.max_transaction_amount, Some(500));
        assert_eq!(config.params.fixed_epsilon, Some(10));
        assert_eq!(config.solver.threads, Some(2));
        assert_eq!(config.solver.node_budget, Some(100_000));
        assert_eq!(config.solver.time_limit_ms, Some(2500));
        assert_eq!(config.solver.max_participants, Some(32));
        assert_eq!(config.solver.epsilon_scope.as_deref(), Some("within-bound"));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert!(config.params.max_transaction_amount.is_none());
        assert!(config.solver.threads.is_none());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = parse_config("[params]\nmax_transfer = 5\n").unwrap_err();
        assert!(format!("{err:#}").contains("max_transfer"));
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = parse_config(
            r#"
[params]
max_transaction_amount = 100
fixed_epsilon = 5

[solver]
threads = 4
time_limit_ms = 1000
"#,
        )
        .unwrap();
        let cli = SettleOverrides {
            params: ParamOverrides {
                max_transaction_amount: None,
                fixed_epsilon: Some(0),
            },
            threads: Some(1),
            ..SettleOverrides::default()
        };

        let settings = ConfigMerger::new(config)
            .merge_settle_args(cli, Utf8PathBuf::from("out"))
            .unwrap();

        assert_eq!(settings.out_dir, Utf8PathBuf::from("out"));
        assert_eq!(settings.defaults.max_transaction_amount, Some(100));
        assert_eq!(settings.defaults.fixed_epsilon, Some(5));
        assert_eq!(settings.overrides.fixed_epsilon, Some(0));
        assert_eq!(settings.search.threads, 1);
        assert_eq!(settings.search.time_limit, Some(Duration::from_millis(1000)));
        assert_eq!(settings.search.epsilon_scope, EpsilonScope::Optimal);
    }

    #[test]
    fn test_bad_epsilon_scope_in_config() {
        let config = parse_config("[solver]\nepsilon_scope = \"loose\"\n").unwrap();
        let err = ConfigMerger::new(config)
            .merge_settle_args(SettleOverrides::default(), Utf8PathBuf::from("out"))
            .unwrap_err();
        assert!(err.to_string().contains("unknown scope `loose`"));
    }

    #[test]
    fn test_max_participants_above_limit_is_rejected() {
        let config = parse_config("[solver]\nmax_participants = 70000\n").unwrap();
        let err = ConfigMerger::new(config)
            .merge_settle_args(SettleOverrides::default(), Utf8PathBuf::from("out"))
            .unwrap_err();
        assert!(err.to_string().contains("max_participants: 70000"));
    }

    #[test]
    fn test_node_budget_defaults_when_unset() {
        let settings = ConfigMerger::new(KittyConfig::default())
            .merge_settle_args(SettleOverrides::default(), Utf8PathBuf::from("out"))
            .unwrap();
        assert_eq!(settings.search.node_budget, SearchSettings::default().node_budget);
        assert_eq!(settings.search.time_limit, None);
    }

    #[test]
    fn test_discover_config_some_and_none() {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        assert!(discover_config(&root).is_none());

        std::fs::write(root.join(CONFIG_FILE_NAME), "").expect("write config");
        assert!(discover_config(&root).is_some());
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8");
        let missing = root.join("missing.toml");
        assert!(load_or_default(Some(&missing), &root).is_err());
        assert!(load_or_default(None, &root).is_ok());
    }
}
