//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for conclave
#[derive(Parser, Debug)]
#[command(name = "conclave")]
#[command(author, version, about = "Long-lived agents that act by multi-model consensus")]
#[command(long_about = r#"
Conclave runs an agent whose every action is chosen by a pool of models.

Each model proposes the next action; equivalent proposals are grouped and
a group wins by quorum. Without a winner the models refine their proposals
at a lower temperature until the last round forces a pick.

Configuration files are loaded from (in priority order):
1. CONCLAVE_* environment variables (e.g. CONCLAVE_CONSENSUS__MAX_ROUNDS=6)
2. --config <path>                   Explicit config file
3. ./conclave.toml                   Project-level config
4. ~/.config/conclave/config.toml    Global config

Example:
  conclave run --script demo.json -m claude-sonnet-4.5 -m gpt-5.2-codex --message "Tidy the repo"
  conclave config --show-sources
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one root agent until it settles and print its state as JSON
    Run(RunArgs),
    /// Print the effective configuration and any issues found in it
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Models in the agent's pool (overrides [agent].models)
    #[arg(short, long, value_name = "MODEL")]
    pub model: Vec<String>,

    /// First message to the agent; also used as its task
    #[arg(long, value_name = "TEXT")]
    pub message: String,

    /// Response script for the offline gateway (JSON)
    #[arg(long, value_name = "FILE")]
    pub script: PathBuf,

    /// Reuse an agent id, restoring its saved memory
    #[arg(long, value_name = "ID")]
    pub agent_id: Option<String>,

    /// Give up waiting for the agent after this many seconds
    #[arg(long, default_value_t = 120, value_name = "SECS")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show configuration file locations
    #[arg(long)]
    pub show_sources: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "conclave", "-vv", "run", "--script", "s.json", "-m", "a", "-m", "b", "--message", "hi",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.model, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(args.message, "hi");
        assert_eq!(args.timeout, 120);
        assert!(args.agent_id.is_none());
    }

    #[test]
    fn test_parse_config_with_global_flags() {
        let cli = Cli::try_parse_from(["conclave", "config", "--show-sources", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::Config(ConfigArgs { show_sources: true })));
    }

    #[test]
    fn test_run_requires_message_and_script() {
        assert!(Cli::try_parse_from(["conclave", "run", "--script", "s.json"]).is_err());
        assert!(Cli::try_parse_from(["conclave", "run", "--message", "hi"]).is_err());
    }
}
