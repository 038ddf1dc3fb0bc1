//! # CLI Interface
//!
//! Defines the command-line argument structure for `grantvault-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use grantvault_contracts::config::DEFAULT_VAULT_ADDRESS;

/// Grant vault node.
///
/// Hosts the token ledgers and the vesting vault in one process, serves
/// the HTTP API and event stream, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "grantvault-node",
    about = "Token ledger and time-locked grant vault node",
    version,
    propagate_version = true
)]
pub struct GrantVaultCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and an empty state snapshot.
    Init(InitArgs),
    /// Query the status of a running node via its HTTP endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Log output format accepted by `--log-format`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the state snapshot.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "GRANTVAULT_DATA_DIR", default_value = "~/.grantvault")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "GRANTVAULT_RPC_PORT", default_value_t = 8645)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "GRANTVAULT_METRICS_PORT", default_value_t = 8646)]
    pub metrics_port: u16,

    /// Ledger account that holds escrowed grant funds.
    ///
    /// Ignored when an existing snapshot is loaded; the snapshot's vault
    /// address wins.
    #[arg(long, env = "GRANTVAULT_VAULT_ADDRESS", default_value = DEFAULT_VAULT_ADDRESS)]
    pub vault_address: String,

    /// Log output format.
    #[arg(long, env = "GRANTVAULT_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "GRANTVAULT_DATA_DIR", default_value = "~/.grantvault")]
    pub data_dir: PathBuf,

    /// Vault custody account recorded in the new snapshot.
    #[arg(long, env = "GRANTVAULT_VAULT_ADDRESS", default_value = DEFAULT_VAULT_ADDRESS)]
    pub vault_address: String,

    /// Overwrite an existing snapshot.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// HTTP endpoint of the running node.
    #[arg(long, env = "GRANTVAULT_RPC_URL", default_value = "http://127.0.0.1:8645")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        GrantVaultCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = GrantVaultCli::try_parse_from(["grantvault-node", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.rpc_port, 8645);
                assert_eq!(args.metrics_port, 8646);
                assert_eq!(args.vault_address, DEFAULT_VAULT_ADDRESS);
                assert_eq!(args.log_format, LogFormatArg::Pretty);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn run_accepts_json_logs() {
        let cli = GrantVaultCli::try_parse_from([
            "grantvault-node",
            "run",
            "--log-format",
            "json",
            "--vault-address",
            "escrow",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.log_format, LogFormatArg::Json);
                assert_eq!(args.vault_address, "escrow");
            }
            other => panic!("expected run, got {:?}", other),
        }
    }
}
