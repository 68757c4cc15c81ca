//! # CLI Interface
//!
//! Command-line arguments for `conduit-node`, via `clap` derive. Four
//! subcommands: `run`, `digest`, `check-config`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use conduit_protocol::bridge::AssetType;
use conduit_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};

use crate::logging::LogFormat;

/// Conduit gateway node.
///
/// Hosts one bridge gateway: admits redemptions carrying a quorum of
/// attestor signatures, serves the HTTP API, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "conduit-node",
    about = "Conduit cross-ledger gateway node",
    version,
    propagate_version = true
)]
pub struct ConduitNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway node.
    Run(RunArgs),
    /// Compute the operation digest attestors sign for a redemption.
    Digest(DigestArgs),
    /// Load and validate a gateway config file, then exit.
    CheckConfig(CheckConfigArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the gateway configuration file (JSON).
    ///
    /// Only used to bootstrap a fresh data directory. Once state has been
    /// persisted, the stored state wins.
    #[arg(long, short = 'c', env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Directory holding the gateway database.
    #[arg(long, short = 'd', env = "CONDUIT_DATA_DIR", default_value = ".conduit")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, env = "CONDUIT_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CONDUIT_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, env = "CONDUIT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Bearer token for the `/admin` routes. Admin routes are disabled
    /// when unset.
    #[arg(long, env = "CONDUIT_ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DigestArgs {
    /// Gateway configuration naming the network and handler kinds.
    #[arg(long, short = 'c', env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Asset type the redemption is for.
    #[arg(long)]
    pub asset_type: AssetType,

    /// Hex-encoded redemption details.
    #[arg(long)]
    pub details: String,
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    #[arg(long, short = 'c', env = "CONDUIT_CONFIG")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ConduitNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = ConduitNodeCli::try_parse_from(["conduit-node", "run", "-c", "gateway.json"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("gateway.json"));
                assert_eq!(args.log_format, LogFormat::Pretty);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn digest_requires_asset_type() {
        let result = ConduitNodeCli::try_parse_from(["conduit-node", "digest", "-c", "g.json", "--details", "00"]);
        assert!(result.is_err());
    }
}
