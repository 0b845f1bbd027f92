//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// RWO - RisingWave operator
#[derive(Parser, Debug)]
#[command(name = "rwo")]
#[command(version)]
#[command(about = "RisingWave operator built on composable reconcile workflows")]
#[command(
    long_about = "RWO reconciles RisingWave objects through a condition state machine, syncing components and writing status back until every object is running."
)]
pub struct Cli {
    /// Operator configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile objects until interrupted
    Run {
        /// RisingWave manifest files (YAML)
        #[arg(short, long, required = true)]
        manifest: Vec<PathBuf>,
    },

    /// Print the workflow an object would run, one step per line
    DryRun {
        /// RisingWave manifest file (YAML)
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Print the compact description of the workflow an object would run
    Describe {
        /// RisingWave manifest file (YAML)
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_takes_many_manifests() {
        let cli = Cli::try_parse_from([
            "rwo", "--config", "rwo.toml", "run", "-m", "a.yaml", "-m", "b.yaml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("rwo.toml")));
        match cli.command {
            Commands::Run { manifest } => assert_eq!(manifest.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_a_manifest() {
        assert!(Cli::try_parse_from(["rwo", "run"]).is_err());
    }
}
