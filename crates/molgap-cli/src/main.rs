//! molgap CLI
//!
//! # Commands
//!
//! - `run`: train on an auxiliary table, select a regressor on a target
//!   table, predict an evaluation table
//! - `fingerprint`: print fingerprint summaries for descriptors
//! - `check-config`: validate a TOML configuration
//!
//! Exit codes: 0 success, 1 runtime failure, 2 configuration error.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod error;

pub use error::{exit_code_for_error, CliExitCode};

/// Transfer-learned HOMO-LUMO gap prediction
#[derive(Parser)]
#[command(name = "molgap")]
#[command(version)]
#[command(about = "Transfer-learned molecular property prediction from SMILES")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pretraining, regressor selection and inference
    ///
    /// Writes best.safetensors, training_history.json,
    /// selection_report.json, predictions.csv and run_summary.json into
    /// the output directory and prints the run summary as JSON.
    Run(commands::run::RunArgs),
    /// Encode SMILES descriptors and print one JSON line per molecule
    Fingerprint(commands::fingerprint::FingerprintArgs),
    /// Validate a configuration file
    CheckConfig(commands::check_config::CheckConfigArgs),
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Run(args) => commands::run::handle_run(args),
        Commands::Fingerprint(args) => commands::fingerprint::handle_fingerprint(args),
        Commands::CheckConfig(args) => commands::check_config::handle_check_config(args),
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_verbosity() {
        let cli = Cli::try_parse_from([
            "molgap",
            "-vv",
            "run",
            "--auxiliary",
            "aux.csv",
            "--target",
            "target.csv",
            "--evaluation",
            "eval.csv",
            "--resume",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run(args) => assert!(args.resume),
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_parse_fingerprint_requires_smiles() {
        assert!(Cli::try_parse_from(["molgap", "fingerprint"]).is_err());
        let cli = Cli::try_parse_from(["molgap", "fingerprint", "--width", "128", "CCO"]).unwrap();
        match cli.command {
            Commands::Fingerprint(args) => {
                assert_eq!(args.width, 128);
                assert_eq!(args.smiles, vec!["CCO".to_string()]);
            }
            _ => panic!("expected fingerprint command"),
        }
    }
}
