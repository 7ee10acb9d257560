//! `molgap check-config`: validate a configuration file.

use std::path::PathBuf;

use clap::Args;
use tracing::{error, info};

use crate::error::{exit_code_for_error, CliExitCode};

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// TOML configuration file
    pub config: PathBuf,

    /// Print the effective configuration (after env overrides) as TOML
    #[arg(long)]
    pub print: bool,
}

pub fn handle_check_config(args: CheckConfigArgs) -> i32 {
    let result = super::load_config(Some(&args.config)).and_then(|config| {
        config.validate()?;
        Ok(config)
    });
    let config = match result {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), error = %e, "Invalid configuration");
            return exit_code_for_error(&e).into();
        }
    };

    info!(path = %args.config.display(), "Configuration is valid");
    if args.print {
        match config.to_toml_string() {
            Ok(toml) => print!("{toml}"),
            Err(e) => {
                error!(error = %e, "Failed to render configuration");
                return exit_code_for_error(&e).into();
            }
        }
    }
    CliExitCode::Success.into()
}
