//! CLI command handlers
//!
//! # Modules
//!
//! - `run`: full transfer run over three CSV tables
//! - `fingerprint`: encode descriptors and print bit summaries
//! - `check_config`: load and validate a configuration file

pub mod check_config;
pub mod fingerprint;
pub mod run;

use std::path::Path;

use molgap_learn::{LearnResult, MolgapConfig};

/// Load `path` (or defaults), then apply `MOLGAP_*` overrides.
pub(crate) fn load_config(path: Option<&Path>) -> LearnResult<MolgapConfig> {
    let config = match path {
        Some(path) => MolgapConfig::from_file(path)?,
        None => MolgapConfig::default(),
    };
    Ok(config.with_env_overrides())
}
