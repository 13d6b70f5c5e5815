//! CLI command handlers
//!
//! # Modules
//!
//! - `transplant`: Build a transplanted model directory
//! - `plan`: Print the token mappings without touching weights

pub mod plan;
pub mod transplant;

use std::path::PathBuf;

use clap::Args;
use vocab_transplant::{TokenOverride, TransplantConfig};

use crate::error::CliError;

/// Options shared by every command that computes mappings.
#[derive(Args, Debug)]
pub struct MappingArgs {
    /// TOML configuration file
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Map a target token to the encoding of donor text (repeatable).
    /// `\n` in DONOR is read as a newline.
    #[arg(
        long = "override",
        num_args = 2,
        value_names = ["TARGET", "DONOR"],
        action = clap::ArgAction::Append
    )]
    pub overrides: Vec<String>,
}

impl MappingArgs {
    /// Config file (or defaults), then environment, then `--override` pairs.
    pub fn load_config(&self) -> Result<TransplantConfig, CliError> {
        let config = match &self.config {
            Some(path) => TransplantConfig::from_file(path).map_err(CliError::Config)?,
            None => TransplantConfig::default(),
        };
        let mut config = config.with_env_overrides();
        config.overrides.extend(
            self.overrides
                .chunks_exact(2)
                .map(|pair| TokenOverride::new(pair[0].as_str(), pair[1].as_str())),
        );
        Ok(config)
    }
}
