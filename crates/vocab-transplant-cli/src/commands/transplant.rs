//! Transplant command: write a donor model re-initialized for the target
//! tokenizer.
//!
//! # Usage
//!
//! ```bash
//! vocab-transplant transplant ./donor ./target ./output \
//!     --override "<|im_start|>" "<s>" --weighting-decay-factor 0.5
//! ```

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use vocab_transplant::{run_transplant, HeadPolicy, OutputDType, TransplantConfig, TransplantRequest};

use super::MappingArgs;
use crate::error::{report_error, CliError, CliExitCode};

/// Arguments for the transplant command.
#[derive(Args, Debug)]
pub struct TransplantArgs {
    /// Donor model directory (weights, config.json, tokenizer)
    pub donor_dir: PathBuf,

    /// Target model directory (config.json, tokenizer)
    pub target_dir: PathBuf,

    /// Output directory for the new model
    pub output_dir: PathBuf,

    #[command(flatten)]
    pub mapping: MappingArgs,

    /// Decay factor for the front-loaded head mean (0.0 first token only,
    /// 1.0 uniform mean)
    #[arg(long, value_name = "DECAY", conflicts_with = "first_claim_scale")]
    pub weighting_decay_factor: Option<f32>,

    /// Use first-claim head initialization; later collisions get the mean
    /// scaled by this factor (0.0 leaves them zero)
    #[arg(long, value_name = "SCALE")]
    pub first_claim_scale: Option<f32>,

    /// Dtype of the written embedding and head (donor, f32, f16, bf16)
    #[arg(long, value_name = "DTYPE")]
    pub output_dtype: Option<OutputDType>,

    /// Name of the input embedding tensor
    #[arg(long, value_name = "NAME")]
    pub embed_tensor: Option<String>,

    /// Name of the output head tensor
    #[arg(long, value_name = "NAME")]
    pub head_tensor: Option<String>,

    /// Replace the output directory if it exists
    #[arg(long)]
    pub overwrite: bool,

    /// Write the transplant statistics as JSON to this path
    #[arg(long, value_name = "JSON")]
    pub report: Option<PathBuf>,
}

impl TransplantArgs {
    /// Resolve the effective configuration. Command-line flags win over the
    /// environment, which wins over the config file.
    pub fn resolve_config(&self) -> Result<TransplantConfig, CliError> {
        let mut config = self.mapping.load_config()?;

        if let Some(decay) = self.weighting_decay_factor {
            config.head = HeadPolicy::FrontLoaded { decay };
        }
        if let Some(scale) = self.first_claim_scale {
            config.head = HeadPolicy::FirstClaim { scale };
        }
        if let Some(dtype) = self.output_dtype {
            config.output_dtype = dtype;
        }
        if let Some(name) = &self.embed_tensor {
            config.tensors.embed = name.clone();
        }
        if let Some(name) = &self.head_tensor {
            config.tensors.head = name.clone();
        }

        config.validate().map_err(CliError::Config)?;
        Ok(config)
    }
}

/// Execute the transplant command.
///
/// # Returns
///
/// Exit code (see [`crate::error`]).
pub fn handle_transplant(args: TransplantArgs) -> i32 {
    match run(&args) {
        Ok(()) => CliExitCode::Success.into(),
        Err(e) => report_error(&e),
    }
}

fn run(args: &TransplantArgs) -> Result<(), CliError> {
    let config = args.resolve_config()?;
    info!(
        "Head policy: {}, output dtype: {}",
        config.head,
        config.output_dtype.as_str()
    );

    let request = TransplantRequest {
        donor_dir: args.donor_dir.clone(),
        target_dir: args.target_dir.clone(),
        output_dir: args.output_dir.clone(),
        config,
        overwrite: args.overwrite,
    };
    let report = run_transplant(&request)?;

    if let Some(path) = &args.report {
        report.stats.write_json(path)?;
        info!("Wrote statistics to {}", path.display());
    }
    Ok(())
}
