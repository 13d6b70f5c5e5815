//! Vocabulary transplant CLI
//!
//! # Commands
//!
//! - `transplant`: Re-initialize a donor model's embedding and head for a
//!   target tokenizer and write the result
//! - `plan`: Print each target token's donor mapping (no weights touched)
//!
//! Exit codes: 0 success, 1 general failure, 2 invalid configuration,
//! 3 model/tokenizer load failure.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod error;

/// Transplant a language model onto a new tokenizer's vocabulary
#[derive(Parser)]
#[command(name = "vocab-transplant")]
#[command(version)]
#[command(about = "Re-initialize embedding and head matrices of a model for a new tokenizer")]
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
    /// Build the transplanted model
    ///
    /// Copies every donor tensor except the input embedding and output head,
    /// which are rebuilt for the target vocabulary. The target's tokenizer
    /// files and a retargeted config.json are written alongside.
    Transplant(commands::transplant::TransplantArgs),
    /// Print the donor mapping of every target token
    Plan(commands::plan::PlanArgs),
}

fn log_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,vocab_transplant=info")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

fn main() {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match cli.command {
        Commands::Transplant(args) => commands::transplant::handle_transplant(args),
        Commands::Plan(args) => commands::plan::handle_plan(args),
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocab_transplant::{HeadPolicy, OutputDType, TokenOverride};

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("vocab-transplant").chain(args.iter().copied()))
    }

    fn transplant_args(cli: Cli) -> commands::transplant::TransplantArgs {
        match cli.command {
            Commands::Transplant(args) => args,
            Commands::Plan(_) => panic!("expected transplant"),
        }
    }

    #[test]
    fn test_transplant_positional_and_defaults() {
        let args = transplant_args(parse(&["transplant", "donor", "target", "out"]).unwrap());
        assert_eq!(args.donor_dir.to_str(), Some("donor"));
        assert_eq!(args.output_dir.to_str(), Some("out"));
        assert!(!args.overwrite);

        let config = args.resolve_config().unwrap();
        assert_eq!(config.head, HeadPolicy::default());
        assert_eq!(config.output_dtype, OutputDType::Donor);
    }

    #[test]
    fn test_repeated_overrides() {
        let args = transplant_args(
            parse(&[
                "transplant",
                "d",
                "t",
                "o",
                "--override",
                "<|im_start|>",
                "<s>",
                "--override",
                "<|im_end|>",
                "</s>\\n",
            ])
            .unwrap(),
        );
        let config = args.resolve_config().unwrap();
        assert_eq!(
            config.overrides,
            vec![
                TokenOverride::new("<|im_start|>", "<s>"),
                TokenOverride::new("<|im_end|>", "</s>\\n"),
            ]
        );
    }

    #[test]
    fn test_override_needs_two_values() {
        assert!(parse(&["transplant", "d", "t", "o", "--override", "x"]).is_err());
    }

    #[test]
    fn test_policy_flags_conflict() {
        let result = parse(&[
            "transplant",
            "d",
            "t",
            "o",
            "--weighting-decay-factor",
            "0.3",
            "--first-claim-scale",
            "0.1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_first_claim_and_dtype() {
        let args = transplant_args(
            parse(&[
                "transplant",
                "d",
                "t",
                "o",
                "--first-claim-scale",
                "0.25",
                "--output-dtype",
                "bf16",
                "--overwrite",
            ])
            .unwrap(),
        );
        let config = args.resolve_config().unwrap();
        assert_eq!(config.head, HeadPolicy::FirstClaim { scale: 0.25 });
        assert_eq!(config.output_dtype, OutputDType::Bf16);
        assert!(args.overwrite);
    }

    #[test]
    fn test_out_of_range_decay_is_config_error() {
        let args = transplant_args(
            parse(&["transplant", "d", "t", "o", "--weighting-decay-factor", "1.5"]).unwrap(),
        );
        let err = args.resolve_config().unwrap_err();
        assert_eq!(err.exit_code(), error::CliExitCode::InvalidConfig);
    }

    #[test]
    fn test_plan_with_verbosity() {
        let cli = parse(&["-vv", "plan", "donor", "target"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Plan(_)));
    }

    #[test]
    fn test_missing_output_dir() {
        assert!(parse(&["transplant", "d", "t"]).is_err());
    }
}
