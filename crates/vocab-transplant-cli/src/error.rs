//! CLI error type and exit codes.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | General or IO failure |
//! | 2 | Invalid configuration or arguments |
//! | 3 | Model, tokenizer or weight load failure |

use thiserror::Error;
use vocab_transplant::TransplantError;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CliExitCode {
    Success = 0,
    General = 1,
    InvalidConfig = 2,
    LoadFailure = 3,
}

impl From<CliExitCode> for i32 {
    fn from(code: CliExitCode) -> Self {
        code as i32
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    /// `--config` file could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(TransplantError),

    #[error(transparent)]
    Transplant(#[from] TransplantError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> CliExitCode {
        match self {
            Self::Config(_) => CliExitCode::InvalidConfig,
            Self::Transplant(e) if e.is_configuration_error() => CliExitCode::InvalidConfig,
            Self::Transplant(e) if e.is_load_error() => CliExitCode::LoadFailure,
            Self::Transplant(_) | Self::Io(_) => CliExitCode::General,
        }
    }
}

/// Log `err` and return its exit code.
pub fn report_error(err: &CliError) -> i32 {
    tracing::error!("{}", err);
    err.exit_code().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let load = CliError::from(TransplantError::WeightsNotFound {
            path: "/m".to_string(),
        });
        assert_eq!(load.exit_code(), CliExitCode::LoadFailure);

        let config = CliError::from(TransplantError::OverrideTargetNotSingle {
            token: "<|im_start|>".to_string(),
            count: 2,
        });
        assert_eq!(config.exit_code(), CliExitCode::InvalidConfig);

        let general = CliError::from(TransplantError::VocabSizeMismatch {
            used: 10,
            declared: 8,
        });
        assert_eq!(general.exit_code(), CliExitCode::General);

        let bad_file = CliError::Config(TransplantError::ConfigParseError {
            path: "x.toml".to_string(),
            message: "bad".to_string(),
        });
        assert_eq!(i32::from(bad_file.exit_code()), 2);
    }
}
