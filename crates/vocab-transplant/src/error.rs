//! Error type for every vocabulary transplant failure.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Model config | ConfigNotFound, ConfigParseError, MissingConfigField, InvalidConfigField |
//! | Transplant config | ConfigError |
//! | Tokenizer | TokenizerLoadError, TokenizationError, DecodingError |
//! | Overrides | OverrideTargetNotSingle, OverrideDonorEmpty, AlreadyRegistered |
//! | Remapping | EmptyMapping, VocabSizeMismatch, DonorIdOutOfRange |
//! | Weights | WeightsNotFound, WeightNotFound, ShapeMismatch, SafetensorsError, TensorError |
//! | Output | DirectoryNotFound, OutputExists, IoError, SerializationError |
//!
//! Every failure is fatal for the run. Automatic special-token alignment is the
//! one place where a missing value is not an error; see
//! [`crate::overrides::AlignmentOutcome`].

use thiserror::Error;

/// Error type for all transplant operations.
#[derive(Debug, Error)]
pub enum TransplantError {
    // === Model Config Errors ===
    /// config.json missing or unreadable.
    #[error("Config file not found at {path}: {source}")]
    ConfigNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// config.json is not valid JSON.
    #[error("Config parse error for {path}: {message}")]
    ConfigParseError { path: String, message: String },

    /// Required field absent from both the top level and `text_config`.
    #[error("{field} not found in model config {path}")]
    MissingConfigField { path: String, field: &'static str },

    /// Field present but not of the expected type.
    #[error("Invalid value for {field} in {path}: {message}")]
    InvalidConfigField {
        path: String,
        field: &'static str,
        message: String,
    },

    // === Transplant Config Errors ===
    /// Transplant configuration invalid or unreadable.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    // === Tokenizer Errors ===
    /// tokenizer.json or tokenizer_config.json failed to load.
    #[error("Failed to load tokenizer from {path}: {message}")]
    TokenizerLoadError { path: String, message: String },

    /// Encoding text failed.
    #[error("Tokenization error in {vocab} vocabulary for {input:?}: {message}")]
    TokenizationError {
        vocab: String,
        input: String,
        message: String,
    },

    /// Decoding a single id failed.
    #[error("Decoding error in {vocab} vocabulary for id {id}: {message}")]
    DecodingError {
        vocab: String,
        id: u32,
        message: String,
    },

    // === Override Errors ===
    /// Manual override target must be exactly one target token.
    #[error("Target token {token:?} maps to {count} tokens. Must be 1 token.")]
    OverrideTargetNotSingle { token: String, count: usize },

    /// Manual override donor text produced no donor ids.
    #[error("Donor token {text:?} for target id {target_id} encodes to 0 tokens")]
    OverrideDonorEmpty { text: String, target_id: u32 },

    /// Automatic registration attempted on an id that is already mapped.
    #[error("Target id {target_id} is already mapped to {existing:?}")]
    AlreadyRegistered { target_id: u32, existing: Vec<u32> },

    // === Remapping Errors ===
    /// Donor re-encoding of a target token produced no ids.
    #[error("Target id {target_id} ({text:?}) re-encodes to 0 donor tokens")]
    EmptyMapping { target_id: u32, text: String },

    /// Tokenizer emits ids beyond the configured vocabulary size.
    #[error("Used target vocabulary size {used} exceeds declared size {declared}")]
    VocabSizeMismatch { used: usize, declared: usize },

    /// Mapping references a row the donor matrices do not have.
    #[error("Target id {target_id} maps to donor id {donor_id}, but donor matrices have {donor_rows} rows")]
    DonorIdOutOfRange {
        target_id: u32,
        donor_id: u32,
        donor_rows: usize,
    },

    // === Weight Errors ===
    /// No safetensors weights in the model directory.
    #[error("No safetensors weights found in {path}")]
    WeightsNotFound { path: String },

    /// Named tensor absent from the weight files.
    #[error("Weight not found: {weight_name} in {model_path}")]
    WeightNotFound {
        weight_name: String,
        model_path: String,
    },

    /// Tensor or matrix has an unexpected shape.
    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Reading or writing a safetensors file failed.
    #[error("Safetensors error for {path}: {message}")]
    SafetensorsError { path: String, message: String },

    /// Candle tensor operation failed.
    #[error("Tensor operation '{operation}' failed: {message}")]
    TensorError { operation: String, message: String },

    // === Output Errors ===
    /// Input model directory does not exist.
    #[error("{role} directory does not exist: {path}")]
    DirectoryNotFound { role: &'static str, path: String },

    /// Output directory exists and overwrite was not requested.
    #[error("Output directory exists (use --overwrite to replace): {path}")]
    OutputExists { path: String },

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("Serialization error: {message}")]
    SerializationError { message: String },
}

impl TransplantError {
    /// Whether the error stems from invalid user-supplied configuration
    /// rather than from unreadable model files.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError { .. }
                | Self::OverrideTargetNotSingle { .. }
                | Self::OverrideDonorEmpty { .. }
                | Self::OutputExists { .. }
                | Self::DirectoryNotFound { .. }
        )
    }

    /// Whether the error came from loading a model, tokenizer or weights.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigParseError { .. }
                | Self::MissingConfigField { .. }
                | Self::InvalidConfigField { .. }
                | Self::TokenizerLoadError { .. }
                | Self::WeightsNotFound { .. }
                | Self::WeightNotFound { .. }
                | Self::SafetensorsError { .. }
        )
    }

    pub(crate) fn tensor(operation: impl Into<String>, err: candle_core::Error) -> Self {
        Self::TensorError {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TransplantError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for transplant operations.
pub type TransplantResult<T> = Result<T, TransplantError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_override_target_not_single_message() {
        let err = TransplantError::OverrideTargetNotSingle {
            token: "<|im_start|>".to_string(),
            count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("<|im_start|>"));
        assert!(msg.contains("3 tokens"));
        assert!(err.is_configuration_error());
        assert!(!err.is_load_error());
    }

    #[test]
    fn test_override_donor_empty_names_target() {
        let err = TransplantError::OverrideDonorEmpty {
            text: String::new(),
            target_id: 42,
        };
        assert!(err.to_string().contains("target id 42"));
    }

    #[test]
    fn test_missing_field_names_field_and_path() {
        let err = TransplantError::MissingConfigField {
            path: "/models/donor/config.json".to_string(),
            field: "hidden_size",
        };
        let msg = err.to_string();
        assert!(msg.contains("hidden_size"));
        assert!(msg.contains("/models/donor/config.json"));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_config_not_found_preserves_source() {
        let err = TransplantError::ConfigNotFound {
            path: "config.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_donor_id_out_of_range_message() {
        let err = TransplantError::DonorIdOutOfRange {
            target_id: 7,
            donor_id: 900,
            donor_rows: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains("900"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TransplantError = io.into();
        assert!(matches!(err, TransplantError::IoError(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TransplantError = parse.into();
        assert!(matches!(err, TransplantError::SerializationError { .. }));
    }
}
