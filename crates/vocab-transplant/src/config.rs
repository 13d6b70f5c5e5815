//! Transplant configuration.
//!
//! # Loading Configuration
//!
//! ```rust,ignore
//! use vocab_transplant::TransplantConfig;
//!
//! // Load from file
//! let config = TransplantConfig::from_file("transplant.toml")?;
//!
//! // Or use defaults
//! let config = TransplantConfig::default();
//!
//! // With environment overrides
//! let config = TransplantConfig::default().with_env_overrides();
//! ```
//!
//! # TOML Structure
//!
//! ```toml
//! output_dtype = "donor"
//!
//! [head]
//! policy = "front_loaded"   # or "first_claim"
//! decay = 0.5               # front_loaded only
//! # scale = 0.0             # first_claim only
//!
//! [tensors]
//! embed = "model.embed_tokens.weight"
//! head = "lm_head.weight"
//!
//! [[overrides]]
//! target = "<|im_start|>"
//! donor = "<|im_start|>"
//!
//! [[overrides]]
//! target = "<|im_end|>"
//! donor = "<|im_end|>\n"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `VOCAB_TRANSPLANT_HEAD_POLICY` | `front_loaded` or `first_claim` |
//! | `VOCAB_TRANSPLANT_DECAY` | front-loaded decay factor |
//! | `VOCAB_TRANSPLANT_SCALE` | first-claim collision scale |
//! | `VOCAB_TRANSPLANT_OUTPUT_DTYPE` | `donor`, `f32`, `f16`, `bf16` |

use std::env;
use std::path::Path;

use candle_core::DType;
use serde::{Deserialize, Serialize};

use crate::error::{TransplantError, TransplantResult};
use crate::synth::HeadPolicy;

// ============================================================================
// TOKEN OVERRIDES
// ============================================================================

/// One manual override: a single target token and the donor text whose
/// encoding should stand in for it. `\n` escapes in `donor` become newlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenOverride {
    pub target: String,
    pub donor: String,
}

impl TokenOverride {
    pub fn new(target: impl Into<String>, donor: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            donor: donor.into(),
        }
    }
}

// ============================================================================
// TENSOR NAMES
// ============================================================================

/// Names of the two tensors being replaced in the safetensors files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorNames {
    #[serde(default = "default_embed_tensor")]
    pub embed: String,
    #[serde(default = "default_head_tensor")]
    pub head: String,
}

fn default_embed_tensor() -> String {
    "model.embed_tokens.weight".to_string()
}

fn default_head_tensor() -> String {
    "lm_head.weight".to_string()
}

impl Default for TensorNames {
    fn default() -> Self {
        Self {
            embed: default_embed_tensor(),
            head: default_head_tensor(),
        }
    }
}

// ============================================================================
// OUTPUT DTYPE
// ============================================================================

/// Storage dtype of the written embedding and head tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputDType {
    /// Same dtype as the donor's embedding tensor.
    #[default]
    Donor,
    F32,
    F16,
    Bf16,
}

impl OutputDType {
    /// Concrete dtype given the donor's.
    pub fn resolve(&self, donor: DType) -> DType {
        match self {
            OutputDType::Donor => donor,
            OutputDType::F32 => DType::F32,
            OutputDType::F16 => DType::F16,
            OutputDType::Bf16 => DType::BF16,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputDType::Donor => "donor",
            OutputDType::F32 => "f32",
            OutputDType::F16 => "f16",
            OutputDType::Bf16 => "bf16",
        }
    }
}

impl std::str::FromStr for OutputDType {
    type Err = TransplantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "donor" => Ok(OutputDType::Donor),
            "f32" | "float32" => Ok(OutputDType::F32),
            "f16" | "float16" => Ok(OutputDType::F16),
            "bf16" | "bfloat16" => Ok(OutputDType::Bf16),
            other => Err(TransplantError::ConfigError {
                message: format!(
                    "Invalid output dtype '{}'. Valid values: donor, f32, f16, bf16",
                    other
                ),
            }),
        }
    }
}

// ============================================================================
// ROOT CONFIG
// ============================================================================

/// Everything that shapes a transplant run apart from the three model
/// directories.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransplantConfig {
    #[serde(default)]
    pub output_dtype: OutputDType,

    #[serde(default)]
    pub head: HeadPolicy,

    #[serde(default)]
    pub tensors: TensorNames,

    /// Applied in order; a later entry for the same target id wins.
    #[serde(default)]
    pub overrides: Vec<TokenOverride>,
}

impl TransplantConfig {
    /// Load from a TOML file.
    ///
    /// # Errors
    /// - `TransplantError::ConfigError` if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> TransplantResult<Self> {
        let path = path.as_ref();

        let contents =
            std::fs::read_to_string(path).map_err(|e| TransplantError::ConfigError {
                message: format!("Failed to read config file '{}': {}", path.display(), e),
            })?;

        toml::from_str(&contents).map_err(|e| TransplantError::ConfigError {
            message: format!("Failed to parse TOML in '{}': {}", path.display(), e),
        })
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(toml: &str) -> TransplantResult<Self> {
        toml::from_str(toml).map_err(|e| TransplantError::ConfigError {
            message: format!("Failed to parse TOML: {}", e),
        })
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> TransplantResult<String> {
        toml::to_string_pretty(self).map_err(|e| TransplantError::ConfigError {
            message: format!("Failed to serialize to TOML: {}", e),
        })
    }

    /// Validate all values, returning the first problem found.
    pub fn validate(&self) -> TransplantResult<()> {
        self.head.validate().map_err(|e| TransplantError::ConfigError {
            message: format!("[head] {}", e),
        })?;

        if self.tensors.embed.is_empty() || self.tensors.head.is_empty() {
            return Err(TransplantError::ConfigError {
                message: "[tensors] tensor names cannot be empty".to_string(),
            });
        }
        if self.tensors.embed == self.tensors.head {
            return Err(TransplantError::ConfigError {
                message: format!(
                    "[tensors] embed and head name the same tensor '{}'",
                    self.tensors.embed
                ),
            });
        }

        if let Some(i) = self.overrides.iter().position(|o| o.target.is_empty()) {
            return Err(TransplantError::ConfigError {
                message: format!("[[overrides]] entry {} has an empty target token", i),
            });
        }

        Ok(())
    }

    /// Apply `VOCAB_TRANSPLANT_*` environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("VOCAB_TRANSPLANT_HEAD_POLICY") {
            match HeadPolicy::with_default_parameter(&val) {
                Some(policy) if policy.name() != self.head.name() => self.head = policy,
                Some(_) => {}
                None => tracing::warn!("Ignoring unknown VOCAB_TRANSPLANT_HEAD_POLICY={}", val),
            }
        }

        if let Some(val) = lookup("VOCAB_TRANSPLANT_DECAY") {
            match (&mut self.head, val.parse::<f32>()) {
                (HeadPolicy::FrontLoaded { decay }, Ok(v)) => *decay = v,
                _ => tracing::warn!("Ignoring VOCAB_TRANSPLANT_DECAY={}", val),
            }
        }

        if let Some(val) = lookup("VOCAB_TRANSPLANT_SCALE") {
            match (&mut self.head, val.parse::<f32>()) {
                (HeadPolicy::FirstClaim { scale }, Ok(v)) => *scale = v,
                _ => tracing::warn!("Ignoring VOCAB_TRANSPLANT_SCALE={}", val),
            }
        }

        if let Some(val) = lookup("VOCAB_TRANSPLANT_OUTPUT_DTYPE") {
            match val.parse::<OutputDType>() {
                Ok(dtype) => self.output_dtype = dtype,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        self
    }
}
