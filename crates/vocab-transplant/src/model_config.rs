//! Typed access to a model's `config.json`.
//!
//! Multimodal checkpoints nest the language model's fields under
//! `text_config`; flat checkpoints keep them at the top level. Every accessor
//! looks in `text_config` first, then at the top level, and always under the
//! field's own name.
//!
//! The raw JSON is kept (key order preserved) so the donor config can be
//! rewritten for the output model with [`ModelConfig::retarget`] without
//! losing fields this crate does not know about.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{TransplantError, TransplantResult};
use crate::vocab::SpecialRole;

const TEXT_CONFIG: &str = "text_config";

/// A parsed `config.json`.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    path: PathBuf,
    raw: Value,
}

/// Values written into the donor config for the transplanted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRetarget {
    /// Target declared vocabulary size.
    pub vocab_size: usize,
    /// Target BOS id.
    pub bos_token_id: Option<u32>,
    /// Target EOS id.
    pub eos_token_id: Option<u32>,
    /// Target PAD id; EOS is used when absent.
    pub pad_token_id: Option<u32>,
}

impl ModelConfig {
    /// Load `config.json` from a model directory.
    pub fn from_dir(dir: &Path) -> TransplantResult<Self> {
        Self::from_file(&dir.join("config.json"))
    }

    /// Load a config file.
    ///
    /// # Errors
    /// - `TransplantError::ConfigNotFound` if the file cannot be read
    /// - `TransplantError::ConfigParseError` if it is not JSON
    pub fn from_file(path: &Path) -> TransplantResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| TransplantError::ConfigNotFound {
                path: path.display().to_string(),
                source: e,
            })?;
        let raw: Value =
            serde_json::from_str(&content).map_err(|e| TransplantError::ConfigParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        tracing::info!("Loaded config from {}", path.display());
        Ok(Self::from_value(raw, path))
    }

    /// Wrap an already parsed config.
    pub fn from_value(raw: Value, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            raw,
        }
    }

    /// Path the config was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw JSON.
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    fn lookup(&self, field: &str) -> Option<&Value> {
        self.raw
            .get(TEXT_CONFIG)
            .and_then(|text| text.get(field))
            .filter(|v| !v.is_null())
            .or_else(|| self.raw.get(field).filter(|v| !v.is_null()))
    }

    fn required_usize(&self, field: &'static str) -> TransplantResult<usize> {
        let value = self
            .lookup(field)
            .ok_or_else(|| TransplantError::MissingConfigField {
                path: self.path.display().to_string(),
                field,
            })?;
        value
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| TransplantError::InvalidConfigField {
                path: self.path.display().to_string(),
                field,
                message: format!("expected a non-negative integer, got {}", value),
            })
    }

    /// Declared vocabulary size.
    pub fn vocab_size(&self) -> TransplantResult<usize> {
        self.required_usize("vocab_size")
    }

    /// Hidden (embedding) dimension.
    pub fn hidden_size(&self) -> TransplantResult<usize> {
        self.required_usize("hidden_size")
    }

    /// Raw special-token id for a role.
    ///
    /// Some configs list several EOS ids; the first one is used.
    pub fn special_token_id(&self, role: SpecialRole) -> Option<u32> {
        match self.lookup(role.config_key())? {
            Value::Array(ids) => ids.first().and_then(Value::as_u64),
            value => value.as_u64(),
        }
        .and_then(|id| u32::try_from(id).ok())
    }

    /// `tie_word_embeddings`, if the config sets it.
    pub fn tie_word_embeddings(&self) -> Option<bool> {
        self.lookup("tie_word_embeddings").and_then(Value::as_bool)
    }

    /// Stored weight dtype name (`torch_dtype`, or `dtype` in newer configs).
    pub fn torch_dtype(&self) -> Option<&str> {
        self.lookup("torch_dtype")
            .or_else(|| self.lookup("dtype"))
            .and_then(Value::as_str)
    }

    /// Rewrite this (donor) config for the transplanted model.
    ///
    /// `vocab_size` is updated wherever it is defined (top level if nowhere),
    /// special ids are set at the top level, and `tie_word_embeddings` is
    /// forced off because the embedding and head are now distinct tensors.
    pub fn retarget(&mut self, update: &ConfigRetarget) {
        if !self.raw.is_object() {
            self.raw = Value::Object(Default::default());
        }
        let Some(root) = self.raw.as_object_mut() else {
            return;
        };

        let vocab = Value::from(update.vocab_size as u64);
        let mut vocab_written = false;
        if let Some(Value::Object(text)) = root.get_mut(TEXT_CONFIG) {
            if text.contains_key("vocab_size") {
                text.insert("vocab_size".to_string(), vocab.clone());
                vocab_written = true;
            }
            if text.contains_key("tie_word_embeddings") {
                text.insert("tie_word_embeddings".to_string(), Value::Bool(false));
            }
        }
        if root.contains_key("vocab_size") || !vocab_written {
            root.insert("vocab_size".to_string(), vocab);
        }

        let id = |id: Option<u32>| id.map_or(Value::Null, Value::from);
        root.insert("bos_token_id".to_string(), id(update.bos_token_id));
        root.insert("eos_token_id".to_string(), id(update.eos_token_id));
        root.insert(
            "pad_token_id".to_string(),
            id(update.pad_token_id.or(update.eos_token_id)),
        );
        root.insert("tie_word_embeddings".to_string(), Value::Bool(false));
    }

    /// Write the config as pretty JSON.
    pub fn write_to(&self, path: &Path) -> TransplantResult<()> {
        let mut text = serde_json::to_string_pretty(&self.raw)?;
        text.push('\n');
        std::fs::write(path, text)?;
        Ok(())
    }
}
