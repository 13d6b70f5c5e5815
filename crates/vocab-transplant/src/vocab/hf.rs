//! HuggingFace tokenizer-backed vocabulary.

use std::path::Path;

use serde_json::Value;
use tokenizers::Tokenizer;

use super::{SpecialRole, Vocabulary};
use crate::error::{TransplantError, TransplantResult};

/// Vocabulary view over a HuggingFace `tokenizer.json`.
///
/// Special tokens live outside `tokenizer.json`: their strings are read from
/// `tokenizer_config.json` (falling back to `special_tokens_map.json`) and
/// resolved to ids through the tokenizer itself. A role whose token string is
/// absent, null, or unknown to the tokenizer has no id.
pub struct HfVocabulary {
    label: String,
    tokenizer: Tokenizer,
    bos_id: Option<u32>,
    eos_id: Option<u32>,
    pad_id: Option<u32>,
    add_bos_token: Option<bool>,
    used_size: usize,
}

impl HfVocabulary {
    /// Load `tokenizer.json` and the optional special-token configs from a
    /// model directory.
    ///
    /// # Errors
    ///
    /// - `TransplantError::TokenizerLoadError` if `tokenizer.json` is missing
    ///   or malformed, or if a present config file is not valid JSON.
    pub fn from_dir(dir: &Path, label: impl Into<String>) -> TransplantResult<Self> {
        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            TransplantError::TokenizerLoadError {
                path: tokenizer_path.display().to_string(),
                message: e.to_string(),
            }
        })?;

        let mut special = read_optional_json(&dir.join("tokenizer_config.json"))?;
        if let Some(map) = read_optional_json(&dir.join("special_tokens_map.json"))? {
            special = Some(merge_special_maps(special, map));
        }

        let vocab = Self::from_tokenizer(tokenizer, special.as_ref(), label);

        tracing::info!(
            vocab = %vocab.label,
            used_size = vocab.used_size,
            bos_id = ?vocab.bos_id,
            eos_id = ?vocab.eos_id,
            pad_id = ?vocab.pad_id,
            "Loaded tokenizer from {}",
            dir.display()
        );

        Ok(vocab)
    }

    /// Wrap an already constructed tokenizer.
    ///
    /// `tokenizer_config` is the parsed `tokenizer_config.json`, if any.
    pub fn from_tokenizer(
        tokenizer: Tokenizer,
        tokenizer_config: Option<&Value>,
        label: impl Into<String>,
    ) -> Self {
        let resolve = |role: SpecialRole| {
            tokenizer_config
                .and_then(|cfg| cfg.get(role.tokenizer_key()))
                .and_then(special_token_content)
                .and_then(|content| tokenizer.token_to_id(content))
        };
        let bos_id = resolve(SpecialRole::Bos);
        let eos_id = resolve(SpecialRole::Eos);
        let pad_id = resolve(SpecialRole::Pad);
        let add_bos_token = tokenizer_config
            .and_then(|cfg| cfg.get("add_bos_token"))
            .and_then(Value::as_bool);

        let used_size = tokenizer
            .get_vocab(true)
            .values()
            .max()
            .map_or(0, |max| *max as usize + 1);

        Self {
            label: label.into(),
            tokenizer,
            bos_id,
            eos_id,
            pad_id,
            add_bos_token,
            used_size,
        }
    }

    /// `add_bos_token` from `tokenizer_config.json`, if set.
    pub fn add_bos_token(&self) -> Option<bool> {
        self.add_bos_token
    }

    /// Whether this tokenizer prepends or defines a BOS token at all.
    pub fn uses_bos(&self) -> bool {
        self.add_bos_token != Some(false) && self.bos_id.is_some()
    }

    /// The wrapped tokenizer.
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }
}

impl Vocabulary for HfVocabulary {
    fn label(&self) -> &str {
        &self.label
    }

    fn encode(&self, text: &str) -> TransplantResult<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, false).map_err(|e| {
            TransplantError::TokenizationError {
                vocab: self.label.clone(),
                input: text.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, id: u32) -> TransplantResult<String> {
        self.tokenizer
            .decode(&[id], false)
            .map_err(|e| TransplantError::DecodingError {
                vocab: self.label.clone(),
                id,
                message: e.to_string(),
            })
    }

    fn token_text(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    fn special_token_id(&self, role: SpecialRole) -> Option<u32> {
        match role {
            SpecialRole::Bos => self.bos_id,
            SpecialRole::Eos => self.eos_id,
            SpecialRole::Pad => self.pad_id,
        }
    }

    fn used_size(&self) -> usize {
        self.used_size
    }
}

/// Token string of a special-token entry: either a bare string or an
/// added-token object with a `content` field.
fn special_token_content(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("content").and_then(Value::as_str),
        _ => None,
    }
}

/// Fill special-token keys missing from `tokenizer_config.json` with the ones
/// in `special_tokens_map.json`.
fn merge_special_maps(primary: Option<Value>, fallback: Value) -> Value {
    let mut merged = primary.unwrap_or_else(|| Value::Object(Default::default()));
    if let (Value::Object(target), Value::Object(source)) = (&mut merged, fallback) {
        for role in SpecialRole::all() {
            let key = role.tokenizer_key();
            let missing = target.get(key).map_or(true, Value::is_null);
            if missing {
                if let Some(value) = source.get(key) {
                    target.insert(key.to_string(), value.clone());
                }
            }
        }
    }
    merged
}

fn read_optional_json(path: &Path) -> TransplantResult<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| TransplantError::TokenizerLoadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}
