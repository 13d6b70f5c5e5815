//! Read-only views over a tokenizer's vocabulary.
//!
//! The transplant never looks inside a tokenizer. It only needs to turn an id
//! back into surface text, turn text into ids, and know which ids play the
//! begin/end/pad roles. [`Vocabulary`] is that contract.
//!
//! # Implementations
//!
//! | Type | Backing |
//! |------|---------|
//! | [`HfVocabulary`] | HuggingFace `tokenizer.json` + `tokenizer_config.json` |
//! | [`TableVocabulary`] | In-memory token table (fixtures, tests) |
//!
//! # Thread Safety
//!
//! `Vocabulary: Sync` so the remapping engine can re-encode target tokens from
//! rayon worker threads.

mod hf;
mod table;

pub use hf::HfVocabulary;
pub use table::TableVocabulary;

use crate::error::TransplantResult;

/// Special-token roles that are aligned automatically between vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialRole {
    /// Begin-of-sequence.
    Bos,
    /// End-of-sequence.
    Eos,
    /// Padding.
    Pad,
}

impl SpecialRole {
    /// All roles in alignment order.
    pub fn all() -> &'static [SpecialRole] {
        &[SpecialRole::Bos, SpecialRole::Eos, SpecialRole::Pad]
    }

    /// Model config key holding the raw id (`bos_token_id`, ...).
    pub fn config_key(&self) -> &'static str {
        match self {
            SpecialRole::Bos => "bos_token_id",
            SpecialRole::Eos => "eos_token_id",
            SpecialRole::Pad => "pad_token_id",
        }
    }

    /// Tokenizer config key holding the token string (`bos_token`, ...).
    pub fn tokenizer_key(&self) -> &'static str {
        match self {
            SpecialRole::Bos => "bos_token",
            SpecialRole::Eos => "eos_token",
            SpecialRole::Pad => "pad_token",
        }
    }
}

impl std::fmt::Display for SpecialRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Encode/decode capability of one tokenizer.
pub trait Vocabulary: Sync {
    /// Short name used in errors and logs ("donor", "target").
    fn label(&self) -> &str;

    /// Encode text to ids without injecting any special tokens.
    fn encode(&self, text: &str) -> TransplantResult<Vec<u32>>;

    /// Decode a single id to its surface text, special tokens included.
    fn decode(&self, id: u32) -> TransplantResult<String>;

    /// Raw token string for an id, for diagnostics only.
    fn token_text(&self, id: u32) -> Option<String>;

    /// Id currently assigned to a special role, if the tokenizer defines one.
    fn special_token_id(&self, role: SpecialRole) -> Option<u32>;

    /// Highest id the tokenizer can emit, plus one.
    fn used_size(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_in_alignment_order() {
        assert_eq!(
            SpecialRole::all(),
            &[SpecialRole::Bos, SpecialRole::Eos, SpecialRole::Pad]
        );
    }

    #[test]
    fn test_role_keys() {
        assert_eq!(SpecialRole::Pad.config_key(), "pad_token_id");
        assert_eq!(SpecialRole::Eos.tokenizer_key(), "eos_token");
        assert_eq!(SpecialRole::Bos.to_string(), "bos_token_id");
    }
}
