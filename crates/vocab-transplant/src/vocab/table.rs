//! In-memory vocabulary backed by a token table.

use std::collections::HashMap;

use super::{SpecialRole, Vocabulary};
use crate::error::{TransplantError, TransplantResult};

/// Vocabulary defined by an explicit token list (`id == index`).
///
/// Encoding tries, in order: an explicitly registered encoding for the whole
/// text, an exact token match, then greedy longest-prefix matching over the
/// token table. Text that cannot be covered is a tokenization error.
#[derive(Debug, Clone, Default)]
pub struct TableVocabulary {
    label: String,
    tokens: Vec<String>,
    index: HashMap<String, u32>,
    scripted: HashMap<String, Vec<u32>>,
    specials: HashMap<SpecialRole, u32>,
}

impl TableVocabulary {
    /// Build from tokens in id order.
    pub fn new<I, S>(label: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        Self {
            label: label.into(),
            tokens,
            index,
            scripted: HashMap::new(),
            specials: HashMap::new(),
        }
    }

    /// Assign a special role to an id.
    pub fn with_special(mut self, role: SpecialRole, id: u32) -> Self {
        self.specials.insert(role, id);
        self
    }

    /// Force `text` to encode to `ids`, bypassing table lookup.
    pub fn with_encoding(mut self, text: impl Into<String>, ids: Vec<u32>) -> Self {
        self.scripted.insert(text.into(), ids);
        self
    }

    fn greedy_encode(&self, text: &str) -> Option<Vec<u32>> {
        let mut ids = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            let boundaries: Vec<usize> = rest
                .char_indices()
                .map(|(i, c)| i + c.len_utf8())
                .collect();
            let id = boundaries
                .iter()
                .rev()
                .find_map(|&end| self.index.get(&rest[..end]).map(|id| (*id, end)));
            let (id, end) = id?;
            ids.push(id);
            rest = &rest[end..];
        }
        Some(ids)
    }
}

impl Vocabulary for TableVocabulary {
    fn label(&self) -> &str {
        &self.label
    }

    fn encode(&self, text: &str) -> TransplantResult<Vec<u32>> {
        if let Some(ids) = self.scripted.get(text) {
            return Ok(ids.clone());
        }
        if let Some(id) = self.index.get(text) {
            return Ok(vec![*id]);
        }
        self.greedy_encode(text)
            .ok_or_else(|| TransplantError::TokenizationError {
                vocab: self.label.clone(),
                input: text.to_string(),
                message: "text not covered by token table".to_string(),
            })
    }

    fn decode(&self, id: u32) -> TransplantResult<String> {
        self.tokens
            .get(id as usize)
            .cloned()
            .ok_or_else(|| TransplantError::DecodingError {
                vocab: self.label.clone(),
                id,
                message: format!("id outside table of {} tokens", self.tokens.len()),
            })
    }

    fn token_text(&self, id: u32) -> Option<String> {
        self.tokens.get(id as usize).cloned()
    }

    fn special_token_id(&self, role: SpecialRole) -> Option<u32> {
        self.specials.get(&role).copied()
    }

    fn used_size(&self) -> usize {
        self.tokens.len()
    }
}
