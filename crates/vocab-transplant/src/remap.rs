//! Target-id to donor-id remapping.
//!
//! Each target id is resolved independently: an override wins outright,
//! otherwise the target's surface text is decoded and re-encoded with the
//! donor tokenizer. Resolution has no shared state, so [`TokenRemapper::map_all`]
//! runs it as an order-preserving parallel map.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{TransplantError, TransplantResult};
use crate::overrides::OverrideRegistry;
use crate::vocab::Vocabulary;

/// Non-empty ordered donor ids standing in for one target id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Mapping(Vec<u32>);

#[allow(clippy::len_without_is_empty)]
impl Mapping {
    /// `None` if `ids` is empty.
    pub fn new(ids: Vec<u32>) -> Option<Self> {
        if ids.is_empty() {
            None
        } else {
            Some(Self(ids))
        }
    }

    /// One-to-one mapping.
    pub fn single(id: u32) -> Self {
        Self(vec![id])
    }

    /// Donor ids in order.
    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    /// First donor id.
    pub fn prefix(&self) -> u32 {
        self.0[0]
    }

    /// Last donor id.
    pub fn suffix(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// Number of donor ids (always >= 1).
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Where a mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    /// Override registry entry.
    Override,
    /// Decode with target, encode with donor.
    Reencoded,
}

/// Resolved mapping for one target id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedToken {
    pub target_id: u32,
    /// Decoded target text (raw token string for overrides).
    pub text: String,
    pub mapping: Mapping,
    pub source: MappingSource,
}

/// Resolves target ids against an override registry and the donor tokenizer.
pub struct TokenRemapper<'a> {
    donor: &'a dyn Vocabulary,
    target: &'a dyn Vocabulary,
    overrides: &'a OverrideRegistry,
}

impl<'a> TokenRemapper<'a> {
    pub fn new(
        donor: &'a dyn Vocabulary,
        target: &'a dyn Vocabulary,
        overrides: &'a OverrideRegistry,
    ) -> Self {
        Self {
            donor,
            target,
            overrides,
        }
    }

    /// Resolve a single target id.
    ///
    /// Overridden ids never go through decode/encode.
    ///
    /// # Errors
    /// - Tokenizer errors from either vocabulary
    /// - `TransplantError::EmptyMapping` if the donor encodes the text to nothing
    pub fn map_id(&self, target_id: u32) -> TransplantResult<MappedToken> {
        if let Some(mapping) = self.overrides.resolve(target_id) {
            return Ok(MappedToken {
                target_id,
                text: self.target.token_text(target_id).unwrap_or_default(),
                mapping: mapping.clone(),
                source: MappingSource::Override,
            });
        }

        let text = self.target.decode(target_id)?;
        let ids = self.donor.encode(&text)?;
        let mapping = Mapping::new(ids).ok_or_else(|| TransplantError::EmptyMapping {
            target_id,
            text: text.clone(),
        })?;

        Ok(MappedToken {
            target_id,
            text,
            mapping,
            source: MappingSource::Reencoded,
        })
    }

    /// Resolve every used target id, in id order.
    pub fn map_all(&self) -> TransplantResult<Vec<MappedToken>> {
        let used = self.target.used_size() as u32;
        (0..used)
            .into_par_iter()
            .map(|id| self.map_id(id))
            .collect()
    }
}
