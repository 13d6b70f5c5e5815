//! Explicit target-id to donor-id mappings that bypass re-encoding.
//!
//! Two passes fill the registry, in this order:
//!
//! 1. **Automatic**: begin/end/pad ids are paired between the vocabularies.
//!    A role missing on either side, or a target id that is already mapped,
//!    is reported as a skip and never fails the run.
//! 2. **Manual**: user `(target token, donor text)` pairs. These overwrite
//!    anything already registered for the same target id. A target token that
//!    is not exactly one id, or donor text that encodes to nothing, is fatal.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::TokenOverride;
use crate::error::{TransplantError, TransplantResult};
use crate::model_config::ModelConfig;
use crate::remap::Mapping;
use crate::vocab::{SpecialRole, Vocabulary};

/// Special-token ids of one side, after tokenizer/config fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpecialTokenIds {
    pub bos: Option<u32>,
    pub eos: Option<u32>,
    pub pad: Option<u32>,
}

impl SpecialTokenIds {
    /// Tokenizer ids first, raw config ids where the tokenizer has none.
    pub fn resolve(vocab: &dyn Vocabulary, config: Option<&ModelConfig>) -> Self {
        let pick = |role: SpecialRole| {
            vocab
                .special_token_id(role)
                .or_else(|| config.and_then(|c| c.special_token_id(role)))
        };
        Self {
            bos: pick(SpecialRole::Bos),
            eos: pick(SpecialRole::Eos),
            pad: pick(SpecialRole::Pad),
        }
    }

    /// Id for a role.
    pub fn get(&self, role: SpecialRole) -> Option<u32> {
        match role {
            SpecialRole::Bos => self.bos,
            SpecialRole::Eos => self.eos,
            SpecialRole::Pad => self.pad,
        }
    }
}

/// Result of aligning one special-token role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentOutcome {
    /// `target_id -> [donor_id]` registered.
    Aligned {
        role: SpecialRole,
        target_id: u32,
        donor_id: u32,
    },
    /// Another role already claimed this target id.
    AlreadyMapped {
        role: SpecialRole,
        target_id: u32,
        existing: Mapping,
    },
    /// Donor has no id for the role.
    MissingDonor { role: SpecialRole },
    /// Target has no id for the role.
    MissingTarget { role: SpecialRole },
}

impl AlignmentOutcome {
    pub fn role(&self) -> SpecialRole {
        match self {
            Self::Aligned { role, .. }
            | Self::AlreadyMapped { role, .. }
            | Self::MissingDonor { role }
            | Self::MissingTarget { role } => *role,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self, Self::Aligned { .. })
    }
}

impl fmt::Display for AlignmentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aligned {
                role,
                target_id,
                donor_id,
            } => write!(f, "{role}: {target_id} -> [{donor_id}]"),
            Self::AlreadyMapped {
                role,
                target_id,
                existing,
            } => write!(
                f,
                "{role}: skipped, {target_id} is already mapped to {:?}",
                existing.ids()
            ),
            Self::MissingDonor { role } => write!(f, "{role}: skipped, not found for donor model"),
            Self::MissingTarget { role } => {
                write!(f, "{role}: skipped, not found for target model")
            }
        }
    }
}

/// Target id -> pre-resolved donor ids.
#[derive(Debug, Clone, Default)]
pub struct OverrideRegistry {
    entries: BTreeMap<u32, Mapping>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register without replacing.
    ///
    /// # Errors
    /// - `TransplantError::AlreadyRegistered` if `target_id` is mapped
    pub fn register_automatic(&mut self, target_id: u32, mapping: Mapping) -> TransplantResult<()> {
        if let Some(existing) = self.entries.get(&target_id) {
            return Err(TransplantError::AlreadyRegistered {
                target_id,
                existing: existing.ids().to_vec(),
            });
        }
        self.entries.insert(target_id, mapping);
        Ok(())
    }

    /// Register, replacing any earlier entry. Returns the replaced mapping.
    pub fn register_manual(&mut self, target_id: u32, mapping: Mapping) -> Option<Mapping> {
        self.entries.insert(target_id, mapping)
    }

    pub fn resolve(&self, target_id: u32) -> Option<&Mapping> {
        self.entries.get(&target_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in target-id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Mapping)> {
        self.entries.iter().map(|(id, m)| (*id, m))
    }

    /// Pair bos/eos/pad between the two vocabularies.
    ///
    /// Vocabularies are only used to render token strings in the log.
    pub fn align_special_tokens(
        &mut self,
        target_ids: &SpecialTokenIds,
        donor_ids: &SpecialTokenIds,
        target: &dyn Vocabulary,
        donor: &dyn Vocabulary,
    ) -> Vec<AlignmentOutcome> {
        tracing::info!(
            "Processing {} automatic token overrides",
            SpecialRole::all().len()
        );

        SpecialRole::all()
            .iter()
            .map(|&role| {
                let outcome = match (target_ids.get(role), donor_ids.get(role)) {
                    (None, _) => AlignmentOutcome::MissingTarget { role },
                    (Some(_), None) => AlignmentOutcome::MissingDonor { role },
                    (Some(target_id), Some(donor_id)) => {
                        match self.register_automatic(target_id, Mapping::single(donor_id)) {
                            Ok(()) => AlignmentOutcome::Aligned {
                                role,
                                target_id,
                                donor_id,
                            },
                            Err(_) => AlignmentOutcome::AlreadyMapped {
                                role,
                                target_id,
                                existing: self.entries[&target_id].clone(),
                            },
                        }
                    }
                };

                if let AlignmentOutcome::Aligned {
                    target_id,
                    donor_id,
                    ..
                } = outcome
                {
                    tracing::info!(
                        "{} ({:?} -> {:?})",
                        outcome,
                        target.token_text(target_id).unwrap_or_default(),
                        donor.token_text(donor_id).unwrap_or_default()
                    );
                } else {
                    tracing::info!("{}", outcome);
                }
                outcome
            })
            .collect()
    }

    /// Resolve and register user overrides, last one wins.
    ///
    /// # Errors
    /// - `TransplantError::OverrideTargetNotSingle`
    /// - `TransplantError::OverrideDonorEmpty`
    /// - Tokenizer errors from either side
    pub fn apply_manual_overrides(
        &mut self,
        overrides: &[TokenOverride],
        target: &dyn Vocabulary,
        donor: &dyn Vocabulary,
    ) -> TransplantResult<()> {
        if overrides.is_empty() {
            return Ok(());
        }
        tracing::info!("Processing {} manual token overrides", overrides.len());

        for entry in overrides {
            let (target_id, mapping) = resolve_override(entry, target, donor)?;
            tracing::info!(
                "{:6} : {:?} -> {:?} {:?}",
                target_id,
                entry.target,
                mapping.ids(),
                entry.donor
            );
            if let Some(previous) = self.register_manual(target_id, mapping) {
                tracing::debug!(
                    target_id,
                    previous = ?previous.ids(),
                    "Manual override replaced earlier mapping"
                );
            }
        }
        Ok(())
    }
}

/// Literal `\n` escapes in override text become real line feeds.
pub fn unescape_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Resolve one `(target token, donor text)` pair to ids.
pub fn resolve_override(
    entry: &TokenOverride,
    target: &dyn Vocabulary,
    donor: &dyn Vocabulary,
) -> TransplantResult<(u32, Mapping)> {
    let target_ids = target.encode(&entry.target)?;
    let [target_id] = target_ids.as_slice() else {
        return Err(TransplantError::OverrideTargetNotSingle {
            token: entry.target.clone(),
            count: target_ids.len(),
        });
    };

    let donor_text = unescape_newlines(&entry.donor);
    let mapping = Mapping::new(donor.encode(&donor_text)?).ok_or_else(|| {
        TransplantError::OverrideDonorEmpty {
            text: donor_text.clone(),
            target_id: *target_id,
        }
    })?;

    Ok((*target_id, mapping))
}
