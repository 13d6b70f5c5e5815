//! The transplant pass.
//!
//! 1. Fill the override registry (special-token alignment, then manual
//!    overrides).
//! 2. Resolve a mapping for every used target id (parallel, order preserved).
//! 3. Walk the mappings in ascending id order, writing one embedding row and
//!    one head row per id and recording statistics.
//!
//! Step 3 is sequential because `FirstClaim` head synthesis depends on which
//! id reaches a donor prefix first. Rows for declared-but-unused ids stay zero.

use crate::config::TokenOverride;
use crate::error::{TransplantError, TransplantResult};
use crate::matrix::EmbeddingMatrix;
use crate::model_config::ModelConfig;
use crate::overrides::{AlignmentOutcome, OverrideRegistry, SpecialTokenIds};
use crate::remap::{MappedToken, TokenRemapper};
use crate::stats::TransplantStats;
use crate::synth::{synthesize_embedding_row, HeadPolicy, HeadSynthesizer};
use crate::vocab::Vocabulary;

/// New matrices plus the statistics of the pass that built them.
#[derive(Debug, Clone)]
pub struct TransplantOutput {
    /// `[declared_size, hidden]` input embedding.
    pub embed: EmbeddingMatrix,
    /// `[declared_size, hidden]` output head.
    pub head: EmbeddingMatrix,
    pub stats: TransplantStats,
}

/// One transplant between a donor and a target vocabulary.
pub struct Transplant<'a> {
    donor: &'a dyn Vocabulary,
    target: &'a dyn Vocabulary,
    registry: OverrideRegistry,
    policy: HeadPolicy,
}

impl<'a> Transplant<'a> {
    pub fn new(donor: &'a dyn Vocabulary, target: &'a dyn Vocabulary, policy: HeadPolicy) -> Self {
        Self {
            donor,
            target,
            registry: OverrideRegistry::new(),
            policy,
        }
    }

    pub fn registry(&self) -> &OverrideRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut OverrideRegistry {
        &mut self.registry
    }

    pub fn policy(&self) -> HeadPolicy {
        self.policy
    }

    /// Run automatic special-token alignment, then apply manual overrides.
    ///
    /// The model configs supply raw special ids where a tokenizer defines
    /// none.
    pub fn prepare_overrides(
        &mut self,
        target_config: Option<&ModelConfig>,
        donor_config: Option<&ModelConfig>,
        manual: &[TokenOverride],
    ) -> TransplantResult<Vec<AlignmentOutcome>> {
        let target_ids = SpecialTokenIds::resolve(self.target, target_config);
        let donor_ids = SpecialTokenIds::resolve(self.donor, donor_config);
        let outcomes =
            self.registry
                .align_special_tokens(&target_ids, &donor_ids, self.target, self.donor);
        self.registry
            .apply_manual_overrides(manual, self.target, self.donor)?;
        Ok(outcomes)
    }

    /// Mappings for every used target id, in id order.
    pub fn plan(&self) -> TransplantResult<Vec<MappedToken>> {
        TokenRemapper::new(self.donor, self.target, &self.registry).map_all()
    }

    /// Build the target embedding and head matrices.
    ///
    /// # Errors
    /// - `TransplantError::VocabSizeMismatch` if the target tokenizer emits ids
    ///   at or beyond `declared_size`
    /// - `TransplantError::ShapeMismatch` if donor embedding and head widths differ
    /// - `TransplantError::DonorIdOutOfRange` if a mapping names a missing donor row
    /// - any remapping error
    pub fn run(
        &self,
        donor_embed: &EmbeddingMatrix,
        donor_head: &EmbeddingMatrix,
        declared_size: usize,
    ) -> TransplantResult<TransplantOutput> {
        let used_size = self.target.used_size();
        if used_size > declared_size {
            return Err(TransplantError::VocabSizeMismatch {
                used: used_size,
                declared: declared_size,
            });
        }
        if donor_embed.cols() != donor_head.cols() {
            return Err(TransplantError::ShapeMismatch {
                name: "donor head".to_string(),
                expected: vec![donor_head.rows(), donor_embed.cols()],
                actual: vec![donor_head.rows(), donor_head.cols()],
            });
        }

        let hidden = donor_embed.cols();
        let donor_rows = donor_embed.rows().min(donor_head.rows());

        tracing::info!(
            used = used_size,
            unused = declared_size - used_size,
            hidden,
            policy = %self.policy,
            "Transplanting tokens"
        );

        let mappings = self.plan()?;

        let mut embed = EmbeddingMatrix::zeros(declared_size, hidden);
        let mut head = EmbeddingMatrix::zeros(declared_size, hidden);
        let mut synth = HeadSynthesizer::new(self.policy);
        let mut stats = TransplantStats::new(used_size, declared_size);

        for mapped in &mappings {
            let target_id = mapped.target_id;
            if let Some(&donor_id) = mapped
                .mapping
                .ids()
                .iter()
                .find(|&&id| id as usize >= donor_rows)
            {
                return Err(TransplantError::DonorIdOutOfRange {
                    target_id,
                    donor_id,
                    donor_rows,
                });
            }

            tracing::debug!(
                "- {:6} : {:?} -> {:?}",
                target_id,
                mapped.text,
                mapped.mapping.ids()
            );

            let row = target_id as usize;
            stats.record_mapping(&mapped.mapping);
            synthesize_embedding_row(&mapped.mapping, donor_embed, embed.row_mut(row));
            let init = synth.synthesize(&mapped.mapping, donor_head, head.row_mut(row));
            stats.record_head(init);
        }
        stats.record_unused_slots();
        stats.log_summary();

        Ok(TransplantOutput { embed, head, stats })
    }
}

/// Histogram-only statistics for a list of mappings.
pub fn mapping_stats(mappings: &[MappedToken], declared_size: usize) -> TransplantStats {
    let mut stats = TransplantStats::new(mappings.len(), declared_size);
    for mapped in mappings {
        stats.record_mapping(&mapped.mapping);
    }
    stats
}
