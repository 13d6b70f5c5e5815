//! End-to-end transplant over model directories.
//!
//! Everything that can fail on the inputs (configs, tokenizers, weights,
//! mappings) runs before the output directory is touched.

use std::path::{Path, PathBuf};

use crate::config::TransplantConfig;
use crate::error::TransplantResult;
use crate::model_config::{ConfigRetarget, ModelConfig};
use crate::output::{
    check_output_dir, copy_tokenizer_files, patch_bos_handling, prepare_output_dir, require_dir,
};
use crate::overrides::{AlignmentOutcome, SpecialTokenIds};
use crate::remap::MappedToken;
use crate::stats::TransplantStats;
use crate::transplant::{mapping_stats, Transplant};
use crate::vocab::{HfVocabulary, Vocabulary};
use crate::weights::{load_donor_weights, write_output_weights};

/// Inputs for one run.
#[derive(Debug, Clone)]
pub struct TransplantRequest {
    pub donor_dir: PathBuf,
    pub target_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config: TransplantConfig,
    /// Replace an existing output directory.
    pub overwrite: bool,
}

/// What a completed run did.
#[derive(Debug, Clone)]
pub struct TransplantReport {
    pub stats: TransplantStats,
    pub alignment: Vec<AlignmentOutcome>,
    /// Whether the output tokenizer config was patched to drop BOS.
    pub bos_patched: bool,
}

/// Mappings computed without touching weights.
#[derive(Debug, Clone)]
pub struct TransplantPlan {
    pub mappings: Vec<MappedToken>,
    pub alignment: Vec<AlignmentOutcome>,
    pub stats: TransplantStats,
}

struct Inputs {
    donor_config: ModelConfig,
    target_config: ModelConfig,
    donor_vocab: HfVocabulary,
    target_vocab: HfVocabulary,
}

fn load_inputs(donor_dir: &Path, target_dir: &Path) -> TransplantResult<Inputs> {
    require_dir("Donor", donor_dir)?;
    require_dir("Target", target_dir)?;

    tracing::info!("Loading config from '{}'...", donor_dir.display());
    let donor_config = ModelConfig::from_dir(donor_dir)?;
    tracing::info!("Loading config from '{}'...", target_dir.display());
    let target_config = ModelConfig::from_dir(target_dir)?;

    let donor_vocab = HfVocabulary::from_dir(donor_dir, "donor")?;
    let target_vocab = HfVocabulary::from_dir(target_dir, "target")?;

    Ok(Inputs {
        donor_config,
        target_config,
        donor_vocab,
        target_vocab,
    })
}

/// Compute mappings and their statistics only.
pub fn plan_transplant(
    donor_dir: &Path,
    target_dir: &Path,
    config: &TransplantConfig,
) -> TransplantResult<TransplantPlan> {
    config.validate()?;
    let inputs = load_inputs(donor_dir, target_dir)?;
    let declared = inputs.target_config.vocab_size()?;

    let mut transplant = Transplant::new(&inputs.donor_vocab, &inputs.target_vocab, config.head);
    let alignment = transplant.prepare_overrides(
        Some(&inputs.target_config),
        Some(&inputs.donor_config),
        &config.overrides,
    )?;
    let mappings = transplant.plan()?;
    let stats = mapping_stats(&mappings, declared);

    Ok(TransplantPlan {
        mappings,
        alignment,
        stats,
    })
}

/// Build the transplanted model in `request.output_dir`.
pub fn run_transplant(request: &TransplantRequest) -> TransplantResult<TransplantReport> {
    let config = &request.config;
    config.validate()?;
    check_output_dir(&request.output_dir, request.overwrite)?;

    let Inputs {
        mut donor_config,
        target_config,
        donor_vocab,
        target_vocab,
    } = load_inputs(&request.donor_dir, &request.target_dir)?;

    let hidden_size = donor_config.hidden_size()?;
    let donor_declared = donor_config.vocab_size()?;
    let target_declared = target_config.vocab_size()?;
    tracing::info!(
        hidden_size,
        torch_dtype = donor_config.torch_dtype().unwrap_or("unknown"),
        "Donor vocabulary: {} declared, {} used; target vocabulary: {} declared, {} used",
        donor_declared,
        donor_vocab.used_size(),
        target_declared,
        target_vocab.used_size()
    );

    let tied = donor_config.tie_word_embeddings() == Some(true);
    let weights = load_donor_weights(&request.donor_dir, &config.tensors, tied, hidden_size)?;

    let mut transplant = Transplant::new(&donor_vocab, &target_vocab, config.head);
    let alignment = transplant.prepare_overrides(
        Some(&target_config),
        Some(&donor_config),
        &config.overrides,
    )?;
    let output = transplant.run(&weights.embed, &weights.head, target_declared)?;

    let dtype = config.output_dtype.resolve(weights.dtype);
    let embed = output.embed.to_tensor(dtype)?;
    let head = output.head.to_tensor(dtype)?;

    prepare_output_dir(&request.output_dir, request.overwrite)?;
    tracing::info!("Saving model and tokenizer to '{}'", request.output_dir.display());

    write_output_weights(
        &request.donor_dir,
        &request.output_dir,
        &weights.layout,
        &config.tensors,
        &embed,
        &head,
    )?;

    let target_ids = SpecialTokenIds::resolve(&target_vocab, Some(&target_config));
    donor_config.retarget(&ConfigRetarget {
        vocab_size: target_declared,
        bos_token_id: target_ids.bos,
        eos_token_id: target_ids.eos,
        pad_token_id: target_ids.pad,
    });
    donor_config.write_to(&request.output_dir.join("config.json"))?;

    copy_tokenizer_files(&request.target_dir, &request.output_dir)?;

    let mut bos_patched = false;
    if !donor_vocab.uses_bos() {
        match patch_bos_handling(&request.output_dir) {
            Ok(patched) => bos_patched = patched,
            Err(e) => tracing::warn!("Failed to patch BOS handling: {}", e),
        }
    }

    tracing::info!("Transplant complete: {}", request.output_dir.display());

    Ok(TransplantReport {
        stats: output.stats,
        alignment,
        bos_patched,
    })
}
