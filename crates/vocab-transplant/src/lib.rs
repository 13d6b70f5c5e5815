//! Vocabulary transplant for causal language models.
//!
//! Re-initializes a donor model's input embedding and output head for a new
//! target tokenizer so the model can be fine-tuned (or run) with that
//! tokenizer.
//!
//! # Architecture
//!
//! - **Vocabulary**: trait over a tokenizer (`HfVocabulary`, `TableVocabulary`)
//! - **OverrideRegistry**: special-token alignment and manual overrides
//! - **TokenRemapper**: target id -> ordered donor ids
//! - **HeadSynthesizer**: output-head rows under a [`HeadPolicy`]
//! - **Transplant**: the pass that builds both matrices
//! - **pipeline**: directory-level run (weights, config, tokenizer files)
//!
//! # Example
//!
//! ```rust
//! use vocab_transplant::{EmbeddingMatrix, HeadPolicy, TableVocabulary, Transplant};
//!
//! let donor = TableVocabulary::new("donor", ["a", "b", "ab"]).with_encoding("c", vec![0, 1]);
//! let target = TableVocabulary::new("target", ["a", "b", "c"]);
//! let donor_rows = EmbeddingMatrix::from_rows(&[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
//!
//! let transplant = Transplant::new(&donor, &target, HeadPolicy::default());
//! let output = transplant.run(&donor_rows, &donor_rows, 3).unwrap();
//! assert_eq!(output.embed.row(2), &[2.0]);
//! ```

pub mod config;
pub mod error;
pub mod matrix;
pub mod model_config;
pub mod output;
pub mod overrides;
pub mod pipeline;
pub mod remap;
pub mod stats;
pub mod synth;
pub mod transplant;
pub mod vocab;
pub mod weights;

pub use config::{OutputDType, TensorNames, TokenOverride, TransplantConfig};
pub use error::{TransplantError, TransplantResult};
pub use matrix::EmbeddingMatrix;
pub use model_config::{ConfigRetarget, ModelConfig};
pub use overrides::{AlignmentOutcome, OverrideRegistry, SpecialTokenIds};
pub use pipeline::{
    plan_transplant, run_transplant, TransplantPlan, TransplantReport, TransplantRequest,
};
pub use remap::{MappedToken, Mapping, MappingSource, TokenRemapper};
pub use stats::TransplantStats;
pub use synth::{HeadInit, HeadPolicy, HeadSynthesizer};
pub use transplant::{Transplant, TransplantOutput};
pub use vocab::{HfVocabulary, SpecialRole, TableVocabulary, Vocabulary};
pub use weights::{DonorWeights, HeadSource, WeightLayout};
