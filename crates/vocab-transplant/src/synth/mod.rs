//! Row synthesis from donor matrices.
//!
//! - Input embedding: exact copy of the donor row for the mapping's *last* id.
//! - Output head: combination of donor head rows chosen by [`HeadPolicy`].

mod head;

pub use head::{front_loaded_mean, HeadInit, HeadPolicy, HeadSynthesizer};

use crate::matrix::EmbeddingMatrix;
use crate::remap::Mapping;

/// Write the input-embedding row for `mapping` into `out`.
///
/// # Panics
/// Panics if the suffix id is outside `donor_embed` or `out` has the wrong
/// width; callers check both before the pass.
pub fn synthesize_embedding_row(mapping: &Mapping, donor_embed: &EmbeddingMatrix, out: &mut [f32]) {
    out.copy_from_slice(donor_embed.row(mapping.suffix() as usize));
}
