//! Output-head row policies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{TransplantError, TransplantResult};
use crate::matrix::EmbeddingMatrix;
use crate::remap::Mapping;

const DEFAULT_DECAY: f32 = 0.5;

fn default_decay() -> f32 {
    DEFAULT_DECAY
}

/// How a head row is built from a mapping's donor head rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum HeadPolicy {
    /// Weighted mean with weights `decay^k` over positions `k`.
    ///
    /// `0` keeps only the first row, `1` is the plain mean.
    FrontLoaded {
        #[serde(default = "default_decay")]
        decay: f32,
    },

    /// First target id to use a donor prefix gets an exact copy; later ids
    /// sharing that prefix get `mean * scale` (zero row when `scale == 0`).
    FirstClaim {
        #[serde(default)]
        scale: f32,
    },
}

impl Default for HeadPolicy {
    fn default() -> Self {
        HeadPolicy::FrontLoaded {
            decay: DEFAULT_DECAY,
        }
    }
}

impl HeadPolicy {
    /// Policy name as used in config files.
    pub fn name(&self) -> &'static str {
        match self {
            HeadPolicy::FrontLoaded { .. } => "front_loaded",
            HeadPolicy::FirstClaim { .. } => "first_claim",
        }
    }

    /// Policy by name with its default parameter.
    pub fn with_default_parameter(name: &str) -> Option<Self> {
        match name.to_lowercase().replace('-', "_").as_str() {
            "front_loaded" => Some(HeadPolicy::FrontLoaded {
                decay: DEFAULT_DECAY,
            }),
            "first_claim" => Some(HeadPolicy::FirstClaim { scale: 0.0 }),
            _ => None,
        }
    }

    /// The policy's parameter (`decay` or `scale`).
    pub fn parameter(&self) -> f32 {
        match self {
            HeadPolicy::FrontLoaded { decay } => *decay,
            HeadPolicy::FirstClaim { scale } => *scale,
        }
    }

    /// Parameter must be a finite value in `[0, 1]`.
    pub fn validate(&self) -> TransplantResult<()> {
        let (label, value) = match self {
            HeadPolicy::FrontLoaded { decay } => ("decay", *decay),
            HeadPolicy::FirstClaim { scale } => ("scale", *scale),
        };
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(TransplantError::ConfigError {
                message: format!("{} must be between 0.0 and 1.0 (got {})", label, value),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for HeadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeadPolicy::FrontLoaded { decay } => write!(f, "front_loaded(decay={})", decay),
            HeadPolicy::FirstClaim { scale } => write!(f, "first_claim(scale={})", scale),
        }
    }
}

/// Which branch initialized a head row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadInit {
    /// Exact copy of one donor row.
    Copy,
    /// Combination of several donor rows (or a scaled mean).
    Combined,
    /// Left at zero.
    Zero,
}

/// Stateful head-row builder for one pass.
///
/// Under `FirstClaim` the claimed-prefix set makes results depend on call
/// order; the pass must call [`HeadSynthesizer::synthesize`] in ascending
/// target-id order.
#[derive(Debug, Clone)]
pub struct HeadSynthesizer {
    policy: HeadPolicy,
    claimed: HashSet<u32>,
}

impl HeadSynthesizer {
    pub fn new(policy: HeadPolicy) -> Self {
        Self {
            policy,
            claimed: HashSet::new(),
        }
    }

    pub fn policy(&self) -> HeadPolicy {
        self.policy
    }

    /// Donor prefix ids claimed so far.
    pub fn claimed_count(&self) -> usize {
        self.claimed.len()
    }

    /// Write the head row for `mapping` into `out` (expected zeroed).
    pub fn synthesize(
        &mut self,
        mapping: &Mapping,
        donor_head: &EmbeddingMatrix,
        out: &mut [f32],
    ) -> HeadInit {
        match self.policy {
            HeadPolicy::FrontLoaded { decay } => {
                let rows = donor_rows(mapping, donor_head);
                front_loaded_mean(&rows, decay, out);
                if mapping.len() == 1 {
                    HeadInit::Copy
                } else {
                    HeadInit::Combined
                }
            }
            HeadPolicy::FirstClaim { scale } => {
                let prefix = mapping.prefix();
                if self.claimed.insert(prefix) {
                    out.copy_from_slice(donor_head.row(prefix as usize));
                    HeadInit::Copy
                } else if scale > 0.0 {
                    let rows = donor_rows(mapping, donor_head);
                    front_loaded_mean(&rows, 1.0, out);
                    out.iter_mut().for_each(|v| *v *= scale);
                    HeadInit::Combined
                } else {
                    HeadInit::Zero
                }
            }
        }
    }
}

fn donor_rows<'m>(mapping: &Mapping, donor_head: &'m EmbeddingMatrix) -> Vec<&'m [f32]> {
    mapping
        .ids()
        .iter()
        .map(|&id| donor_head.row(id as usize))
        .collect()
}

/// Front-loaded exponentially weighted mean of `rows` into `out`.
///
/// - one row, or `decay == 0`: the first row
/// - `decay == 1`: arithmetic mean
/// - otherwise: `Σ decay^k · row_k / Σ decay^k`
///
/// # Panics
/// Panics if `rows` is empty or a row's width differs from `out`.
pub fn front_loaded_mean(rows: &[&[f32]], decay: f32, out: &mut [f32]) {
    if rows.len() == 1 || decay == 0.0 {
        out.copy_from_slice(rows[0]);
        return;
    }

    out.fill(0.0);
    if decay == 1.0 {
        for row in rows {
            out.iter_mut().zip(row.iter()).for_each(|(o, v)| *o += v);
        }
        let n = rows.len() as f32;
        out.iter_mut().for_each(|o| *o /= n);
        return;
    }

    let mut total = 0.0f32;
    for (k, row) in rows.iter().enumerate() {
        let weight = decay.powi(k as i32);
        total += weight;
        out.iter_mut()
            .zip(row.iter())
            .for_each(|(o, v)| *o += weight * v);
    }
    out.iter_mut().for_each(|o| *o /= total);
}
