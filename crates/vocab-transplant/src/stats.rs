//! Mapping and head-initialization statistics for one transplant pass.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::error::TransplantResult;
use crate::remap::Mapping;
use crate::synth::HeadInit;

/// Counters accumulated during the pass. Purely observational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransplantStats {
    /// Donor-token count -> number of target ids with that mapping length.
    pub mapping_counts: BTreeMap<usize, usize>,
    pub head_copies: usize,
    pub head_combined: usize,
    pub head_zeros: usize,
    pub used_size: usize,
    pub declared_size: usize,
}

impl TransplantStats {
    pub fn new(used_size: usize, declared_size: usize) -> Self {
        Self {
            used_size,
            declared_size,
            ..Default::default()
        }
    }

    pub fn record_mapping(&mut self, mapping: &Mapping) {
        *self.mapping_counts.entry(mapping.len()).or_insert(0) += 1;
    }

    pub fn record_head(&mut self, init: HeadInit) {
        match init {
            HeadInit::Copy => self.head_copies += 1,
            HeadInit::Combined => self.head_combined += 1,
            HeadInit::Zero => self.head_zeros += 1,
        }
    }

    /// Count the declared-but-unused slots as zero rows.
    pub fn record_unused_slots(&mut self) {
        self.head_zeros += self.declared_size.saturating_sub(self.used_size);
    }

    /// Total head rows accounted for.
    pub fn head_total(&self) -> usize {
        self.head_copies + self.head_combined + self.head_zeros
    }

    /// Target ids mapped (sum of the histogram).
    pub fn mapped_total(&self) -> usize {
        self.mapping_counts.values().sum()
    }

    /// Emit the summary at info level.
    pub fn log_summary(&self) {
        tracing::info!("Transplant mappings:");
        for (count, occurrences) in &self.mapping_counts {
            tracing::info!(
                "- {:<8}: {} ({:.2}%)",
                format!("{} to 1", count),
                occurrences,
                percent(*occurrences, self.used_size)
            );
        }

        tracing::info!("Head initialized with:");
        for (label, value) in [
            ("Copies", self.head_copies),
            ("Combined", self.head_combined),
            ("Zeros", self.head_zeros),
        ] {
            tracing::info!(
                "- {:<8}: {} ({:.2}%)",
                label,
                value,
                percent(value, self.declared_size)
            );
        }
    }

    /// Write the statistics as pretty JSON.
    pub fn write_json(&self, path: &Path) -> TransplantResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
