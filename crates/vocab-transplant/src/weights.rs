//! Safetensors weight access.
//!
//! Donor weights are memory-mapped with candle; only the embedding and head
//! tensors are materialized. Output shards are written with every donor
//! tensor passed through untouched except the two replaced matrices.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use candle_core::safetensors::MmapedSafetensors;
use candle_core::{DType, Device, Tensor};
use safetensors::tensor::{Dtype, TensorView, View};
use serde_json::Value;

use crate::config::TensorNames;
use crate::error::{TransplantError, TransplantResult};
use crate::matrix::EmbeddingMatrix;

/// Single-file weights.
pub const SINGLE_FILE: &str = "model.safetensors";
/// Shard index for sharded weights.
pub const INDEX_FILE: &str = "model.safetensors.index.json";

/// How a model's weights are laid out on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightLayout {
    /// One `model.safetensors`.
    Single,
    /// Shards listed by `model.safetensors.index.json`.
    Sharded {
        /// The full parsed index (metadata kept on rewrite).
        index: Value,
        /// Tensor name -> shard file name.
        weight_map: BTreeMap<String, String>,
    },
}

impl WeightLayout {
    /// Inspect `dir`; a single file wins over an index.
    pub fn detect(dir: &Path) -> TransplantResult<Self> {
        if dir.join(SINGLE_FILE).is_file() {
            return Ok(WeightLayout::Single);
        }

        let index_path = dir.join(INDEX_FILE);
        if !index_path.is_file() {
            return Err(TransplantError::WeightsNotFound {
                path: dir.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&index_path)?;
        let index: Value =
            serde_json::from_str(&content).map_err(|e| TransplantError::ConfigParseError {
                path: index_path.display().to_string(),
                message: e.to_string(),
            })?;
        let weight_map = index
            .get("weight_map")
            .and_then(Value::as_object)
            .ok_or_else(|| TransplantError::MissingConfigField {
                path: index_path.display().to_string(),
                field: "weight_map",
            })?
            .iter()
            .filter_map(|(name, file)| Some((name.clone(), file.as_str()?.to_string())))
            .collect();

        Ok(WeightLayout::Sharded { index, weight_map })
    }

    /// Weight files in this layout, sorted and deduplicated.
    pub fn shard_files(&self) -> Vec<String> {
        match self {
            WeightLayout::Single => vec![SINGLE_FILE.to_string()],
            WeightLayout::Sharded { weight_map, .. } => weight_map
                .values()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// File holding tensor `name`. A single-file layout holds everything.
    pub fn shard_of(&self, name: &str) -> Option<&str> {
        match self {
            WeightLayout::Single => Some(SINGLE_FILE),
            WeightLayout::Sharded { weight_map, .. } => weight_map.get(name).map(String::as_str),
        }
    }

    pub fn is_sharded(&self) -> bool {
        matches!(self, WeightLayout::Sharded { .. })
    }
}

/// Where the donor head matrix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadSource {
    /// Its own tensor.
    Separate,
    /// Aliased to the embedding because the config ties them.
    Tied,
    /// Aliased to the embedding because no head tensor exists.
    Missing,
}

/// The two donor matrices plus what is needed to write the output model.
#[derive(Debug, Clone)]
pub struct DonorWeights {
    pub embed: EmbeddingMatrix,
    pub head: EmbeddingMatrix,
    /// Storage dtype of the donor embedding.
    pub dtype: DType,
    pub head_source: HeadSource,
    pub layout: WeightLayout,
}

/// Load the donor embedding and head as f32 matrices.
///
/// # Errors
/// - `TransplantError::WeightsNotFound` if `dir` has no safetensors weights
/// - `TransplantError::WeightNotFound` if the embedding tensor is absent
/// - `TransplantError::ShapeMismatch` if a matrix is not `[_, hidden_size]`
pub fn load_donor_weights(
    dir: &Path,
    names: &TensorNames,
    tied: bool,
    hidden_size: usize,
) -> TransplantResult<DonorWeights> {
    let layout = WeightLayout::detect(dir)?;
    let paths: Vec<_> = layout.shard_files().iter().map(|f| dir.join(f)).collect();

    tracing::info!(
        "Loading donor weights from: {} ({} file(s))",
        dir.display(),
        paths.len()
    );

    let st = unsafe {
        MmapedSafetensors::multi(&paths).map_err(|e| TransplantError::SafetensorsError {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?
    };

    let embed_tensor = load_tensor(&st, &names.embed, dir)?;
    let dtype = embed_tensor.dtype();
    let embed = EmbeddingMatrix::from_tensor(&embed_tensor, &names.embed)?;
    check_width(&embed, &names.embed, hidden_size)?;

    let head_source = if tied {
        HeadSource::Tied
    } else if st.get(&names.head).is_ok() {
        HeadSource::Separate
    } else {
        tracing::warn!(
            "No '{}' tensor in donor, using '{}' as the output head",
            names.head,
            names.embed
        );
        HeadSource::Missing
    };

    let head = match head_source {
        HeadSource::Separate => {
            let tensor = load_tensor(&st, &names.head, dir)?;
            let head = EmbeddingMatrix::from_tensor(&tensor, &names.head)?;
            check_width(&head, &names.head, hidden_size)?;
            head
        }
        HeadSource::Tied | HeadSource::Missing => embed.clone(),
    };

    tracing::info!(
        embed_rows = embed.rows(),
        head_rows = head.rows(),
        hidden = hidden_size,
        dtype = ?dtype,
        head = ?head_source,
        "Donor weights loaded"
    );

    Ok(DonorWeights {
        embed,
        head,
        dtype,
        head_source,
        layout,
    })
}

fn load_tensor(st: &MmapedSafetensors, name: &str, dir: &Path) -> TransplantResult<Tensor> {
    if st.get(name).is_err() {
        return Err(TransplantError::WeightNotFound {
            weight_name: name.to_string(),
            model_path: dir.display().to_string(),
        });
    }
    st.load(name, &Device::Cpu)
        .map_err(|e| TransplantError::tensor(format!("load {}", name), e))
}

fn check_width(matrix: &EmbeddingMatrix, name: &str, hidden_size: usize) -> TransplantResult<()> {
    if matrix.cols() != hidden_size {
        return Err(TransplantError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![matrix.rows(), hidden_size],
            actual: vec![matrix.rows(), matrix.cols()],
        });
    }
    Ok(())
}

/// A tensor queued for writing: borrowed from a donor shard or newly built.
enum OutputTensor<'a> {
    Kept(TensorView<'a>),
    Replaced(&'a Tensor),
}

impl View for OutputTensor<'_> {
    fn dtype(&self) -> Dtype {
        match self {
            OutputTensor::Kept(view) => view.dtype(),
            OutputTensor::Replaced(tensor) => <Tensor as View>::dtype(tensor),
        }
    }

    fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::Kept(view) => view.shape(),
            OutputTensor::Replaced(tensor) => <Tensor as View>::shape(tensor),
        }
    }

    fn data(&self) -> Cow<'_, [u8]> {
        match self {
            OutputTensor::Kept(view) => Cow::Borrowed(view.data()),
            OutputTensor::Replaced(tensor) => <Tensor as View>::data(tensor),
        }
    }

    fn data_len(&self) -> usize {
        match self {
            OutputTensor::Kept(view) => view.data().len(),
            OutputTensor::Replaced(tensor) => <Tensor as View>::data_len(tensor),
        }
    }
}

/// Write the output model's weights into `output_dir`.
///
/// Every donor shard is rewritten under the same file name. The embedding
/// replaces the donor's in place; the head replaces the donor's or, when the
/// donor had none, is added to the embedding's shard. For sharded layouts the
/// index is rewritten with the head's location and the new `total_size`.
pub fn write_output_weights(
    donor_dir: &Path,
    output_dir: &Path,
    layout: &WeightLayout,
    names: &TensorNames,
    embed: &Tensor,
    head: &Tensor,
) -> TransplantResult<()> {
    let embed_home = layout
        .shard_of(&names.embed)
        .ok_or_else(|| TransplantError::WeightNotFound {
            weight_name: names.embed.clone(),
            model_path: donor_dir.display().to_string(),
        })?
        .to_string();
    let head_home = layout
        .shard_of(&names.head)
        .unwrap_or(&embed_home)
        .to_string();

    let metadata: HashMap<String, String> =
        HashMap::from([("format".to_string(), "pt".to_string())]);
    let mut total_size = 0usize;

    for file in layout.shard_files() {
        let source = donor_dir.join(&file);
        let destination = output_dir.join(&file);
        let st = unsafe {
            MmapedSafetensors::new(&source).map_err(|e| TransplantError::SafetensorsError {
                path: source.display().to_string(),
                message: e.to_string(),
            })?
        };

        let mut tensors: Vec<(String, OutputTensor<'_>)> = st
            .tensors()
            .into_iter()
            .filter(|(name, _)| name != &names.embed && name != &names.head)
            .map(|(name, view)| (name, OutputTensor::Kept(view)))
            .collect();
        if file == embed_home {
            tensors.push((names.embed.clone(), OutputTensor::Replaced(embed)));
        }
        if file == head_home {
            tensors.push((names.head.clone(), OutputTensor::Replaced(head)));
        }

        total_size += tensors.iter().map(|(_, t)| t.data_len()).sum::<usize>();
        let count = tensors.len();

        safetensors::tensor::serialize_to_file(tensors, &Some(metadata.clone()), &destination)
            .map_err(|e| TransplantError::SafetensorsError {
                path: destination.display().to_string(),
                message: e.to_string(),
            })?;

        tracing::info!("Wrote {} tensors to {}", count, destination.display());
    }

    if let WeightLayout::Sharded { index, .. } = layout {
        let mut index = index.clone();
        index["weight_map"][names.head.as_str()] = Value::String(head_home);
        index["metadata"]["total_size"] = Value::from(total_size);
        let path = output_dir.join(INDEX_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&index)?)?;
        tracing::info!("Wrote shard index to {}", path.display());
    }

    Ok(())
}
