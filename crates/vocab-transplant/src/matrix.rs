//! Dense row-major `f32` matrix indexed by token id.
//!
//! Donor tensors are converted to `f32` once on load so that row copies and
//! weighted means are computed at full precision regardless of the stored
//! dtype; results are cast back on save.

use candle_core::{DType, Device, Tensor};

use crate::error::{TransplantError, TransplantResult};

/// `[rows, cols]` matrix of `f32`, one row per token id.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wrap row-major data.
    ///
    /// # Errors
    /// - `TransplantError::ShapeMismatch` if `data.len() != rows * cols`
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> TransplantResult<Self> {
        if data.len() != rows * cols {
            return Err(TransplantError::ShapeMismatch {
                name: "matrix data".to_string(),
                expected: vec![rows * cols],
                actual: vec![data.len()],
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from rows of equal length.
    pub fn from_rows(rows: &[Vec<f32>]) -> TransplantResult<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(TransplantError::ShapeMismatch {
                    name: format!("row {}", i),
                    expected: vec![cols],
                    actual: vec![row.len()],
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Convert a 2-D tensor of any float dtype.
    pub fn from_tensor(tensor: &Tensor, name: &str) -> TransplantResult<Self> {
        let (rows, cols) = tensor.dims2().map_err(|_| TransplantError::ShapeMismatch {
            name: name.to_string(),
            expected: vec![0, 0],
            actual: tensor.dims().to_vec(),
        })?;
        let data = tensor
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| TransplantError::tensor(format!("read {}", name), e))?;
        Ok(Self { rows, cols, data })
    }

    /// Convert to a CPU tensor of the given dtype.
    pub fn to_tensor(&self, dtype: DType) -> TransplantResult<Tensor> {
        Tensor::from_slice(&self.data, (self.rows, self.cols), &Device::Cpu)
            .and_then(|t| t.to_dtype(dtype))
            .map_err(|e| TransplantError::tensor("build output tensor", e))
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Row width.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row `i`.
    ///
    /// # Panics
    /// Panics if `i >= rows`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutable row `i`.
    ///
    /// # Panics
    /// Panics if `i >= rows`.
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Whether row `i` is all zeros.
    pub fn row_is_zero(&self, i: usize) -> bool {
        self.row(i).iter().all(|v| *v == 0.0)
    }

    /// Row-major data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
