//! Norm cache

use ndarray::{Array1, ArrayView2};

use crate::vector::l2_norm;

/// Euclidean norms of the vectors in an embedding matrix.
///
/// The norms are computed once when a store is constructed. Since the
/// matrix of a store is never modified, `norm(idx)` always equals the
/// length of row `idx`.
#[derive(Clone, Debug, PartialEq)]
pub struct Norms(Array1<f64>);

impl Norms {
    /// Compute the norms of the rows of `matrix`.
    pub fn from_matrix(matrix: ArrayView2<f64>) -> Self {
        Norms(matrix.outer_iter().map(l2_norm).collect())
    }

    /// Return the norm for the word at the given index.
    pub fn norm(&self, idx: usize) -> f64 {
        self.0[idx]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
