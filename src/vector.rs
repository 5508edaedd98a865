//! Dimension-checked embedding vectors.

use std::ops::Deref;

use ndarray::{Array1, ArrayView1};

use crate::error::{Error, Result};

/// An owned embedding vector.
///
/// Arithmetic between vectors checks that both operands have the same
/// dimensionality, so that vectors from different tables cannot be
/// combined by accident.
#[derive(Clone, Debug, PartialEq)]
pub struct Vector {
    inner: Array1<f64>,
}

impl Vector {
    /// Construct a vector from its components.
    pub fn new(components: impl Into<Vec<f64>>) -> Self {
        Vector {
            inner: Array1::from(components.into()),
        }
    }

    /// Construct a vector of zeros.
    pub fn zeros(dims: usize) -> Self {
        Vector {
            inner: Array1::zeros(dims),
        }
    }

    pub fn dims(&self) -> usize {
        self.inner.len()
    }

    pub fn view(&self) -> ArrayView1<f64> {
        self.inner.view()
    }

    pub fn into_inner(self) -> Array1<f64> {
        self.inner
    }

    /// Dot product.
    pub fn dot(&self, other: &Vector) -> Result<f64> {
        self.check_dims(other)?;
        Ok(self.inner.dot(&other.inner))
    }

    /// Euclidean length of the vector.
    pub fn l2_norm(&self) -> f64 {
        l2_norm(self.inner.view())
    }

    /// `self + other`.
    pub fn add(&self, other: &Vector) -> Result<Vector> {
        self.check_dims(other)?;
        Ok(Vector {
            inner: &self.inner + &other.inner,
        })
    }

    /// `self - other`.
    pub fn sub(&self, other: &Vector) -> Result<Vector> {
        self.check_dims(other)?;
        Ok(Vector {
            inner: &self.inner - &other.inner,
        })
    }

    /// Multiply every component by `factor`.
    pub fn scale(&self, factor: f64) -> Vector {
        Vector {
            inner: &self.inner * factor,
        }
    }

    /// Ensure that `other` has the dimensionality of this vector.
    pub fn check_dims(&self, other: &Vector) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(Error::DimensionMismatch {
                line: None,
                expected: self.dims(),
                found: other.dims(),
            });
        }

        Ok(())
    }
}

impl Deref for Vector {
    type Target = Array1<f64>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Array1<f64>> for Vector {
    fn from(inner: Array1<f64>) -> Self {
        Vector { inner }
    }
}

impl From<ArrayView1<'_, f64>> for Vector {
    fn from(view: ArrayView1<f64>) -> Self {
        Vector {
            inner: view.to_owned(),
        }
    }
}

pub(crate) fn l2_norm(v: ArrayView1<f64>) -> f64 {
    v.dot(&v).sqrt()
}

/// Cosine similarity given precomputed norms.
///
/// Returns `None` when either norm is within `tolerance` of zero or
/// when the norms or the quotient are not finite (e.g. after overflow
/// of the squared norm). Otherwise the similarity is clamped to
/// *[-1, 1]* to absorb rounding errors.
pub(crate) fn cosine_with_norms(dot: f64, norm_a: f64, norm_b: f64, tolerance: f64) -> Option<f64> {
    if !(norm_a.is_finite() && norm_b.is_finite()) || norm_a <= tolerance || norm_b <= tolerance {
        return None;
    }

    let similarity = dot / (norm_a * norm_b);
    if !similarity.is_finite() {
        return None;
    }

    Some(similarity.max(-1.).min(1.))
}

/// Cosine similarity of two vectors, `None` if either has a zero norm.
pub fn cosine(a: &Vector, b: &Vector, tolerance: f64) -> Result<Option<f64>> {
    let dot = a.dot(b)?;
    Ok(cosine_with_norms(dot, a.l2_norm(), b.l2_norm(), tolerance))
}
