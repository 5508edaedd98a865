//! Principal component projection of word subsets.
//!
//! The vectors of a small set of words are centered and projected onto
//! the two directions of maximal variance, e.g. for plotting. The
//! principal components are the leading eigenvectors of the covariance
//! matrix, computed with Jacobi eigenvalue iteration.

use std::collections::HashSet;

use ndarray::{s, Array1, Array2, ArrayView2, Axis};

use crate::config::ProjectionConfig;
use crate::embeddings::EmbeddingStore;
use crate::error::{Error, Result};

/// Words projected onto the first two principal components.
///
/// The sign of each component is arbitrary. Components are normalized
/// such that their largest-magnitude loading is positive, which makes
/// the output reproducible, but callers should not depend on it.
#[derive(Clone, Debug)]
pub struct Projection {
    words: Vec<String>,
    coordinates: Array2<f64>,
    components: Array2<f64>,
    explained_variance: [f64; 2],
    total_variance: f64,
}

impl Projection {
    /// Get the coordinates of a word.
    pub fn coordinates(&self, word: &str) -> Option<(f64, f64)> {
        self.words
            .iter()
            .position(|w| w == word)
            .map(|idx| (self.coordinates[(idx, 0)], self.coordinates[(idx, 1)]))
    }

    /// Iterate over words and their coordinates in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, (f64, f64))> {
        self.words
            .iter()
            .zip(self.coordinates.outer_iter())
            .map(|(word, row)| (word.as_str(), (row[0], row[1])))
    }

    /// Number of projected words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The principal components, one per row.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Variance along each component, in descending order.
    pub fn explained_variance(&self) -> [f64; 2] {
        self.explained_variance
    }

    /// Fraction of the total variance along each component.
    pub fn explained_variance_ratio(&self) -> [f64; 2] {
        if self.total_variance <= 0. {
            return [0., 0.];
        }

        [
            self.explained_variance[0] / self.total_variance,
            self.explained_variance[1] / self.total_variance,
        ]
    }
}

/// Principal component projection against an embedding store.
#[derive(Clone, Debug)]
pub struct ProjectionReducer<'a> {
    store: &'a EmbeddingStore,
    config: ProjectionConfig,
}

impl<'a> ProjectionReducer<'a> {
    pub fn new(store: &'a EmbeddingStore) -> Self {
        Self::with_config(store, ProjectionConfig::default())
    }

    pub fn with_config(store: &'a EmbeddingStore, config: ProjectionConfig) -> Self {
        ProjectionReducer { store, config }
    }

    /// Project words onto their first two principal components.
    ///
    /// Repeated words are projected once. Fails with `Error::NotFound`
    /// if any word is not in the store, and with
    /// `Error::InsufficientData` if fewer than two distinct words are
    /// given.
    pub fn project_2d<'b>(&self, tokens: impl IntoIterator<Item = &'b str>) -> Result<Projection> {
        let mut seen = HashSet::new();
        let mut words = Vec::new();
        let mut indices = Vec::new();
        let mut missing = Vec::new();

        for token in tokens {
            if !seen.insert(token) {
                continue;
            }

            match self.store.vocab().idx(token) {
                Some(idx) => {
                    words.push(token.to_owned());
                    indices.push(idx);
                }
                None => missing.push(token),
            }
        }

        if !missing.is_empty() {
            return Err(Error::not_found(missing));
        }

        if words.len() < 2 {
            return Err(Error::InsufficientData {
                distinct: words.len(),
            });
        }

        let mut data = self.store.view().select(Axis(0), &indices);
        let mean = data
            .mean_axis(Axis(0))
            .ok_or(Error::InsufficientData { distinct: 0 })?;
        data -= &mean;

        let (components, explained_variance) = principal_components(data.view(), &self.config);
        let total_variance = data.iter().map(|v| v * v).sum::<f64>() / (data.nrows() - 1) as f64;
        let coordinates = data.dot(&components.t());

        Ok(Projection {
            words,
            coordinates,
            components,
            explained_variance,
            total_variance,
        })
    }
}

/// Project words onto their first two principal components with the
/// default configuration.
pub fn project_2d<'b>(
    store: &EmbeddingStore,
    tokens: impl IntoIterator<Item = &'b str>,
) -> Result<Projection> {
    ProjectionReducer::new(store).project_2d(tokens)
}

/// Compute the two leading principal components of centered data.
///
/// The eigen-decomposition is done on the smaller of the covariance
/// matrix *X^T X / (n - 1)* and the Gram matrix *X X^T*. Returns the
/// components as rows with their variances, in descending order of
/// variance.
fn principal_components(data: ArrayView2<f64>, config: &ProjectionConfig) -> (Array2<f64>, [f64; 2]) {
    let (n_rows, dims) = data.dim();
    let denom = (n_rows - 1) as f64;

    let (eigenvalues, eigenvectors, from_gram) = if n_rows <= dims {
        let (values, vectors) = symmetric_eigen(data.dot(&data.t()), config);
        (values, vectors, true)
    } else {
        let (values, vectors) = symmetric_eigen(data.t().dot(&data) / denom, config);
        (values, vectors, false)
    };

    let scale = eigenvalues.iter().map(|v| v.abs()).sum::<f64>();
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let mut components = Array2::zeros((2, dims));
    let mut explained_variance = [0f64; 2];

    for (component, &idx) in order.iter().take(2).enumerate() {
        let eigenvalue = eigenvalues[idx];
        let mut direction = if eigenvalue <= ZERO_VARIANCE * scale {
            None
        } else if from_gram {
            // Map the eigenvector of the Gram matrix to feature space.
            Some(data.t().dot(&eigenvectors.column(idx)) / eigenvalue.sqrt())
        } else {
            Some(eigenvectors.column(idx).to_owned())
        };

        if direction.is_none() {
            direction = orthogonal_basis_vector(components.slice(s![..component, ..]));
        } else {
            explained_variance[component] = if from_gram {
                eigenvalue / denom
            } else {
                eigenvalue
            };
        }

        if let Some(mut direction) = direction {
            normalize_sign(&mut direction);
            components.row_mut(component).assign(&direction);
        }
    }

    (components, explained_variance)
}

/// Eigenvalues below this fraction of the total are treated as zero.
const ZERO_VARIANCE: f64 = 1e-10;

/// Eigen-decomposition of a symmetric matrix using cyclic Jacobi
/// rotations.
///
/// Returns the eigenvalues and the matrix with the corresponding
/// eigenvectors as columns, in no particular order.
fn symmetric_eigen(mut a: Array2<f64>, config: &ProjectionConfig) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v: Array2<f64> = Array2::eye(n);
    let norm_sq = a.iter().map(|x| x * x).sum::<f64>();

    for _ in 0..config.max_iterations {
        let mut off_diagonal = 0.;
        for p in 0..n {
            for q in p + 1..n {
                off_diagonal += 2. * a[[p, q]] * a[[p, q]];
            }
        }

        if off_diagonal <= config.tolerance * config.tolerance * norm_sq {
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = a[[p, q]];
                if apq == 0. {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2. * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.).sqrt());
                let c = 1. / (t * t + 1.).sqrt();
                let s = t * c;

                rotate_columns(&mut a, p, q, c, s);
                rotate_rows(&mut a, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
    }

    (a.diag().to_owned(), v)
}

fn rotate_columns(m: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..m.nrows() {
        let (mkp, mkq) = (m[[k, p]], m[[k, q]]);
        m[[k, p]] = c * mkp - s * mkq;
        m[[k, q]] = s * mkp + c * mkq;
    }
}

fn rotate_rows(m: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for k in 0..m.ncols() {
        let (mpk, mqk) = (m[[p, k]], m[[q, k]]);
        m[[p, k]] = c * mpk - s * mqk;
        m[[q, k]] = s * mpk + c * mqk;
    }
}

/// Unit vector orthogonal to the given rows.
///
/// Used as a component direction when the data has no remaining
/// variance. The standard basis vector that is least aligned with the
/// previous components is chosen.
fn orthogonal_basis_vector(previous: ArrayView2<f64>) -> Option<Array1<f64>> {
    let dims = previous.ncols();
    (0..dims)
        .map(|dim| {
            let mut basis = Array1::zeros(dims);
            basis[dim] = 1.;
            for component in previous.outer_iter() {
                let overlap = component.dot(&basis);
                basis.scaled_add(-overlap, &component);
            }
            basis
        })
        .map(|basis| (basis.dot(&basis).sqrt(), basis))
        .filter(|(norm, _)| *norm > 1e-6)
        .fold(None, |best: Option<(f64, Array1<f64>)>, (norm, basis)| match best {
            Some((best_norm, _)) if best_norm >= norm => best,
            _ => Some((norm, basis)),
        })
        .map(|(norm, basis)| basis / norm)
}

/// Flip the vector such that its largest-magnitude component is positive.
fn normalize_sign(v: &mut Array1<f64>) {
    let largest = v
        .iter()
        .cloned()
        .fold(0f64, |largest, c| if c.abs() > largest.abs() { c } else { largest });

    if largest < 0. {
        v.mapv_inplace(|c| -c);
    }
}
