//! Immutable embedding store.

use std::iter::Enumerate;
use std::slice;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::norms::Norms;
use crate::vector::Vector;
use crate::vocab::Vocab;

/// Policy for tokens that occur more than once in a table.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Fail with `Error::DuplicateToken`.
    Error,

    /// Keep the vector of the first occurrence, ignore later ones.
    KeepFirst,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy::Error
    }
}

/// Word embeddings.
///
/// This data structure owns a vocabulary, an embedding matrix with one
/// row per vocabulary word, and the norm of every row. A store is
/// immutable after construction and can be shared between threads
/// without synchronization. Retraining or reloading always produces a
/// new store.
#[derive(Clone, Debug)]
pub struct EmbeddingStore {
    vocab: Vocab,
    matrix: Array2<f64>,
    norms: Norms,
}

impl EmbeddingStore {
    /// Construct a store from a vocabulary and a matrix.
    ///
    /// The matrix must have one row per vocabulary word.
    pub fn new(vocab: Vocab, matrix: Array2<f64>) -> Result<Self> {
        if vocab.len() != matrix.nrows() {
            return Err(Error::Config(format!(
                "Vocabulary size ({}) does not match the number of embeddings ({})",
                vocab.len(),
                matrix.nrows()
            )));
        }

        let norms = Norms::from_matrix(matrix.view());

        Ok(EmbeddingStore {
            vocab,
            matrix,
            norms,
        })
    }

    /// Construct a store from `(token, components)` records.
    ///
    /// The first record determines the dimensionality of the store.
    /// Duplicate tokens are an error.
    pub fn from_records<I, S>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        Self::from_records_with(records, DuplicatePolicy::Error)
    }

    /// Construct a store from `(token, components)` records, handling
    /// duplicate tokens according to `duplicates`.
    pub fn from_records_with<I, S>(records: I, duplicates: DuplicatePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut builder = StoreBuilder::new(None, 0, duplicates);
        for (idx, (token, components)) in records.into_iter().enumerate() {
            builder.push(token.into(), components, idx + 1)?;
        }

        builder.finish()
    }

    /// Get the vector of a token.
    pub fn vector(&self, token: &str) -> Result<Vector> {
        self.embedding(token)
            .map(Vector::from)
            .ok_or_else(|| Error::not_found(vec![token]))
    }

    /// Get a view of the vector of a token.
    pub fn embedding(&self, token: &str) -> Option<ArrayView1<f64>> {
        self.vocab.idx(token).map(|idx| self.matrix.row(idx))
    }

    /// Look up several tokens at once.
    ///
    /// Fails with `Error::NotFound` listing *every* absent token.
    pub fn vectors<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) -> Result<Vec<Vector>> {
        let mut vectors = Vec::new();
        let mut missing = Vec::new();

        for token in tokens {
            match self.embedding(token) {
                Some(embedding) => vectors.push(Vector::from(embedding)),
                None => missing.push(token),
            }
        }

        if !missing.is_empty() {
            return Err(Error::not_found(missing));
        }

        Ok(vectors)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.vocab.idx(token).is_some()
    }

    /// Number of tokens in the store.
    pub fn size(&self) -> usize {
        self.vocab.len()
    }

    /// Number of components of each vector.
    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    /// Euclidean norm of the vector of a token.
    pub fn norm(&self, token: &str) -> Result<f64> {
        self.vocab
            .idx(token)
            .map(|idx| self.norms.norm(idx))
            .ok_or_else(|| Error::not_found(vec![token]))
    }

    /// Euclidean norm of the vector at the given index.
    pub fn norm_at(&self, idx: usize) -> f64 {
        self.norms.norm(idx)
    }

    pub fn norms(&self) -> &Norms {
        &self.norms
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// View of the embedding matrix, one row per token.
    pub fn view(&self) -> ArrayView2<f64> {
        self.matrix.view()
    }

    /// Get an iterator over pairs of words and the corresponding embeddings.
    pub fn iter(&self) -> Iter {
        Iter {
            matrix: self.matrix.view(),
            inner: self.vocab.words().iter().enumerate(),
        }
    }
}

impl<'a> IntoIterator for &'a EmbeddingStore {
    type Item = (&'a str, ArrayView1<'a, f64>);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over embeddings.
pub struct Iter<'a> {
    matrix: ArrayView2<'a, f64>,
    inner: Enumerate<slice::Iter<'a, String>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, ArrayView1<'a, f64>);

    fn next(&mut self) -> Option<Self::Item> {
        let matrix = self.matrix;
        self.inner
            .next()
            .map(|(idx, word)| (word.as_str(), matrix.index_axis_move(Axis(0), idx)))
    }
}

/// Incremental construction of a store.
///
/// Components are appended to a flat buffer that becomes the
/// row-major embedding matrix.
pub(crate) struct StoreBuilder {
    vocab: Vocab,
    data: Vec<f64>,
    dims: Option<usize>,
    duplicates: DuplicatePolicy,
    n_duplicates: usize,
}

// Header counts are untrusted hints. Preallocation is capped, larger
// tables grow on demand.
const MAX_PREALLOCATED_WORDS: usize = 1 << 20;
const MAX_PREALLOCATED_COMPONENTS: usize = 1 << 24;

impl StoreBuilder {
    pub(crate) fn new(dims: Option<usize>, capacity: usize, duplicates: DuplicatePolicy) -> Self {
        let n_components = capacity
            .saturating_mul(dims.unwrap_or(0))
            .min(MAX_PREALLOCATED_COMPONENTS);
        let mut data = Vec::new();
        if data.try_reserve(n_components).is_err() {
            debug!("Cannot preallocate {} vector components", n_components);
        }

        StoreBuilder {
            vocab: Vocab::with_capacity(capacity.min(MAX_PREALLOCATED_WORDS)),
            data,
            dims,
            duplicates,
            n_duplicates: 0,
        }
    }

    pub(crate) fn dims(&self) -> Option<usize> {
        self.dims
    }

    pub(crate) fn len(&self) -> usize {
        self.vocab.len()
    }

    pub(crate) fn n_duplicates(&self) -> usize {
        self.n_duplicates
    }

    /// Add a record, `line` is used for error reporting.
    ///
    /// Returns `false` if the record was a duplicate that was dropped.
    pub(crate) fn push(&mut self, token: String, components: Vec<f64>, line: usize) -> Result<bool> {
        if components.is_empty() {
            return Err(Error::parse_error(
                line,
                format!("Token '{}' has no vector components", token),
            ));
        }

        if let Some(component) = components.iter().find(|c| !c.is_finite()) {
            return Err(Error::parse_error(
                line,
                format!("Non-finite vector component: {}", component),
            ));
        }

        let dims = *self.dims.get_or_insert(components.len());
        if components.len() != dims {
            return Err(Error::DimensionMismatch {
                line: Some(line),
                expected: dims,
                found: components.len(),
            });
        }

        if self.vocab.idx(&token).is_some() {
            return match self.duplicates {
                DuplicatePolicy::Error => Err(Error::DuplicateToken { token, line }),
                DuplicatePolicy::KeepFirst => {
                    debug!("Ignoring duplicate token '{}' on line {}", token, line);
                    self.n_duplicates += 1;
                    Ok(false)
                }
            };
        }

        self.vocab.push(token);
        self.data.extend(components);

        Ok(true)
    }

    pub(crate) fn finish(self) -> Result<EmbeddingStore> {
        let shape = (self.vocab.len(), self.dims.unwrap_or(0));
        let matrix = Array2::from_shape_vec(shape, self.data)
            .map_err(|e| Error::Config(format!("Cannot construct embedding matrix: {}", e)))?;

        EmbeddingStore::new(self.vocab, matrix)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::{DuplicatePolicy, EmbeddingStore};
    use crate::error::Error;
    use crate::tests::toy_store;

    #[test]
    fn accessors() {
        let store = toy_store();
        assert_eq!(store.size(), 4);
        assert_eq!(store.dimension(), 3);
        assert!(store.contains("queen"));
        assert!(!store.contains("Queen"));
        assert_eq!(store.vector("king").unwrap().to_vec(), vec![1., 0., 1.]);
        assert_abs_diff_eq!(store.norm("king").unwrap(), 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn norms_match_vectors() {
        let store = toy_store();
        for (word, embedding) in store.iter() {
            let expected = embedding.iter().map(|c| c * c).sum::<f64>().sqrt();
            assert_abs_diff_eq!(store.norm(word).unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn absent_tokens_are_not_found() {
        let store = toy_store();
        assert!(matches!(store.vector("prince"), Err(Error::NotFound { .. })));
        assert!(matches!(store.norm("prince"), Err(Error::NotFound { .. })));

        match store.vectors(vec!["king", "prince", "duke"]) {
            Err(Error::NotFound { tokens }) => assert_eq!(tokens, vec!["prince", "duke"]),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn second_record_with_other_dims_is_rejected() {
        let records = vec![("a", vec![1., 2., 3.]), ("b", vec![1., 2., 3., 4.])];
        match EmbeddingStore::from_records(records) {
            Err(Error::DimensionMismatch {
                line: Some(2),
                expected: 3,
                found: 4,
            }) => (),
            other => panic!("expected dimension mismatch, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_policy() {
        let records = || vec![("a", vec![1., 0.]), ("b", vec![0., 1.]), ("a", vec![5., 5.])];

        match EmbeddingStore::from_records(records()) {
            Err(Error::DuplicateToken { token, line: 3 }) => assert_eq!(token, "a"),
            other => panic!("expected duplicate token, got {:?}", other),
        }

        let store = EmbeddingStore::from_records_with(records(), DuplicatePolicy::KeepFirst).unwrap();
        assert_eq!(store.size(), 2);
        assert_eq!(store.vector("a").unwrap().to_vec(), vec![1., 0.]);
    }

    #[test]
    fn non_finite_components_are_rejected() {
        let records = vec![("a", vec![1., f64::NAN])];
        assert!(matches!(
            EmbeddingStore::from_records(records),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn empty_store() {
        let store = EmbeddingStore::from_records(Vec::<(String, Vec<f64>)>::new()).unwrap();
        assert_eq!(store.size(), 0);
        assert_eq!(store.dimension(), 0);
    }

    #[test]
    fn store_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmbeddingStore>();
    }
}
