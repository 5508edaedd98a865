//! Similarity and analogy queries.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::f64;
use std::ops::Range;

use ndarray::{s, ArrayView1};
use ordered_float::NotNan;
use rayon::prelude::*;
use tracing::debug;

use crate::config::QueryConfig;
use crate::embeddings::EmbeddingStore;
use crate::error::{Error, Result};
use crate::vector::{cosine_with_norms, l2_norm, Vector};

/// A word with its similarity.
///
/// This data structure is used to store a pair consisting of a word and
/// its cosine similarity to a query vector. If the query or the word has
/// a zero norm, the similarity is undefined. Such pairs get a similarity
/// of *0* and are marked as degenerate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WordSimilarityResult<'a> {
    similarity: NotNan<f64>,
    idx: usize,
    word: &'a str,
    degenerate: bool,
}

impl<'a> WordSimilarityResult<'a> {
    /// Get the word's similarity in angular similarity.
    pub fn angular_similarity(&self) -> f64 {
        1f64 - (self.similarity.acos() / f64::consts::PI)
    }

    /// Get the word's similarity in cosine similarity.
    pub fn cosine_similarity(&self) -> f64 {
        *self.similarity
    }

    /// Get the euclidean distance between the unit vectors.
    pub fn euclidean_distance(&self) -> f64 {
        // Trivially derived from the law of cosines
        (2f64 - 2f64 * self.cosine_similarity()).max(0.).sqrt()
    }

    /// Whether the similarity is undefined because of a zero norm.
    pub fn degenerate(&self) -> bool {
        self.degenerate
    }

    /// Vocabulary index of the word.
    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn word(&self) -> &'a str {
        self.word
    }
}

/// Better results order first: higher similarity, then lower
/// vocabulary index.
impl<'a> Ord for WordSimilarityResult<'a> {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.similarity.cmp(&self.similarity) {
            Ordering::Equal => self.idx.cmp(&other.idx),
            ordering => ordering,
        }
    }
}

impl<'a> PartialOrd for WordSimilarityResult<'a> {
    fn partial_cmp(&self, other: &WordSimilarityResult) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Exact nearest-neighbor search over an embedding store.
///
/// Every query scans the full vocabulary, computing the cosine
/// similarity between the query and each stored vector. The norms of
/// the stored vectors are taken from the store's norm cache. Only the
/// `k` best results are retained during the scan.
#[derive(Clone, Debug)]
pub struct SimilarityEngine<'a> {
    store: &'a EmbeddingStore,
    config: QueryConfig,
}

impl<'a> SimilarityEngine<'a> {
    /// Construct an engine with the default configuration.
    pub fn new(store: &'a EmbeddingStore) -> Self {
        Self::with_config(store, QueryConfig::default())
    }

    pub fn with_config(store: &'a EmbeddingStore, config: QueryConfig) -> Self {
        SimilarityEngine { store, config }
    }

    pub fn store(&self) -> &'a EmbeddingStore {
        self.store
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Find the `k` words that are most similar to the query vector.
    ///
    /// Words in `exclude` are never returned. No other words are
    /// excluded, so a query with the vector of a stored word will
    /// return that word itself unless it is in `exclude`.
    ///
    /// Results are sorted by descending similarity; words with the same
    /// similarity are in vocabulary order.
    pub fn top_k(
        &self,
        query: &Vector,
        k: usize,
        exclude: &HashSet<&str>,
    ) -> Result<Vec<WordSimilarityResult<'a>>> {
        let n_words = self.store.size();
        if k == 0 || n_words == 0 {
            return Ok(Vec::new());
        }

        // No more than the vocabulary can be returned.
        let k = k.min(n_words);

        if query.dims() != self.store.dimension() {
            return Err(Error::DimensionMismatch {
                line: None,
                expected: self.store.dimension(),
                found: query.dims(),
            });
        }

        let query_norm = l2_norm(query.view());

        let (results, n_degenerate) = if n_words > self.config.parallel_threshold {
            let chunk_size = self.config.parallel_threshold.max(1);
            let n_chunks = (n_words + chunk_size - 1) / chunk_size;
            (0..n_chunks)
                .into_par_iter()
                .map(|chunk| {
                    let range = chunk * chunk_size..((chunk + 1) * chunk_size).min(n_words);
                    self.scan(query.view(), query_norm, range, exclude, k)
                })
                .reduce(
                    || (BinaryHeap::new(), 0),
                    |(mut heap, n_degenerate), (partial, partial_degenerate)| {
                        for result in partial {
                            push_bounded(&mut heap, result, k);
                        }
                        (heap, n_degenerate + partial_degenerate)
                    },
                )
        } else {
            self.scan(query.view(), query_norm, 0..n_words, exclude, k)
        };

        if n_degenerate != 0 {
            debug!(
                "{} zero-norm pairs scored as 0 similarity (query norm: {})",
                n_degenerate, query_norm
            );
        }

        Ok(results.into_sorted_vec())
    }

    /// Find words that are similar to the query word.
    ///
    /// Fails with `Error::NotFound` if the word is not in the store.
    pub fn nearest(
        &self,
        word: &str,
        k: usize,
        exclude: &HashSet<&str>,
    ) -> Result<Vec<WordSimilarityResult<'a>>> {
        let query = self.store.vector(word)?;
        self.top_k(&query, k, exclude)
    }

    /// Perform an analogy query.
    ///
    /// This method returns words that are close in vector space to
    ///
    /// *embedding(a) - embedding(b) + embedding(c)*
    ///
    /// so that *a* is to *b* as the answer is to *c*. For example,
    /// `analogy("king", "man", "woman", ..)` looks for the word that
    /// relates to *woman* as *king* relates to *man*.
    ///
    /// Fails with `Error::NotFound` listing every query word that is
    /// not in the store. The query words are only excluded from the
    /// results if they are in `exclude`.
    pub fn analogy(
        &self,
        a: &str,
        b: &str,
        c: &str,
        k: usize,
        exclude: &HashSet<&str>,
    ) -> Result<Vec<WordSimilarityResult<'a>>> {
        let vectors = self.store.vectors(vec![a, b, c])?;
        let query = vectors[0].sub(&vectors[1])?.add(&vectors[2])?;
        self.top_k(&query, k, exclude)
    }

    /// Cosine similarity between two stored words.
    ///
    /// Returns *0* when either word has a zero norm.
    pub fn similarity(&self, word1: &str, word2: &str) -> Result<f64> {
        let idx1 = self.lookup(word1);
        let idx2 = self.lookup(word2);
        let (idx1, idx2) = match (idx1, idx2) {
            (Some(idx1), Some(idx2)) => (idx1, idx2),
            _ => {
                return Err(Error::not_found(
                    vec![(word1, idx1), (word2, idx2)]
                        .into_iter()
                        .filter(|(_, idx)| idx.is_none())
                        .map(|(word, _)| word),
                ))
            }
        };

        let view = self.store.view();
        let dot = view.row(idx1).dot(&view.row(idx2));
        Ok(cosine_with_norms(
            dot,
            self.store.norm_at(idx1),
            self.store.norm_at(idx2),
            self.config.zero_norm_tolerance,
        )
        .unwrap_or(0.))
    }

    fn lookup(&self, word: &str) -> Option<usize> {
        self.store.vocab().idx(word)
    }

    /// Score the words in `range`, retaining the best `limit`.
    fn scan(
        &self,
        query: ArrayView1<f64>,
        query_norm: f64,
        range: Range<usize>,
        skip: &HashSet<&str>,
        limit: usize,
    ) -> (BinaryHeap<WordSimilarityResult<'a>>, usize) {
        let store = self.store;
        let words = store.vocab().words();
        let offset = range.start;
        let capacity = limit.min(range.len()) + 1;
        let dots = store.view().slice(s![range, ..]).dot(&query);

        let mut results = BinaryHeap::with_capacity(capacity);
        let mut n_degenerate = 0;

        for (batch_idx, &dot) in dots.iter().enumerate() {
            let idx = offset + batch_idx;
            let word = words[idx].as_str();

            // Don't add words that we are explicitly asked to skip.
            if skip.contains(word) {
                continue;
            }

            let similarity = cosine_with_norms(
                dot,
                query_norm,
                store.norm_at(idx),
                self.config.zero_norm_tolerance,
            );

            let degenerate = similarity.is_none();
            if degenerate {
                n_degenerate += 1;
            }

            let word_similarity = WordSimilarityResult {
                similarity: NotNan::new(similarity.unwrap_or(0.)).expect("Encountered NaN"),
                idx,
                word,
                degenerate,
            };

            push_bounded(&mut results, word_similarity, limit);
        }

        (results, n_degenerate)
    }
}

/// Push a result on a heap holding the best `limit` results.
///
/// The top of the heap is the worst retained result.
fn push_bounded<'a>(
    results: &mut BinaryHeap<WordSimilarityResult<'a>>,
    word_similarity: WordSimilarityResult<'a>,
    limit: usize,
) {
    if results.len() < limit {
        results.push(word_similarity);
    } else if let Some(mut peek) = results.peek_mut() {
        if word_similarity < *peek {
            *peek = word_similarity
        }
    }
}
