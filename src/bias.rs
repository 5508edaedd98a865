//! Bias-axis projections.
//!
//! A bias axis is the difference vector between two anchor words, such
//! as *woman - man*. Projecting a word onto the axis gives the cosine
//! similarity between the difference vector and the word's vector.
//! Positive values indicate association with the high anchor, negative
//! values association with the low anchor.

use std::collections::HashSet;

use crate::config::QueryConfig;
use crate::embeddings::EmbeddingStore;
use crate::error::{Error, Result};
use crate::similarity::{SimilarityEngine, WordSimilarityResult};
use crate::vector::{cosine_with_norms, Vector};

/// Difference vector between two anchor words.
///
/// The axis borrows the store it was resolved against. It is
/// recomputed for every pair of anchors and never stored.
#[derive(Clone, Debug)]
pub struct BiasAxis<'a> {
    store: &'a EmbeddingStore,
    low: String,
    high: String,
    direction: Vector,
    direction_norm: f64,
    zero_norm_tolerance: f64,
}

impl<'a> BiasAxis<'a> {
    /// Resolve the axis *embedding(high) - embedding(low)*.
    ///
    /// Fails with `Error::NotFound` if an anchor is not in the store.
    pub fn new(store: &'a EmbeddingStore, low: &str, high: &str) -> Result<Self> {
        Self::with_config(store, low, high, &QueryConfig::default())
    }

    pub fn with_config(
        store: &'a EmbeddingStore,
        low: &str,
        high: &str,
        config: &QueryConfig,
    ) -> Result<Self> {
        let vectors = store.vectors(vec![low, high])?;
        let direction = vectors[1].sub(&vectors[0])?;
        let direction_norm = direction.l2_norm();

        Ok(BiasAxis {
            store,
            low: low.to_owned(),
            high: high.to_owned(),
            direction,
            direction_norm,
            zero_norm_tolerance: config.zero_norm_tolerance,
        })
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    /// The difference vector.
    pub fn direction(&self) -> &Vector {
        &self.direction
    }

    /// Project a word onto the axis.
    ///
    /// Returns the cosine similarity in *[-1, 1]* between the axis and
    /// the word, or *0* if the axis or the word has a zero norm. Fails
    /// with `Error::NotFound` if the word is not in the store.
    pub fn project(&self, target: &str) -> Result<f64> {
        let idx = self
            .store
            .vocab()
            .idx(target)
            .ok_or_else(|| Error::not_found(vec![target]))?;

        let dot = self.store.view().row(idx).dot(&self.direction.view());
        Ok(cosine_with_norms(
            dot,
            self.direction_norm,
            self.store.norm_at(idx),
            self.zero_norm_tolerance,
        )
        .unwrap_or(0.))
    }

    /// Project several words onto the axis.
    ///
    /// The results are in the order of `targets`. A missing word only
    /// fails its own projection.
    pub fn project_many<'b>(
        &self,
        targets: impl IntoIterator<Item = &'b str>,
    ) -> Vec<(&'b str, Result<f64>)> {
        targets
            .into_iter()
            .map(|target| (target, self.project(target)))
            .collect()
    }

    /// Get the `k` words most associated with each pole of the axis.
    ///
    /// Returns the words closest to the low pole and the words closest
    /// to the high pole. The anchors themselves are excluded.
    pub fn rank_vocabulary(
        &self,
        k: usize,
        config: &QueryConfig,
    ) -> Result<PoleRanking<'a>> {
        let engine = SimilarityEngine::with_config(self.store, config.clone());
        let exclude: HashSet<&str> = vec![self.low.as_str(), self.high.as_str()]
            .into_iter()
            .collect();

        let high = engine.top_k(&self.direction, k, &exclude)?;
        let low = engine.top_k(&self.direction.scale(-1.), k, &exclude)?;

        Ok(PoleRanking { low, high })
    }
}

/// Words most associated with the poles of a bias axis.
///
/// The similarities in `low` are relative to the reversed axis, so the
/// most strongly associated words have the highest similarity in both
/// lists.
#[derive(Clone, Debug)]
pub struct PoleRanking<'a> {
    pub low: Vec<WordSimilarityResult<'a>>,
    pub high: Vec<WordSimilarityResult<'a>>,
}

/// Project `target` onto the axis *embedding(axis_high) -
/// embedding(axis_low)*.
///
/// Fails with `Error::NotFound` listing every absent word.
pub fn bias_project(
    store: &EmbeddingStore,
    axis_low: &str,
    axis_high: &str,
    target: &str,
) -> Result<f64> {
    let missing: Vec<&str> = vec![axis_low, axis_high, target]
        .into_iter()
        .filter(|token| !store.contains(token))
        .collect();
    if !missing.is_empty() {
        return Err(Error::not_found(missing));
    }

    BiasAxis::new(store, axis_low, axis_high)?.project(target)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::{bias_project, BiasAxis};
    use crate::config::QueryConfig;
    use crate::embeddings::EmbeddingStore;
    use crate::error::Error;
    use crate::tests::{random_store, toy_store};

    #[test]
    fn project_queen_on_gender_axis() {
        let store = toy_store();

        // woman - man = [-0.8, 0.9, -0.6]
        let expected = (-0.8 * 0.2 + 0.9 * 0.9 + -0.6 * 1.0) / (1.81f64.sqrt() * 1.85f64.sqrt());
        assert_abs_diff_eq!(
            bias_project(&store, "man", "woman", "queen").unwrap(),
            expected,
            epsilon = 1e-9
        );
    }

    #[test]
    fn swapping_anchors_flips_the_sign() {
        let store = random_store(30, 6, 23);
        let words = store.vocab().words();
        let forward = BiasAxis::new(&store, &words[0], &words[1]).unwrap();
        let backward = BiasAxis::new(&store, &words[1], &words[0]).unwrap();

        for word in words {
            let projection = forward.project(word).unwrap();
            assert!(projection >= -1. && projection <= 1.);
            assert_abs_diff_eq!(projection, -backward.project(word).unwrap(), epsilon = 1e-12);
        }
    }

    #[test]
    fn anchors_project_to_their_poles() {
        let store = toy_store();
        let axis = BiasAxis::new(&store, "man", "woman").unwrap();
        assert!(axis.project("woman").unwrap() > 0.);
        assert!(axis.project("man").unwrap() < 0.);
        assert_eq!(axis.low(), "man");
        assert_eq!(axis.high(), "woman");
    }

    #[test]
    fn missing_words_fail() {
        let store = toy_store();

        match bias_project(&store, "man", "girl", "princess") {
            Err(Error::NotFound { tokens }) => assert_eq!(tokens, vec!["girl", "princess"]),
            other => panic!("expected NotFound, got {:?}", other),
        }

        assert!(matches!(
            bias_project(&store, "man", "woman", "princess"),
            Err(Error::NotFound { .. })
        ));

        let axis = BiasAxis::new(&store, "man", "woman").unwrap();
        let results = axis.project_many(vec!["queen", "princess", "king"]);
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(Error::NotFound { .. })));
        assert!(results[2].1.is_ok());
    }

    #[test]
    fn identical_anchors_give_zero() {
        let store = EmbeddingStore::from_records(vec![
            ("a", vec![1., 1.]),
            ("b", vec![1., 1.]),
            ("c", vec![0., 1.]),
        ])
        .unwrap();
        assert_eq!(bias_project(&store, "a", "b", "c").unwrap(), 0.);
    }

    #[test]
    fn rank_vocabulary_by_pole() {
        let store = toy_store();
        let axis = BiasAxis::new(&store, "man", "woman").unwrap();
        let ranking = axis.rank_vocabulary(1, &QueryConfig::default()).unwrap();

        assert_eq!(ranking.high[0].word(), "queen");
        assert_eq!(ranking.low[0].word(), "king");
    }

    #[test]
    fn axis_is_shareable_between_threads() {
        let store = random_store(100, 8, 29);
        let axis = BiasAxis::new(&store, "word0", "word1").unwrap();
        let sequential: Vec<f64> = store
            .vocab()
            .words()
            .iter()
            .map(|w| axis.project(w).unwrap())
            .collect();

        let parallel: Vec<f64> = std::thread::scope(|scope| {
            let handles: Vec<_> = store
                .vocab()
                .words()
                .chunks(25)
                .map(|chunk| {
                    let axis = &axis;
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|w| axis.project(w).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(sequential, parallel);
    }
}
