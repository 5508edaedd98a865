//! A library for querying word embeddings.
//!
//! embedding-bias reads word embeddings in the word2vec/GloVe text
//! format and answers similarity queries against them: nearest
//! neighbors, analogies, projections onto bias axes, and 2-D PCA
//! projections. Bias estimates can be bootstrapped by retraining
//! embeddings on resampled corpora.
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use embedding_bias::prelude::*;
//!
//! let mut reader = BufReader::new(File::open("embeddings.txt").unwrap());
//! let store = EmbeddingStore::read_text(&mut reader).unwrap();
//!
//! let engine = SimilarityEngine::new(&store);
//! let exclude = ["king"].iter().cloned().collect();
//! for result in engine.nearest("king", 10, &exclude).unwrap() {
//!     println!("{}\t{}", result.word(), result.cosine_similarity());
//! }
//!
//! let bias = bias_project(&store, "man", "woman", "queen").unwrap();
//! println!("queen: {}", bias);
//! ```

pub mod bias;

pub mod bootstrap;

pub mod config;

pub mod embeddings;

pub mod error;

pub mod norms;

pub mod prelude;

pub mod projection;

pub mod similarity;

pub mod text;

pub mod vector;

pub mod vocab;
