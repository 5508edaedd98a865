//! Prelude exports the most commonly-used types and traits.

pub use crate::bias::{bias_project, BiasAxis, PoleRanking};

pub use crate::bootstrap::{
    bootstrap, BootstrapEvaluator, BootstrapReport, Summary, TrainError, Trainer, Trial,
    TrialFailure,
};

pub use crate::config::Config;

pub use crate::embeddings::{DuplicatePolicy, EmbeddingStore};

pub use crate::error::{Error, Result};

pub use crate::projection::{project_2d, Projection, ProjectionReducer};

pub use crate::similarity::{SimilarityEngine, WordSimilarityResult};

pub use crate::text::{read_text_file, LoadStats, ReadText};

pub use crate::vector::Vector;
