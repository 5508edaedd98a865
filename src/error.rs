//! Error types.

use std::io;

use thiserror::Error;

/// `Result` type alias for operations that can fail.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Errors in loading embeddings or answering queries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error while reading an embedding table or configuration.
    #[error("{desc}: {error}")]
    Read {
        desc: String,
        #[source]
        error: io::Error,
    },

    /// Malformed record in a text embedding table.
    #[error("Cannot parse line {line}: {desc}")]
    Parse { line: usize, desc: String },

    /// A vector does not have the dimensionality of the store.
    #[error("{}", dimension_mismatch_message(.line, .expected, .found))]
    DimensionMismatch {
        line: Option<usize>,
        expected: usize,
        found: usize,
    },

    /// A token occurs more than once in a table.
    #[error("Duplicate token '{token}' on line {line}")]
    DuplicateToken { token: String, line: usize },

    /// One or more tokens are not in the store.
    #[error("Unknown token(s): {}", .tokens.join(", "))]
    NotFound { tokens: Vec<String> },

    /// Too few distinct tokens for a projection.
    #[error("At least two distinct tokens are required, got {distinct}")]
    InsufficientData { distinct: usize },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn read_error(desc: impl Into<String>, error: io::Error) -> Self {
        Error::Read {
            desc: desc.into(),
            error,
        }
    }

    pub fn parse_error(line: usize, desc: impl Into<String>) -> Self {
        Error::Parse {
            line,
            desc: desc.into(),
        }
    }

    pub fn not_found<S>(tokens: impl IntoIterator<Item = S>) -> Self
    where
        S: Into<String>,
    {
        Error::NotFound {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

fn dimension_mismatch_message(line: &Option<usize>, expected: &usize, found: &usize) -> String {
    match line {
        Some(line) => format!(
            "Incorrect embedding dimensionality on line {}, expected: {}, got: {}",
            line, expected, found
        ),
        None => format!(
            "Incorrect embedding dimensionality, expected: {}, got: {}",
            expected, found
        ),
    }
}
