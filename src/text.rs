//! Reader for text embedding tables.
//!
//! Each line of a table contains a token followed by its vector
//! components:
//!
//! *token component_1 component_2 ... component_n*
//!
//! Components are separated by ASCII whitespace or commas, so both the
//! GloVe format and comma-separated tables are accepted. The table may
//! start with a header line holding the shape of the embedding matrix,
//! as in word2vec's text output:
//!
//! *vocab_size n_components*
//!
//! For example:
//!
//! ```
//! use std::io::Cursor;
//!
//! use embedding_bias::prelude::*;
//!
//! let mut reader = Cursor::new("2 3\nking 1 0 1\nqueen 0.2 0.9 1.0\n");
//! let store = EmbeddingStore::read_text(&mut reader).unwrap();
//! assert_eq!(store.dimension(), 3);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::config::LoadConfig;
use crate::embeddings::{EmbeddingStore, StoreBuilder};
use crate::error::{Error, Result};

/// Statistics of a load.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadStats {
    /// Number of records in the store.
    pub records: usize,

    /// Malformed lines skipped in lenient mode.
    pub skipped_lines: usize,

    /// Repeated tokens that were dropped.
    pub duplicates: usize,

    /// Shape declared by the header line, if any.
    pub header: Option<(usize, usize)>,
}

/// Method to construct an `EmbeddingStore` from a text table.
pub trait ReadText<R>
where
    Self: Sized,
    R: BufRead,
{
    /// Read the embeddings with the default options.
    fn read_text(reader: &mut R) -> Result<Self> {
        Self::read_text_with(reader, &LoadConfig::default()).map(|(store, _)| store)
    }

    /// Read the embeddings with the given options.
    ///
    /// Reading stops after `config.limit` records; the remainder of the
    /// stream is not consumed.
    fn read_text_with(reader: &mut R, config: &LoadConfig) -> Result<(Self, LoadStats)>;
}

impl<R> ReadText<R> for EmbeddingStore
where
    R: BufRead,
{
    fn read_text_with(reader: &mut R, config: &LoadConfig) -> Result<(Self, LoadStats)> {
        read_embeds(reader, config)
    }
}

/// Read a text embedding table from a file.
pub fn read_text_file(
    path: impl AsRef<Path>,
    config: &LoadConfig,
) -> Result<(EmbeddingStore, LoadStats)> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        Error::read_error(
            format!("Cannot open embedding file {}", path.display()),
            e,
        )
    })?;

    EmbeddingStore::read_text_with(&mut BufReader::new(f), config)
}

fn read_embeds<R>(reader: &mut R, config: &LoadConfig) -> Result<(EmbeddingStore, LoadStats)>
where
    R: BufRead,
{
    let mut stats = LoadStats::default();
    let mut builder = StoreBuilder::new(None, 0, config.duplicates);
    let mut first_line = true;
    let mut line_no = 0;
    let mut buf = Vec::new();

    loop {
        if config.limit.map_or(false, |limit| builder.len() >= limit) {
            break;
        }

        buf.clear();
        match reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::read_error("Cannot read line from embedding file", e))?
        {
            0 => break,
            _ => line_no += 1,
        }

        let line = match decode_line(&buf, config.lossy, line_no) {
            Ok(line) => line,
            Err(err) => {
                skip_or_fail(err, config, &mut stats)?;
                continue;
            }
        };
        let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if line.trim().is_empty() {
            continue;
        }

        if first_line {
            first_line = false;
            if let Some((n_words, dims)) = parse_header(line) {
                let capacity = config.limit.map_or(n_words, |limit| n_words.min(limit));
                stats.header = Some((n_words, dims));
                builder = StoreBuilder::new(Some(dims), capacity, config.duplicates);
                continue;
            }
        }

        if let Err(err) = parse_record(line, line_no)
            .and_then(|(token, components)| builder.push(token, components, line_no))
        {
            skip_or_fail(err, config, &mut stats)?;
        }
    }

    stats.duplicates = builder.n_duplicates();
    let dims = builder.dims().unwrap_or(0);
    let store = builder.finish()?;
    stats.records = store.size();

    if let Some((n_words, _)) = stats.header {
        let n_lines = stats.records + stats.duplicates + stats.skipped_lines;
        if config.limit.is_none() && n_lines != n_words {
            warn!(
                "Incorrect vocabulary size, expected: {}, got: {}",
                n_words, n_lines
            );
        }
    }

    info!(
        "Loaded {} embeddings with {} components ({} lines skipped, {} duplicates)",
        stats.records, dims, stats.skipped_lines, stats.duplicates
    );

    Ok((store, stats))
}

/// Malformed lines are skipped in lenient mode, all other errors are
/// fatal.
fn skip_or_fail(err: Error, config: &LoadConfig, stats: &mut LoadStats) -> Result<()> {
    match err {
        Error::Parse { line, desc } if config.lenient => {
            warn!("Skipping line {}: {}", line, desc);
            stats.skipped_lines += 1;
            Ok(())
        }
        err => Err(err),
    }
}

fn decode_line(buf: &[u8], lossy: bool, line_no: usize) -> Result<String> {
    if lossy {
        Ok(String::from_utf8_lossy(buf).into_owned())
    } else {
        String::from_utf8(buf.to_vec()).map_err(|e| {
            Error::parse_error(line_no, format!("Token contains invalid UTF-8: {}", e))
        })
    }
}

/// Interpret a line of two non-negative integers as the matrix shape.
fn parse_header(line: &str) -> Option<(usize, usize)> {
    let mut parts = line.split_ascii_whitespace();
    let n_words = parts.next()?.parse().ok()?;
    let dims = parts.next()?.parse().ok()?;

    if parts.next().is_some() {
        return None;
    }

    Some((n_words, dims))
}

/// Split a record into its token and components.
///
/// The token extends up to the first whitespace. If the token contains
/// a comma after its first character, the record is comma-separated and
/// the token ends at that comma. This keeps punctuation tokens such as
/// `,` intact.
fn parse_record(line: &str, line_no: usize) -> Result<(String, Vec<f64>)> {
    let line = line.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let token_end = line
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or_else(|| line.len());

    let (token, rest) = match line[..token_end].char_indices().skip(1).find(|&(_, c)| c == ',') {
        Some((comma, _)) => (&line[..comma], &line[comma + 1..]),
        None => (&line[..token_end], &line[token_end..]),
    };

    let components = rest
        .split(|c: char| c.is_ascii_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>().map_err(|e| {
                Error::parse_error(
                    line_no,
                    format!("Cannot parse vector component '{}': {}", part, e),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((token.to_owned(), components))
}
