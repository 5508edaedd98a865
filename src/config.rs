//! Configuration.
//!
//! All tunables of the loader, the query engines, and the bootstrap
//! evaluator can be read from a TOML file. Every field has a default,
//! so an empty file is a valid configuration:
//!
//! ```
//! use embedding_bias::config::Config;
//!
//! let config: Config = "[query]\nk = 5".parse().unwrap();
//! assert_eq!(config.query.k, 5);
//! assert_eq!(config.bootstrap.trials, 20);
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::embeddings::DuplicatePolicy;
use crate::error::{Error, Result};

/// Complete configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub load: LoadConfig,
    pub query: QueryConfig,
    pub projection: ProjectionConfig,
    pub bootstrap: BootstrapConfig,
}

impl Config {
    /// Read the configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|e| {
            Error::read_error(
                format!("Cannot read configuration file {}", path.display()),
                e,
            )
        })?;

        data.parse()
    }

    /// Check that all values are in range.
    pub fn validate(&self) -> Result<()> {
        self.query.validate()?;
        self.projection.validate()?;
        self.bootstrap.validate()
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)
            .map_err(|e| Error::Config(format!("Cannot deserialize TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Options for reading text embedding tables.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    /// Stop after this number of records.
    pub limit: Option<usize>,

    /// Skip and count malformed lines rather than failing.
    pub lenient: bool,

    /// Replace invalid UTF-8 by the replacement character.
    pub lossy: bool,

    /// Handling of repeated tokens.
    pub duplicates: DuplicatePolicy,
}

/// Options for similarity queries.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QueryConfig {
    /// Default number of results.
    pub k: usize,

    /// Norms at or below this value are treated as zero.
    pub zero_norm_tolerance: f64,

    /// Vocabularies larger than this are scanned in parallel.
    pub parallel_threshold: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            k: 10,
            zero_norm_tolerance: 1e-12,
            parallel_threshold: 1 << 16,
        }
    }
}

impl QueryConfig {
    fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::Config("query.k must be at least 1".to_string()));
        }

        if !(self.zero_norm_tolerance >= 0.) {
            return Err(Error::Config(
                "query.zero_norm_tolerance must be non-negative".to_string(),
            ));
        }

        if self.parallel_threshold == 0 {
            return Err(Error::Config(
                "query.parallel_threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Options for principal component projection.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectionConfig {
    /// Maximum number of Jacobi sweeps.
    pub max_iterations: usize,

    /// Convergence threshold on the off-diagonal norm, relative to the
    /// norm of the decomposed matrix.
    pub tolerance: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        ProjectionConfig {
            max_iterations: 1000,
            tolerance: 1e-12,
        }
    }
}

impl ProjectionConfig {
    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Config(
                "projection.max_iterations must be at least 1".to_string(),
            ));
        }

        if !(self.tolerance > 0.) {
            return Err(Error::Config(
                "projection.tolerance must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Options for bootstrap resampling.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Number of resampled trials.
    pub trials: usize,

    /// Fraction of the corpus units drawn per trial, in *(0, 1]*.
    pub sample_fraction: f64,

    /// Seed for resampling. Trial `i` uses a generator derived from
    /// the seed and `i`.
    pub seed: u64,

    /// Trainer calls that do not return within this many seconds are
    /// abandoned and their trials are recorded as skipped.
    pub timeout_secs: Option<f64>,

    /// Coverage of the percentile interval, in *(0, 1)*.
    pub confidence: f64,

    /// Number of worker threads, `0` uses the available parallelism.
    pub n_threads: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig {
            trials: 20,
            sample_fraction: 1.0,
            seed: 42,
            timeout_secs: None,
            confidence: 0.95,
            n_threads: 0,
        }
    }
}

impl BootstrapConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs_f64)
    }

    /// Number of worker threads to use.
    pub fn threads(&self) -> usize {
        if self.n_threads == 0 {
            num_cpus::get()
        } else {
            self.n_threads
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(Error::Config(
                "bootstrap.trials must be at least 1".to_string(),
            ));
        }

        if !(self.sample_fraction > 0. && self.sample_fraction <= 1.) {
            return Err(Error::Config(format!(
                "bootstrap.sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }

        if !(self.confidence > 0. && self.confidence < 1.) {
            return Err(Error::Config(format!(
                "bootstrap.confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }

        if let Some(timeout) = self.timeout_secs {
            if !(timeout > 0. && timeout.is_finite()) {
                return Err(Error::Config(format!(
                    "bootstrap.timeout_secs must be positive, got {}",
                    timeout
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use tempfile::NamedTempFile;

    use super::Config;
    use crate::embeddings::DuplicatePolicy;
    use crate::error::Error;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.query.k, 10);
        assert_eq!(config.load.duplicates, DuplicatePolicy::Error);
        assert_eq!(config.bootstrap.timeout(), None);
    }

    #[test]
    fn reads_all_sections() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
[load]
limit = 1000
lenient = true
duplicates = "keep-first"

[query]
k = 3
zero_norm_tolerance = 1e-9

[projection]
max_iterations = 50

[bootstrap]
trials = 5
sample_fraction = 0.5
seed = 7
timeout_secs = 1.5
n_threads = 2
"#
        )
        .unwrap();

        let config = Config::from_file(f.path()).unwrap();
        assert_eq!(config.load.limit, Some(1000));
        assert!(config.load.lenient);
        assert_eq!(config.load.duplicates, DuplicatePolicy::KeepFirst);
        assert_eq!(config.query.k, 3);
        assert_eq!(config.query.parallel_threshold, 1 << 16);
        assert_eq!(config.projection.max_iterations, 50);
        assert_eq!(config.bootstrap.trials, 5);
        assert_eq!(config.bootstrap.seed, 7);
        assert_eq!(config.bootstrap.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.bootstrap.threads(), 2);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            "[bootstrap]\nsample_fraction = 1.5".parse::<Config>(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            "[bootstrap]\ntrials = 0".parse::<Config>(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            "[query]\nk = 0".parse::<Config>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            "[query]\nneighbours = 3".parse::<Config>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        assert!(matches!(
            Config::from_file("/nonexistent/config.toml"),
            Err(Error::Read { .. })
        ));
    }
}
