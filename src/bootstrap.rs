//! Bootstrap estimates of bias projections.
//!
//! Embeddings are retrained on resampled subsets of a corpus. The
//! spread of a target's projection across the retrained embeddings
//! indicates how stable the bias estimate is.

use std::collections::HashMap;
use std::error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use thiserror::Error;
use tracing::{debug, info};

use crate::bias::BiasAxis;
use crate::config::{BootstrapConfig, QueryConfig};
use crate::embeddings::EmbeddingStore;
use crate::error::{Error, Result};

/// Error returned by a trainer.
pub type TrainError = Box<dyn error::Error + Send + Sync>;

/// Trainer of embeddings on a subset of corpus units.
///
/// Trainers are called concurrently from several threads. Closures with
/// the signature `Fn(&[&U]) -> Result<EmbeddingStore, TrainError>`
/// implement this trait.
///
/// When a timeout is configured, each call runs on its own thread. A
/// call that exceeds the timeout is abandoned and keeps running in the
/// background until it returns, its result is discarded.
pub trait Trainer<U>: Sync {
    fn train(&self, units: &[&U]) -> std::result::Result<EmbeddingStore, TrainError>;
}

impl<U, F> Trainer<U> for F
where
    F: Fn(&[&U]) -> std::result::Result<EmbeddingStore, TrainError> + Sync,
{
    fn train(&self, units: &[&U]) -> std::result::Result<EmbeddingStore, TrainError> {
        self(units)
    }
}

/// Reason for skipping a trial or a target in a trial.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TrialFailure {
    #[error("Training failed: {0}")]
    Training(String),

    #[error("Training took {elapsed:?}, timeout: {timeout:?}")]
    Timeout { elapsed: Duration, timeout: Duration },

    #[error("Unknown token(s) in trained embeddings: {}", .0.join(", "))]
    MissingTokens(Vec<String>),

    #[error("Cannot project: {0}")]
    Projection(String),
}

impl From<Error> for TrialFailure {
    fn from(error: Error) -> Self {
        match error {
            Error::NotFound { tokens } => TrialFailure::MissingTokens(tokens),
            error => TrialFailure::Projection(error.to_string()),
        }
    }
}

/// Outcome of a single bootstrap trial.
#[derive(Clone, Debug)]
pub struct Trial {
    index: usize,
    sample: Vec<usize>,
    elapsed: Duration,
    failure: Option<TrialFailure>,
    estimates: Vec<(String, std::result::Result<f64, TrialFailure>)>,
}

impl Trial {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Indices of the corpus units the trainer was called with.
    pub fn sample(&self) -> &[usize] {
        &self.sample
    }

    /// Time spent waiting for the trainer.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Failure that skipped the trial for every target.
    pub fn failure(&self) -> Option<&TrialFailure> {
        self.failure.as_ref()
    }

    pub fn is_skipped(&self) -> bool {
        self.failure.is_some()
    }

    /// Estimates or skip reasons, in target order.
    pub fn estimates(&self) -> &[(String, std::result::Result<f64, TrialFailure>)] {
        &self.estimates
    }

    pub fn estimate(&self, target: &str) -> Option<&std::result::Result<f64, TrialFailure>> {
        self.estimates
            .iter()
            .find(|(word, _)| word == target)
            .map(|(_, estimate)| estimate)
    }
}

/// Summary of the estimates of a target across trials.
#[derive(Clone, Debug, PartialEq)]
pub struct Summary {
    /// Mean of the successful estimates.
    pub mean: Option<f64>,

    /// Sample standard deviation of the successful estimates.
    pub std_dev: Option<f64>,

    /// Percentile interval of the successful estimates.
    pub interval: Option<(f64, f64)>,

    /// Number of successful estimates.
    pub n: usize,

    /// Number of trials in which the target was skipped.
    pub skipped: usize,
}

impl Summary {
    /// Summarize estimates.
    ///
    /// The interval covers `confidence` of the estimates, interpolating
    /// linearly between order statistics. `confidence` is clamped to
    /// *[0, 1]*.
    pub fn from_estimates(estimates: &[f64], skipped: usize, confidence: f64) -> Self {
        let n = estimates.len();
        if n == 0 {
            return Summary {
                mean: None,
                std_dev: None,
                interval: None,
                n,
                skipped,
            };
        }

        let mean = estimates.iter().sum::<f64>() / n as f64;
        let std_dev = if n == 1 {
            0.
        } else {
            let sum_sq: f64 = estimates.iter().map(|&v| (v - mean).powi(2)).sum();
            (sum_sq / (n - 1) as f64).sqrt()
        };

        let mut sorted = estimates.to_owned();
        sorted.sort_by(f64::total_cmp);
        let tail = (1. - confidence.max(0.).min(1.)) / 2.;
        let interval = (percentile(&sorted, tail), percentile(&sorted, 1. - tail));

        Summary {
            mean: Some(mean),
            std_dev: Some(std_dev),
            interval: Some(interval),
            n,
            skipped,
        }
    }
}

/// Percentile of sorted values, `p` is clamped to *[0, 1]*.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let p = p.max(0.).min(1.);
    let pos = p * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

/// Result of a bootstrap run.
#[derive(Clone, Debug)]
pub struct BootstrapReport {
    axis_low: String,
    axis_high: String,
    targets: Vec<String>,
    trials: Vec<Trial>,
    summaries: HashMap<String, Summary>,
}

impl BootstrapReport {
    pub fn axis(&self) -> (&str, &str) {
        (&self.axis_low, &self.axis_high)
    }

    /// Trials in trial order.
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Get the summary of a target.
    pub fn summary(&self, target: &str) -> Option<&Summary> {
        self.summaries.get(target)
    }

    /// Iterate over the targets and their summaries, in target order.
    pub fn summaries(&self) -> impl Iterator<Item = (&str, &Summary)> {
        self.targets
            .iter()
            .map(move |target| (target.as_str(), &self.summaries[target]))
    }

    /// Number of trials skipped for every target.
    pub fn n_skipped_trials(&self) -> usize {
        self.trials.iter().filter(|trial| trial.is_skipped()).count()
    }

    pub fn into_summaries(self) -> HashMap<String, Summary> {
        self.summaries
    }
}

/// Bootstrap evaluator for bias projections.
#[derive(Clone, Debug, Default)]
pub struct BootstrapEvaluator {
    config: BootstrapConfig,
    query: QueryConfig,
}

impl BootstrapEvaluator {
    pub fn new(config: BootstrapConfig) -> Self {
        BootstrapEvaluator {
            config,
            query: QueryConfig::default(),
        }
    }

    /// Use `query` for the zero-norm tolerance of projections.
    pub fn with_query_config(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Estimate the projections of `targets` on the axis
    /// *axis_high - axis_low* across resampled trials.
    ///
    /// The configuration is validated before any trial runs. Failing
    /// trials are recorded in the report and never abort the run.
    ///
    /// The corpus units are copied once so that timed-out trainer calls
    /// can outlive the run.
    pub fn run<U, T>(
        &self,
        corpus_units: &[U],
        trainer: T,
        axis_low: &str,
        axis_high: &str,
        targets: &[&str],
    ) -> Result<BootstrapReport>
    where
        U: Clone + Send + Sync + 'static,
        T: Trainer<U> + Send + 'static,
    {
        self.config.validate()?;
        if corpus_units.is_empty() {
            return Err(Error::Config(
                "bootstrap requires at least one corpus unit".to_string(),
            ));
        }

        let targets: Vec<String> = targets.iter().unique().map(|&t| t.to_owned()).collect();
        let n_threads = self.config.threads();
        let sample_size = self.sample_size(corpus_units.len());

        info!(
            trials = self.config.trials,
            sample_size,
            n_threads,
            "Starting bootstrap on {} corpus units",
            corpus_units.len()
        );

        let corpus = Arc::new(corpus_units.to_vec());
        let trainer = Arc::new(trainer);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|err| Error::Config(format!("Cannot build thread pool: {}", err)))?;

        let trials: Vec<Trial> = pool.install(|| {
            (0..self.config.trials)
                .into_par_iter()
                .map(|index| {
                    self.run_trial(
                        index,
                        &corpus,
                        sample_size,
                        &trainer,
                        axis_low,
                        axis_high,
                        &targets,
                    )
                })
                .collect()
        });

        let summaries: HashMap<String, Summary> = targets
            .iter()
            .enumerate()
            .map(|(idx, target)| {
                let mut estimates = Vec::with_capacity(trials.len());
                let mut skipped = 0;
                for trial in &trials {
                    match trial.estimates[idx].1 {
                        Ok(estimate) => estimates.push(estimate),
                        Err(_) => skipped += 1,
                    }
                }

                (
                    target.clone(),
                    Summary::from_estimates(&estimates, skipped, self.config.confidence),
                )
            })
            .collect();

        let report = BootstrapReport {
            axis_low: axis_low.to_owned(),
            axis_high: axis_high.to_owned(),
            targets,
            trials,
            summaries,
        };

        info!(
            skipped = report.n_skipped_trials(),
            "Finished {} bootstrap trials",
            report.trials.len()
        );

        Ok(report)
    }

    fn sample_size(&self, n_units: usize) -> usize {
        ((self.config.sample_fraction * n_units as f64).round() as usize).max(1)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_trial<U, T>(
        &self,
        index: usize,
        corpus: &Arc<Vec<U>>,
        sample_size: usize,
        trainer: &Arc<T>,
        axis_low: &str,
        axis_high: &str,
        targets: &[String],
    ) -> Trial
    where
        U: Send + Sync + 'static,
        T: Trainer<U> + Send + 'static,
    {
        let mut rng = XorShiftRng::seed_from_u64(self.config.seed.wrapping_add(index as u64));
        let sample: Vec<usize> = (0..sample_size)
            .map(|_| rng.gen_range(0..corpus.len()))
            .collect();

        let start = Instant::now();
        let store = match self.config.timeout() {
            Some(timeout) => train_with_timeout(index, corpus, &sample, trainer, timeout),
            None => train(corpus.as_slice(), &sample, &**trainer),
        };
        let elapsed = start.elapsed();

        let estimates = store.and_then(|store| {
            let axis = BiasAxis::with_config(&store, axis_low, axis_high, &self.query)?;
            Ok(axis
                .project_many(targets.iter().map(String::as_str))
                .into_iter()
                .map(|(target, estimate)| (target.to_owned(), estimate.map_err(TrialFailure::from)))
                .collect::<Vec<_>>())
        });

        match estimates {
            Ok(estimates) => {
                debug!(trial = index, ?elapsed, "Trial finished");
                Trial {
                    index,
                    sample,
                    elapsed,
                    failure: None,
                    estimates,
                }
            }
            Err(failure) => {
                debug!(trial = index, ?elapsed, "Trial skipped: {}", failure);
                Trial {
                    index,
                    sample,
                    elapsed,
                    estimates: targets
                        .iter()
                        .map(|target| (target.clone(), Err(failure.clone())))
                        .collect(),
                    failure: Some(failure),
                }
            }
        }
    }
}

type Trained = thread::Result<std::result::Result<EmbeddingStore, TrainError>>;

fn train<U, T>(
    corpus: &[U],
    sample: &[usize],
    trainer: &T,
) -> std::result::Result<EmbeddingStore, TrialFailure>
where
    T: Trainer<U> + ?Sized,
{
    let units: Vec<&U> = sample.iter().map(|&idx| &corpus[idx]).collect();
    check_trained(panic::catch_unwind(AssertUnwindSafe(|| trainer.train(&units))))
}

/// Train on a separate thread, giving up after `timeout`.
///
/// The trainer thread is detached when the timeout expires.
fn train_with_timeout<U, T>(
    index: usize,
    corpus: &Arc<Vec<U>>,
    sample: &[usize],
    trainer: &Arc<T>,
    timeout: Duration,
) -> std::result::Result<EmbeddingStore, TrialFailure>
where
    U: Send + Sync + 'static,
    T: Trainer<U> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<Trained>();
    let corpus = Arc::clone(corpus);
    let trainer = Arc::clone(trainer);
    let sample = sample.to_owned();

    let start = Instant::now();
    thread::Builder::new()
        .name(format!("bootstrap-trial-{}", index))
        .spawn(move || {
            let units: Vec<&U> = sample.iter().map(|&idx| &corpus[idx]).collect();
            let trained = panic::catch_unwind(AssertUnwindSafe(|| trainer.train(&units)));
            // The receiver is gone if the trial timed out.
            let _ = sender.send(trained);
        })
        .map_err(|err| TrialFailure::Training(format!("Cannot start trainer thread: {}", err)))?;

    match receiver.recv_timeout(timeout) {
        Ok(trained) => check_trained(trained),
        Err(RecvTimeoutError::Timeout) => {
            let elapsed = start.elapsed();
            debug!(trial = index, ?elapsed, "Abandoning trainer call");
            Err(TrialFailure::Timeout { elapsed, timeout })
        }
        Err(RecvTimeoutError::Disconnected) => Err(TrialFailure::Training(
            "trainer thread exited without a result".to_string(),
        )),
    }
}

fn check_trained(trained: Trained) -> std::result::Result<EmbeddingStore, TrialFailure> {
    match trained {
        Ok(Ok(store)) => Ok(store),
        Ok(Err(err)) => Err(TrialFailure::Training(err.to_string())),
        Err(_) => Err(TrialFailure::Training("trainer panicked".to_string())),
    }
}

/// Bootstrap the projections of `targets` with default settings.
///
/// Returns the summary of every target.
pub fn bootstrap<U, T>(
    corpus_units: &[U],
    trainer: T,
    sample_fraction: f64,
    trials: usize,
    axis_low: &str,
    axis_high: &str,
    targets: &[&str],
) -> Result<HashMap<String, Summary>>
where
    U: Clone + Send + Sync + 'static,
    T: Trainer<U> + Send + 'static,
{
    let config = BootstrapConfig {
        sample_fraction,
        trials,
        ..BootstrapConfig::default()
    };

    BootstrapEvaluator::new(config)
        .run(corpus_units, trainer, axis_low, axis_high, targets)
        .map(BootstrapReport::into_summaries)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use approx::assert_abs_diff_eq;

    use super::{bootstrap, BootstrapEvaluator, Summary, TrainError, TrialFailure};
    use crate::bias::bias_project;
    use crate::config::BootstrapConfig;
    use crate::embeddings::EmbeddingStore;
    use crate::error::Error;
    use crate::tests::toy_store;

    fn config(trials: usize, sample_fraction: f64) -> BootstrapConfig {
        BootstrapConfig {
            trials,
            sample_fraction,
            n_threads: 2,
            ..BootstrapConfig::default()
        }
    }

    fn fixed_trainer(_units: &[&u64]) -> Result<EmbeddingStore, TrainError> {
        Ok(toy_store())
    }

    // Moves queen along the third dimension by the sum of the sampled units.
    fn shifting_trainer(units: &[&u64]) -> Result<EmbeddingStore, TrainError> {
        let shift = units.iter().map(|&&unit| unit as f64).sum::<f64>() / 100.;
        Ok(EmbeddingStore::from_records(vec![
            ("king", vec![1., 0., 1.]),
            ("man", vec![0.9, 0., 0.8]),
            ("woman", vec![0.1, 0.9, 0.2]),
            ("queen", vec![0.2, 0.9, 1.0 + shift]),
        ])?)
    }

    #[test]
    fn single_full_trial_has_zero_spread() {
        let units: Vec<u64> = (0..10).collect();
        let evaluator = BootstrapEvaluator::new(config(1, 1.0));
        let report = evaluator
            .run(&units, fixed_trainer, "man", "woman", &["queen"])
            .unwrap();

        let expected = bias_project(&toy_store(), "man", "woman", "queen").unwrap();
        let summary = report.summary("queen").unwrap();
        assert_eq!(summary.n, 1);
        assert_eq!(summary.skipped, 0);
        assert_abs_diff_eq!(summary.mean.unwrap(), expected, epsilon = 1e-12);
        assert_eq!(summary.std_dev, Some(0.));
        assert_eq!(summary.interval, Some((expected, expected)));

        assert_eq!(report.trials().len(), 1);
        assert_eq!(report.trials()[0].sample().len(), 10);
        assert!(report.trials()[0]
            .sample()
            .iter()
            .all(|&idx| idx < units.len()));
    }

    #[test]
    fn deterministic_trainer_has_zero_spread() {
        let units: Vec<u64> = (0..10).collect();
        let report = BootstrapEvaluator::new(config(8, 0.5))
            .run(&units, fixed_trainer, "man", "woman", &["queen", "king"])
            .unwrap();

        for (_, summary) in report.summaries() {
            assert_eq!(summary.n, 8);
            assert_abs_diff_eq!(summary.std_dev.unwrap(), 0., epsilon = 1e-12);
        }
    }

    #[test]
    fn sample_size_is_rounded_and_at_least_one() {
        let units: Vec<u64> = (0..10).collect();

        let report = BootstrapEvaluator::new(config(2, 0.25))
            .run(&units, fixed_trainer, "man", "woman", &["queen"])
            .unwrap();
        assert!(report.trials().iter().all(|t| t.sample().len() == 3));

        let report = BootstrapEvaluator::new(config(2, 0.01))
            .run(&units, fixed_trainer, "man", "woman", &["queen"])
            .unwrap();
        assert!(report.trials().iter().all(|t| t.sample().len() == 1));
    }

    #[test]
    fn failed_training_skips_trial() {
        let units: Vec<u64> = (0..10).collect();
        let calls = Arc::new(AtomicUsize::new(0));
        let trainer_calls = Arc::clone(&calls);
        let trainer = move |_units: &[&u64]| -> Result<EmbeddingStore, TrainError> {
            if trainer_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("out of memory".into())
            } else {
                Ok(toy_store())
            }
        };

        let report = BootstrapEvaluator::new(config(5, 1.0))
            .run(&units, trainer, "man", "woman", &["queen"])
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(report.n_skipped_trials(), 1);
        let summary = report.summary("queen").unwrap();
        assert_eq!(summary.n, 4);
        assert_eq!(summary.skipped, 1);

        let failed = report.trials().iter().find(|t| t.is_skipped()).unwrap();
        assert_eq!(
            failed.failure(),
            Some(&TrialFailure::Training("out of memory".to_string()))
        );
    }

    #[test]
    fn panicking_trainer_skips_trial() {
        let units: Vec<u64> = (0..4).collect();
        let trainer = |_units: &[&u64]| -> Result<EmbeddingStore, TrainError> {
            panic!("trainer bug");
        };

        let report = BootstrapEvaluator::new(config(2, 1.0))
            .run(&units, trainer, "man", "woman", &["queen"])
            .unwrap();
        assert_eq!(report.n_skipped_trials(), 2);
        let summary = report.summary("queen").unwrap();
        assert_eq!(summary.mean, None);
        assert_eq!(summary.std_dev, None);
        assert_eq!(summary.interval, None);
    }

    #[test]
    fn missing_target_skips_only_target() {
        let units: Vec<u64> = (0..10).collect();
        let report = BootstrapEvaluator::new(config(3, 1.0))
            .run(&units, fixed_trainer, "man", "woman", &["queen", "princess"])
            .unwrap();

        assert_eq!(report.n_skipped_trials(), 0);
        assert_eq!(report.summary("queen").unwrap().n, 3);

        let princess = report.summary("princess").unwrap();
        assert_eq!(princess.n, 0);
        assert_eq!(princess.skipped, 3);
        assert_eq!(princess.mean, None);
        assert_eq!(
            report.trials()[0].estimate("princess"),
            Some(&Err(TrialFailure::MissingTokens(vec![
                "princess".to_string()
            ])))
        );
    }

    #[test]
    fn missing_anchor_skips_trial() {
        let units: Vec<u64> = (0..10).collect();
        let report = BootstrapEvaluator::new(config(3, 1.0))
            .run(&units, fixed_trainer, "boy", "woman", &["queen", "king"])
            .unwrap();

        assert_eq!(report.n_skipped_trials(), 3);
        for (_, summary) in report.summaries() {
            assert_eq!(summary.n, 0);
            assert_eq!(summary.skipped, 3);
        }
        assert_eq!(
            report.trials()[0].failure(),
            Some(&TrialFailure::MissingTokens(vec!["boy".to_string()]))
        );
    }

    #[test]
    fn slow_training_times_out() {
        let units: Vec<u64> = (0..10).collect();
        let trainer = |_units: &[&u64]| -> Result<EmbeddingStore, TrainError> {
            thread::sleep(Duration::from_millis(50));
            Ok(toy_store())
        };

        let with_timeout = BootstrapConfig {
            timeout_secs: Some(0.001),
            ..config(2, 1.0)
        };
        let report = BootstrapEvaluator::new(with_timeout)
            .run(&units, trainer, "man", "woman", &["queen"])
            .unwrap();

        assert_eq!(report.n_skipped_trials(), 2);
        assert!(matches!(
            report.trials()[0].failure(),
            Some(TrialFailure::Timeout { .. })
        ));
    }

    #[test]
    fn timeout_bounds_wall_time() {
        let units: Vec<u64> = (0..10).collect();
        let trainer = |_units: &[&u64]| -> Result<EmbeddingStore, TrainError> {
            thread::sleep(Duration::from_secs(1));
            Ok(toy_store())
        };

        let with_timeout = BootstrapConfig {
            timeout_secs: Some(0.05),
            n_threads: 1,
            ..config(2, 1.0)
        };

        let start = Instant::now();
        let report = BootstrapEvaluator::new(with_timeout)
            .run(&units, trainer, "man", "woman", &["queen"])
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(900));

        assert_eq!(report.n_skipped_trials(), 2);
        for trial in report.trials() {
            match trial.failure() {
                Some(TrialFailure::Timeout { elapsed, timeout }) => {
                    assert_eq!(*timeout, Duration::from_millis(50));
                    assert!(elapsed >= timeout);
                }
                other => panic!("expected timeout, got {:?}", other),
            }
        }
    }

    #[test]
    fn fast_training_within_timeout_succeeds() {
        let units: Vec<u64> = (0..10).collect();
        let with_timeout = BootstrapConfig {
            timeout_secs: Some(60.),
            ..config(3, 1.0)
        };

        let report = BootstrapEvaluator::new(with_timeout)
            .run(&units, fixed_trainer, "man", "woman", &["queen"])
            .unwrap();
        assert_eq!(report.n_skipped_trials(), 0);
        assert_eq!(report.summary("queen").unwrap().n, 3);
    }

    #[test]
    fn invalid_configuration_runs_no_trials() {
        let units: Vec<u64> = (0..10).collect();
        let calls = Arc::new(AtomicUsize::new(0));
        let trainer_calls = Arc::clone(&calls);
        let trainer = move |_units: &[&u64]| -> Result<EmbeddingStore, TrainError> {
            trainer_calls.fetch_add(1, Ordering::SeqCst);
            Ok(toy_store())
        };

        for invalid in vec![config(3, 0.), config(3, 1.5), config(0, 1.0)] {
            assert!(matches!(
                BootstrapEvaluator::new(invalid).run(&units, trainer.clone(), "man", "woman", &["queen"]),
                Err(Error::Config(_))
            ));
        }

        let empty: Vec<u64> = Vec::new();
        assert!(matches!(
            BootstrapEvaluator::new(config(3, 1.0)).run(&empty, trainer, "man", "woman", &["queen"]),
            Err(Error::Config(_))
        ));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn results_do_not_depend_on_threads() {
        let units: Vec<u64> = (0..20).collect();
        let run = |n_threads| {
            let threaded = BootstrapConfig {
                n_threads,
                ..config(12, 0.5)
            };
            BootstrapEvaluator::new(threaded)
                .run(&units, shifting_trainer, "man", "woman", &["queen"])
                .unwrap()
        };

        let single = run(1);
        let multi = run(4);

        for (t1, t2) in single.trials().iter().zip(multi.trials()) {
            assert_eq!(t1.index(), t2.index());
            assert_eq!(t1.sample(), t2.sample());
            assert_eq!(t1.estimates(), t2.estimates());
        }
        assert_eq!(single.summary("queen"), multi.summary("queen"));

        // Different samples give different estimates.
        assert!(single.summary("queen").unwrap().std_dev.unwrap() > 0.);
    }

    #[test]
    fn bootstrap_with_defaults() {
        let units: Vec<u64> = (0..10).collect();
        let summaries = bootstrap(&units, fixed_trainer, 1.0, 3, "man", "woman", &["queen"]).unwrap();
        assert_eq!(summaries["queen"].n, 3);
        assert_eq!(summaries["queen"].skipped, 0);
    }

    #[test]
    fn summary_statistics() {
        let summary = Summary::from_estimates(&[4., 1., 3., 2.], 1, 0.5);
        assert_eq!(summary.n, 4);
        assert_eq!(summary.skipped, 1);
        assert_abs_diff_eq!(summary.mean.unwrap(), 2.5);
        assert_abs_diff_eq!(summary.std_dev.unwrap(), (5f64 / 3.).sqrt(), epsilon = 1e-12);

        let (lower, upper) = summary.interval.unwrap();
        assert_abs_diff_eq!(lower, 1.75, epsilon = 1e-12);
        assert_abs_diff_eq!(upper, 3.25, epsilon = 1e-12);

        // Out-of-range confidence levels are clamped.
        let wide = Summary::from_estimates(&[4., 1., 3., 2.], 0, 1.5);
        assert_eq!(wide.interval, Some((1., 4.)));
        let narrow = Summary::from_estimates(&[4., 1., 3., 2.], 0, -1.);
        assert_eq!(narrow.interval, Some((2.5, 2.5)));

        let empty = Summary::from_estimates(&[], 2, 0.95);
        assert_eq!(empty.mean, None);
        assert_eq!(empty.n, 0);
        assert_eq!(empty.skipped, 2);
    }
}
