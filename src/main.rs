use std::collections::HashSet;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use embedding_bias::prelude::*;
use itertools::Itertools;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Query word embeddings: neighbors, analogies, bias axes, and
/// 2-D projections.
#[derive(Parser)]
#[command(name = "embedding-bias", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read at most N embeddings
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Skip malformed lines instead of failing
    #[arg(long)]
    lenient: bool,

    /// Keep the first vector of repeated tokens
    #[arg(long)]
    keep_first: bool,

    /// Embeddings in word2vec/GloVe text format
    #[arg(value_name = "EMBEDDINGS")]
    embeddings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the nearest neighbors of a token
    Nearest {
        token: String,

        /// Number of neighbors (default: from the configuration)
        #[arg(short)]
        k: Option<usize>,

        /// Do not list the token itself
        #[arg(long)]
        exclude_self: bool,
    },

    /// Solve the analogy A is to B as C is to ?
    Analogy {
        a: String,
        b: String,
        c: String,

        /// Number of answers (default: from the configuration)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Project targets onto the axis HIGH - LOW
    Bias {
        low: String,
        high: String,

        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Project tokens onto their first two principal components
    Project {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if cli.limit.is_some() {
        config.load.limit = cli.limit;
    }
    config.load.lenient |= cli.lenient;
    if cli.keep_first {
        config.load.duplicates = DuplicatePolicy::KeepFirst;
    }

    let (store, stats) = read_text_file(&cli.embeddings, &config.load)?;
    info!(
        records = stats.records,
        skipped = stats.skipped_lines,
        "Read embeddings from {}",
        cli.embeddings.display()
    );

    match cli.command {
        Command::Nearest {
            token,
            k,
            exclude_self,
        } => {
            let engine = SimilarityEngine::with_config(&store, config.query.clone());
            let mut exclude = HashSet::new();
            if exclude_self {
                exclude.insert(token.as_str());
            }

            let results = engine.nearest(&token, k.unwrap_or(config.query.k), &exclude)?;
            print_results(&results);
        }
        Command::Analogy { a, b, c, k } => {
            let engine = SimilarityEngine::with_config(&store, config.query.clone());
            let exclude: HashSet<&str> = [a.as_str(), b.as_str(), c.as_str()]
                .iter()
                .cloned()
                .collect();

            let results = engine.analogy(&a, &b, &c, k.unwrap_or(config.query.k), &exclude)?;
            print_results(&results);
        }
        Command::Bias { low, high, targets } => {
            let axis = BiasAxis::with_config(&store, &low, &high, &config.query)?;

            let mut missing = Vec::new();
            for (target, projection) in axis.project_many(targets.iter().map(String::as_str)) {
                match projection {
                    Ok(projection) => println!("{}\t{:.6}", target, projection),
                    Err(_) => missing.push(target),
                }
            }

            if !missing.is_empty() {
                return Err(Error::not_found(missing));
            }
        }
        Command::Project { tokens } => {
            let reducer = ProjectionReducer::with_config(&store, config.projection.clone());
            let projection = reducer.project_2d(tokens.iter().map(String::as_str))?;

            let [ratio1, ratio2] = projection.explained_variance_ratio();
            info!("Explained variance ratio: {:.4}, {:.4}", ratio1, ratio2);

            for (token, (x, y)) in projection.iter() {
                println!("{}\t{:.6}\t{:.6}", token, x, y);
            }
        }
    }

    Ok(())
}

fn print_results(results: &[WordSimilarityResult]) {
    for result in results {
        let mut fields = vec![
            result.word().to_owned(),
            format!("{:.6}", result.cosine_similarity()),
        ];
        if result.degenerate() {
            fields.push("degenerate".to_owned());
        }

        println!("{}", fields.iter().join("\t"));
    }
}
