use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use rand::{rngs::StdRng, SeedableRng};
use rnn_sentiment::{
    config::Config,
    dataset::{Corpus, JsonlCorpus, SyntheticCorpus},
    model::RecurrentKind,
    pipeline,
};
use tracing_subscriber::EnvFilter;

/// Train recurrent sentiment classifiers on integer-encoded reviews.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load, pad, build, train and report the best epoch.
    Train(TrainArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["data", "synthetic"])))]
struct TrainArgs {
    /// YAML run configuration. Defaults apply to every missing field.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Directory holding `train.jsonl` and `test.jsonl`.
    #[arg(long, value_name = "DIR")]
    data: Option<PathBuf>,
    /// Generate a synthetic corpus with this many training and test samples instead.
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,
    /// Override the seed of the configuration.
    #[arg(long)]
    seed: Option<u64>,
    /// Override the cell of every stacked layer.
    #[arg(long, value_enum)]
    kind: Option<Kind>,
    /// Override the maximum number of epochs.
    #[arg(long)]
    epochs: Option<usize>,
    /// Write the per-epoch history as JSON to this file.
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Simple,
    Lstm,
}

impl From<Kind> for RecurrentKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Simple => RecurrentKind::Simple,
            Kind::Lstm => RecurrentKind::Lstm,
        }
    }
}

impl TrainArgs {
    /// Replace the configured values the command line sets explicitly.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(kind) = self.kind {
            config.model.kind = kind.into();
            if let Some(layers) = &mut config.model.layers {
                layers.iter_mut().for_each(|layer| layer.kind = kind.into());
            }
        }
        if let Some(epochs) = self.epochs {
            config.training.epochs = epochs;
        }
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_yaml_file(path)?,
        None => Config::default(),
    };
    args.apply_overrides(&mut config);

    let corpus: Box<dyn Corpus> = match (args.data, args.synthetic) {
        (Some(dir), _) => Box::new(JsonlCorpus::new(dir)),
        (None, Some(n)) => Box::new(SyntheticCorpus::new(n, n, config.seed)),
        (None, None) => unreachable!("clap requires a data source"),
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let outcome = pipeline::run(&config, corpus.as_ref(), &mut rng)?;
    println!("{}", outcome.report);
    if let Some(test) = outcome.test {
        println!(
            "test split had a loss of {:.3} and an accuracy of {:.3}",
            test.loss, test.accuracy
        );
    }

    if let Some(path) = args.history {
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &outcome.history)
            .with_context(|| format!("failed to write the history to {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Train(args) => train(args),
    }
}
