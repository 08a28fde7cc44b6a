//! The full workflow: load, pad, build, train, report, then score the test split.

use rand::Rng;
use tracing::{info, info_span, warn};

use crate::{
    config::Config,
    dataset::{Corpus, Label, Sample},
    error::{Error, Result},
    model::Classifier,
    report::{History, Report},
    sequence::{pad_sequences, Padded, TokenId},
    train::{Metrics, Trainer},
};

/// Everything a run produces.
#[derive(Debug)]
pub struct Outcome {
    /// Metrics of every completed epoch.
    pub history: History,
    /// The best epoch of the history.
    pub report: Report,
    /// Metrics of the final parameters on the test split, when it is not empty.
    pub test: Option<Metrics>,
    /// The trained model, with the parameters of the last epoch.
    pub model: Classifier,
}

fn pad(config: &Config, samples: &[Sample]) -> Result<(Padded, Vec<Label>)> {
    let tokens: Vec<&[TokenId]> = samples.iter().map(|s| s.tokens.as_slice()).collect();
    let inputs = pad_sequences(
        &tokens,
        config.data.max_len,
        config.data.padding,
        config.data.truncating,
    )?;
    let labels = samples.iter().map(|s| s.label).collect();
    Ok((inputs, labels))
}

/// Run every stage with the settings of `config`, reading data from `corpus`.
///
/// The model and training settings are validated before any data is loaded.
pub fn run<R>(config: &Config, corpus: &dyn Corpus, rng: &mut R) -> Result<Outcome>
where
    R: Rng + ?Sized,
{
    let model_config = config.model_config();
    model_config.validate()?;
    let trainer = Trainer::new(config.training)?;

    let split = info_span!("load")
        .in_scope(|| corpus.fetch(config.data.vocab_size))?;
    info!(train = split.train.len(), test = split.test.len(), "loaded corpus");

    let ((train_inputs, train_labels), test) = info_span!("pad").in_scope(|| {
        let train = pad(config, &split.train)?;
        let test = pad(config, &split.test)?;
        Ok::<_, Error>((train, test))
    })?;

    let mut model = info_span!("build")
        .in_scope(|| Classifier::build(&model_config, rng))?;
    info!(
        kind = ?model_config.layers.iter().map(|l| l.kind).collect::<Vec<_>>(),
        parameters = model.num_parameters(),
        "built model"
    );

    let history = info_span!("train")
        .in_scope(|| trainer.fit(&mut model, &train_inputs, &train_labels, rng))?;
    let report = Report::from_history(&history)?;
    info!(
        epoch = report.epoch + 1,
        loss = report.loss,
        accuracy = report.accuracy,
        "{report}"
    );

    let (test_inputs, test_labels) = test;
    let test = if test_labels.is_empty() {
        warn!("the test split is empty, skipping the test evaluation");
        None
    } else {
        let metrics = info_span!("test")
            .in_scope(|| trainer.evaluate(&model, &test_inputs, &test_labels))?;
        info!(loss = metrics.loss, accuracy = metrics.accuracy, "test split");
        Some(metrics)
    };

    Ok(Outcome {
        history,
        report,
        test,
        model,
    })
}
