//! Run configuration, loaded from YAML. Every field has a default, so an empty document describes
//! the reference run: a 10000-token vocabulary, sequences of 500 tokens and one LSTM layer of 32
//! units over 32-dimensional embeddings.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{LayerSpec, ModelConfig, RecurrentKind},
    sequence::Side,
    train::TrainConfig,
};

/// Settings of a full load, pad, build, train and report run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Seed of the random number generator driving initialization, shuffling and dropout.
    pub seed: u64,
    /// How sequences are loaded and padded.
    pub data: DataConfig,
    /// The architecture.
    pub model: ModelSection,
    /// Training hyperparameters.
    pub training: TrainConfig,
}

/// Settings of the data stages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Number of most frequent tokens kept.
    pub vocab_size: usize,
    /// Length every sequence is padded or truncated to.
    pub max_len: usize,
    /// Where padding goes.
    pub padding: Side,
    /// Where tokens are dropped from.
    pub truncating: Side,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            vocab_size: 10_000,
            max_len: 500,
            padding: Side::Pre,
            truncating: Side::Pre,
        }
    }
}

/// Settings of the model.
///
/// Either a stack of `num_layers` identical layers, or an explicit list in `layers`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    /// Size of the token vectors.
    pub embed_dim: usize,
    /// Hidden units of each stacked layer.
    pub units: usize,
    /// Cell of each stacked layer.
    pub kind: RecurrentKind,
    /// Number of stacked layers.
    pub num_layers: usize,
    /// Input dropout of each stacked layer.
    pub dropout: f32,
    /// Recurrent dropout of each stacked layer.
    pub recurrent_dropout: f32,
    /// Explicit layers, overriding the stack settings above.
    pub layers: Option<Vec<LayerSpec>>,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            embed_dim: 32,
            units: 32,
            kind: RecurrentKind::Lstm,
            num_layers: 1,
            dropout: 0.0,
            recurrent_dropout: 0.0,
            layers: None,
        }
    }
}

impl Config {
    /// Parse a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|err| Error::configuration(err.to_string()))
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|err| Error::configuration(format!("{}: {err}", path.display())))?;
        serde_yaml::from_str(&yaml)
            .map_err(|err| Error::configuration(format!("{}: {err}", path.display())))
    }

    /// Returns the architecture described by the data and model sections.
    pub fn model_config(&self) -> ModelConfig {
        let DataConfig {
            vocab_size,
            max_len,
            ..
        } = self.data;
        match &self.model.layers {
            Some(layers) => ModelConfig {
                vocab_size,
                max_len,
                embed_dim: self.model.embed_dim,
                layers: layers.clone(),
            },
            None => ModelConfig::stacked(
                vocab_size,
                max_len,
                self.model.embed_dim,
                LayerSpec {
                    dropout: self.model.dropout,
                    recurrent_dropout: self.model.recurrent_dropout,
                    ..LayerSpec::new(self.model.kind, self.model.units)
                },
                self.model.num_layers,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::optim::OptimizerConfig;

    #[test]
    fn empty_document_is_the_reference_run() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config, Config::default());
        let model = config.model_config();
        assert_eq!(model.vocab_size, 10_000);
        assert_eq!(model.max_len, 500);
        assert_eq!(model.embed_dim, 32);
        assert_eq!(model.layers, vec![LayerSpec::new(RecurrentKind::Lstm, 32)]);
        assert_eq!(config.training, TrainConfig::default());
    }

    #[test]
    fn sections_can_be_partial() {
        let config = Config::from_yaml_str(
            r"
seed: 7
data:
  max_len: 80
  truncating: post
model:
  kind: simple
  num_layers: 2
  recurrent_dropout: 0.2
training:
  epochs: 3
  optimizer:
    kind: adam
    learning_rate: 0.01
",
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.data.vocab_size, 10_000);
        assert_eq!(config.data.truncating, Side::Post);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, 128);
        assert_eq!(
            config.training.optimizer,
            OptimizerConfig::Adam {
                learning_rate: 0.01
            }
        );
        let model = config.model_config();
        assert_eq!(model.max_len, 80);
        assert_eq!(model.layers.len(), 2);
        assert!(model.layers[0].return_sequences);
        assert!(!model.layers[1].return_sequences);
        assert!(model
            .layers
            .iter()
            .all(|l| l.kind == RecurrentKind::Simple && l.recurrent_dropout == 0.2));
    }

    #[test]
    fn explicit_layers_override_the_stack() {
        let config = Config::from_yaml_str(
            r"
model:
  layers:
    - { kind: lstm, units: 16, return_sequences: true }
    - { kind: simple, units: 8 }
",
        )
        .unwrap();
        let model = config.model_config();
        assert_eq!(model.layers.len(), 2);
        assert_eq!(model.layers[1].units, 8);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::from_yaml_str("training:\n  epochz: 3\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn files_are_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed: 3").unwrap();
        assert_eq!(Config::from_yaml_file(file.path()).unwrap().seed, 3);
        let missing = file.path().with_extension("missing");
        assert!(Config::from_yaml_file(missing).is_err());
    }
}
