//! Recurrent sequence classifiers: an embedding, stacked recurrent layers and a dense scoring
//! head producing one logit per sequence.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    autodiff::{sigmoid, Tape, Var},
    error::{Error, Result},
    sequence::Padded,
    tensor::Tensor,
};

mod cell;
mod init;
mod layers;
mod recurrent;

pub use cell::{
    BoundCell, BoundLstmCell, BoundSimpleCell, Cell, Gate, LstmCell, LstmState, RecurrentKind,
    SimpleCell, Step,
};
pub use layers::{BoundDense, BoundEmbedding, Dense, Embedding};
pub use recurrent::{BoundRecurrent, DropoutMasks, Recurrent};

/// Number of rows scored per tape by [`Classifier::predict`].
const PREDICT_BATCH: usize = 256;

/// Description of one recurrent layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerSpec {
    /// The cell used by the layer.
    #[serde(default)]
    pub kind: RecurrentKind,
    /// Number of hidden units.
    pub units: usize,
    /// Fraction of the input units dropped during training.
    #[serde(default)]
    pub dropout: f32,
    /// Fraction of the recurrent units dropped during training.
    #[serde(default)]
    pub recurrent_dropout: f32,
    /// Whether the layer emits its hidden state at every timestep instead of only the last one.
    /// Every layer but the last must, so that the next layer sees a sequence.
    #[serde(default)]
    pub return_sequences: bool,
}

impl LayerSpec {
    /// A layer of `units` cells of the given kind, without dropout, returning its final state.
    pub fn new(kind: RecurrentKind, units: usize) -> Self {
        Self {
            kind,
            units,
            dropout: 0.0,
            recurrent_dropout: 0.0,
            return_sequences: false,
        }
    }
}

/// The architecture of a [`Classifier`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of rows of the embedding table. Token IDs must be below it.
    pub vocab_size: usize,
    /// Length of the padded sequences the model reads.
    pub max_len: usize,
    /// Size of the token vectors.
    pub embed_dim: usize,
    /// The recurrent layers, from the embedding up.
    pub layers: Vec<LayerSpec>,
}

impl ModelConfig {
    /// Stack `num_layers` copies of `layer`, every one but the last returning sequences.
    pub fn stacked(
        vocab_size: usize,
        max_len: usize,
        embed_dim: usize,
        layer: LayerSpec,
        num_layers: usize,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|i| LayerSpec {
                return_sequences: i + 1 < num_layers,
                ..layer
            })
            .collect();
        Self {
            vocab_size,
            max_len,
            embed_dim,
            layers,
        }
    }

    /// Check that the configuration describes a model that can be built.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 || self.max_len == 0 || self.embed_dim == 0 {
            return Err(Error::configuration(format!(
                "vocabulary size ({}), sequence length ({}) and embedding size ({}) must be positive",
                self.vocab_size, self.max_len, self.embed_dim
            )));
        }
        let Some(last) = self.layers.len().checked_sub(1) else {
            return Err(Error::configuration("at least one recurrent layer is required"));
        };
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.units == 0 {
                return Err(Error::configuration(format!(
                    "recurrent layer {i} has no units"
                )));
            }
            for (name, rate) in [
                ("dropout", layer.dropout),
                ("recurrent_dropout", layer.recurrent_dropout),
            ] {
                if !(0.0..1.0).contains(&rate) {
                    return Err(Error::configuration(format!(
                        "{name} of recurrent layer {i} must be in [0, 1), got {rate}"
                    )));
                }
            }
            if i < last && !layer.return_sequences {
                return Err(Error::configuration(format!(
                    "recurrent layer {i} feeds another recurrent layer and must return sequences"
                )));
            }
            if i == last && layer.return_sequences {
                return Err(Error::configuration(format!(
                    "the last recurrent layer ({i}) feeds the scoring layer and must return only \
                     its final state"
                )));
            }
        }
        Ok(())
    }

    /// Count the trainable parameters of the described model.
    pub fn num_parameters(&self) -> usize {
        let mut count = self.vocab_size * self.embed_dim;
        let mut input = self.embed_dim;
        for layer in &self.layers {
            let gates = match layer.kind {
                RecurrentKind::Simple => 1,
                RecurrentKind::Lstm => 4,
            };
            count += gates * (input * layer.units + layer.units * layer.units + layer.units);
            input = layer.units;
        }
        count + input + 1
    }
}

/// A binary sequence classifier.
#[derive(Clone, Debug)]
pub struct Classifier {
    config: ModelConfig,
    embedding: Embedding,
    pub(crate) layers: Vec<Recurrent>,
    pub(crate) head: Dense,
}

impl Classifier {
    /// Validate `config` and create a model with randomized parameters.
    pub fn build<R>(config: &ModelConfig, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        config.validate()?;
        let embedding = Embedding::rand(rng, config.vocab_size, config.embed_dim);
        let mut input_size = config.embed_dim;
        let mut layers = Vec::with_capacity(config.layers.len());
        for spec in &config.layers {
            layers.push(Recurrent::rand(rng, spec, input_size));
            input_size = spec.units;
        }
        let head = Dense::rand(rng, input_size, 1);
        Ok(Self {
            config: config.clone(),
            embedding,
            layers,
            head,
        })
    }

    /// Return the architecture of the model.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Count the trainable parameters.
    pub fn num_parameters(&self) -> usize {
        self.config.num_parameters()
    }

    /// Sample fresh dropout masks of every recurrent layer for a training pass over `batch`
    /// sequences.
    pub fn sample_masks<R>(&self, rng: &mut R, batch: usize) -> Result<Vec<DropoutMasks>>
    where
        R: Rng + ?Sized,
    {
        self.layers
            .iter()
            .map(|layer| layer.sample_masks(rng, batch))
            .collect()
    }

    /// Lift the parameters onto `tape`.
    pub fn bind<'t>(&self, tape: &'t Tape) -> BoundClassifier<'t> {
        BoundClassifier {
            max_len: self.config.max_len,
            embedding: self.embedding.bind(tape),
            layers: self.layers.iter().map(|layer| layer.bind(tape)).collect(),
            head: self.head.bind(tape),
        }
    }

    /// Returns the parameters, in the order of [`BoundClassifier::parameters`].
    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.embedding.parameters_mut();
        for layer in &mut self.layers {
            params.extend(layer.parameters_mut());
        }
        params.extend(self.head.parameters_mut());
        params
    }

    /// Return the probability of the positive label for every row of `batch`, without dropout.
    pub fn predict(&self, batch: &Padded) -> Result<Vec<f32>> {
        let rows: Vec<usize> = (0..batch.num_rows()).collect();
        let mut probabilities = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(PREDICT_BATCH) {
            let tape = Tape::default();
            let logits = self.bind(&tape).forward(&batch.select(chunk), &[])?;
            probabilities.extend(logits.value().as_slice().iter().map(|&z| sigmoid(z)));
        }
        Ok(probabilities)
    }
}

/// A [`Classifier`] whose parameters live on a tape.
#[derive(Clone, Debug)]
pub struct BoundClassifier<'t> {
    max_len: usize,
    embedding: BoundEmbedding<'t>,
    layers: Vec<BoundRecurrent<'t>>,
    head: BoundDense<'t>,
}

impl<'t> BoundClassifier<'t> {
    /// Compute the `[rows, 1]` logits of a padded batch.
    ///
    /// `masks` holds one entry per recurrent layer for a training pass, or is empty for an
    /// evaluation pass without dropout.
    pub fn forward(&self, batch: &Padded, masks: &[DropoutMasks]) -> Result<Var<'t>> {
        if batch.is_empty() {
            return Err(Error::configuration("cannot score an empty batch"));
        }
        if batch.seq_len() != self.max_len {
            return Err(Error::configuration(format!(
                "the model reads sequences of {} tokens, got {}",
                self.max_len,
                batch.seq_len()
            )));
        }
        let inputs = self.embedding.forward(batch)?;
        self.forward_embedded(&inputs, masks)
    }

    /// Compute the logits from already embedded timesteps, one `[rows, embed_dim]` variable per
    /// timestep.
    pub fn forward_embedded(&self, inputs: &[Var<'t>], masks: &[DropoutMasks]) -> Result<Var<'t>> {
        if !masks.is_empty() && masks.len() != self.layers.len() {
            return Err(Error::configuration(format!(
                "expected dropout masks for {} layers, got {}",
                self.layers.len(),
                masks.len()
            )));
        }
        let unmasked = DropoutMasks::default();
        let mut sequence = inputs.to_vec();
        for (i, layer) in self.layers.iter().enumerate() {
            sequence = layer.forward(&sequence, masks.get(i).unwrap_or(&unmasked))?;
        }
        let last = sequence
            .last()
            .copied()
            .ok_or_else(|| Error::configuration("cannot score an empty sequence"))?;
        Ok(self.head.forward(last)?)
    }

    /// Returns the parameter variables, in the order of [`Classifier::parameters_mut`].
    pub fn parameters(&self) -> Vec<Var<'t>> {
        let mut params = self.embedding.parameters();
        for layer in &self.layers {
            params.extend(layer.parameters());
        }
        params.extend(self.head.parameters());
        params
    }

    /// Differentiate `loss` and return the gradient of every parameter, in the order of
    /// [`Self::parameters`]. Parameters the loss does not depend on get a zero gradient.
    pub fn gradients(&self, loss: Var<'t>) -> Vec<Tensor> {
        let mut grads = loss.gradients();
        self.parameters()
            .iter()
            .map(|param| {
                grads
                    .take(param)
                    .unwrap_or_else(|| Tensor::zeros(param.shape()))
            })
            .collect()
    }
}
