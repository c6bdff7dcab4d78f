// src/predictor/model.rs — Pluggable trainable next-token model

use serde::{Deserialize, Serialize};

use crate::infra::errors::{Result, SynapseError};

/// Context → next-token pairs over vocabulary indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingBatch {
    pub inputs: Vec<Vec<usize>>,
    pub targets: Vec<usize>,
    /// Vocabulary size the indices refer to.
    pub vocab_size: usize,
}

impl TrainingBatch {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Every index must fall inside the declared vocabulary.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.len() != self.targets.len() {
            return Err(SynapseError::TrainingFailure(format!(
                "batch has {} inputs but {} targets",
                self.inputs.len(),
                self.targets.len()
            )));
        }
        let out_of_range = self
            .inputs
            .iter()
            .flatten()
            .chain(self.targets.iter())
            .any(|&i| i >= self.vocab_size);
        if out_of_range {
            return Err(SynapseError::TrainingFailure(
                "batch index outside vocabulary".into(),
            ));
        }
        Ok(())
    }
}

/// A numeric next-token predictor trained incrementally in the worker.
///
/// Implementations own their weights; `save`/`load` exchange opaque blobs
/// with the persistence layer.
pub trait SequenceModel: Send {
    fn name(&self) -> &str;

    /// Update on one batch; returns the batch loss before the update.
    fn fit(&mut self, batch: &TrainingBatch) -> Result<f32>;

    /// Distribution over the vocabulary for the next token after `context`.
    fn predict(&self, context: &[usize]) -> Result<Vec<f32>>;

    fn is_trained(&self) -> bool;

    fn save(&self) -> Result<Vec<u8>>;

    fn load(&mut self, blob: &[u8]) -> Result<()>;
}

/// Argmax of a distribution with its probability. Earlier index wins ties.
pub fn argmax(distribution: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in distribution.iter().enumerate() {
        if !p.is_finite() {
            continue;
        }
        if best.map_or(true, |(_, bp)| p > bp) {
            best = Some((i, p));
        }
    }
    best
}

/// Smoothed first-order transition model.
///
/// `fit` adds `learning_rate` to the weight of every observed
/// (last context token → target) transition; `predict` normalizes the row
/// with additive smoothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionModel {
    learning_rate: f32,
    smoothing: f32,
    vocab_size: usize,
    weights: Vec<Vec<f32>>,
    batches_seen: u64,
}

impl TransitionModel {
    pub fn new(learning_rate: f32, smoothing: f32) -> Self {
        Self {
            learning_rate,
            smoothing: smoothing.max(f32::EPSILON),
            vocab_size: 0,
            weights: Vec::new(),
            batches_seen: 0,
        }
    }

    pub fn from_config(c: &crate::infra::config::LearnerConfig) -> Self {
        Self::new(c.learning_rate, c.smoothing)
    }

    fn grow(&mut self, vocab_size: usize) {
        if vocab_size <= self.vocab_size {
            return;
        }
        for row in self.weights.iter_mut() {
            row.resize(vocab_size, 0.0);
        }
        self.weights.resize(vocab_size, vec![0.0; vocab_size]);
        self.vocab_size = vocab_size;
    }

    fn row_distribution(&self, row: usize) -> Vec<f32> {
        let weights = &self.weights[row];
        let total: f32 = weights.iter().sum::<f32>() + self.smoothing * self.vocab_size as f32;
        weights
            .iter()
            .map(|w| (w + self.smoothing) / total)
            .collect()
    }
}

impl SequenceModel for TransitionModel {
    fn name(&self) -> &str {
        "transition"
    }

    fn fit(&mut self, batch: &TrainingBatch) -> Result<f32> {
        batch.validate()?;
        if batch.is_empty() {
            return Err(SynapseError::InsufficientData { needed: 1, got: 0 });
        }
        self.grow(batch.vocab_size);

        let mut loss = 0.0f32;
        let mut n = 0usize;
        for (input, &target) in batch.inputs.iter().zip(batch.targets.iter()) {
            let Some(&last) = input.last() else {
                continue;
            };
            let p = self.row_distribution(last)[target];
            loss -= p.max(f32::MIN_POSITIVE).ln();
            n += 1;
            self.weights[last][target] += self.learning_rate;
        }
        if n == 0 {
            return Err(SynapseError::InsufficientData { needed: 1, got: 0 });
        }
        self.batches_seen += 1;
        Ok(loss / n as f32)
    }

    fn predict(&self, context: &[usize]) -> Result<Vec<f32>> {
        if !self.is_trained() {
            return Err(SynapseError::ModelUnavailable(
                "transition model has not been fitted".into(),
            ));
        }
        let last = *context.last().ok_or(SynapseError::InsufficientData {
            needed: 1,
            got: 0,
        })?;
        if last >= self.vocab_size {
            return Err(SynapseError::ModelUnavailable(format!(
                "token {last} outside model vocabulary ({})",
                self.vocab_size
            )));
        }
        Ok(self.row_distribution(last))
    }

    fn is_trained(&self) -> bool {
        self.batches_seen > 0
    }

    fn save(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Replaces the model only when the blob's weight matrix is
    /// `vocab_size` x `vocab_size`.
    fn load(&mut self, blob: &[u8]) -> Result<()> {
        let mut loaded: TransitionModel = serde_json::from_slice(blob)?;
        let n = loaded.vocab_size;
        if loaded.weights.len() != n {
            return Err(anyhow::anyhow!(
                "transition weights have {} rows for vocabulary {}",
                loaded.weights.len(),
                n
            )
            .into());
        }
        if let Some((row, w)) = loaded.weights.iter().enumerate().find(|(_, w)| w.len() != n) {
            return Err(anyhow::anyhow!(
                "transition row {row} has {} columns for vocabulary {n}",
                w.len()
            )
            .into());
        }
        loaded.smoothing = loaded.smoothing.max(f32::EPSILON);
        *self = loaded;
        Ok(())
    }
}
