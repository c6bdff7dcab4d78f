// src/predictor/incremental.rs — Experience replay buffer and batch preparation

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::types::Event;
use crate::features::tokens::base_token;
use crate::infra::config::LearnerConfig;
use crate::patterns::vocabulary::Vocabulary;
use crate::predictor::model::TrainingBatch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerMetrics {
    pub experience_count: u64,
    pub buffer_utilization: f32,
    pub ready_for_incremental: bool,
    /// Distinct event kinds / buffer length.
    pub diversity: f32,
}

/// Bounded experience buffer feeding incremental fits.
#[derive(Debug, Clone)]
pub struct IncrementalLearner {
    capacity: usize,
    batch_size: usize,
    fit_interval: usize,
    buffer: VecDeque<Event>,
    experience_count: u64,
}

impl IncrementalLearner {
    pub fn new(config: &LearnerConfig) -> Self {
        Self {
            capacity: config.buffer_capacity.max(1),
            batch_size: config.batch_size.max(2),
            fit_interval: config.fit_interval.max(1),
            buffer: VecDeque::with_capacity(config.buffer_capacity),
            experience_count: 0,
        }
    }

    /// Push an event, evicting the oldest beyond capacity.
    pub fn add_experience(&mut self, event: Event) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(event);
        self.experience_count += 1;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.len() >= self.batch_size
    }

    /// Whether the cadence calls for a fit after the latest experience.
    pub fn should_fit(&self) -> bool {
        self.is_ready() && self.experience_count % self.fit_interval as u64 == 0
    }

    /// Single-token context → next-token pairs from the latest `batch_size`
    /// experiences. Pairs touching tokens outside `vocabulary` are skipped.
    pub fn prepare_batch(&self, vocabulary: &Vocabulary) -> Option<TrainingBatch> {
        if !self.is_ready() || vocabulary.is_empty() {
            return None;
        }
        let start = self.buffer.len() - self.batch_size;
        let indices: Vec<Option<usize>> = self
            .buffer
            .iter()
            .skip(start)
            .map(|e| vocabulary.index_of(&base_token(e)))
            .collect();

        let mut batch = TrainingBatch {
            vocab_size: vocabulary.len(),
            ..Default::default()
        };
        for pair in indices.windows(2) {
            if let [Some(input), Some(target)] = pair {
                batch.inputs.push(vec![*input]);
                batch.targets.push(*target);
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    pub fn metrics(&self) -> LearnerMetrics {
        let kinds: HashSet<_> = self.buffer.iter().map(|e| e.kind).collect();
        let diversity = if self.buffer.is_empty() {
            0.0
        } else {
            kinds.len() as f32 / self.buffer.len() as f32
        };
        LearnerMetrics {
            experience_count: self.experience_count,
            buffer_utilization: self.buffer.len() as f32 / self.capacity as f32,
            ready_for_incremental: self.is_ready(),
            diversity,
        }
    }
}
