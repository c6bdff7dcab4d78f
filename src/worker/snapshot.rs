// src/worker/snapshot.rs — Read-only view of the last committed training state

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::types::Event;
use crate::features::FeatureExtractor;
use crate::patterns::vocabulary::Vocabulary;
use crate::predictor::sequence::{SequencePredictor, TokenPrediction};
use crate::quantizer::codebook::{Codebook, TokenId};

/// Which symbolic tokens produced each quantized id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenLabels {
    counts: HashMap<TokenId, Vec<(String, u32)>>,
}

impl TokenLabels {
    pub fn record(&mut self, id: TokenId, token: &str) {
        let entry = self.counts.entry(id).or_default();
        match entry.iter_mut().find(|(t, _)| t == token) {
            Some((_, n)) => *n += 1,
            None => entry.push((token.to_string(), 1)),
        }
    }

    /// Dominant symbolic token for `id`; first-recorded wins ties.
    pub fn label(&self, id: TokenId) -> Option<&str> {
        let entry = self.counts.get(&id)?;
        let mut best: Option<&(String, u32)> = None;
        for candidate in entry {
            if best.map_or(true, |b| candidate.1 > b.1) {
                best = Some(candidate);
            }
        }
        best.map(|(t, _)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Frequency-table prediction resolved back to a symbolic label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPrediction {
    pub token_id: TokenId,
    pub label: String,
    pub confidence: f32,
    pub support: u32,
}

/// Immutable state published by the worker after every committed train.
#[derive(Debug, Clone)]
pub struct PredictorSnapshot {
    pub codebook: Codebook,
    pub vocabulary: Vocabulary,
    pub table: SequencePredictor<TokenId>,
    pub labels: TokenLabels,
    pub skills_count: usize,
}

impl PredictorSnapshot {
    pub fn is_trained(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    pub fn quantize(&self, extractor: &FeatureExtractor, events: &[Event]) -> Vec<TokenId> {
        events
            .iter()
            .map(|e| self.codebook.assign(&extractor.extract(e)))
            .collect()
    }

    /// Majority-vote prediction over the quantized tail of `recent`.
    pub fn predict(
        &self,
        extractor: &FeatureExtractor,
        recent: &[Event],
    ) -> Option<LabeledPrediction> {
        let l = self.table.context_length();
        if recent.len() < l || self.table.is_empty() {
            return None;
        }
        let ids = self.quantize(extractor, &recent[recent.len() - l..]);
        let TokenPrediction {
            token,
            confidence,
            support,
        } = self.table.predict(&ids)?;
        let label = self
            .labels
            .label(token)
            .map(str::to_string)
            .unwrap_or_else(|| format!("token_{token}"));
        Some(LabeledPrediction {
            token_id: token,
            label,
            confidence,
            support,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_majority() {
        let mut labels = TokenLabels::default();
        labels.record(3, "click_button_general");
        labels.record(3, "regular_key");
        labels.record(3, "regular_key");
        assert_eq!(labels.label(3), Some("regular_key"));
        assert_eq!(labels.label(4), None);
    }

    #[test]
    fn test_labels_serde() {
        let mut labels = TokenLabels::default();
        labels.record(7, "scroll_down");
        let json = serde_json::to_string(&labels).unwrap();
        let back: TokenLabels = serde_json::from_str(&json).unwrap();
        assert_eq!(back, labels);
    }
}
