// src/patterns/miner.rs — Frequent contiguous subsequence mining

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::patterns::naming;
use crate::patterns::vocabulary::Vocabulary;

/// Occurrence count of one exact subsequence within a mined stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCount {
    pub tokens: Vec<String>,
    pub count: u32,
}

/// A recurring token subsequence ("skill").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Matching key: the symbolic tokens, in order.
    pub tokens: Vec<String>,
    /// Vocabulary indices of `tokens` as of the last mining pass.
    pub token_indices: Vec<usize>,
    pub frequency: u32,
    pub confidence: f32,
    pub first_seen: i64,
    pub last_seen: i64,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether `self` occurs contiguously inside a strictly longer `other`.
    pub fn is_contained_in(&self, other: &Pattern) -> bool {
        other.len() > self.len()
            && other
                .tokens
                .windows(self.len())
                .any(|w| w == self.tokens.as_slice())
    }
}

/// Confidence heuristic: monotonic in frequency, saturating at 1.0.
pub fn frequency_confidence(frequency: u32, scale: f32) -> f32 {
    (frequency as f32 / scale).min(1.0)
}

/// Count every contiguous subsequence of length `min_len..=max_len` and keep
/// those occurring at least `min_frequency` times (overlapping windows count).
///
/// Results are ordered by first occurrence, shorter first on ties.
pub fn mine_patterns<S: AsRef<str>>(
    stream: &[S],
    min_len: usize,
    max_len: usize,
    min_frequency: u32,
) -> Vec<SequenceCount> {
    let tokens: Vec<&str> = stream.iter().map(AsRef::as_ref).collect();
    let mut counts: HashMap<&[&str], (u32, usize)> = HashMap::new();

    for len in min_len.max(1)..=max_len {
        if len > tokens.len() {
            break;
        }
        for (start, window) in tokens.windows(len).enumerate() {
            counts.entry(window).or_insert((0, start)).0 += 1;
        }
    }

    let mut mined: Vec<(usize, SequenceCount)> = counts
        .into_iter()
        .filter(|(_, (count, _))| *count >= min_frequency)
        .map(|(window, (count, first))| {
            (
                first,
                SequenceCount {
                    tokens: window.iter().map(|t| t.to_string()).collect(),
                    count,
                },
            )
        })
        .collect();
    mined.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.tokens.len().cmp(&b.1.tokens.len())));
    mined.into_iter().map(|(_, c)| c).collect()
}

/// Occurrences of each length-`min_len..=max_len` window that ends past
/// position `seen`.
fn fresh_counts<'a>(
    tokens: &'a [&'a str],
    seen: usize,
    min_len: usize,
    max_len: usize,
) -> HashMap<&'a [&'a str], u32> {
    let mut counts = HashMap::new();
    for len in min_len.max(1)..=max_len {
        if len > tokens.len() {
            break;
        }
        let first = seen.saturating_sub(len - 1);
        for window in tokens[first..].windows(len) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, Copy)]
pub struct MinerSettings {
    pub min_len: usize,
    pub max_len: usize,
    pub min_frequency: u32,
    pub confidence_scale: f32,
}

impl From<&crate::infra::config::PatternsConfig> for MinerSettings {
    fn from(c: &crate::infra::config::PatternsConfig) -> Self {
        Self {
            min_len: c.min_len,
            max_len: c.max_len,
            min_frequency: c.min_frequency,
            confidence_scale: c.confidence_scale,
        }
    }
}

/// Mines a token stream and keeps the accumulated pattern library.
#[derive(Debug, Clone)]
pub struct PatternMiner {
    settings: MinerSettings,
    patterns: Vec<Pattern>,
    index: HashMap<Vec<String>, usize>,
}

impl PatternMiner {
    pub fn new(settings: MinerSettings) -> Self {
        Self {
            settings,
            patterns: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild from persisted patterns.
    pub fn with_patterns(settings: MinerSettings, patterns: Vec<Pattern>) -> Self {
        let mut miner = Self::new(settings);
        for p in patterns {
            if p.is_empty() || miner.index.contains_key(&p.tokens) {
                continue;
            }
            miner.index.insert(p.tokens.clone(), miner.patterns.len());
            miner.patterns.push(p);
        }
        miner
    }

    pub fn settings(&self) -> &MinerSettings {
        &self.settings
    }

    /// Mine `stream` and fold the results into the library.
    ///
    /// Only the last `new_tokens` positions of `stream` are unseen; earlier
    /// ones were part of a previous pass. A stored pattern gains every
    /// occurrence that ends among the new positions, so re-mining a window
    /// never double-counts and the frequency keeps growing after older
    /// occurrences leave a rolling buffer. A subsequence enters the library
    /// once a single pass finds it `min_frequency` times, with that count.
    ///
    /// Returns the patterns created or updated by this pass.
    pub fn observe<S: AsRef<str>>(
        &mut self,
        stream: &[S],
        new_tokens: usize,
        vocabulary: Option<&Vocabulary>,
        now_ms: i64,
    ) -> Vec<Pattern> {
        let s = self.settings;
        let tokens: Vec<&str> = stream.iter().map(AsRef::as_ref).collect();
        let seen = tokens.len().saturating_sub(new_tokens);
        let mut touched = Vec::new();

        let encode = |seq: &[String]| vocabulary.map(|v| v.encode(seq)).unwrap_or_default();

        let fresh = fresh_counts(&tokens, seen, s.min_len, s.max_len);
        let mut updated = vec![false; self.patterns.len()];
        for (window, count) in fresh {
            let key: Vec<String> = window.iter().map(|t| t.to_string()).collect();
            let Some(&i) = self.index.get(&key) else {
                continue;
            };
            let p = &mut self.patterns[i];
            p.frequency = p.frequency.saturating_add(count);
            p.confidence = frequency_confidence(p.frequency, s.confidence_scale);
            p.description = naming::pattern_description(&p.tokens, p.frequency);
            p.last_seen = now_ms;
            updated[i] = true;
        }

        for (i, p) in self.patterns.iter_mut().enumerate() {
            if !updated[i] {
                continue;
            }
            let indices = encode(&p.tokens);
            if indices.len() == p.tokens.len() {
                p.token_indices = indices;
            }
            touched.push(p.clone());
        }

        for seq in mine_patterns(&tokens, s.min_len, s.max_len, s.min_frequency) {
            if self.index.contains_key(&seq.tokens) {
                continue;
            }
            let p = Pattern {
                id: Uuid::new_v4().to_string(),
                name: naming::pattern_name(&seq.tokens),
                description: naming::pattern_description(&seq.tokens, seq.count),
                token_indices: encode(&seq.tokens),
                frequency: seq.count,
                confidence: frequency_confidence(seq.count, s.confidence_scale),
                first_seen: now_ms,
                last_seen: now_ms,
                tokens: seq.tokens,
            };
            self.index.insert(p.tokens.clone(), self.patterns.len());
            self.patterns.push(p.clone());
            touched.push(p);
        }

        if !touched.is_empty() {
            tracing::debug!(
                "Pattern mining: {} patterns touched, {} stored",
                touched.len(),
                self.patterns.len()
            );
        }
        touched
    }

    pub fn get(&self, tokens: &[String]) -> Option<&Pattern> {
        self.index.get(tokens).map(|&i| &self.patterns[i])
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Stored patterns minus those subsumed by a longer pattern of equal frequency.
    pub fn skills(&self) -> Vec<Pattern> {
        self.patterns
            .iter()
            .filter(|p| {
                !self
                    .patterns
                    .iter()
                    .any(|q| q.frequency == p.frequency && p.is_contained_in(q))
            })
            .cloned()
            .collect()
    }

    /// Patterns whose first step is `token`, most frequent first.
    pub fn starting_with<'a>(&'a self, token: &'a str) -> impl Iterator<Item = &'a Pattern> + 'a {
        let mut hits: Vec<&Pattern> = self
            .patterns
            .iter()
            .filter(move |p| p.tokens.first().map(String::as_str) == Some(token))
            .collect();
        hits.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        hits.into_iter()
    }
}
