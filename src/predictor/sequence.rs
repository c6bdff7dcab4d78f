// src/predictor/sequence.rs — Context-window → next-token frequency table
//
// Cumulative across training calls. Growth is bounded by `max_contexts`:
// when exceeded, the least-recently-observed tenth of the contexts is
// evicted in one sweep.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Majority-vote prediction for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrediction<T> {
    pub token: T,
    pub confidence: f32,
    /// Total observations behind the vote.
    pub support: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ContextEntry<T> {
    /// Next-token counts in first-seen order (stable tie-break).
    next: Vec<(T, u32)>,
    last_seen: u64,
}

impl<T: PartialEq> ContextEntry<T> {
    fn bump(&mut self, token: T, tick: u64) {
        self.last_seen = tick;
        match self.next.iter_mut().find(|(t, _)| *t == token) {
            Some((_, count)) => *count += 1,
            None => self.next.push((token, 1)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize + Eq + Hash",
    deserialize = "T: Deserialize<'de> + Eq + Hash"
))]
pub struct SequencePredictor<T: Eq + Hash> {
    context_length: usize,
    max_contexts: usize,
    tick: u64,
    #[serde(with = "table_entries")]
    table: HashMap<Vec<T>, ContextEntry<T>>,
}

impl<T> SequencePredictor<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new(context_length: usize, max_contexts: usize) -> Self {
        Self {
            context_length: context_length.max(1),
            max_contexts: max_contexts.max(1),
            tick: 0,
            table: HashMap::new(),
        }
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    pub fn context_count(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.tick = 0;
    }

    /// Fold every length-L window → next-token transition of `stream` into the table.
    pub fn observe(&mut self, stream: &[T]) {
        let l = self.context_length;
        if stream.len() <= l {
            return;
        }
        for window in stream.windows(l + 1) {
            self.tick += 1;
            let tick = self.tick;
            let (context, next) = window.split_at(l);
            self.table
                .entry(context.to_vec())
                .or_insert_with(|| ContextEntry {
                    next: Vec::new(),
                    last_seen: tick,
                })
                .bump(next[0].clone(), tick);
        }
        if self.table.len() > self.max_contexts {
            self.evict();
        }
    }

    /// Predict from the last L tokens of `recent`. `None` when fewer than L
    /// tokens are given or the exact context was never observed.
    pub fn predict(&self, recent: &[T]) -> Option<TokenPrediction<T>> {
        let l = self.context_length;
        if recent.len() < l {
            return None;
        }
        let context = &recent[recent.len() - l..];
        let entry = self.table.get(context)?;

        let total: u32 = entry.next.iter().map(|(_, c)| c).sum();
        if total == 0 {
            return None;
        }
        let mut best: Option<&(T, u32)> = None;
        for candidate in &entry.next {
            // strict: first-seen token wins ties
            if best.map_or(true, |b| candidate.1 > b.1) {
                best = Some(candidate);
            }
        }
        best.map(|(token, count)| TokenPrediction {
            token: token.clone(),
            confidence: *count as f32 / total as f32,
            support: total,
        })
    }

    /// Every token that appears anywhere in the table.
    pub fn observed_tokens(&self) -> std::collections::HashSet<T> {
        self.table
            .iter()
            .flat_map(|(ctx, e)| ctx.iter().chain(e.next.iter().map(|(t, _)| t)))
            .cloned()
            .collect()
    }

    fn evict(&mut self) {
        let target = self.max_contexts - self.max_contexts / 10;
        let excess = self.table.len().saturating_sub(target);
        if excess == 0 {
            return;
        }
        let mut ages: Vec<u64> = self.table.values().map(|e| e.last_seen).collect();
        ages.sort_unstable();
        let cutoff = ages[excess - 1];
        let before = self.table.len();
        self.table.retain(|_, e| e.last_seen > cutoff);
        tracing::debug!(
            "Context table evicted {} stale contexts ({} kept)",
            before - self.table.len(),
            self.table.len()
        );
    }
}

/// JSON maps need string keys; persist the table as a list of entries.
mod table_entries {
    use super::ContextEntry;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::hash::Hash;

    pub fn serialize<T, S>(
        table: &HashMap<Vec<T>, ContextEntry<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        T: Serialize + Eq + Hash,
        S: Serializer,
    {
        serializer.collect_seq(table.iter())
    }

    pub fn deserialize<'de, T, D>(
        deserializer: D,
    ) -> Result<HashMap<Vec<T>, ContextEntry<T>>, D::Error>
    where
        T: Deserialize<'de> + Eq + Hash,
        D: Deserializer<'de>,
    {
        let entries: Vec<(Vec<T>, ContextEntry<T>)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_majority_vote_confidence() {
        let mut p = SequencePredictor::new(5, 100);
        for _ in 0..5 {
            p.observe(&s(&["A", "B", "C", "D", "E", "F"]));
        }
        for _ in 0..2 {
            p.observe(&s(&["A", "B", "C", "D", "E", "G"]));
        }
        let pred = p.predict(&s(&["A", "B", "C", "D", "E"])).unwrap();
        assert_eq!(pred.token, "F");
        assert!((pred.confidence - 5.0 / 7.0).abs() < 1e-6);
        assert_eq!(pred.support, 7);
    }

    #[test]
    fn test_requires_full_context() {
        let mut p = SequencePredictor::new(3, 100);
        p.observe(&[1u32, 2, 3, 4]);
        assert!(p.predict(&[2, 3]).is_none());
        assert_eq!(p.predict(&[1, 2, 3]).unwrap().token, 4);
        // only the last L tokens are used
        assert_eq!(p.predict(&[9, 9, 1, 2, 3]).unwrap().token, 4);
    }

    #[test]
    fn test_unknown_context_is_none() {
        let mut p = SequencePredictor::new(2, 100);
        p.observe(&[1u32, 2, 3]);
        assert!(p.predict(&[3, 1]).is_none());
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let mut p = SequencePredictor::new(1, 100);
        p.observe(&[0u32, 7]);
        p.observe(&[0u32, 3]);
        let pred = p.predict(&[0]).unwrap();
        assert_eq!(pred.token, 7);
        assert!((pred.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cumulative_observe() {
        let mut p = SequencePredictor::new(1, 100);
        p.observe(&[1u32, 2]);
        p.observe(&[1u32, 2, 1, 2]);
        let pred = p.predict(&[1]).unwrap();
        assert_eq!(pred.support, 3);
    }

    #[test]
    fn test_eviction_bounds_table() {
        let mut p = SequencePredictor::new(1, 10);
        let stream: Vec<u32> = (0..100).collect();
        p.observe(&stream);
        assert!(p.context_count() <= 10);
        // most recent transition survives
        assert_eq!(p.predict(&[98]).unwrap().token, 99);
        assert!(p.predict(&[0]).is_none());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut p = SequencePredictor::new(2, 100);
        p.observe(&[1u32, 2, 3, 1, 2, 4, 1, 2, 3]);
        let blob = serde_json::to_vec(&p).unwrap();
        let restored: SequencePredictor<u32> = serde_json::from_slice(&blob).unwrap();
        assert_eq!(restored.predict(&[1, 2]), p.predict(&[1, 2]));
        assert_eq!(restored.context_count(), p.context_count());
    }
}
