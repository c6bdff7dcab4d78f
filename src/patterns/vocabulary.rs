// src/patterns/vocabulary.rs — Symbolic token ↔ dense index table

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bidirectional token table. Rebuilt wholesale per training batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    tokens: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Unique tokens of `stream` in order of first appearance, indexed 0..U-1.
    pub fn rebuild<S: AsRef<str>>(stream: &[S]) -> Self {
        let mut vocab = Self::default();
        for token in stream {
            let token = token.as_ref();
            if !vocab.index.contains_key(token) {
                vocab.index.insert(token.to_string(), vocab.tokens.len());
                vocab.tokens.push(token.to_string());
            }
        }
        vocab
    }

    /// Restore the reverse index after deserialization.
    pub fn reindex(mut self) -> Self {
        self.index = self
            .tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Encode a stream, dropping tokens outside the vocabulary.
    pub fn encode<S: AsRef<str>>(&self, stream: &[S]) -> Vec<usize> {
        stream
            .iter()
            .filter_map(|t| self.index_of(t.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_appearance_order() {
        let v = Vocabulary::rebuild(&["b", "a", "b", "c", "a"]);
        assert_eq!(v.len(), 3);
        assert_eq!(v.tokens(), &["b", "a", "c"]);
        assert_eq!(v.index_of("a"), Some(1));
        assert_eq!(v.token(2), Some("c"));
        assert_eq!(v.index_of("zzz"), None);
    }

    #[test]
    fn test_rebuild_replaces() {
        let first = Vocabulary::rebuild(&["x", "y"]);
        let second = Vocabulary::rebuild(&["z"]);
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second.index_of("x"), None);
    }

    #[test]
    fn test_serde_reindex() {
        let v = Vocabulary::rebuild(&["click", "paste_action"]);
        let blob = serde_json::to_vec(&v).unwrap();
        let restored: Vocabulary = serde_json::from_slice::<Vocabulary>(&blob).unwrap().reindex();
        assert_eq!(restored.index_of("paste_action"), Some(1));
        assert_eq!(restored, v);
    }

    #[test]
    fn test_encode_skips_unknown() {
        let v = Vocabulary::rebuild(&["a", "b"]);
        assert_eq!(v.encode(&["a", "q", "b"]), vec![0, 1]);
    }
}
