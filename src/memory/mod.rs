// src/memory/mod.rs — Persistence contract

pub mod schema;
pub mod store;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::infra::errors::{Result, SynapseError};

pub use store::SqliteStore;

/// Storage keys for persisted blobs.
pub mod keys {
    pub const CODEBOOK: &str = "codebook";
    pub const VOCABULARY: &str = "vocabulary";
    pub const SKILLS: &str = "skills";
    pub const CONTEXT_TABLE: &str = "context_table";
    pub const TOKEN_LABELS: &str = "token_labels";
    pub const WORKFLOW_PATTERNS: &str = "workflow_patterns";
    pub const CLIPBOARD_HISTORY: &str = "clipboard_history";
    pub const MODEL_WEIGHTS: &str = "model_weights";

    pub const ALL: &[&str] = &[
        CODEBOOK,
        VOCABULARY,
        SKILLS,
        CONTEXT_TABLE,
        TOKEN_LABELS,
        WORKFLOW_PATTERNS,
        CLIPBOARD_HISTORY,
        MODEL_WEIGHTS,
    ];
}

/// Durable key → opaque blob storage.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Load and decode a JSON blob; `None` when the key is absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let blob = serde_json::to_vec(value)?;
    store.set(key, &blob)
}

/// Like `load_json`, but a corrupt or unreadable blob is logged and treated as absent.
pub fn load_or_warn<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    match load_json(store, key) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Ignoring persisted '{}': {}", key, e);
            None
        }
    }
}

/// Persist, logging instead of failing.
pub fn save_or_warn<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) {
    if let Err(e) = save_json(store, key, value) {
        tracing::warn!("Failed to persist '{}': {}", key, e);
    }
}

/// Ephemeral store for tests and `--memory` runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| SynapseError::Other(anyhow::anyhow!("memory store poisoned")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SynapseError::Other(anyhow::anyhow!("memory store poisoned")))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
