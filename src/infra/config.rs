// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::errors::{Result, SynapseError};
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub codebook: CodebookConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub patterns: PatternsConfig,

    #[serde(default)]
    pub predictor: PredictorConfig,

    #[serde(default)]
    pub learner: LearnerConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Feature vector dimension (16..=20).
    pub dimension: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { dimension: 18 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodebookConfig {
    pub size: usize,
    pub iterations: usize,
    /// Fixed PRNG seed. OS entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CodebookConfig {
    fn default() -> Self {
        Self {
            size: 256,
            iterations: 10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub min_training_events: usize,
    pub training_interval: usize,
    /// Events kept on the ingestion side for retraining.
    pub history_limit: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_training_events: 20,
            training_interval: 10,
            history_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub min_len: usize,
    pub max_len: usize,
    pub min_frequency: u32,
    /// Frequency at which confidence saturates at 1.0.
    pub confidence_scale: f32,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 3,
            min_frequency: 3,
            confidence_scale: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    /// Context-window frequency table
    #[default]
    Frequency,
    /// Trainable model behind the worker, frequency table as fallback
    Incremental,
}

impl PredictorKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Frequency => "frequency",
            Self::Incremental => "incremental",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    #[serde(default)]
    pub kind: PredictorKind,
    pub context_length: usize,
    /// Upper bound on distinct contexts kept in the frequency table.
    pub max_contexts: usize,
    pub timeout_ms: u64,
    /// Predictions below this confidence are not suggested.
    pub min_confidence: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            kind: PredictorKind::Frequency,
            context_length: 5,
            max_contexts: 10_000,
            timeout_ms: 5000,
            min_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub fit_interval: usize,
    pub learning_rate: f32,
    pub smoothing: f32,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 100,
            batch_size: 10,
            fit_interval: 10,
            learning_rate: 0.5,
            smoothing: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    #[serde(default)]
    pub workflow: WorkflowPluginConfig,
    #[serde(default)]
    pub clipboard: ClipboardPluginConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowPluginConfig {
    pub enabled: bool,
    pub buffer_size: usize,
    pub mine_every: usize,
    pub min_len: usize,
    pub max_len: usize,
    pub min_frequency: u32,
    pub confidence_scale: f32,
    pub abandon_after_misses: u32,
    pub abandon_after_ms: i64,
}

impl Default for WorkflowPluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 50,
            mine_every: 10,
            min_len: 3,
            max_len: 10,
            min_frequency: 2,
            confidence_scale: 10.0,
            abandon_after_misses: 1,
            abandon_after_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardPluginConfig {
    pub enabled: bool,
    pub max_contexts: usize,
    pub context_expiry_ms: i64,
    pub history_expiry_ms: i64,
    pub max_suggestions: usize,
    pub exact_confidence: f32,
    pub partial_confidence: f32,
    pub generic_confidence: f32,
}

impl Default for ClipboardPluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_contexts: 20,
            context_expiry_ms: 5 * 60 * 1000,
            history_expiry_ms: 24 * 60 * 60 * 1000,
            max_suggestions: 3,
            exact_confidence: 0.95,
            partial_confidence: 0.7,
            generic_confidence: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cooldown_ms: i64,
    pub max_suggestions: usize,
    /// Remaining steps needed before a workflow start becomes task guidance.
    pub min_guidance_steps: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 30_000,
            max_suggestions: 9,
            min_guidance_steps: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub ready_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            ready_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| SynapseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(SynapseError::Config(msg.to_string()));

        if !(16..=20).contains(&self.features.dimension) {
            return fail("features.dimension must be within 16..=20");
        }
        if self.codebook.size == 0 || self.codebook.iterations == 0 {
            return fail("codebook.size and codebook.iterations must be > 0");
        }
        if self.training.training_interval == 0 {
            return fail("training.training_interval must be > 0");
        }
        if self.training.history_limit < self.training.min_training_events {
            return fail("training.history_limit must be >= training.min_training_events");
        }
        if self.patterns.min_len < 2 || self.patterns.min_len > self.patterns.max_len {
            return fail("patterns.min_len must be >= 2 and <= patterns.max_len");
        }
        if self.patterns.confidence_scale <= 0.0 {
            return fail("patterns.confidence_scale must be > 0");
        }
        if self.predictor.context_length == 0 || self.predictor.max_contexts == 0 {
            return fail("predictor.context_length and predictor.max_contexts must be > 0");
        }
        if self.learner.batch_size < 2 || self.learner.batch_size > self.learner.buffer_capacity {
            return fail("learner.batch_size must be within 2..=learner.buffer_capacity");
        }
        if self.learner.fit_interval == 0 {
            return fail("learner.fit_interval must be > 0");
        }
        let wf = &self.plugins.workflow;
        if wf.mine_every == 0 || wf.min_len < 2 || wf.min_len > wf.max_len {
            return fail("plugins.workflow needs mine_every > 0 and 2 <= min_len <= max_len");
        }
        if self.plugins.clipboard.history_expiry_ms < self.plugins.clipboard.context_expiry_ms {
            return fail("plugins.clipboard.history_expiry_ms must be >= context_expiry_ms");
        }
        if self.scheduler.max_suggestions == 0 {
            return fail("scheduler.max_suggestions must be > 0");
        }
        if self.worker.queue_capacity == 0 {
            return fail("worker.queue_capacity must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.features.dimension, 18);
        assert_eq!(c.codebook.size, 256);
        assert_eq!(c.training.min_training_events, 20);
        assert_eq!(c.predictor.context_length, 5);
        assert_eq!(c.predictor.kind, PredictorKind::Frequency);
        assert_eq!(c.learner.buffer_capacity, 100);
        assert_eq!(c.scheduler.cooldown_ms, 30_000);
        assert_eq!(c.scheduler.max_suggestions, 9);
        assert!(c.plugins.workflow.enabled);
        assert!(c.plugins.clipboard.enabled);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.patterns.min_frequency, 3);
        assert_eq!(config.plugins.clipboard.context_expiry_ms, 300_000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[features]
dimension = 20

[codebook]
size = 64
iterations = 5
seed = 42

[predictor]
kind = "incremental"
context_length = 4
max_contexts = 500
timeout_ms = 1000
min_confidence = 0.5

[plugins.workflow]
enabled = false
buffer_size = 30
mine_every = 5
min_len = 3
max_len = 6
min_frequency = 3
confidence_scale = 5.0
abandon_after_misses = 2
abandon_after_ms = 60000

[scheduler]
cooldown_ms = 10000
max_suggestions = 5
min_guidance_steps = 1
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.features.dimension, 20);
        assert_eq!(config.codebook.seed, Some(42));
        assert_eq!(config.predictor.kind, PredictorKind::Incremental);
        assert_eq!(config.predictor.context_length, 4);
        assert!(!config.plugins.workflow.enabled);
        assert_eq!(config.plugins.workflow.abandon_after_misses, 2);
        assert_eq!(config.scheduler.max_suggestions, 5);
        // untouched sections keep defaults
        assert_eq!(config.learner.batch_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_dimension() {
        let mut c = Config::default();
        c.features.dimension = 8;
        assert!(matches!(c.validate(), Err(SynapseError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_lengths() {
        let mut c = Config::default();
        c.patterns.min_len = 4;
        c.patterns.max_len = 3;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.codebook.size, config.codebook.size);
        assert_eq!(deserialized.predictor.kind, config.predictor.kind);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
