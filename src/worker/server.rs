// src/worker/server.rs — The model worker task
//
// Owns the codebook, vocabulary, skills library, context table, token labels
// and the trainable model. Jobs are served one at a time in arrival order;
// every training job works on copies and commits only on success.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};

use super::protocol::{
    Envelope, ModelPrediction, TrainingReport, WorkerInfo, WorkerRequest, WorkerResponse,
};
use super::snapshot::{PredictorSnapshot, TokenLabels};
use crate::core::types::Event;
use crate::features::FeatureExtractor;
use crate::infra::config::Config;
use crate::infra::errors::{Result, SynapseError};
use crate::memory::{self, keys, KvStore};
use crate::patterns::miner::{MinerSettings, Pattern, PatternMiner};
use crate::patterns::vocabulary::Vocabulary;
use crate::predictor::model::{argmax, SequenceModel, TrainingBatch};
use crate::predictor::sequence::SequencePredictor;
use crate::quantizer::codebook::{Codebook, TokenId};
use crate::quantizer::rng::Rng;

pub struct ModelWorker {
    config: Config,
    store: Arc<dyn KvStore>,
    extractor: FeatureExtractor,
    rng: Rng,
    codebook: Codebook,
    vocabulary: Vocabulary,
    skills: PatternMiner,
    table: SequencePredictor<TokenId>,
    labels: TokenLabels,
    model: Box<dyn SequenceModel>,
    trainings: u64,
    last_trained_at: Option<i64>,
}

/// Committed result of a training pass, built off to the side.
struct TrainedState {
    codebook: Codebook,
    vocabulary: Vocabulary,
    skills: PatternMiner,
    table: SequencePredictor<TokenId>,
    labels: TokenLabels,
    report: TrainingReport,
}

impl ModelWorker {
    /// Restore persisted state; generate and persist a random codebook on first use.
    pub fn load(config: Config, store: Arc<dyn KvStore>, mut model: Box<dyn SequenceModel>) -> Self {
        let dimension = config.features.dimension;
        let mut rng = Rng::from_config(config.codebook.seed);
        let s = store.as_ref();

        let codebook = match memory::load_or_warn::<Codebook>(s, keys::CODEBOOK) {
            Some(cb) if cb.dimension() == dimension && cb.size() == config.codebook.size => cb,
            stale => {
                if stale.is_some() {
                    tracing::warn!("Persisted codebook does not match configuration, regenerating");
                }
                let cb = Codebook::random(config.codebook.size, dimension, &mut rng);
                memory::save_or_warn(s, keys::CODEBOOK, &cb);
                cb
            }
        };

        let vocabulary = memory::load_or_warn::<Vocabulary>(s, keys::VOCABULARY)
            .map(Vocabulary::reindex)
            .unwrap_or_default();
        let skills = PatternMiner::with_patterns(
            MinerSettings::from(&config.patterns),
            memory::load_or_warn::<Vec<Pattern>>(s, keys::SKILLS).unwrap_or_default(),
        );
        let table = memory::load_or_warn::<SequencePredictor<TokenId>>(s, keys::CONTEXT_TABLE)
            .filter(|t| t.context_length() == config.predictor.context_length)
            .unwrap_or_else(|| {
                SequencePredictor::new(config.predictor.context_length, config.predictor.max_contexts)
            });
        let labels = memory::load_or_warn::<TokenLabels>(s, keys::TOKEN_LABELS).unwrap_or_default();

        match store.get(keys::MODEL_WEIGHTS) {
            Ok(Some(blob)) => {
                if let Err(e) = model.load(&blob) {
                    tracing::warn!("Discarding persisted {} weights: {}", model.name(), e);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read model weights: {}", e),
        }

        Self {
            extractor: FeatureExtractor::new(dimension),
            config,
            store,
            rng,
            codebook,
            vocabulary,
            skills,
            table,
            labels,
            model,
            trainings: 0,
            last_trained_at: None,
        }
    }

    pub fn snapshot(&self) -> PredictorSnapshot {
        PredictorSnapshot {
            codebook: self.codebook.clone(),
            vocabulary: self.vocabulary.clone(),
            table: self.table.clone(),
            labels: self.labels.clone(),
            skills_count: self.skills.skills().len(),
        }
    }

    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::Train {
                events,
                rebuild_codebook,
                new_events,
            } => match self.train(&events, rebuild_codebook, new_events.unwrap_or(events.len())) {
                Ok(report) => WorkerResponse::TrainingComplete {
                    success: true,
                    error: None,
                    report: Some(report),
                },
                Err(e) => {
                    match &e {
                        SynapseError::InsufficientData { .. } => tracing::debug!("Training skipped: {}", e),
                        _ => tracing::warn!("Training failed, keeping previous state: {}", e),
                    }
                    WorkerResponse::TrainingComplete {
                        success: false,
                        error: Some(e.to_string()),
                        report: None,
                    }
                }
            },
            WorkerRequest::Fit { batch } => match self.fit(&batch) {
                Ok(loss) => WorkerResponse::FitComplete {
                    success: true,
                    error: None,
                    loss: Some(loss),
                },
                Err(e) => {
                    tracing::warn!("Incremental fit failed: {}", e);
                    WorkerResponse::FitComplete {
                        success: false,
                        error: Some(e.to_string()),
                        loss: None,
                    }
                }
            },
            WorkerRequest::Predict { recent } => match self.predict(&recent) {
                Ok(prediction) => WorkerResponse::PredictionResult {
                    success: true,
                    error: None,
                    prediction: Some(prediction),
                },
                Err(e) => WorkerResponse::PredictionResult {
                    success: false,
                    error: Some(e.to_string()),
                    prediction: None,
                },
            },
            WorkerRequest::GetSkills => WorkerResponse::SkillsResult {
                skills: self.skills.skills(),
            },
            WorkerRequest::GetInfo => WorkerResponse::InfoResult { info: self.info() },
        }
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            vocab_size: self.vocabulary.len(),
            skills_count: self.skills.skills().len(),
            context_count: self.table.context_count(),
            codebook_size: self.codebook.size(),
            model_type: self.model.name().to_string(),
            model_trained: self.model.is_trained(),
            trainings: self.trainings,
            last_trained_at: self.last_trained_at,
        }
    }

    fn train(
        &mut self,
        events: &[Event],
        rebuild_codebook: bool,
        new_events: usize,
    ) -> Result<TrainingReport> {
        let needed = self.config.training.min_training_events;
        if events.len() < needed {
            return Err(SynapseError::InsufficientData {
                needed,
                got: events.len(),
            });
        }
        let state = self.train_copy(events, rebuild_codebook, new_events)?;

        self.codebook = state.codebook;
        self.vocabulary = state.vocabulary;
        self.skills = state.skills;
        self.table = state.table;
        self.labels = state.labels;
        self.trainings += 1;
        self.last_trained_at = Some(Utc::now().timestamp_millis());
        self.persist_training(rebuild_codebook);

        tracing::info!(
            "Training complete: {} events, vocab {}, {} skills, {} contexts",
            state.report.events,
            state.report.vocab_size,
            state.report.skills_count,
            state.report.context_count
        );
        Ok(state.report)
    }

    fn train_copy(
        &mut self,
        events: &[Event],
        rebuild_codebook: bool,
        new_events: usize,
    ) -> Result<TrainedState> {
        let tokens: Vec<String> = events.iter().map(|e| self.extractor.base_token(e)).collect();
        let vectors: Vec<Vec<f32>> = events.iter().map(|e| self.extractor.extract(e)).collect();

        let codebook = if rebuild_codebook {
            self.codebook
                .rebuild(&vectors, self.config.codebook.iterations, &mut self.rng)?
        } else {
            self.codebook.clone()
        };
        let ids: Vec<TokenId> = vectors.iter().map(|v| codebook.assign(v)).collect();

        let vocabulary = Vocabulary::rebuild(&tokens);

        let mut skills = self.skills.clone();
        let last_ts = events.last().map(|e| e.timestamp).unwrap_or_default();
        let touched = skills.observe(&tokens, new_events, Some(&vocabulary), last_ts);

        // a rebuilt codebook changes the alphabet; old contexts are meaningless
        let (mut table, mut labels) = if rebuild_codebook {
            (
                SequencePredictor::new(
                    self.config.predictor.context_length,
                    self.config.predictor.max_contexts,
                ),
                TokenLabels::default(),
            )
        } else {
            (self.table.clone(), self.labels.clone())
        };
        table.observe(&ids);
        for (id, token) in ids.iter().zip(tokens.iter()) {
            labels.record(*id, token);
        }

        let report = TrainingReport {
            events: events.len(),
            vocab_size: vocabulary.len(),
            skills_count: skills.skills().len(),
            patterns_touched: touched.len(),
            context_count: table.context_count(),
            codebook_rebuilt: rebuild_codebook,
        };
        Ok(TrainedState {
            codebook,
            vocabulary,
            skills,
            table,
            labels,
            report,
        })
    }

    fn persist_training(&self, codebook_changed: bool) {
        let s = self.store.as_ref();
        if codebook_changed {
            memory::save_or_warn(s, keys::CODEBOOK, &self.codebook);
        }
        memory::save_or_warn(s, keys::VOCABULARY, &self.vocabulary);
        memory::save_or_warn(s, keys::SKILLS, self.skills.patterns());
        memory::save_or_warn(s, keys::CONTEXT_TABLE, &self.table);
        memory::save_or_warn(s, keys::TOKEN_LABELS, &self.labels);
    }

    fn fit(&mut self, batch: &TrainingBatch) -> Result<f32> {
        let before = self.model.save()?;
        match self.model.fit(batch) {
            Ok(loss) => {
                match self.model.save() {
                    Ok(blob) => {
                        if let Err(e) = self.store.set(keys::MODEL_WEIGHTS, &blob) {
                            tracing::warn!("Failed to persist model weights: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to serialize model weights: {}", e),
                }
                tracing::debug!("Fit {} pairs, loss {:.4}", batch.len(), loss);
                Ok(loss)
            }
            Err(e) => {
                self.model.load(&before)?;
                Err(e)
            }
        }
    }

    fn predict(&self, recent: &[Event]) -> Result<ModelPrediction> {
        if !self.model.is_trained() {
            return Err(SynapseError::ModelUnavailable(format!(
                "{} model not trained",
                self.model.name()
            )));
        }
        let tokens: Vec<String> = recent.iter().map(|e| self.extractor.base_token(e)).collect();
        let context = self.vocabulary.encode(&tokens);
        if context.is_empty() {
            return Err(SynapseError::InsufficientData { needed: 1, got: 0 });
        }
        let distribution = self.model.predict(&context)?;
        let (index, confidence) = argmax(&distribution)
            .ok_or_else(|| SynapseError::ModelUnavailable("empty distribution".into()))?;
        let token = self
            .vocabulary
            .token(index)
            .ok_or_else(|| {
                SynapseError::ModelUnavailable(format!("index {index} outside vocabulary"))
            })?
            .to_string();
        Ok(ModelPrediction {
            token,
            confidence: confidence.clamp(0.0, 1.0),
            model: self.model.name().to_string(),
        })
    }
}

/// Spawn the worker task. Returns the request sender, the ready signal, the
/// snapshot channel and the task handle.
pub fn spawn_worker(
    worker: ModelWorker,
    queue_capacity: usize,
) -> (
    mpsc::Sender<Envelope>,
    oneshot::Receiver<WorkerResponse>,
    watch::Receiver<Arc<PredictorSnapshot>>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let (ready_tx, ready_rx) = oneshot::channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(worker.snapshot()));
    let join_handle = tokio::spawn(run_worker(worker, rx, ready_tx, snapshot_tx));
    (tx, ready_rx, snapshot_rx, join_handle)
}

/// The background task that owns the model state.
pub async fn run_worker(
    mut worker: ModelWorker,
    mut rx: mpsc::Receiver<Envelope>,
    ready: oneshot::Sender<WorkerResponse>,
    snapshot_tx: watch::Sender<Arc<PredictorSnapshot>>,
) {
    let _ = ready.send(WorkerResponse::WorkerReady {
        model: worker.model.name().to_string(),
    });
    tracing::debug!("Model worker ready");

    while let Some(Envelope { id, request, reply }) = rx.recv().await {
        let kind = request.kind();
        tracing::trace!("Worker job {} ({})", id, kind);
        let response = worker.handle(request);

        if matches!(
            response,
            WorkerResponse::TrainingComplete { success: true, .. }
        ) {
            snapshot_tx.send_replace(Arc::new(worker.snapshot()));
        }
        if reply.send(response).is_err() {
            tracing::debug!("Worker job {} ({}) reply dropped by caller", id, kind);
        }
    }
    tracing::debug!("Model worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventKind;
    use crate::memory::MemoryStore;
    use crate::predictor::model::TransitionModel;

    fn config() -> Config {
        let mut c = Config::default();
        c.codebook.size = 8;
        c.codebook.seed = Some(11);
        c
    }

    fn worker(store: Arc<dyn KvStore>) -> ModelWorker {
        ModelWorker::load(config(), store, Box::new(TransitionModel::new(1.0, 0.1)))
    }

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| match i % 3 {
                0 => Event::new(EventKind::Click, i as i64 * 1000).with_selector("#save"),
                1 => Event::new(EventKind::Keydown, i as i64 * 1000).with_key("a", &[]),
                _ => Event::new(EventKind::Scroll, i as i64 * 1000).with_feature("direction", "down"),
            })
            .collect()
    }

    #[test]
    fn test_codebook_generated_and_persisted() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let w = worker(store.clone());
        assert_eq!(w.info().codebook_size, 8);
        assert!(store.get(keys::CODEBOOK).unwrap().is_some());
        let again = worker(store);
        assert_eq!(again.codebook, w.codebook);
    }

    #[test]
    fn test_short_history_leaves_state_unchanged() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut w = worker(store.clone());
        let codebook = w.codebook.clone();
        let response = w.handle(WorkerRequest::Train {
            events: events(19),
            rebuild_codebook: true,
            new_events: None,
        });
        assert!(matches!(
            response,
            WorkerResponse::TrainingComplete { success: false, .. }
        ));
        assert_eq!(w.codebook, codebook);
        assert!(w.vocabulary.is_empty());
        assert!(w.skills.is_empty());
        assert!(store.get(keys::VOCABULARY).unwrap().is_none());
    }

    #[test]
    fn test_train_commits_and_persists() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut w = worker(store.clone());
        let response = w.handle(WorkerRequest::Train {
            events: events(30),
            rebuild_codebook: false,
            new_events: None,
        });
        let WorkerResponse::TrainingComplete {
            success: true,
            report: Some(report),
            ..
        } = response
        else {
            panic!("training did not succeed");
        };
        assert_eq!(report.vocab_size, 3);
        assert!(report.skills_count >= 1);
        assert!(w.table.context_count() > 0);
        assert!(store.get(keys::SKILLS).unwrap().is_some());
        assert!(store.get(keys::CONTEXT_TABLE).unwrap().is_some());

        let restored = worker(store);
        assert_eq!(restored.vocabulary.len(), 3);
        assert_eq!(restored.skills.len(), w.skills.len());
    }

    #[test]
    fn test_codebook_rebuild_resets_table() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut w = worker(store);
        w.handle(WorkerRequest::Train {
            events: events(30),
            rebuild_codebook: false,
            new_events: None,
        });
        let old = w.codebook.clone();
        w.handle(WorkerRequest::Train {
            events: events(30),
            rebuild_codebook: true,
            new_events: None,
        });
        assert_ne!(w.codebook, old);
        assert_eq!(w.codebook.size(), 8);
    }

    #[test]
    fn test_predict_requires_trained_model() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut w = worker(store);
        let response = w.handle(WorkerRequest::Predict { recent: events(3) });
        assert!(matches!(
            response,
            WorkerResponse::PredictionResult { success: false, .. }
        ));
    }

    #[test]
    fn test_fit_then_predict() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut w = worker(store.clone());
        w.handle(WorkerRequest::Train {
            events: events(30),
            rebuild_codebook: false,
            new_events: None,
        });
        // click → keydown → scroll → click ...
        let batch = TrainingBatch {
            inputs: vec![vec![0], vec![1], vec![2]],
            targets: vec![1, 2, 0],
            vocab_size: 3,
        };
        assert!(matches!(
            w.handle(WorkerRequest::Fit { batch }),
            WorkerResponse::FitComplete { success: true, .. }
        ));
        assert!(store.get(keys::MODEL_WEIGHTS).unwrap().is_some());

        let recent = events(1);
        let WorkerResponse::PredictionResult {
            prediction: Some(p),
            ..
        } = w.handle(WorkerRequest::Predict { recent })
        else {
            panic!("expected a prediction");
        };
        assert_eq!(p.token, "regular_key");
        assert!(p.confidence > 0.0 && p.confidence <= 1.0);
    }

    #[test]
    fn test_failed_fit_keeps_weights() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut w = worker(store);
        let bad = TrainingBatch {
            inputs: vec![vec![9]],
            targets: vec![0],
            vocab_size: 2,
        };
        assert!(matches!(
            w.handle(WorkerRequest::Fit { batch: bad }),
            WorkerResponse::FitComplete { success: false, .. }
        ));
        assert!(!w.info().model_trained);
    }
}
