// src/core/engine.rs — Ingestion-side engine context
//
// One Engine per process. It owns the event history, the experience buffer,
// the plugin set and the intent scheduler; all model state lives in the
// worker task and is reached through `WorkerHandle`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};

use super::intent::{IntentScheduler, Prediction};
use super::types::Event;
use crate::features::FeatureExtractor;
use crate::infra::config::{Config, PredictorKind};
use crate::infra::errors::{Result, SynapseError};
use crate::memory::KvStore;
use crate::patterns::miner::Pattern;
use crate::patterns::naming;
use crate::plugins::scheduler::SchedulerStatus;
use crate::plugins::types::{ActionKind, Suggestion, SuggestionAction, SuggestionCategory};
use crate::plugins::{self, PluginContext, PluginScheduler};
use crate::predictor::incremental::{IncrementalLearner, LearnerMetrics};
use crate::predictor::model::{SequenceModel, TransitionModel};
use crate::worker::{
    spawn_worker, ModelWorker, PredictorSnapshot, TrainingReport, WorkerHandle, WorkerRequest,
    WorkerResponse,
};

pub const SEQUENCE_SOURCE: &str = "sequence";

const UI_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Worker has not signalled ready yet.
    Initializing,
    Untrained,
    Training,
    Ready,
    /// Worker did not answer in time.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub vocab_size: usize,
    pub skills_count: usize,
    #[serde(rename = "type")]
    pub model_type: String,
    pub status: ModelStatus,
    pub context_count: usize,
    pub codebook_size: usize,
    pub events_seen: u64,
    pub trainable_model: Option<String>,
    pub trainable_model_ready: bool,
    pub learner: LearnerMetrics,
}

/// A queued worker job whose reply has not been collected yet.
struct PendingJob {
    kind: &'static str,
    rx: oneshot::Receiver<WorkerResponse>,
}

impl PendingJob {
    /// True once the reply has arrived (or can never arrive).
    fn poll(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(response) => {
                match response.error() {
                    Some(e) => tracing::debug!("Worker {} finished with error: {}", self.kind, e),
                    None => tracing::debug!("Worker {} finished", self.kind),
                }
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => true,
        }
    }
}

pub struct Engine {
    config: Config,
    extractor: FeatureExtractor,
    worker: WorkerHandle,
    worker_task: tokio::task::JoinHandle<()>,
    ready_rx: Option<oneshot::Receiver<WorkerResponse>>,
    history: VecDeque<Event>,
    event_count: u64,
    /// `event_count` at the last queued training pass.
    trained_through: u64,
    pending_train: Option<PendingJob>,
    pending_fit: Option<PendingJob>,
    learner: IncrementalLearner,
    plugins: PluginScheduler,
    intent: IntentScheduler,
    last_prediction: Prediction,
    ui_tx: broadcast::Sender<Prediction>,
}

impl Engine {
    /// Start with the default trainable model.
    pub async fn start(config: Config, store: Arc<dyn KvStore>) -> Result<Self> {
        let model = TransitionModel::from_config(&config.learner);
        Self::start_with_model(config, store, Box::new(model)).await
    }

    pub async fn start_with_model(
        config: Config,
        store: Arc<dyn KvStore>,
        model: Box<dyn SequenceModel>,
    ) -> Result<Self> {
        config.validate()?;

        let worker = ModelWorker::load(config.clone(), store.clone(), model);
        let (tx, ready_rx, snapshot_rx, worker_task) =
            spawn_worker(worker, config.worker.queue_capacity);

        let mut plugins = PluginScheduler::new(plugins::build(&config.plugins));
        plugins.initialize_all(&PluginContext { store });

        let (ui_tx, _) = broadcast::channel(UI_CHANNEL_CAPACITY);
        let mut engine = Self {
            extractor: FeatureExtractor::new(config.features.dimension),
            worker: WorkerHandle::new(tx, snapshot_rx),
            worker_task,
            ready_rx: Some(ready_rx),
            history: VecDeque::new(),
            event_count: 0,
            trained_through: 0,
            pending_train: None,
            pending_fit: None,
            learner: IncrementalLearner::new(&config.learner),
            intent: IntentScheduler::new(config.scheduler.clone()),
            plugins,
            last_prediction: Prediction::idle("no events yet"),
            ui_tx,
            config,
        };
        engine.await_ready().await;
        tracing::info!(
            "Engine started ({} predictor, {} plugins)",
            engine.config.predictor.kind.as_str(),
            engine.plugins.len()
        );
        Ok(engine)
    }

    async fn await_ready(&mut self) {
        let Some(rx) = self.ready_rx.as_mut() else {
            return;
        };
        let timeout = Duration::from_millis(self.config.worker.ready_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(WorkerResponse::WorkerReady { model })) => {
                tracing::debug!("Worker ready ({})", model);
                self.ready_rx = None;
            }
            Ok(Ok(other)) => {
                tracing::warn!("Unexpected first worker message: {}", other.kind());
                self.ready_rx = None;
            }
            Ok(Err(_)) => {
                tracing::warn!("Worker exited before signalling ready");
                self.ready_rx = None;
            }
            Err(_) => tracing::warn!("Worker not ready after {:?}, continuing degraded", timeout),
        }
    }

    pub fn is_worker_ready(&mut self) -> bool {
        if let Some(rx) = self.ready_rx.as_mut() {
            match rx.try_recv() {
                Ok(_) | Err(oneshot::error::TryRecvError::Closed) => self.ready_rx = None,
                Err(oneshot::error::TryRecvError::Empty) => return false,
            }
        }
        !self.worker.is_closed()
    }

    /// Receive every surfaced prediction.
    pub fn subscribe(&self) -> broadcast::Receiver<Prediction> {
        self.ui_tx.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn snapshot(&self) -> Arc<PredictorSnapshot> {
        self.worker.snapshot()
    }

    /// Fire-and-forget ingestion.
    pub async fn submit(&mut self, event: Event) {
        self.process_event(event).await;
    }

    /// Ingest one event and return the resulting prediction. Never fails:
    /// every downstream error degrades to fewer suggestions.
    pub async fn process_event(&mut self, event: Event) -> Prediction {
        self.poll_jobs();

        let limit = self.config.training.history_limit.max(1);
        if self.history.len() == limit {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
        self.event_count += 1;

        self.learner.add_experience(event.clone());
        self.maybe_fit();
        self.maybe_train();

        let mut suggestions = self.plugins.dispatch(&event);
        if let Some(next) = self.predict_next().await {
            suggestions.push(next);
        }

        let decision = self.intent.combine(event.timestamp, suggestions);
        if decision.surfaced {
            let _ = self.ui_tx.send(decision.prediction.clone());
        }
        self.last_prediction = decision.prediction.clone();
        decision.prediction
    }

    pub fn get_prediction(&self) -> Prediction {
        self.last_prediction.clone()
    }

    fn poll_jobs(&mut self) {
        if self.pending_train.as_mut().is_some_and(PendingJob::poll) {
            self.pending_train = None;
        }
        if self.pending_fit.as_mut().is_some_and(PendingJob::poll) {
            self.pending_fit = None;
        }
    }

    fn job_in_flight(&self) -> bool {
        self.pending_train.is_some() || self.pending_fit.is_some()
    }

    fn maybe_train(&mut self) {
        let t = &self.config.training;
        let due = self.event_count >= t.min_training_events as u64
            && self.event_count % t.training_interval.max(1) as u64 == 0;
        if !due {
            return;
        }
        if self.pending_train.is_some() {
            tracing::debug!("Training already in flight, skipping trigger at {}", self.event_count);
            return;
        }
        let events: Vec<Event> = self.history.iter().cloned().collect();
        match self.worker.try_submit(WorkerRequest::Train {
            events,
            rebuild_codebook: false,
            new_events: Some(self.untrained_events()),
        }) {
            Ok(rx) => {
                tracing::debug!("Training queued at event {}", self.event_count);
                self.trained_through = self.event_count;
                self.pending_train = Some(PendingJob { kind: "train", rx });
            }
            Err(e) => tracing::warn!("Training trigger skipped: {}", e),
        }
    }

    /// History tail that no queued training pass has covered.
    fn untrained_events(&self) -> usize {
        let fresh = self.event_count.saturating_sub(self.trained_through);
        usize::try_from(fresh).unwrap_or(usize::MAX).min(self.history.len())
    }

    fn maybe_fit(&mut self) {
        if self.config.predictor.kind != PredictorKind::Incremental
            || self.pending_fit.is_some()
            || !self.learner.should_fit()
        {
            return;
        }
        let snapshot = self.worker.snapshot();
        let Some(batch) = self.learner.prepare_batch(&snapshot.vocabulary) else {
            return;
        };
        match self.worker.try_submit(WorkerRequest::Fit { batch }) {
            Ok(rx) => self.pending_fit = Some(PendingJob { kind: "fit", rx }),
            Err(e) => tracing::debug!("Fit skipped: {}", e),
        }
    }

    fn recent(&self) -> Vec<Event> {
        let l = self.config.predictor.context_length;
        let skip = self.history.len().saturating_sub(l);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Next-action suggestion from the configured predictor.
    async fn predict_next(&mut self) -> Option<Suggestion> {
        let recent = self.recent();

        if self.config.predictor.kind == PredictorKind::Incremental
            && self.ready_rx.is_none()
            && !self.job_in_flight()
        {
            match self.model_prediction(recent.clone()).await {
                Ok(Some((token, confidence, model))) => {
                    return self.next_action(&token, confidence, &model, None);
                }
                Ok(None) => {}
                Err(e) if e.falls_back() => {
                    tracing::debug!("Falling back to frequency table: {}", e)
                }
                Err(e) => tracing::warn!("Model prediction failed: {}", e),
            }
        }

        let snapshot = self.worker.snapshot();
        let p = snapshot.predict(&self.extractor, &recent)?;
        self.next_action(&p.label, p.confidence, "frequency", Some(p.support))
    }

    async fn model_prediction(&self, recent: Vec<Event>) -> Result<Option<(String, f32, String)>> {
        let timeout = Duration::from_millis(self.config.predictor.timeout_ms);
        match self
            .worker
            .request(WorkerRequest::Predict { recent }, timeout)
            .await?
        {
            WorkerResponse::PredictionResult {
                prediction: Some(p),
                ..
            } => Ok(Some((p.token, p.confidence, p.model))),
            WorkerResponse::PredictionResult { error, .. } => Err(SynapseError::ModelUnavailable(
                error.unwrap_or_else(|| "no prediction".into()),
            )),
            other => {
                tracing::warn!("Unexpected worker reply to predict: {}", other.kind());
                Ok(None)
            }
        }
    }

    fn next_action(
        &self,
        token: &str,
        confidence: f32,
        model: &str,
        support: Option<u32>,
    ) -> Option<Suggestion> {
        if confidence < self.config.predictor.min_confidence {
            return None;
        }
        let mut s = Suggestion::new(
            SEQUENCE_SOURCE,
            SuggestionCategory::NextAction,
            format!("Next: {}", naming::label(token)),
            confidence,
            SuggestionAction::new(ActionKind::Perform).with_value(token),
        )
        .with_description(format!("Predicted by the {model} model"))
        .with_payload("model", model);
        if let Some(n) = support {
            s = s.with_payload("support", n);
        }
        Some(s)
    }

    /// Skills learned so far; empty when the worker cannot answer.
    pub async fn get_skills(&mut self) -> Vec<Pattern> {
        let timeout = Duration::from_millis(self.config.predictor.timeout_ms);
        match self.worker.request(WorkerRequest::GetSkills, timeout).await {
            Ok(WorkerResponse::SkillsResult { skills }) => skills,
            Ok(other) => {
                tracing::warn!("Unexpected worker reply to getSkills: {}", other.kind());
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("getSkills failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_model_info(&mut self) -> ModelInfo {
        self.poll_jobs();
        let ready = self.is_worker_ready();
        let timeout = Duration::from_millis(self.config.predictor.timeout_ms);
        let info = match self.worker.request(WorkerRequest::GetInfo, timeout).await {
            Ok(WorkerResponse::InfoResult { info }) => Some(info),
            Ok(other) => {
                tracing::warn!("Unexpected worker reply to getInfo: {}", other.kind());
                None
            }
            Err(e) => {
                tracing::warn!("getInfo failed: {}", e);
                None
            }
        };

        let snapshot = self.worker.snapshot();
        let status = match &info {
            _ if !ready => ModelStatus::Initializing,
            None => ModelStatus::Unavailable,
            Some(_) if self.pending_train.is_some() => ModelStatus::Training,
            Some(i) if i.vocab_size > 0 => ModelStatus::Ready,
            Some(_) => ModelStatus::Untrained,
        };
        let incremental = self.config.predictor.kind == PredictorKind::Incremental;
        ModelInfo {
            vocab_size: info.as_ref().map_or(snapshot.vocabulary.len(), |i| i.vocab_size),
            skills_count: info.as_ref().map_or(snapshot.skills_count, |i| i.skills_count),
            model_type: self.config.predictor.kind.as_str().to_string(),
            status,
            context_count: info
                .as_ref()
                .map_or(snapshot.table.context_count(), |i| i.context_count),
            codebook_size: info.as_ref().map_or(snapshot.codebook.size(), |i| i.codebook_size),
            events_seen: self.event_count,
            trainable_model: info
                .as_ref()
                .filter(|_| incremental)
                .map(|i| i.model_type.clone()),
            trainable_model_ready: info.as_ref().is_some_and(|i| i.model_trained),
            learner: self.learner.metrics(),
        }
    }

    pub fn get_plugin_status(&self) -> SchedulerStatus {
        self.plugins.status()
    }

    /// Full training pass over the history, re-clustering the codebook.
    /// Returns `None` (logged) when there is too little data or the worker fails.
    pub async fn train_model(&mut self) -> Option<TrainingReport> {
        let needed = self.config.training.min_training_events;
        if self.history.len() < needed {
            tracing::info!(
                "{}",
                SynapseError::InsufficientData {
                    needed,
                    got: self.history.len()
                }
            );
            return None;
        }
        let events: Vec<Event> = self.history.iter().cloned().collect();
        let rx = match self.worker.try_submit(WorkerRequest::Train {
            events,
            rebuild_codebook: true,
            new_events: Some(self.untrained_events()),
        }) {
            Ok(rx) => {
                self.trained_through = self.event_count;
                rx
            }
            Err(e) => {
                tracing::warn!("Explicit training not queued: {}", e);
                return None;
            }
        };
        match rx.await {
            Ok(WorkerResponse::TrainingComplete {
                success: true,
                report,
                ..
            }) => report,
            Ok(other) => {
                tracing::warn!(
                    "Explicit training failed: {}",
                    other.error().unwrap_or("unexpected reply")
                );
                None
            }
            Err(_) => {
                tracing::warn!("Worker dropped the training job");
                None
            }
        }
    }

    /// Persist plugin state and stop the worker.
    pub async fn shutdown(self) {
        let Self {
            mut plugins,
            worker,
            worker_task,
            ..
        } = self;
        plugins.cleanup_all();
        drop(worker);
        if tokio::time::timeout(Duration::from_secs(5), worker_task)
            .await
            .is_err()
        {
            tracing::warn!("Worker did not stop within 5s");
        }
        tracing::info!("Engine stopped");
    }
}
