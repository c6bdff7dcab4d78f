// src/worker/protocol.rs — Typed request/response messages for the model worker

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::core::types::Event;
use crate::patterns::miner::Pattern;
use crate::predictor::model::TrainingBatch;

/// Requests accepted by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerRequest {
    /// Full training pass over an event history.
    Train {
        events: Vec<Event>,
        /// Re-cluster the codebook before quantizing.
        #[serde(rename = "rebuildCodebook", default)]
        rebuild_codebook: bool,
        /// Trailing events no earlier pass has seen; all of them when absent.
        #[serde(rename = "newEvents", default, skip_serializing_if = "Option::is_none")]
        new_events: Option<usize>,
    },
    /// Incremental update of the trainable model.
    Fit { batch: TrainingBatch },
    /// Next-token prediction from the trainable model.
    Predict { recent: Vec<Event> },
    GetSkills,
    GetInfo,
}

impl WorkerRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Train { .. } => "train",
            Self::Fit { .. } => "fit",
            Self::Predict { .. } => "predict",
            Self::GetSkills => "getSkills",
            Self::GetInfo => "getInfo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingReport {
    pub events: usize,
    pub vocab_size: usize,
    pub skills_count: usize,
    pub patterns_touched: usize,
    pub context_count: usize,
    pub codebook_rebuilt: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPrediction {
    pub token: String,
    pub confidence: f32,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    pub vocab_size: usize,
    pub skills_count: usize,
    pub context_count: usize,
    pub codebook_size: usize,
    pub model_type: String,
    pub model_trained: bool,
    pub trainings: u64,
    pub last_trained_at: Option<i64>,
}

/// Responses emitted by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    WorkerReady {
        model: String,
    },
    TrainingComplete {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<TrainingReport>,
    },
    FitComplete {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        loss: Option<f32>,
    },
    PredictionResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prediction: Option<ModelPrediction>,
    },
    SkillsResult {
        skills: Vec<Pattern>,
    },
    InfoResult {
        info: WorkerInfo,
    },
}

impl WorkerResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkerReady { .. } => "worker_ready",
            Self::TrainingComplete { .. } => "training_complete",
            Self::FitComplete { .. } => "fit_complete",
            Self::PredictionResult { .. } => "prediction_result",
            Self::SkillsResult { .. } => "skills_result",
            Self::InfoResult { .. } => "info_result",
        }
    }

    /// Failure message carried by the response, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::TrainingComplete { error, .. }
            | Self::FitComplete { error, .. }
            | Self::PredictionResult { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}

/// A queued request with its correlation id and reply channel.
#[derive(Debug)]
pub struct Envelope {
    pub id: u64,
    pub request: WorkerRequest,
    pub reply: oneshot::Sender<WorkerResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_tags() {
        let json = serde_json::to_value(&WorkerRequest::GetSkills).unwrap();
        assert_eq!(json, serde_json::json!({"type": "getSkills"}));

        let train: WorkerRequest =
            serde_json::from_str(r#"{"type":"train","events":[],"rebuildCodebook":true}"#).unwrap();
        assert!(matches!(
            train,
            WorkerRequest::Train {
                rebuild_codebook: true,
                ..
            }
        ));
        assert_eq!(train.kind(), "train");

        let incremental: WorkerRequest =
            serde_json::from_str(r#"{"type":"train","events":[],"newEvents":10}"#).unwrap();
        assert!(matches!(
            incremental,
            WorkerRequest::Train {
                rebuild_codebook: false,
                new_events: Some(10),
                ..
            }
        ));
    }

    #[test]
    fn test_response_tags() {
        let r = WorkerResponse::TrainingComplete {
            success: false,
            error: Some("boom".into()),
            report: None,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "training_complete", "success": false, "error": "boom"})
        );
        assert_eq!(r.error(), Some("boom"));
        assert_eq!(
            WorkerResponse::WorkerReady { model: "x".into() }.kind(),
            "worker_ready"
        );
    }
}
