// src/predictor/mod.rs — Next-action predictors

pub mod incremental;
pub mod model;
pub mod sequence;

pub use incremental::{IncrementalLearner, LearnerMetrics};
pub use model::{argmax, SequenceModel, TrainingBatch, TransitionModel};
pub use sequence::{SequencePredictor, TokenPrediction};
