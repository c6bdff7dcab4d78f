// src/core/mod.rs — Event model, intent scheduling and the engine context

pub mod engine;
pub mod intent;
pub mod types;

pub use engine::{Engine, ModelInfo, ModelStatus};
pub use intent::{Decision, IntentScheduler, Prediction, TaskGuidance};
pub use types::{Event, EventKind};
