// src/plugins/types.rs — Suggestion values shared by plugins and schedulers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionCategory {
    NextAction,
    Workflow,
    Clipboard,
}

impl SuggestionCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NextAction => "next_action",
            Self::Workflow => "workflow",
            Self::Clipboard => "clipboard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Perform the predicted next step.
    Perform,
    ContinueWorkflow,
    SaveWorkflow,
    Paste,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionAction {
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SuggestionAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            target: None,
            value: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Progress through a tracked multi-step pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowProgress {
    pub pattern_id: String,
    pub pattern_name: String,
    pub completed_steps: usize,
    pub total_steps: usize,
    /// Next expected symbolic token, if any remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

impl WorkflowProgress {
    pub fn remaining_steps(&self) -> usize {
        self.total_steps.saturating_sub(self.completed_steps)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub source_plugin_id: String,
    pub category: SuggestionCategory,
    pub title: String,
    pub description: String,
    pub confidence: f32,
    pub priority: f32,
    pub action: SuggestionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<WorkflowProgress>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl Suggestion {
    /// Confidence is clamped into [0, 1].
    pub fn new(
        source: &str,
        category: SuggestionCategory,
        title: impl Into<String>,
        confidence: f32,
        action: SuggestionAction,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            id: Uuid::new_v4().to_string(),
            source_plugin_id: source.to_string(),
            category,
            title: title.into(),
            description: String::new(),
            confidence,
            priority: 0.0,
            action,
            progress: None,
            payload: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_progress(mut self, progress: WorkflowProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_payload(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        let s = Suggestion::new(
            "t",
            SuggestionCategory::NextAction,
            "x",
            1.7,
            SuggestionAction::new(ActionKind::Perform),
        );
        assert_eq!(s.confidence, 1.0);
        let s = Suggestion::new(
            "t",
            SuggestionCategory::NextAction,
            "x",
            f32::NAN,
            SuggestionAction::new(ActionKind::Perform),
        );
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_serialized_shape() {
        let s = Suggestion::new(
            "clipboard",
            SuggestionCategory::Clipboard,
            "Paste email",
            0.95,
            SuggestionAction::new(ActionKind::Paste).with_value("jane@example.com"),
        );
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["sourcePluginId"], "clipboard");
        assert_eq!(json["category"], "clipboard");
        assert_eq!(json["action"]["kind"], "paste");
        assert!(json.get("progress").is_none());
    }

    #[test]
    fn test_remaining_steps() {
        let p = WorkflowProgress {
            pattern_id: "p".into(),
            pattern_name: "n".into(),
            completed_steps: 2,
            total_steps: 5,
            next_step: None,
        };
        assert_eq!(p.remaining_steps(), 3);
    }
}
