// src/core/intent.rs — Merges predictor and plugin output into one Prediction
//
// Workflow continuations become task guidance. Updates of a workflow already
// under way always surface; a fresh start needs enough remaining steps and
// obeys the global cooldown like everything else, which is ranked and
// truncated.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::infra::config::SchedulerConfig;
use crate::plugins::types::{Suggestion, WorkflowProgress};

/// The single best multi-step continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGuidance {
    pub suggestion: Suggestion,
    pub progress: WorkflowProgress,
}

/// Unified UI-facing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Prediction {
    TaskGuidance(TaskGuidance),
    Suggestions(Vec<Suggestion>),
    Idle { reason: String },
}

impl Prediction {
    pub fn idle(reason: impl Into<String>) -> Self {
        Self::Idle {
            reason: reason.into(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle { .. })
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        match self {
            Self::Suggestions(s) => s,
            Self::TaskGuidance(g) => std::slice::from_ref(&g.suggestion),
            Self::Idle { .. } => &[],
        }
    }
}

/// Outcome of one scheduling cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub prediction: Prediction,
    /// Whether the prediction goes out on the UI channel.
    pub surfaced: bool,
}

/// Descending confidence, then descending priority.
pub fn rank(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal))
    });
}

pub struct IntentScheduler {
    config: SchedulerConfig,
    last_surfaced: Option<i64>,
}

impl IntentScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            last_surfaced: None,
        }
    }

    /// A timestamp earlier than the last surfacing counts as inside the cooldown.
    pub fn in_cooldown(&self, now_ms: i64) -> bool {
        match self.last_surfaced {
            Some(last) => now_ms < last.saturating_add(self.config.cooldown_ms),
            None => false,
        }
    }

    pub fn last_surfaced(&self) -> Option<i64> {
        self.last_surfaced
    }

    fn guidance_candidate(&self, progress: &WorkflowProgress) -> Option<bool> {
        let remaining = progress.remaining_steps();
        if progress.completed_steps > 1 && remaining > 0 {
            Some(true)
        } else if remaining >= self.config.min_guidance_steps {
            Some(false)
        } else {
            None
        }
    }

    pub fn combine(&mut self, now_ms: i64, mut suggestions: Vec<Suggestion>) -> Decision {
        // (index, under way)
        let guidance = suggestions
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                let p = s.progress.as_ref()?;
                self.guidance_candidate(p).map(|active| (i, s, p, active))
            })
            .max_by(|(_, a, pa, aa), (_, b, pb, ab)| {
                aa.cmp(ab)
                    .then(a.confidence.total_cmp(&b.confidence))
                    .then(pa.completed_steps.cmp(&pb.completed_steps))
            })
            .map(|(i, _, _, active)| (i, active));

        if let Some((i, active)) = guidance {
            let suggestion = suggestions.swap_remove(i);
            if let Some(progress) = suggestion.progress.clone() {
                let surfaced = if active {
                    true
                } else if self.in_cooldown(now_ms) {
                    tracing::trace!("Workflow start held back by cooldown");
                    false
                } else {
                    self.last_surfaced = Some(now_ms);
                    true
                };
                tracing::debug!(
                    surfaced,
                    "Task guidance: {} ({}/{})",
                    progress.pattern_name,
                    progress.completed_steps,
                    progress.total_steps
                );
                return Decision {
                    prediction: Prediction::TaskGuidance(TaskGuidance {
                        suggestion,
                        progress,
                    }),
                    surfaced,
                };
            }
        }

        if suggestions.is_empty() {
            return Decision {
                prediction: Prediction::idle("no confident suggestions"),
                surfaced: false,
            };
        }

        rank(&mut suggestions);
        suggestions.truncate(self.config.max_suggestions);

        let surfaced = !self.in_cooldown(now_ms);
        if surfaced {
            self.last_surfaced = Some(now_ms);
        } else {
            tracing::trace!("Suggestions held back by cooldown");
        }
        Decision {
            prediction: Prediction::Suggestions(suggestions),
            surfaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::types::{ActionKind, SuggestionAction, SuggestionCategory};

    fn suggestion(confidence: f32, priority: f32) -> Suggestion {
        Suggestion::new(
            "test",
            SuggestionCategory::NextAction,
            format!("{confidence}"),
            confidence,
            SuggestionAction::new(ActionKind::Perform),
        )
        .with_priority(priority)
    }

    fn guided(completed: usize, total: usize) -> Suggestion {
        suggestion(0.2, 0.0).with_progress(WorkflowProgress {
            pattern_id: "p".into(),
            pattern_name: "a → b → c → d".into(),
            completed_steps: completed,
            total_steps: total,
            next_step: Some("b".into()),
        })
    }

    fn scheduler() -> IntentScheduler {
        IntentScheduler::new(SchedulerConfig::default())
    }

    #[test]
    fn test_ranked_and_truncated() {
        let mut s = scheduler();
        let input: Vec<Suggestion> = (0..12).map(|i| suggestion(i as f32 / 12.0, 0.0)).collect();
        let d = s.combine(0, input);
        let out = d.prediction.suggestions();
        assert_eq!(out.len(), 9);
        assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(d.surfaced);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let mut s = scheduler();
        let d = s.combine(0, vec![suggestion(0.5, 0.1), suggestion(0.5, 0.9)]);
        assert_eq!(d.prediction.suggestions()[0].priority, 0.9);
    }

    #[test]
    fn test_cooldown() {
        let mut s = scheduler();
        assert!(s.combine(1_000, vec![suggestion(0.8, 0.0)]).surfaced);
        assert!(!s.combine(20_000, vec![suggestion(0.8, 0.0)]).surfaced);
        // out-of-order timestamp is inside the cooldown
        assert!(!s.combine(500, vec![suggestion(0.8, 0.0)]).surfaced);
        assert!(s.combine(31_000, vec![suggestion(0.8, 0.0)]).surfaced);
    }

    #[test]
    fn test_workflow_start_obeys_cooldown() {
        let mut s = scheduler();
        assert!(s.combine(0, vec![suggestion(0.8, 0.0)]).surfaced);
        let d = s.combine(1_000, vec![suggestion(0.9, 0.0), guided(1, 4)]);
        assert!(!d.surfaced);
        let Prediction::TaskGuidance(g) = d.prediction else {
            panic!("expected task guidance");
        };
        assert_eq!(g.progress.remaining_steps(), 3);
        assert_eq!(s.last_surfaced(), Some(0));
    }

    #[test]
    fn test_workflow_start_surfaces_and_starts_cooldown() {
        let mut s = scheduler();
        let d = s.combine(5_000, vec![guided(1, 4)]);
        assert!(d.surfaced);
        assert!(matches!(d.prediction, Prediction::TaskGuidance(_)));
        assert_eq!(s.last_surfaced(), Some(5_000));
        assert!(!s.combine(6_000, vec![suggestion(0.9, 0.0)]).surfaced);
    }

    #[test]
    fn test_active_workflow_updates_bypass_cooldown() {
        let mut s = scheduler();
        assert!(s.combine(0, vec![suggestion(0.8, 0.0)]).surfaced);
        assert!(!s.combine(1_000, vec![guided(1, 3)]).surfaced);

        // the last step has one remaining, below the start threshold
        let d = s.combine(2_000, vec![suggestion(0.9, 0.0), guided(2, 3)]);
        assert!(d.surfaced);
        let Prediction::TaskGuidance(g) = d.prediction else {
            panic!("expected task guidance");
        };
        assert_eq!(g.progress.completed_steps, 2);
        // updates leave the cooldown clock alone
        assert_eq!(s.last_surfaced(), Some(0));
    }

    #[test]
    fn test_short_start_is_plain_suggestion() {
        let mut s = scheduler();
        let d = s.combine(0, vec![guided(1, 2)]);
        assert!(matches!(d.prediction, Prediction::Suggestions(ref v) if v.len() == 1));
    }

    #[test]
    fn test_finished_workflow_is_plain_suggestion() {
        let mut s = scheduler();
        let d = s.combine(0, vec![guided(4, 4)]);
        assert!(matches!(d.prediction, Prediction::Suggestions(_)));
    }

    #[test]
    fn test_empty_is_idle() {
        let mut s = scheduler();
        let d = s.combine(0, Vec::new());
        assert!(d.prediction.is_idle());
        assert!(!d.surfaced);
        assert_eq!(s.last_surfaced(), None);
    }
}
