// src/plugins/workflow.rs — Multi-step workflow detection and tracking
//
// Mines recurring step sequences from a bounded buffer of recent tokens and
// follows matching workflows as they unfold: idle → started → advancing →
// completed | abandoned.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde_json::json;

use super::types::{ActionKind, Suggestion, SuggestionAction, SuggestionCategory, WorkflowProgress};
use super::{Plugin, PluginContext, PluginKind, PluginStatus};
use crate::core::types::{Event, EventKind};
use crate::features::tokens::base_token;
use crate::infra::config::WorkflowPluginConfig;
use crate::infra::errors::Result;
use crate::memory::{self, keys, KvStore};
use crate::patterns::miner::{MinerSettings, Pattern, PatternMiner};
use crate::patterns::naming;

pub const PLUGIN_ID: &str = "workflow";

/// In-progress tracking of one pattern.
#[derive(Debug, Clone)]
pub struct ActiveWorkflow {
    pub pattern: Pattern,
    pub completed_steps: usize,
    pub start_time: i64,
    pub last_progress: i64,
    pub tab_ids: BTreeSet<i64>,
    misses: u32,
}

impl ActiveWorkflow {
    fn start(pattern: Pattern, event: &Event) -> Self {
        Self {
            pattern,
            completed_steps: 1,
            start_time: event.timestamp,
            last_progress: event.timestamp,
            tab_ids: event.context.tab_id.into_iter().collect(),
            misses: 0,
        }
    }

    pub fn expected(&self) -> Option<&str> {
        self.pattern.tokens.get(self.completed_steps).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_steps >= self.pattern.len()
    }

    pub fn progress(&self) -> WorkflowProgress {
        WorkflowProgress {
            pattern_id: self.pattern.id.clone(),
            pattern_name: self.pattern.name.clone(),
            completed_steps: self.completed_steps,
            total_steps: self.pattern.len(),
            next_step: self.expected().map(str::to_string),
        }
    }
}

pub struct WorkflowPlugin {
    config: WorkflowPluginConfig,
    store: Option<Arc<dyn KvStore>>,
    buffer: VecDeque<String>,
    since_mine: usize,
    miner: PatternMiner,
    active: Vec<ActiveWorkflow>,
    completed: u64,
    abandoned: u64,
}

impl WorkflowPlugin {
    pub fn new(config: WorkflowPluginConfig) -> Self {
        let miner = PatternMiner::new(Self::settings(&config));
        Self {
            buffer: VecDeque::with_capacity(config.buffer_size),
            config,
            store: None,
            since_mine: 0,
            miner,
            active: Vec::new(),
            completed: 0,
            abandoned: 0,
        }
    }

    fn settings(config: &WorkflowPluginConfig) -> MinerSettings {
        MinerSettings {
            min_len: config.min_len,
            max_len: config.max_len,
            min_frequency: config.min_frequency,
            confidence_scale: config.confidence_scale,
        }
    }

    pub fn patterns(&self) -> &[Pattern] {
        self.miner.patterns()
    }

    pub fn active(&self) -> &[ActiveWorkflow] {
        &self.active
    }

    /// Advance, complete or abandon every active workflow for `token`.
    fn track(&mut self, token: &str, event: &Event, out: &mut Vec<Suggestion>) {
        let timeout = self.config.abandon_after_ms;
        let max_misses = self.config.abandon_after_misses.max(1);
        let mut kept = Vec::with_capacity(self.active.len());

        for mut wf in self.active.drain(..) {
            if event.timestamp.saturating_sub(wf.last_progress) > timeout {
                tracing::debug!("Workflow '{}' abandoned after inactivity", wf.pattern.name);
                self.abandoned += 1;
                continue;
            }
            if wf.expected() != Some(token) {
                wf.misses += 1;
                if wf.misses >= max_misses {
                    tracing::debug!("Workflow '{}' abandoned at step {}", wf.pattern.name, wf.completed_steps);
                    self.abandoned += 1;
                } else {
                    kept.push(wf);
                }
                continue;
            }

            wf.completed_steps += 1;
            wf.last_progress = event.timestamp;
            wf.misses = 0;
            if let Some(tab) = event.context.tab_id {
                wf.tab_ids.insert(tab);
            }

            if wf.is_complete() {
                self.completed += 1;
                out.push(completed_suggestion(&wf));
            } else {
                out.push(continue_suggestion(&wf));
                kept.push(wf);
            }
        }
        self.active = kept;
    }

    /// Begin tracking the best known workflow that opens with `token`.
    fn maybe_start(&mut self, token: &str, event: &Event, out: &mut Vec<Suggestion>) {
        let min_frequency = self.config.min_frequency;
        let candidate = self
            .miner
            .skills()
            .into_iter()
            .filter(|p| p.frequency >= min_frequency)
            .filter(|p| p.tokens.first().map(String::as_str) == Some(token))
            .filter(|p| !self.active.iter().any(|a| a.pattern.id == p.id))
            .max_by(|a, b| {
                a.frequency
                    .cmp(&b.frequency)
                    .then(a.len().cmp(&b.len()))
            });

        if let Some(pattern) = candidate {
            let wf = ActiveWorkflow::start(pattern, event);
            tracing::debug!("Workflow '{}' started", wf.pattern.name);
            out.push(continue_suggestion(&wf));
            self.active.push(wf);
        }
    }

    fn mine(&mut self, now_ms: i64) {
        let new_tokens = std::mem::take(&mut self.since_mine);
        let stream: Vec<&String> = self.buffer.iter().collect();
        let touched = self.miner.observe(&stream, new_tokens, None, now_ms);
        if touched.is_empty() {
            return;
        }
        tracing::debug!(
            "Workflow mining: {} patterns updated, {} known",
            touched.len(),
            self.miner.len()
        );
        self.persist();
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            memory::save_or_warn(store.as_ref(), keys::WORKFLOW_PATTERNS, self.miner.patterns());
        }
    }
}

fn continue_suggestion(wf: &ActiveWorkflow) -> Suggestion {
    let progress = wf.progress();
    let remaining = progress.remaining_steps();
    let next = progress
        .next_step
        .as_deref()
        .map(naming::label)
        .unwrap_or_default();
    let mut action = SuggestionAction::new(ActionKind::ContinueWorkflow)
        .with_target(wf.pattern.id.clone());
    if let Some(step) = &progress.next_step {
        action = action.with_value(step.clone());
    }
    Suggestion::new(
        PLUGIN_ID,
        SuggestionCategory::Workflow,
        format!("Continue \"{}\"", wf.pattern.name),
        wf.pattern.confidence,
        action,
    )
    .with_description(format!(
        "{} step{} remaining, next: {}",
        remaining,
        if remaining == 1 { "" } else { "s" },
        next
    ))
    .with_priority(progress.completed_steps as f32 / progress.total_steps.max(1) as f32)
    .with_progress(progress)
}

fn completed_suggestion(wf: &ActiveWorkflow) -> Suggestion {
    Suggestion::new(
        PLUGIN_ID,
        SuggestionCategory::Workflow,
        format!("Workflow learned: {}", wf.pattern.name),
        wf.pattern.confidence,
        SuggestionAction::new(ActionKind::SaveWorkflow).with_target(wf.pattern.id.clone()),
    )
    .with_description(wf.pattern.description.clone())
    .with_priority(1.0)
    .with_payload("durationMs", wf.last_progress - wf.start_time)
    .with_payload("tabIds", json!(wf.tab_ids))
}

impl Plugin for WorkflowPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Workflow
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Click
                | EventKind::Keydown
                | EventKind::TextInput
                | EventKind::TabCreated
                | EventKind::TabActivated
        )
    }

    fn process_event(&mut self, event: &Event) -> Vec<Suggestion> {
        let token = base_token(event);

        if self.buffer.len() == self.config.buffer_size.max(1) {
            self.buffer.pop_front();
        }
        self.buffer.push_back(token.clone());
        self.since_mine += 1;

        let mut out = Vec::new();
        self.track(&token, event, &mut out);
        self.maybe_start(&token, event, &mut out);

        if self.since_mine >= self.config.mine_every.max(1) {
            self.mine(event.timestamp);
        }
        out
    }

    fn initialize(&mut self, ctx: &PluginContext) -> Result<()> {
        let patterns: Vec<Pattern> =
            memory::load_json(ctx.store.as_ref(), keys::WORKFLOW_PATTERNS)?.unwrap_or_default();
        self.miner = PatternMiner::with_patterns(Self::settings(&self.config), patterns);
        self.store = Some(ctx.store.clone());
        tracing::debug!("Workflow plugin loaded {} patterns", self.miner.len());
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(store) = &self.store {
            memory::save_json(store.as_ref(), keys::WORKFLOW_PATTERNS, self.miner.patterns())?;
        }
        self.buffer.clear();
        self.active.clear();
        self.since_mine = 0;
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        PluginStatus {
            id: PLUGIN_ID.into(),
            kind: PluginKind::Workflow,
            initialized: self.store.is_some(),
            details: json!({
                "patterns": self.miner.len(),
                "activeWorkflows": self.active.len(),
                "buffered": self.buffer.len(),
                "completed": self.completed,
                "abandoned": self.abandoned,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn click(target: &str, ts: i64) -> Event {
        Event::new(EventKind::Click, ts).with_feature("element_role", target)
    }

    fn plugin() -> WorkflowPlugin {
        let mut p = WorkflowPlugin::new(WorkflowPluginConfig {
            mine_every: 6,
            ..Default::default()
        });
        p.initialize(&PluginContext {
            store: Arc::new(MemoryStore::new()),
        })
        .unwrap();
        p
    }

    /// Feed a b c twice so mining (every 6 events) learns the workflow.
    fn learned() -> WorkflowPlugin {
        let mut p = plugin();
        let mut ts = 0;
        for _ in 0..2 {
            for t in ["a", "b", "c"] {
                ts += 1000;
                p.process_event(&click(t, ts));
            }
        }
        assert!(p
            .patterns()
            .iter()
            .any(|pat| pat.tokens.len() == 3 && pat.frequency == 2));
        p
    }

    #[test]
    fn test_frequency_accumulates_across_buffer_turnover() {
        let mut p = WorkflowPlugin::new(WorkflowPluginConfig {
            mine_every: 6,
            buffer_size: 6,
            ..Default::default()
        });
        p.initialize(&PluginContext {
            store: Arc::new(MemoryStore::new()),
        })
        .unwrap();
        let mut ts = 0;
        for _ in 0..6 {
            for t in ["a", "b", "c"] {
                ts += 1000;
                p.process_event(&click(t, ts));
            }
        }
        let abc = p
            .patterns()
            .iter()
            .find(|pat| pat.tokens.len() == 3 && pat.tokens[0] == "click_a_general")
            .map(|pat| pat.frequency);
        assert_eq!(abc, Some(6));
    }

    #[test]
    fn test_can_handle() {
        let p = plugin();
        assert!(p.can_handle(&Event::new(EventKind::TabActivated, 0)));
        assert!(!p.can_handle(&Event::new(EventKind::Scroll, 0)));
    }

    #[test]
    fn test_start_advance_complete() {
        let mut p = learned();
        let start = p.process_event(&click("a", 10_000));
        let progress = start[0].progress.as_ref().unwrap();
        assert_eq!(progress.completed_steps, 1);
        assert_eq!(progress.total_steps, 3);
        assert_eq!(progress.next_step.as_deref(), Some("click_b_general"));

        let mid = p.process_event(&click("b", 11_000));
        assert_eq!(mid[0].progress.as_ref().unwrap().remaining_steps(), 1);

        let done = p.process_event(&click("c", 12_000));
        assert!(done[0].title.starts_with("Workflow learned"));
        assert_eq!(done[0].action.kind, ActionKind::SaveWorkflow);
        assert!(p.active().is_empty());
    }

    #[test]
    fn test_abandon_on_mismatch() {
        let mut p = learned();
        p.process_event(&click("a", 10_000));
        assert_eq!(p.active().len(), 1);
        let out = p.process_event(&click("zzz", 11_000));
        assert!(out.is_empty());
        assert!(p.active().is_empty());
    }

    #[test]
    fn test_abandon_on_timeout() {
        let mut p = learned();
        p.process_event(&click("a", 10_000));
        let out = p.process_event(&click("b", 10_000 + 120_001));
        assert!(out.iter().all(|s| s.progress.as_ref().map(|g| g.completed_steps) != Some(2)));
    }

    #[test]
    fn test_patterns_persist() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ctx = PluginContext { store: store.clone() };
        let mut p = WorkflowPlugin::new(WorkflowPluginConfig {
            mine_every: 6,
            ..Default::default()
        });
        p.initialize(&ctx).unwrap();
        for (i, t) in ["a", "b", "c", "a", "b", "c"].iter().enumerate() {
            p.process_event(&click(t, i as i64));
        }
        p.cleanup().unwrap();

        let mut restored = WorkflowPlugin::new(WorkflowPluginConfig::default());
        restored.initialize(&ctx).unwrap();
        assert_eq!(restored.patterns().len(), p.patterns().len());
        assert!(!restored.patterns().is_empty());
    }
}
