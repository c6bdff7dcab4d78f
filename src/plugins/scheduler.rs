// src/plugins/scheduler.rs — Dispatches events to every plugin that can handle them

use serde::{Deserialize, Serialize};

use super::types::Suggestion;
use super::{Plugin, PluginContext, PluginStatus};
use crate::core::types::Event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub plugin_count: usize,
    pub plugins: Vec<PluginStatus>,
    pub active_suggestions: Vec<Suggestion>,
}

/// Owns the plugin set and the suggestions produced by the latest dispatch.
pub struct PluginScheduler {
    plugins: Vec<Box<dyn Plugin>>,
    active: Vec<Suggestion>,
}

impl PluginScheduler {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self {
            plugins,
            active: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Initialize every plugin. A plugin that fails to load its state keeps
    /// running from scratch.
    pub fn initialize_all(&mut self, ctx: &PluginContext) {
        for plugin in self.plugins.iter_mut() {
            if let Err(e) = plugin.initialize(ctx) {
                tracing::warn!("Plugin '{}' failed to initialize: {}", plugin.id(), e);
            }
        }
    }

    /// Concatenate suggestions from every plugin whose `can_handle` matches.
    pub fn dispatch(&mut self, event: &Event) -> Vec<Suggestion> {
        let mut out = Vec::new();
        for plugin in self.plugins.iter_mut() {
            if !plugin.can_handle(event) {
                continue;
            }
            let produced = plugin.process_event(event);
            if !produced.is_empty() {
                tracing::trace!("Plugin '{}' produced {} suggestions", plugin.id(), produced.len());
            }
            out.extend(produced);
        }
        self.active = out.clone();
        out
    }

    pub fn active_suggestions(&self) -> &[Suggestion] {
        &self.active
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            plugin_count: self.plugins.len(),
            plugins: self.plugins.iter().map(|p| p.status()).collect(),
            active_suggestions: self.active.clone(),
        }
    }

    pub fn cleanup_all(&mut self) {
        for plugin in self.plugins.iter_mut() {
            if let Err(e) = plugin.cleanup() {
                tracing::warn!("Plugin '{}' cleanup failed: {}", plugin.id(), e);
            }
        }
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::EventKind;
    use crate::infra::errors::{Result, SynapseError};
    use crate::plugins::types::{ActionKind, SuggestionAction, SuggestionCategory};
    use crate::plugins::PluginKind;

    /// Emits one suggestion per click; fails to initialize.
    struct Echo {
        handled: usize,
    }

    impl Plugin for Echo {
        fn id(&self) -> &str {
            "echo"
        }
        fn kind(&self) -> PluginKind {
            PluginKind::Workflow
        }
        fn can_handle(&self, event: &Event) -> bool {
            event.kind == EventKind::Click
        }
        fn process_event(&mut self, _event: &Event) -> Vec<Suggestion> {
            self.handled += 1;
            vec![Suggestion::new(
                "echo",
                SuggestionCategory::NextAction,
                "echo",
                0.5,
                SuggestionAction::new(ActionKind::Perform),
            )]
        }
        fn initialize(&mut self, _ctx: &PluginContext) -> Result<()> {
            Err(SynapseError::Config("no state".into()))
        }
        fn cleanup(&mut self) -> Result<()> {
            Ok(())
        }
        fn status(&self) -> PluginStatus {
            PluginStatus {
                id: "echo".into(),
                kind: PluginKind::Workflow,
                initialized: false,
                details: serde_json::json!({ "handled": self.handled }),
            }
        }
    }

    #[test]
    fn test_dispatch_filters_by_can_handle() {
        let mut s = PluginScheduler::new(vec![Box::new(Echo { handled: 0 }), Box::new(Echo { handled: 0 })]);
        s.initialize_all(&PluginContext {
            store: std::sync::Arc::new(crate::memory::MemoryStore::new()),
        });
        assert_eq!(s.dispatch(&Event::new(EventKind::Click, 0)).len(), 2);
        assert_eq!(s.active_suggestions().len(), 2);
        assert!(s.dispatch(&Event::new(EventKind::Scroll, 1)).is_empty());
        assert!(s.active_suggestions().is_empty());

        let status = s.status();
        assert_eq!(status.plugin_count, 2);
        assert_eq!(status.plugins[0].details["handled"], 1);
    }

    #[test]
    fn test_cleanup_clears_active() {
        let mut s = PluginScheduler::empty();
        s.register(Box::new(Echo { handled: 0 }));
        s.dispatch(&Event::new(EventKind::Click, 0));
        s.cleanup_all();
        assert!(s.active_suggestions().is_empty());
    }
}
