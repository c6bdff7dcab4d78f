// src/plugins/mod.rs — Per-domain pattern detectors
//
// Each plugin consumes the events it can handle and emits zero or more
// suggestions. The set of plugin kinds is closed; adding one means adding a
// `PluginKind` variant and a constructor arm in `build`.

pub mod clipboard;
pub mod scheduler;
pub mod types;
pub mod workflow;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::types::Event;
use crate::infra::config::PluginsConfig;
use crate::infra::errors::Result;
use crate::memory::KvStore;

pub use clipboard::ClipboardPlugin;
pub use scheduler::PluginScheduler;
pub use types::{
    ActionKind, Suggestion, SuggestionAction, SuggestionCategory, WorkflowProgress,
};
pub use workflow::WorkflowPlugin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Workflow,
    Clipboard,
}

impl PluginKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Workflow => "workflow",
            Self::Clipboard => "clipboard",
        }
    }

    pub fn all() -> &'static [PluginKind] {
        &[PluginKind::Workflow, PluginKind::Clipboard]
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capabilities handed to plugins at initialization.
#[derive(Clone)]
pub struct PluginContext {
    pub store: Arc<dyn KvStore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub id: String,
    pub kind: PluginKind,
    pub initialized: bool,
    /// Plugin-specific counters (patterns known, contexts held, ...).
    pub details: serde_json::Value,
}

pub trait Plugin: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> PluginKind;

    fn can_handle(&self, event: &Event) -> bool;

    fn process_event(&mut self, event: &Event) -> Vec<Suggestion>;

    /// Load persisted state. Called once before the first event.
    fn initialize(&mut self, ctx: &PluginContext) -> Result<()>;

    /// Persist state and drop transient data.
    fn cleanup(&mut self) -> Result<()>;

    fn status(&self) -> PluginStatus;
}

/// Instantiate every enabled plugin kind.
pub fn build(config: &PluginsConfig) -> Vec<Box<dyn Plugin>> {
    let mut plugins: Vec<Box<dyn Plugin>> = Vec::new();
    for kind in PluginKind::all() {
        match kind {
            PluginKind::Workflow if config.workflow.enabled => {
                plugins.push(Box::new(WorkflowPlugin::new(config.workflow.clone())));
            }
            PluginKind::Clipboard if config.clipboard.enabled => {
                plugins.push(Box::new(ClipboardPlugin::new(config.clipboard.clone())));
            }
            _ => tracing::debug!("Plugin '{}' disabled", kind),
        }
    }
    plugins
}
