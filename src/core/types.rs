// src/core/types.rs — Interaction event model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed, versioned set of interaction kinds.
///
/// The wire names follow the capture layer's namespacing (`user.`, `ui.`,
/// `browser.`); the bare names are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "user.click", alias = "click")]
    Click,
    #[serde(rename = "user.keydown", alias = "keydown")]
    Keydown,
    #[serde(rename = "user.text_input", alias = "text_input")]
    TextInput,
    #[serde(rename = "user.scroll", alias = "scroll")]
    Scroll,
    #[serde(rename = "ui.mouse_pattern", alias = "mouse_pattern")]
    MousePattern,
    #[serde(rename = "user.form_submit", alias = "form_submit")]
    FormSubmit,
    #[serde(rename = "ui.focus_change", alias = "focus_change")]
    FocusChange,
    #[serde(rename = "browser.page_visibility", alias = "page_visibility")]
    PageVisibility,
    #[serde(rename = "ui.mouse_hover", alias = "mouse_hover")]
    MouseHover,
    #[serde(rename = "user.clipboard", alias = "clipboard", alias = "ui.clipboard")]
    Clipboard,
    #[serde(rename = "browser.tab_created", alias = "tab_created")]
    TabCreated,
    #[serde(rename = "browser.tab_activated", alias = "tab_activated")]
    TabActivated,
    #[serde(rename = "browser.tab_updated", alias = "tab_updated")]
    TabUpdated,
    #[serde(rename = "browser.tab_removed", alias = "tab_removed")]
    TabRemoved,
}

impl EventKind {
    /// Schema version of this kind set.
    pub const VERSION: u32 = 1;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Keydown => "keydown",
            Self::TextInput => "text_input",
            Self::Scroll => "scroll",
            Self::MousePattern => "mouse_pattern",
            Self::FormSubmit => "form_submit",
            Self::FocusChange => "focus_change",
            Self::PageVisibility => "page_visibility",
            Self::MouseHover => "mouse_hover",
            Self::Clipboard => "clipboard",
            Self::TabCreated => "tab_created",
            Self::TabActivated => "tab_activated",
            Self::TabUpdated => "tab_updated",
            Self::TabRemoved => "tab_removed",
        }
    }

    /// All kinds, in feature-index order.
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::Click,
            EventKind::Keydown,
            EventKind::TextInput,
            EventKind::Scroll,
            EventKind::MousePattern,
            EventKind::FormSubmit,
            EventKind::FocusChange,
            EventKind::PageVisibility,
            EventKind::MouseHover,
            EventKind::Clipboard,
            EventKind::TabCreated,
            EventKind::TabActivated,
            EventKind::TabUpdated,
            EventKind::TabRemoved,
        ]
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, alias = "selector", skip_serializing_if = "Option::is_none")]
    pub target_selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Flat coordinates, as exported by the capture side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, alias = "modifier_keys", skip_serializing_if = "Vec::is_empty")]
    pub modifier_keys: Vec<String>,
    /// Open bag of kind-specific attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub features: Map<String, Value>,
    /// Payload-level attributes outside the fixed fields (`input_method`,
    /// `operation`, `focus_type`, `visibility_state`, `field_count`, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One discrete user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch. Used for relative ordering only.
    pub timestamp: i64,
    #[serde(default)]
    pub context: EventContext,
    #[serde(default)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: i64) -> Self {
        Self {
            kind,
            timestamp,
            context: EventContext::default(),
            payload: EventPayload::default(),
        }
    }

    pub fn with_tab(mut self, tab_id: i64) -> Self {
        self.context.tab_id = Some(tab_id);
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.payload.target_selector = Some(selector.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.payload.value = Some(value.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, modifiers: &[&str]) -> Self {
        self.payload.key = Some(key.into());
        self.payload.modifier_keys = modifiers.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.payload.position = Some(Position { x, y });
        self
    }

    pub fn with_feature(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.payload.features.insert(name.to_string(), value.into());
        self
    }

    /// Sets a payload-level attribute, the way wire events carry them.
    pub fn with_attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.payload.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Explicit `position`, else the flat `x`/`y` pair.
    pub fn position(&self) -> Option<Position> {
        let p = &self.payload;
        p.position.or(match (p.x, p.y) {
            (Some(x), Some(y)) => Some(Position { x, y }),
            _ => None,
        })
    }

    /// Named attribute: payload level first (snake or camel case), then the
    /// feature bag.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        let attrs = &self.payload.attributes;
        attrs
            .get(name)
            .or_else(|| attrs.get(&camel_case(name)))
            .or_else(|| self.payload.features.get(name))
            .filter(|v| !v.is_null())
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(Value::as_str)
    }

    /// Numeric attribute; numeric strings are accepted.
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        match self.attr(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn has_modifier(&self, name: &str) -> bool {
        self.payload
            .modifier_keys
            .iter()
            .any(|m| m.eq_ignore_ascii_case(name))
    }

    /// Parse one JSON event, mapping failures to `MalformedEvent`.
    pub fn from_json(line: &str) -> crate::infra::errors::Result<Self> {
        serde_json::from_str(line)
            .map_err(|e| crate::infra::errors::SynapseError::malformed(e.to_string()))
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
