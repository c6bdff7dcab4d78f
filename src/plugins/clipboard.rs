// src/plugins/clipboard.rs — Copy/paste context tracking
//
// A copy builds a `ClipboardContext` with candidate actions derived from the
// copied content. A later focus on an input field turns the freshest context
// into field-aware paste suggestions.

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::types::{ActionKind, Suggestion, SuggestionAction, SuggestionCategory};
use super::{Plugin, PluginContext, PluginKind, PluginStatus};
use crate::core::types::{Event, EventKind};
use crate::infra::config::ClipboardPluginConfig;
use crate::infra::errors::Result;
use crate::memory::{self, keys, KvStore};

pub const PLUGIN_ID: &str = "clipboard";

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").ok());
static URL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(https?://|www\.)[^\s]+$").ok());
static PHONE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s().-]{7,20}$").ok());
// Calendar dates and timestamps share the phone alphabet.
static DATE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{4}[-./]\d{1,2}[-./]\d{1,2}([ T][\d:.]+)?$").ok());

fn is_match(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    (**re).as_ref().is_some_and(|r| r.is_match(text))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Email,
    Url,
    Phone,
    SearchQuery,
    Text,
}

impl ContentType {
    pub fn classify(text: &str) -> Self {
        let t = text.trim();
        if is_match(&EMAIL_RE, t) {
            Self::Email
        } else if is_match(&URL_RE, t) {
            Self::Url
        } else if is_match(&PHONE_RE, t)
            && !is_match(&DATE_RE, t)
            && t.chars().filter(char::is_ascii_digit).count() >= 7
        {
            Self::Phone
        } else if is_search_query(t) {
            Self::SearchQuery
        } else {
            Self::Text
        }
    }

    /// Input types this content fills exactly.
    fn exact_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Email => &["email"],
            Self::Url => &["url"],
            Self::Phone => &["tel", "phone"],
            Self::SearchQuery => &["search"],
            Self::Text => &["textarea"],
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Url => "link",
            Self::Phone => "phone number",
            Self::SearchQuery => "search query",
            Self::Text => "text",
        }
    }
}

/// Short, multi-word, no sentence punctuation.
fn is_search_query(text: &str) -> bool {
    let words = text.split_whitespace().count();
    (2..=8).contains(&words)
        && text.len() <= 80
        && !text.contains('\n')
        && !text.ends_with('.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    AsIs,
    Uppercase,
    Lowercase,
    TitleCase,
    Search,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardAction {
    pub transform: TransformKind,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardContext {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub timestamp: i64,
    pub content_type: ContentType,
    pub actions: Vec<ClipboardAction>,
}

impl ClipboardContext {
    pub fn from_copy(text: &str, event: &Event) -> Self {
        let content_type = ContentType::classify(text);
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            url: event
                .attr_str("url")
                .or_else(|| event.attr_str("page_url"))
                .map(str::to_string),
            title: event
                .attr_str("title")
                .or_else(|| event.attr_str("page_title"))
                .map(str::to_string),
            timestamp: event.timestamp,
            content_type,
            actions: derive_actions(text, content_type),
        }
    }

    pub fn is_fresh(&self, now_ms: i64, expiry_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) <= expiry_ms
    }
}

fn derive_actions(text: &str, content_type: ContentType) -> Vec<ClipboardAction> {
    let trimmed = text.trim();
    let mut actions = vec![ClipboardAction {
        transform: TransformKind::AsIs,
        label: format!("Paste {}", content_type.label()),
        value: trimmed.to_string(),
    }];
    if content_type == ContentType::SearchQuery {
        actions.push(ClipboardAction {
            transform: TransformKind::Search,
            label: format!("Search for \"{trimmed}\""),
            value: trimmed.to_string(),
        });
    }
    if matches!(content_type, ContentType::Text | ContentType::SearchQuery)
        && trimmed.chars().any(char::is_alphabetic)
    {
        let variants = [
            (TransformKind::Uppercase, "Paste as UPPERCASE", trimmed.to_uppercase()),
            (TransformKind::Lowercase, "Paste as lowercase", trimmed.to_lowercase()),
            (TransformKind::TitleCase, "Paste as Title Case", title_case(trimmed)),
        ];
        for (transform, label, value) in variants {
            if value != trimmed {
                actions.push(ClipboardAction {
                    transform,
                    label: label.to_string(),
                    value,
                });
            }
        }
    }
    actions
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn is_copy(event: &Event) -> bool {
    event.kind == EventKind::Clipboard
        && event
            .attr_str("operation")
            .or_else(|| event.attr_str("clipboard_operation"))
            .is_some_and(|op| op.eq_ignore_ascii_case("copy") || op.eq_ignore_ascii_case("cut"))
}

fn copied_text(event: &Event) -> Option<&str> {
    event
        .payload
        .value
        .as_deref()
        .or_else(|| event.attr_str("text"))
        .filter(|t| !t.trim().is_empty())
}

fn field_type(event: &Event) -> Option<String> {
    event
        .attr_str("input_type")
        .or_else(|| event.attr_str("field_type"))
        .map(str::to_ascii_lowercase)
}

pub struct ClipboardPlugin {
    config: ClipboardPluginConfig,
    store: Option<Arc<dyn KvStore>>,
    /// Oldest first.
    contexts: VecDeque<ClipboardContext>,
    last_seen: i64,
}

impl ClipboardPlugin {
    pub fn new(config: ClipboardPluginConfig) -> Self {
        Self {
            config,
            store: None,
            contexts: VecDeque::new(),
            last_seen: 0,
        }
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ClipboardContext> {
        self.contexts.iter()
    }

    fn remember(&mut self, ctx: ClipboardContext) {
        tracing::debug!("Clipboard context {} ({:?})", ctx.id, ctx.content_type);
        self.contexts.push_back(ctx);
        while self.contexts.len() > self.config.max_contexts.max(1) {
            self.contexts.pop_front();
        }
    }

    /// Drop contexts past the long history expiry.
    fn purge_history(&mut self, now_ms: i64) {
        let expiry = self.config.history_expiry_ms;
        let before = self.contexts.len();
        self.contexts.retain(|c| c.is_fresh(now_ms, expiry));
        if self.contexts.len() < before {
            tracing::debug!("Clipboard history purged {} contexts", before - self.contexts.len());
        }
    }

    fn persist(&self) {
        if let Some(store) = &self.store {
            let history: Vec<&ClipboardContext> = self.contexts.iter().collect();
            memory::save_or_warn(store.as_ref(), keys::CLIPBOARD_HISTORY, &history);
        }
    }

    fn freshest(&self, now_ms: i64) -> Option<&ClipboardContext> {
        self.contexts
            .iter()
            .filter(|c| c.is_fresh(now_ms, self.config.context_expiry_ms))
            .max_by_key(|c| c.timestamp)
    }

    /// Field-aware paste suggestions, best first, capped.
    pub fn suggest_for_field(&self, field: Option<&str>, now_ms: i64) -> Vec<Suggestion> {
        let Some(ctx) = self.freshest(now_ms) else {
            return Vec::new();
        };
        let c = &self.config;
        let exact = field.is_some_and(|f| ctx.content_type.exact_fields().iter().any(|e| *e == f));
        let textual = field.map_or(true, |f| matches!(f, "text" | "textarea" | "search"));

        let mut out: Vec<Suggestion> = ctx
            .actions
            .iter()
            .filter_map(|action| {
                let confidence = match action.transform {
                    TransformKind::AsIs if exact => c.exact_confidence,
                    TransformKind::AsIs => c.generic_confidence,
                    TransformKind::Search if field == Some("search") => c.exact_confidence,
                    TransformKind::Search => return None,
                    _ if textual => c.partial_confidence,
                    _ => return None,
                };
                Some(
                    Suggestion::new(
                        PLUGIN_ID,
                        SuggestionCategory::Clipboard,
                        action.label.clone(),
                        confidence,
                        SuggestionAction::new(ActionKind::Paste)
                            .with_value(action.value.clone())
                            .with_target(field.unwrap_or("input").to_string()),
                    )
                    .with_description(preview(&ctx.text))
                    .with_priority(if exact { 1.0 } else { 0.5 })
                    .with_payload("contextId", ctx.id.clone())
                    .with_payload("contentType", json!(ctx.content_type))
                    .with_payload("transform", json!(action.transform)),
                )
            })
            .collect();

        out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        out.truncate(c.max_suggestions);
        out
    }
}

fn preview(text: &str) -> String {
    let t = text.trim();
    if t.chars().count() > 40 {
        format!("{}…", t.chars().take(40).collect::<String>())
    } else {
        t.to_string()
    }
}

impl Plugin for ClipboardPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Clipboard
    }

    fn can_handle(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Clipboard | EventKind::FocusChange)
    }

    fn process_event(&mut self, event: &Event) -> Vec<Suggestion> {
        self.last_seen = self.last_seen.max(event.timestamp);
        match event.kind {
            EventKind::Clipboard if is_copy(event) => {
                if let Some(text) = copied_text(event) {
                    let ctx = ClipboardContext::from_copy(text, event);
                    self.remember(ctx);
                    self.purge_history(event.timestamp);
                    self.persist();
                }
                Vec::new()
            }
            EventKind::FocusChange => {
                let field = field_type(event);
                self.suggest_for_field(field.as_deref(), event.timestamp)
            }
            _ => Vec::new(),
        }
    }

    fn initialize(&mut self, ctx: &PluginContext) -> Result<()> {
        let history: Vec<ClipboardContext> =
            memory::load_json(ctx.store.as_ref(), keys::CLIPBOARD_HISTORY)?.unwrap_or_default();
        self.last_seen = history.iter().map(|c| c.timestamp).max().unwrap_or(0);
        self.contexts = history.into();
        self.store = Some(ctx.store.clone());
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.purge_history(self.last_seen);
        if let Some(store) = &self.store {
            let history: Vec<&ClipboardContext> = self.contexts.iter().collect();
            memory::save_json(store.as_ref(), keys::CLIPBOARD_HISTORY, &history)?;
        }
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        PluginStatus {
            id: PLUGIN_ID.into(),
            kind: PluginKind::Clipboard,
            initialized: self.store.is_some(),
            details: json!({
                "contexts": self.contexts.len(),
                "fresh": self.freshest(self.last_seen).is_some(),
            }),
        }
    }
}
