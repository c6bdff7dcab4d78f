// src/features/tokens.rs — Symbolic base tokens
//
// A pure switch over event kind and payload content. Every component is
// lower-cased and reduced to [a-z0-9_] so tokens are safe as map keys and
// in persisted blobs.

use crate::core::types::{Event, EventKind};

/// Derive the symbolic token for an event. Never fails; missing payload
/// attributes fall back to generic components.
pub fn base_token(event: &Event) -> String {
    match event.kind {
        EventKind::Click => {
            let role = component(event.attr_str("element_role"), "element");
            let page = component(event.attr_str("page_type"), "general");
            format!("click_{role}_{page}")
        }
        EventKind::Keydown => keydown_token(event).to_string(),
        EventKind::TextInput => text_input_token(event),
        EventKind::Scroll => {
            let dir = event
                .attr_str("scroll_direction")
                .or_else(|| event.attr_str("direction"));
            match dir {
                Some(d) => format!("scroll_{}", sanitize(d)),
                None => "scroll".into(),
            }
        }
        EventKind::MousePattern => format!(
            "mouse_{}",
            component(event.attr_str("pattern_type"), "movement")
        ),
        EventKind::FormSubmit => "form_submit".into(),
        EventKind::FocusChange => {
            let target = event
                .attr_str("input_type")
                .or_else(|| event.attr_str("focus_type"));
            format!("focus_{}", component(target, "element"))
        }
        EventKind::PageVisibility => {
            let state = event
                .attr_str("visibility_state")
                .or_else(|| event.payload.value.as_deref());
            format!("page_{}", component(state, "visibility"))
        }
        EventKind::MouseHover => "hover".into(),
        EventKind::Clipboard => {
            let op = event
                .attr_str("operation")
                .or_else(|| event.attr_str("clipboard_operation"));
            format!("clipboard_{}", component(op, "access"))
        }
        EventKind::TabCreated => "tab_created".into(),
        EventKind::TabActivated => "tab_activated".into(),
        EventKind::TabUpdated => "tab_updated".into(),
        EventKind::TabRemoved => "tab_removed".into(),
    }
}

fn keydown_token(event: &Event) -> &'static str {
    let key = event.payload.key.as_deref().unwrap_or("").to_ascii_lowercase();
    let command = event.has_modifier("ctrl") || event.has_modifier("meta");

    if command {
        let named = match key.as_str() {
            "c" => Some("copy_action"),
            "v" => Some("paste_action"),
            "x" => Some("cut_action"),
            "z" => Some("undo_action"),
            "y" => Some("redo_action"),
            "s" => Some("save_action"),
            "a" => Some("select_all_action"),
            "f" => Some("find_action"),
            "t" => Some("new_tab_action"),
            "w" => Some("close_tab_action"),
            _ => None,
        };
        if let Some(name) = named {
            return name;
        }
    }

    match key.as_str() {
        "enter" => return "enter_key",
        "tab" => return "tab_key",
        "escape" | "esc" => return "escape_key",
        "backspace" | "delete" => return "delete_key",
        "arrowup" | "arrowdown" | "arrowleft" | "arrowright" | "pageup" | "pagedown"
        | "home" | "end" => return "navigation_key",
        _ => {}
    }

    if command {
        "ctrl_key"
    } else if event.has_modifier("alt") {
        "alt_key"
    } else if event.has_modifier("shift") {
        "shift_key"
    } else {
        "regular_key"
    }
}

fn text_input_token(event: &Event) -> String {
    let method = event
        .attr_str("input_method")
        .unwrap_or("typing")
        .to_ascii_lowercase();
    match method.as_str() {
        "ime" | "composition" => {
            let lang = component(
                event
                    .attr_str("ime_language")
                    .or_else(|| event.attr_str("language")),
                "unknown",
            );
            format!("text_input_ime_{lang}")
        }
        "paste" => "text_input_paste".into(),
        "emoji" => "text_input_emoji".into(),
        _ => "text_input_typing".into(),
    }
}

fn component(value: Option<&str>, fallback: &str) -> String {
    match value.map(sanitize) {
        Some(s) if !s.is_empty() => s,
        _ => fallback.to_string(),
    }
}

/// Lower-case and collapse anything outside [a-z0-9] into single underscores.
pub fn sanitize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}
