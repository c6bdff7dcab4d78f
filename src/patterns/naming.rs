// src/patterns/naming.rs — Display names for mined patterns (cosmetic only)

/// Curated aliases for common actions.
fn alias(token: &str) -> Option<&'static str> {
    Some(match token {
        "copy_action" => "Copy",
        "paste_action" => "Paste",
        "cut_action" => "Cut",
        "undo_action" => "Undo",
        "redo_action" => "Redo",
        "save_action" => "Save",
        "select_all_action" => "Select all",
        "find_action" => "Find",
        "new_tab_action" => "New tab",
        "close_tab_action" => "Close tab",
        "enter_key" => "Enter",
        "form_submit" => "Submit form",
        "tab_created" => "Open tab",
        "tab_activated" => "Switch tab",
        "tab_removed" => "Close tab",
        "text_input_typing" => "Type",
        "text_input_paste" => "Paste text",
        "clipboard_copy" => "Copy",
        _ => return None,
    })
}

/// Human label for one token: alias, else the token with underscores as spaces.
pub fn label(token: &str) -> String {
    alias(token)
        .map(str::to_string)
        .unwrap_or_else(|| token.replace('_', " "))
}

pub fn pattern_name<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| label(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" → ")
}

pub fn pattern_description<S: AsRef<str>>(tokens: &[S], frequency: u32) -> String {
    format!(
        "{}-step sequence seen {frequency} times: {}",
        tokens.len(),
        tokens
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ")
    )
}
