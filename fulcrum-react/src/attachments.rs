//! Attachment-placeholder expansion (§4.5 Execute, §6 "Attachment
//! placeholder grammar").
//!
//! `[name]` inside a string tool argument resolves against the
//! current attachment table by, in order: exact match, case-insensitive
//! match, a seedream index-suffix alias, then a generic "most recent
//! generated image" alias. Resolution replaces the bracketed
//! placeholder with the attachment's canonical reference.

use fulcrum_core::{Attachment, AttachmentSource, TaskState};

/// Tools that opt out of placeholder expansion entirely — they work
/// with placeholder names directly rather than resolved references.
const EXPANSION_OPT_OUT_PREFIXES: &[&str] = &["artifacts_"];
const EXPANSION_OPT_OUT_EXACT: &[&str] = &["html_edit", "vision_analyze"];

fn tool_opts_out(tool_name: &str) -> bool {
    EXPANSION_OPT_OUT_EXACT.contains(&tool_name)
        || EXPANSION_OPT_OUT_PREFIXES
            .iter()
            .any(|prefix| tool_name.starts_with(prefix))
}

fn trailing_digits(name: &str) -> Option<&str> {
    let digit_start = name.find(|c: char| c.is_ascii_digit())?;
    let tail = &name[digit_start..];
    if tail.chars().all(|c| c.is_ascii_digit()) {
        Some(tail)
    } else {
        None
    }
}

fn is_generic_image_alias(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "image"
        || lower.starts_with("image_")
        || lower.starts_with("image.")
        || lower == "img"
        || lower.starts_with("img_")
}

/// Resolve one placeholder name against the attachment table. Returns
/// `None` when no rule matches, in which case the caller leaves the
/// bracketed text as-is.
pub fn resolve_placeholder<'a>(name: &str, state: &'a TaskState) -> Option<&'a Attachment> {
    if let Some(attachment) = state.attachments.get(name) {
        return Some(attachment);
    }

    let lower = name.to_ascii_lowercase();
    if let Some(attachment) = state
        .attachments
        .values()
        .find(|a| a.placeholder.to_ascii_lowercase() == lower)
    {
        return Some(attachment);
    }

    if let Some(digits) = trailing_digits(name) {
        if let Some(attachment) = state.attachments.values().find(|a| {
            a.source == AttachmentSource::Seedream && trailing_digits(&a.placeholder) == Some(digits)
        }) {
            return Some(attachment);
        }
    }

    if is_generic_image_alias(name) {
        let mut candidates: Vec<&Attachment> = state
            .attachments
            .values()
            .filter(|a| a.media_type.starts_with("image/"))
            .collect();
        candidates.sort_by_key(|a| {
            state
                .attachment_origin_iteration
                .get(&a.placeholder)
                .copied()
                .unwrap_or(0)
        });
        return candidates.into_iter().next_back();
    }

    None
}

/// Expand every `[name]` placeholder in a plain string (the final
/// answer's text, not a tool argument) against `state`'s attachment
/// table.
pub(crate) fn expand_string(text: &str, state: &TaskState) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            out.push_str(rest);
            return out;
        };
        let close = open + close;
        let name = &rest[open + 1..close];
        out.push_str(&rest[..open]);
        if name.is_empty() || name.contains('[') {
            out.push('[');
            out.push_str(name);
            out.push(']');
        } else if let Some(attachment) = resolve_placeholder(name, state) {
            match attachment.canonical_reference() {
                Some(reference) => out.push_str(&reference),
                None => {
                    out.push('[');
                    out.push_str(name);
                    out.push(']');
                }
            }
        } else {
            out.push('[');
            out.push_str(name);
            out.push(']');
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Expand every `[name]` placeholder found in string values of `input`
/// against `state`'s attachment table, unless `tool_name` opts out.
pub fn expand_tool_input(
    tool_name: &str,
    input: serde_json::Value,
    state: &TaskState,
) -> serde_json::Value {
    if tool_opts_out(tool_name) {
        return input;
    }
    expand_value(input, state)
}

fn expand_value(value: serde_json::Value, state: &TaskState) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => serde_json::Value::String(expand_string(&text, state)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(|v| expand_value(v, state)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, expand_value(v, state)))
                .collect(),
        ),
        other => other,
    }
}
