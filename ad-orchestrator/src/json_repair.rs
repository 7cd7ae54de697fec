//! Recovers `AdContent` from the loosely formatted JSON language models emit.
//!
//! Strategies run cheapest first: direct parse, balanced-object extraction
//! (after stripping code fences), then textual repairs of common defects.

use crate::types::{AdContent, OrchestratorError, Result};
use serde_json::Value;
use tracing::debug;

/// Parses a text-generator reply, which may be an Ollama envelope
/// (`{"response": "..."}`) around the actual ad JSON.
pub fn parse_ad_content(raw: &str) -> Result<AdContent> {
    let body = unwrap_envelope(raw.trim());
    let object = repair_object(&body)?;

    let content: AdContent = serde_json::from_value(object)?;
    if content.description.trim().is_empty() && content.scene.trim().is_empty() {
        return Err(OrchestratorError::Parse(
            "model reply has neither description nor scene".to_string(),
        ));
    }
    Ok(content)
}

fn unwrap_envelope(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => match map.get("response") {
            Some(Value::String(inner)) => inner.trim().to_string(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

/// Finds the ad object inside `text`, repairing it if needed.
pub fn repair_object(text: &str) -> Result<Value> {
    // Already valid
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    // Drop fences and surrounding prose
    let unfenced = strip_fences(text);
    let candidate = extract_balanced_object(&unfenced).unwrap_or_else(|| unfenced.trim().to_string());
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&candidate) {
        debug!("Recovered JSON by extracting the first object");
        return Ok(value);
    }

    // Trailing commas, smart quotes
    let repaired = apply_fixes(&candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value @ Value::Object(_)) => {
            debug!("Recovered JSON after textual repairs");
            Ok(value)
        }
        Ok(_) => Err(OrchestratorError::Parse("model reply is not a JSON object".to_string())),
        Err(e) => Err(OrchestratorError::Parse(format!("unrepairable model JSON: {}", e))),
    }
}

fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn apply_fixes(text: &str) -> String {
    let normalized = text
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    drop_trailing_commas(&normalized)
        .replace(": True", ": true")
        .replace(": False", ": false")
        .replace(": None", ": null")
}

/// Removes commas that directly precede `}` or `]`, outside strings.
fn drop_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// The first `{ ... }` span with balanced braces, ignoring braces in strings.
fn extract_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
