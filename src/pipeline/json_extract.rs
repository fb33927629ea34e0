//! Locate a JSON object inside free-form model text.
//!
//! Models asked for JSON often wrap it in prose or a fenced code block. Candidates
//! are tried in order: the whole text, fenced blocks, then each balanced `{...}` span.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static FENCED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fenced block pattern is valid")
});

pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    if let Some(obj) = parse_object(trimmed) {
        return Some(obj);
    }
    for caps in FENCED.captures_iter(trimmed) {
        if let Some(obj) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Some(obj);
        }
    }
    let mut offset = 0;
    while let Some(rel) = trimmed[offset..].find('{') {
        let start = offset + rel;
        if let Some(end) = balanced_end(&trimmed[start..]) {
            if let Some(obj) = parse_object(&trimmed[start..start + end]) {
                return Some(obj);
            }
        }
        offset = start + 1;
    }
    None
}

fn parse_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Byte length of the brace-balanced span starting at `s[0] == '{'`.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
