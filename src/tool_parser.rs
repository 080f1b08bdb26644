//! # Tool-Call Parser (C2)
//!
//! Extracts structured tool invocations from free-form model text. Used only by the
//! local-model chat path (spec §4.8) — the remote adapter's provider returns function-call
//! parts natively and never needs this.
//!
//! Algorithm, in order:
//! 1. Strip a Markdown code fence (` ```json ... ``` ` or bare ` ``` ... ``` `) and isolate
//!    the outermost JSON value.
//! 2. Try parsing as JSON: a single `{name, parameters}` object, or an array of such.
//! 3. On parse failure, fall back to a regex pass matching `IDENT(args)` call syntax with
//!    `key=value` arguments (quoted strings, or bare values coerced to bool/number/string).
//! 4. Emit invocations with ids `{prompt_id}-{index}`.
//!
//! An empty result is a *signal*, not an error — the executor's local-model fallback
//! (spec §4.1.7) treats zero parsed invocations as "this model didn't call a tool", not a
//! parse failure.

use serde_json::{Map, Value};

use crate::types::ToolInvocation;

/// Parse every tool call out of `text`, assigning ids derived from `prompt_id`.
pub fn parse_tool_calls(text: &str, prompt_id: &str) -> Vec<ToolInvocation> {
    let isolated = isolate_json_value(text);

    if let Some(json_text) = isolated {
        if let Ok(value) = serde_json::from_str::<Value>(&json_text) {
            if let Some(invocations) = from_json_value(&value, prompt_id) {
                return invocations;
            }
        }
    }

    log::debug!("tool_parser: JSON parse failed, falling back to regex scan");
    regex_fallback(text, prompt_id)
}

/// Strip common Markdown JSON fences and return the outermost balanced `{...}` or `[...]`
/// substring, if any.
fn isolate_json_value(text: &str) -> Option<String> {
    let stripped = strip_code_fence(text);
    let bytes = stripped.as_bytes();
    let start = stripped.find(['{', '['])?;
    let open = bytes[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = stripped.chars().collect();
    let start_idx = stripped[..start].chars().count();

    for (i, &c) in chars.iter().enumerate().skip(start_idx) {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end_char = i + 1;
                    let slice: String = chars[start_idx..end_char].iter().collect();
                    return Some(slice);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches(['\n', '\r']);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
        return rest.trim();
    }
    trimmed
}

fn from_json_value(value: &Value, prompt_id: &str) -> Option<Vec<ToolInvocation>> {
    match value {
        Value::Object(_) => single_call_from_object(value, prompt_id, 0).map(|inv| vec![inv]),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(single_call_from_object(item, prompt_id, i)?);
            }
            Some(out)
        }
        _ => None,
    }
}

fn single_call_from_object(value: &Value, prompt_id: &str, index: usize) -> Option<ToolInvocation> {
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let arguments = obj
        .get("parameters")
        .or_else(|| obj.get("arguments"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(ToolInvocation::new(format!("{prompt_id}-{index}"), name, arguments))
}

// ============================================================================
// REGEX FALLBACK
// ============================================================================

fn call_pattern() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?P<name>[A-Za-z_][A-Za-z0-9_]*)\((?P<args>[^()]*)\)").unwrap())
}

fn kv_pattern() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r#"(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[^,]+))"#,
        )
        .unwrap()
    })
}

fn regex_fallback(text: &str, prompt_id: &str) -> Vec<ToolInvocation> {
    // The model may wrap the whole list in `[...]`; strip that before scanning so the
    // outer brackets don't get mistaken for part of a call's argument list.
    let scan_target = strip_code_fence(text);
    let scan_target = scan_target.trim();
    let scan_target = scan_target
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(scan_target);

    let mut out = Vec::new();
    for caps in call_pattern().captures_iter(scan_target) {
        let name = caps["name"].to_string();
        let args_str = &caps["args"];
        let mut arguments = Map::new();
        for kv in kv_pattern().captures_iter(args_str) {
            let key = kv["key"].to_string();
            let value = if let Some(dq) = kv.name("dq") {
                Value::String(dq.as_str().to_string())
            } else if let Some(sq) = kv.name("sq") {
                Value::String(sq.as_str().to_string())
            } else {
                coerce_bare(kv.name("bare").map(|m| m.as_str().trim()).unwrap_or(""))
            };
            arguments.insert(key, value);
        }
        out.push(ToolInvocation::new(format!("{prompt_id}-{}", out.len()), name, arguments));
    }
    out
}

/// Coerce a bare (unquoted) value to bool/number/string. Lossy for inputs like the literal
/// string `"true"` written without quotes — this matches the reference behavior (spec §9);
/// it is a known ambiguity, not a bug to silently fix.
fn coerce_bare(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Number(i.into())
            } else if let Ok(f) = raw.parse::<f64>() {
                serde_json::Number::from_f64(f).map(Value::Number).unwrap_or_else(|| Value::String(raw.to_string()))
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}
