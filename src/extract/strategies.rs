use serde_json::Value;

/// Field names that generation services are known to wrap their output in,
/// tried in priority order.
const FIELD_NAMES: &[&str] = &[
    "result",
    "content",
    "message",
    "text",
    "response",
    "output",
    "arguments",
];

/// Step-type markers that identify a tool invocation or message-creation
/// element inside a step sequence.
const STEP_MARKERS: &[&str] = &[
    "tool_call",
    "tool_call_message",
    "tool_use",
    "assistant_message",
    "create_message",
];

/// Strategy 1: direct access on expected top-level locations. The payload
/// itself counts as a candidate, then known wrapper fields, one level deep.
pub fn from_known_fields(payload: &Value) -> Vec<Value> {
    object_candidates(payload, 2)
}

/// Strategy 2: take textual candidates, strip a fenced code block if present
/// and attempt a strict parse.
pub fn from_fenced_text(payload: &Value) -> Vec<Value> {
    text_candidates(payload, 2)
        .iter()
        .filter_map(|text| parse_fenced(text))
        .collect()
}

/// Strategy 3: search textual candidates for the first balanced `{...}` span
/// and attempt a strict parse of that span only.
pub fn from_brace_span(payload: &Value) -> Vec<Value> {
    text_candidates(payload, 2)
        .iter()
        .filter_map(|text| parse_brace_span(text))
        .collect()
}

/// Strategy 4: search a "sequence of steps" structure for a tool invocation
/// or message-creation element and extract from its embedded content.
pub fn from_step_sequence(payload: &Value) -> Vec<Value> {
    let Some(steps) = ["steps", "messages", "outputs"]
        .iter()
        .find_map(|key| payload.get(key).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for step in steps {
        let marker = step
            .get("type")
            .or_else(|| step.get("message_type"))
            .and_then(Value::as_str);

        let Some(marker) = marker else { continue };
        if !STEP_MARKERS.contains(&marker) {
            continue;
        }

        for key in ["arguments", "tool_call", "content", "text", "message"] {
            let Some(embedded) = step.get(key) else { continue };

            candidates.extend(from_known_fields(embedded));
            candidates.extend(from_fenced_text(embedded));
            candidates.extend(from_brace_span(embedded));
        }
    }

    candidates
}

/// Strategy 5: serialize the entire payload to text and retry the textual
/// strategies against that serialization.
pub fn from_reserialized(payload: &Value) -> Vec<Value> {
    let Ok(serialized) = serde_json::to_string(payload) else {
        return Vec::new();
    };

    parse_fenced(&serialized)
        .into_iter()
        .chain(parse_brace_span(&serialized))
        .collect()
}

/// Collect object-shaped candidates: the value itself plus known wrapper
/// fields, recursing up to `depth` levels.
fn object_candidates(value: &Value, depth: u8) -> Vec<Value> {
    let mut candidates = Vec::new();
    if value.is_object() {
        candidates.push(value.clone());
    }
    if depth == 0 {
        return candidates;
    }

    for name in FIELD_NAMES {
        if let Some(inner) = value.get(name) {
            candidates.extend(object_candidates(inner, depth - 1));
        }
    }
    candidates
}

/// Collect textual candidates: the value itself if it is a string, plus
/// strings found under known wrapper fields, recursing up to `depth` levels.
fn text_candidates(value: &Value, depth: u8) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(text) = value.as_str() {
        candidates.push(text.to_string());
    }
    if depth == 0 {
        return candidates;
    }

    for name in FIELD_NAMES {
        if let Some(inner) = value.get(name) {
            candidates.extend(text_candidates(inner, depth - 1));
        }
    }
    candidates
}

/// Strict parse of a string that may be wrapped in a markdown code block.
fn parse_fenced(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let candidate = cap.get(1)?.as_str().trim();
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    None
}

/// Find the first balanced `{...}` span and strict-parse that span only.
fn parse_brace_span(s: &str) -> Option<Value> {
    let start = s.find('{')?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = start;

    for (i, c) in s[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && end > start {
        if let Ok(value) = serde_json::from_str::<Value>(&s[start..end]) {
            if value.is_object() {
                return Some(value);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_bare_json() {
        let value = parse_fenced(r#"{"reaction": "ha"}"#).unwrap();
        assert_eq!(value["reaction"], "ha");
    }

    #[test]
    fn test_parse_fenced_code_block() {
        let text = "Sure, here you go:\n```json\n{\"reaction\": \"ha\"}\n```\nDone.";
        let value = parse_fenced(text).unwrap();
        assert_eq!(value["reaction"], "ha");
    }

    #[test]
    fn test_parse_brace_span_with_prose() {
        let text = "The audience reacts {\"laugh\": \"hot\"} and moves on";
        let value = parse_brace_span(text).unwrap();
        assert_eq!(value["laugh"], "hot");
    }

    #[test]
    fn test_parse_brace_span_ignores_braces_in_strings() {
        let text = r#"noise {"reaction": "set design {weird}", "laugh": "warm"} tail"#;
        let value = parse_brace_span(text).unwrap();
        assert_eq!(value["reaction"], "set design {weird}");
    }

    #[test]
    fn test_known_fields_includes_wrapped_object() {
        let payload = json!({"result": {"reaction": "chuckle"}});
        let candidates = from_known_fields(&payload);
        assert!(candidates.iter().any(|c| c["reaction"] == "chuckle"));
    }

    #[test]
    fn test_step_sequence_tool_call() {
        let payload = json!({
            "steps": [
                {"type": "reasoning", "text": "thinking..."},
                {"type": "tool_call", "arguments": "{\"reaction\": \"booing\", \"laugh\": \"cold\"}"}
            ]
        });
        let candidates = from_step_sequence(&payload);
        assert!(candidates.iter().any(|c| c["reaction"] == "booing"));
    }

    #[test]
    fn test_step_sequence_without_markers() {
        let payload = json!({"steps": [{"type": "reasoning", "text": "hmm"}]});
        assert!(from_step_sequence(&payload).is_empty());
    }
}
