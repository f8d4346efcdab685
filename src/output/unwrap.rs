use serde_json::Value;

use super::is_truthy;

/// Fields that may hold a single text payload, in priority order.
const PAYLOAD_FIELDS: [&str; 4] = ["response", "result", "text", "content"];

/// Reduce an execution result to the text it carries.
///
/// Token event streams are concatenated, wrapper objects are opened, and
/// anything unrecognized is stringified. Never fails.
pub fn unwrap(raw: &Value) -> String {
    match raw {
        Value::String(s) => unwrap_str(s),
        Value::Array(items) => items.iter().filter_map(token_content).collect(),
        Value::Object(map) => {
            let payload = PAYLOAD_FIELDS
                .iter()
                .find_map(|field| map.get(*field).filter(|v| is_truthy(v)));
            match payload {
                Some(Value::String(s)) => unwrap_str(s),
                Some(other) => other.to_string(),
                None => raw.to_string(),
            }
        }
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    }
}

/// Reassemble streamed token events from raw text.
///
/// Accepts newline-delimited events or events glued together as
/// `{...}{...}`. Returns the input unchanged when it is neither.
pub fn unwrap_str(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return raw.to_string();
    }

    let parsed: Result<Vec<Value>, _> = lines
        .iter()
        .map(|line| serde_json::from_str::<Value>(line))
        .collect();

    match parsed {
        Ok(events) => {
            let tokens: Option<String> = events.iter().map(token_content).collect();
            tokens.unwrap_or_else(|| raw.to_string())
        }
        Err(_) => concatenated_tokens(raw).unwrap_or_else(|| raw.to_string()),
    }
}

/// `content` of a `{"type": "token", "content": "..."}` event.
fn token_content(value: &Value) -> Option<&str> {
    if value.get("type").and_then(Value::as_str) != Some("token") {
        return None;
    }
    value.get("content").and_then(Value::as_str)
}

/// Parse back-to-back JSON objects and join their token contents.
fn concatenated_tokens(raw: &str) -> Option<String> {
    if !has_object_boundary(raw) {
        return None;
    }

    let mut objects = Vec::new();
    for value in serde_json::Deserializer::from_str(raw.trim()).into_iter::<Value>() {
        match value {
            Ok(v @ Value::Object(_)) => objects.push(v),
            Ok(_) => return None,
            Err(e) => {
                tracing::trace!(error = %e, "Concatenated token stream did not parse");
                return None;
            }
        }
    }

    let mut tokens = objects.iter().filter_map(token_content).peekable();
    tokens.peek()?;
    Some(tokens.collect())
}

/// Whether `}` is followed (ignoring whitespace) by `{` somewhere in the text.
fn has_object_boundary(raw: &str) -> bool {
    let mut after_close = false;
    for c in raw.chars() {
        match c {
            '}' => after_close = true,
            '{' if after_close => return true,
            c if c.is_whitespace() => {}
            _ => after_close = false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_newline_delimited_tokens() {
        let raw = [
            r#"{"type":"token","content":"A"}"#,
            r#"{"type":"token","content":"B"}"#,
            r#"{"type":"token","content":"C"}"#,
        ]
        .join("\n");
        assert_eq!(unwrap_str(&raw), "ABC");
    }

    #[test]
    fn test_blank_lines_and_crlf_ignored() {
        let raw = "{\"type\":\"token\",\"content\":\"Hi \"}\r\n\r\n{\"type\":\"token\",\"content\":\"there\"}\r\n";
        assert_eq!(unwrap_str(raw), "Hi there");
    }

    #[test]
    fn test_concatenated_tokens() {
        let raw = r#"{"type":"token","content":"A"}{"type":"token","content":"B"}"#;
        assert_eq!(unwrap_str(raw), "AB");
    }

    #[test]
    fn test_concatenated_tokens_skip_other_events() {
        let raw = r#"{"type":"start"}{"type":"token","content":"x"} {"type":"token","content":"y"}{"type":"done"}"#;
        assert_eq!(unwrap_str(raw), "xy");
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(unwrap_str("hello world"), "hello world");
        assert_eq!(unwrap_str("line one\nline two"), "line one\nline two");
        assert_eq!(unwrap_str(""), "");
    }

    #[test]
    fn test_non_token_json_lines_passthrough() {
        let raw = "{\"a\":1}\n{\"b\":2}";
        assert_eq!(unwrap_str(raw), raw);
    }

    #[test]
    fn test_braces_in_prose_passthrough() {
        let raw = "use {a} then {b}";
        assert_eq!(unwrap_str(raw), raw);
        let raw = "fn f() {}{ broken";
        assert_eq!(unwrap_str(raw), raw);
    }

    #[test]
    fn test_array_input() {
        let events = json!([
            {"type": "token", "content": "Hel"},
            {"type": "status", "content": "ignored"},
            {"type": "token", "content": "lo"}
        ]);
        assert_eq!(unwrap(&events), "Hello");
        assert_eq!(unwrap(&json!([])), "");
    }

    #[test]
    fn test_object_payload_priority() {
        assert_eq!(
            unwrap(&json!({"text": "second", "response": "first"})),
            "first"
        );
        assert_eq!(
            unwrap(&json!({"response": "", "result": "fallback"})),
            "fallback"
        );
        let streamed = json!({"content": "{\"type\":\"token\",\"content\":\"A\"}\n{\"type\":\"token\",\"content\":\"B\"}"});
        assert_eq!(unwrap(&streamed), "AB");
    }

    #[test]
    fn test_object_non_string_payload_serialized() {
        assert_eq!(unwrap(&json!({"result": {"score": 3}})), r#"{"score":3}"#);
        assert_eq!(unwrap(&json!({"other": 1})), r#"{"other":1}"#);
    }

    #[test]
    fn test_scalars() {
        assert_eq!(unwrap(&json!(42)), "42");
        assert_eq!(unwrap(&json!(true)), "true");
        assert_eq!(unwrap(&Value::Null), "null");
    }
}
