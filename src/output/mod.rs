//! Turning untyped execution output into something displayable.
//!
//! Agents return arbitrary JSON. `unwrap` reassembles streamed token
//! events into text, `classify` picks a display shape, and `render`
//! turns that shape into terminal markdown.

pub mod classify;
pub mod render;
pub mod unwrap;

pub use classify::{classify, CodeLanguage, RenderPlan, Section, SectionBody};
pub use render::{render, render_result};
pub use unwrap::{unwrap, unwrap_str};

use serde_json::Value;

/// JSON truthiness: `null`, `false`, `0` and `""` are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Pretty JSON, falling back to the compact form.
pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
