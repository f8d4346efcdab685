use serde_json::{Map, Value};

use super::{is_truthy, pretty};

const SUBJECT_FIELDS: [&str; 2] = ["subject", "subject_line"];
const BODY_FIELDS: [&str; 2] = ["body", "email_body"];
/// Probed in order; the first present field wins.
const CODE_FIELDS: [&str; 4] = ["sql_query", "python_code", "code", "regex_pattern"];
const EXPLANATION_FIELDS: [&str; 2] = ["explanation", "description"];

/// How an execution result should be displayed.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPlan {
    /// Free text, rendered as markdown.
    Markdown(String),
    Email {
        subject: String,
        body: String,
    },
    Code {
        code: String,
        language: CodeLanguage,
        explanation: Option<String>,
    },
    /// One section per non-empty field of an object.
    Generic(Vec<Section>),
    /// Anything else, as a pretty-printed dump.
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    Sql,
    Plain,
}

impl CodeLanguage {
    /// Fence tag for markdown code blocks.
    pub fn as_str(self) -> &'static str {
        match self {
            CodeLanguage::Sql => "sql",
            CodeLanguage::Plain => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub key: String,
    pub body: SectionBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Markdown(String),
    /// Pretty JSON for non-string values.
    Structured(String),
}

/// Decide how to display an execution result.
///
/// Never fails: anything unrecognized becomes markdown or a raw dump.
pub fn classify(result: &Value) -> RenderPlan {
    match result {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => classify_object(&map),
            _ => RenderPlan::Markdown(text.clone()),
        },
        Value::Object(map) => classify_object(map),
        other => RenderPlan::Raw(pretty(other)),
    }
}

fn classify_object(map: &Map<String, Value>) -> RenderPlan {
    let subject = first_present(map, &SUBJECT_FIELDS);
    let body = first_present(map, &BODY_FIELDS);
    if let (Some((_, subject)), Some((_, body))) = (subject, body) {
        return RenderPlan::Email {
            subject: text_of(subject),
            body: text_of(body),
        };
    }

    if let Some((field, code)) = first_present(map, &CODE_FIELDS) {
        let language = if field == "sql_query" {
            CodeLanguage::Sql
        } else {
            CodeLanguage::Plain
        };
        return RenderPlan::Code {
            code: text_of(code),
            language,
            explanation: first_present(map, &EXPLANATION_FIELDS).map(|(_, v)| text_of(v)),
        };
    }

    let sections = map
        .iter()
        .filter(|(_, value)| is_truthy(value))
        .map(|(key, value)| Section {
            key: key.clone(),
            body: match value {
                Value::String(s) => SectionBody::Markdown(s.clone()),
                other => SectionBody::Structured(pretty(other)),
            },
        })
        .collect();
    RenderPlan::Generic(sections)
}

fn first_present<'a>(
    map: &'a Map<String, Value>,
    fields: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    fields
        .iter()
        .find_map(|field| map.get(*field).filter(|v| is_truthy(v)).map(|v| (*field, v)))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_shapes() {
        let expected = RenderPlan::Email {
            subject: "S".to_string(),
            body: "B".to_string(),
        };
        assert_eq!(classify(&json!({"subject": "S", "body": "B"})), expected);
        assert_eq!(
            classify(&json!({"subject_line": "S", "email_body": "B"})),
            expected
        );
    }

    #[test]
    fn test_subject_without_body_is_generic() {
        let plan = classify(&json!({"subject": "S", "notes": "n"}));
        assert!(matches!(plan, RenderPlan::Generic(ref s) if s.len() == 2));
    }

    #[test]
    fn test_code_language_tagging() {
        assert_eq!(
            classify(&json!({"sql_query": "SELECT 1"})),
            RenderPlan::Code {
                code: "SELECT 1".to_string(),
                language: CodeLanguage::Sql,
                explanation: None,
            }
        );
        assert!(matches!(
            classify(&json!({"python_code": "print(1)"})),
            RenderPlan::Code { language: CodeLanguage::Plain, .. }
        ));
    }

    #[test]
    fn test_code_priority_and_explanation() {
        let plan = classify(&json!({
            "regex_pattern": "^a+$",
            "code": "fn main() {}",
            "description": "entry point"
        }));
        assert_eq!(
            plan,
            RenderPlan::Code {
                code: "fn main() {}".to_string(),
                language: CodeLanguage::Plain,
                explanation: Some("entry point".to_string()),
            }
        );
    }

    #[test]
    fn test_empty_sql_query_falls_through() {
        let plan = classify(&json!({"sql_query": "", "python_code": "x = 1"}));
        assert!(matches!(plan, RenderPlan::Code { language: CodeLanguage::Plain, ref code, .. } if code == "x = 1"));
    }

    #[test]
    fn test_generic_skips_falsy_and_keeps_order() {
        let plan = classify(&json!({
            "summary": "Looks good",
            "empty": "",
            "missing": null,
            "count": 0,
            "tags": ["a", "b"]
        }));
        let RenderPlan::Generic(sections) = plan else {
            panic!("expected generic plan");
        };
        let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["summary", "tags"]);
        assert_eq!(sections[0].body, SectionBody::Markdown("Looks good".to_string()));
        assert!(matches!(sections[1].body, SectionBody::Structured(ref s) if s.contains("\"a\"")));
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            classify(&json!("# Title")),
            RenderPlan::Markdown("# Title".to_string())
        );
        assert_eq!(
            classify(&json!("{not json")),
            RenderPlan::Markdown("{not json".to_string())
        );
        // Parses, but not to an object.
        assert_eq!(classify(&json!("[1,2]")), RenderPlan::Markdown("[1,2]".to_string()));
        assert_eq!(classify(&json!("42")), RenderPlan::Markdown("42".to_string()));
    }

    #[test]
    fn test_stringified_object_matches_object() {
        let objects = [
            json!({"subject": "S", "body": "B"}),
            json!({"sql_query": "SELECT 1", "explanation": "one"}),
            json!({"answer": "yes", "confidence": 0.9, "sources": [{"url": "x"}]}),
            json!({}),
        ];
        for obj in objects {
            let as_string = Value::String(obj.to_string());
            assert_eq!(classify(&as_string), classify(&obj), "mismatch for {obj}");
        }
    }

    #[test]
    fn test_total_over_scalars() {
        for value in [json!(null), json!(true), json!(3.5), json!([1, "two", null])] {
            let plan = classify(&value);
            assert!(matches!(plan, RenderPlan::Raw(_)));
            assert_eq!(classify(&value), plan);
        }
        assert_eq!(classify(&json!(null)), RenderPlan::Raw("null".to_string()));
    }
}
