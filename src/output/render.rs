use serde_json::Value;

use super::classify::{classify, RenderPlan, SectionBody};
use super::unwrap::unwrap_str;

/// Render a classified result as terminal markdown.
pub fn render(plan: &RenderPlan) -> String {
    match plan {
        RenderPlan::Markdown(text) => text.trim_end().to_string(),
        RenderPlan::Email { subject, body } => {
            format!("**Subject:** {subject}\n\n{}", body.trim_end())
        }
        RenderPlan::Code {
            code,
            language,
            explanation,
        } => {
            let mut out = fenced(language.as_str(), code);
            if let Some(explanation) = explanation {
                out.push_str("\n\n");
                out.push_str(explanation.trim_end());
            }
            out
        }
        RenderPlan::Generic(sections) => sections
            .iter()
            .map(|section| {
                let body = match &section.body {
                    SectionBody::Markdown(text) => text.trim_end().to_string(),
                    SectionBody::Structured(dump) => fenced("json", dump),
                };
                format!("### {}\n\n{body}", title_case(&section.key))
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        RenderPlan::Raw(dump) => fenced("json", dump),
    }
}

/// Unwrap streamed text, classify, and render in one step.
pub fn render_result(result: &Value) -> String {
    let plan = match result {
        Value::String(raw) => classify(&Value::String(unwrap_str(raw))),
        other => classify(other),
    };
    render(&plan)
}

fn fenced(language: &str, body: &str) -> String {
    format!("```{language}\n{}\n```", body.trim_end())
}

/// `email_body` -> `Email Body`
fn title_case(key: &str) -> String {
    key.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
