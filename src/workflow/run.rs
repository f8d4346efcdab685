use serde_json::{Map, Value};

use crate::api::types::Execution;
use crate::api::ExecutionApi;
use crate::error::{AppError, Result};
use crate::output::render_result;
use crate::workflow::types::RunReport;

/// Parse `key=value` arguments into an input map.
///
/// Values that parse as JSON keep their type (`n=3`, `flags=[1,2]`);
/// everything else is passed as a string.
pub fn parse_inputs(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut inputs = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| AppError::Validation(format!("expected key=value, got `{pair}`")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::Validation(format!("missing key in `{pair}`")));
        }
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.to_string(), value);
    }
    Ok(inputs)
}

/// Run an agent and render whatever it produced.
pub async fn run_agent(
    api: &dyn ExecutionApi,
    agent_id: &str,
    inputs: &Map<String, Value>,
) -> Result<RunReport> {
    tracing::info!(agent = agent_id, inputs = inputs.len(), "Running agent");

    let execution = api.execute_agent(agent_id, inputs).await?;

    tracing::info!(
        agent = agent_id,
        execution = %execution.id,
        status = ?execution.status,
        review_status = %execution.review_status,
        "Execution finished"
    );

    Ok(report(execution))
}

/// Render an execution that was fetched rather than run.
pub fn report(execution: Execution) -> RunReport {
    let rendered = render_result(&execution.outputs);
    let refined = execution.refined_outputs.as_ref().map(render_result);
    RunReport {
        execution,
        rendered,
        refined,
    }
}
