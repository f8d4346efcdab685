use std::future::Future;

use crate::api::types::{Execution, ReviewPriority, ReviewRequest, ReviewResponse, ReviewStatus};
use crate::api::ExecutionApi;
use crate::error::{AppError, Result};
use crate::output::render_result;
use crate::review::{PollHandle, PollOutcome, ReviewPoller, ReviewUpdate};
use crate::workflow::types::ReviewOutcome;

/// Ask an expert to review an execution, optionally waiting for the result.
pub async fn request_review<S>(
    api: &dyn ExecutionApi,
    poller: &ReviewPoller,
    execution_id: &str,
    note: &str,
    priority: Option<ReviewPriority>,
    watch: bool,
    stop: S,
) -> Result<ReviewOutcome>
where
    S: Future<Output = ()>,
{
    if note.trim().is_empty() {
        return Err(AppError::Validation("review note must not be empty".to_string()));
    }

    let request = ReviewRequest {
        note: note.to_string(),
        priority,
    };
    let execution = api.request_review(execution_id, &request).await?;
    tracing::info!(
        execution = execution_id,
        review_status = %execution.review_status,
        "Review requested"
    );

    if !watch {
        return Ok(ReviewOutcome::Requested { execution });
    }
    Ok(watch_execution(poller, execution, stop).await)
}

/// Fetch an execution and wait for its open review to finish.
pub async fn watch_review<S>(
    api: &dyn ExecutionApi,
    poller: &ReviewPoller,
    execution_id: &str,
    stop: S,
) -> Result<ReviewOutcome>
where
    S: Future<Output = ()>,
{
    let execution = api.get_execution(execution_id).await?;
    Ok(watch_execution(poller, execution, stop).await)
}

/// Answer a review request as the creator.
pub async fn respond_review(
    api: &dyn ExecutionApi,
    execution_id: &str,
    note: &str,
    score: Option<u8>,
) -> Result<Execution> {
    if note.trim().is_empty() {
        return Err(AppError::Validation("response note must not be empty".to_string()));
    }
    let response = ReviewResponse {
        note: note.to_string(),
        score,
    };
    let execution = api.respond_review(execution_id, &response).await?;
    tracing::info!(execution = execution_id, "Review response submitted");
    Ok(execution)
}

async fn watch_execution<S>(poller: &ReviewPoller, execution: Execution, stop: S) -> ReviewOutcome
where
    S: Future<Output = ()>,
{
    match execution.review_status {
        ReviewStatus::Completed => {
            let shown = execution.refined_outputs.as_ref().unwrap_or(&execution.outputs);
            let rendered = render_result(shown);
            return ReviewOutcome::Completed {
                update: ReviewUpdate {
                    execution_id: execution.id,
                    outputs: execution.outputs,
                    refined_outputs: execution.refined_outputs,
                    review_note: execution.review_note,
                },
                rendered,
            };
        }
        ReviewStatus::Rejected => {
            return ReviewOutcome::Rejected {
                note: execution.review_note,
            }
        }
        _ => {}
    }

    match poller.start_if_pending(&execution) {
        Some(handle) => wait_or_stop(handle, stop).await,
        None => ReviewOutcome::NotPending { execution },
    }
}

/// Wait for the poll, dropping (and so cancelling) it if `stop` fires first.
async fn wait_or_stop<S>(handle: PollHandle, stop: S) -> ReviewOutcome
where
    S: Future<Output = ()>,
{
    let outcome = tokio::select! {
        outcome = handle.wait() => outcome,
        _ = stop => PollOutcome::Cancelled,
    };

    match outcome {
        PollOutcome::Completed(update) => {
            let shown = update.refined_outputs.as_ref().unwrap_or(&update.outputs);
            let rendered = render_result(shown);
            ReviewOutcome::Completed { update, rendered }
        }
        PollOutcome::Rejected { note } => ReviewOutcome::Rejected { note },
        PollOutcome::Cancelled => ReviewOutcome::Cancelled,
    }
}
