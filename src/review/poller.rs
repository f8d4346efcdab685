use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::types::{Execution, ReviewStatus};
use crate::api::ExecutionApi;

/// Lifecycle of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Completed,
    Rejected,
}

/// Outputs published once a review completes.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewUpdate {
    pub execution_id: String,
    pub outputs: Value,
    pub refined_outputs: Option<Value>,
    pub review_note: Option<String>,
}

impl ReviewUpdate {
    fn from_execution(execution: Execution) -> Self {
        Self {
            execution_id: execution.id,
            outputs: execution.outputs,
            refined_outputs: execution.refined_outputs,
            review_note: execution.review_note,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(ReviewUpdate),
    Rejected { note: Option<String> },
    /// The handle was cancelled or the task went away.
    Cancelled,
}

/// Shortest accepted poll interval; smaller values are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Watches executions until their expert review finishes.
///
/// Each poll fetches the execution once per interval. Fetch errors are
/// logged and retried on the next tick, with no cap on attempts.
#[derive(Clone)]
pub struct ReviewPoller {
    api: Arc<dyn ExecutionApi>,
    interval: Duration,
}

impl ReviewPoller {
    pub fn new(api: Arc<dyn ExecutionApi>, interval: Duration) -> Self {
        let interval = if interval < MIN_INTERVAL {
            tracing::warn!(
                requested_ms = interval.as_millis() as u64,
                "Poll interval too short, using {}ms",
                MIN_INTERVAL.as_millis()
            );
            MIN_INTERVAL
        } else {
            interval
        };
        Self { api, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling if the execution is waiting on a review.
    pub fn start_if_pending(&self, execution: &Execution) -> Option<PollHandle> {
        match execution.review_status {
            ReviewStatus::Pending | ReviewStatus::InProgress => Some(self.start(&execution.id)),
            _ => None,
        }
    }

    /// Spawn a poll for `execution_id`. The first fetch happens one interval from now.
    pub fn start(&self, execution_id: &str) -> PollHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(PollState::Polling);

        tracing::info!(
            execution = execution_id,
            interval_secs = self.interval.as_secs_f64(),
            "Starting review poll"
        );

        tokio::spawn(poll_loop(
            Arc::clone(&self.api),
            execution_id.to_string(),
            self.interval,
            cancel_rx,
            state_tx,
            outcome_tx,
        ));

        PollHandle {
            execution_id: execution_id.to_string(),
            cancel: cancel_tx,
            outcome: outcome_rx,
            state: state_rx,
        }
    }
}

/// Owner's side of a running poll. Dropping it cancels the poll.
pub struct PollHandle {
    execution_id: String,
    cancel: oneshot::Sender<()>,
    outcome: oneshot::Receiver<PollOutcome>,
    state: watch::Receiver<PollState>,
}

impl PollHandle {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    /// Observe state transitions without owning the poll.
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    /// Stop polling. No further ticks fire and nothing is published.
    pub fn cancel(self) {
        tracing::info!(execution = %self.execution_id, "Cancelling review poll");
        let _ = self.cancel.send(());
    }

    /// Wait for the poll to reach a terminal status.
    pub async fn wait(self) -> PollOutcome {
        let PollHandle {
            cancel, outcome, ..
        } = self;
        let result = outcome.await.unwrap_or(PollOutcome::Cancelled);
        drop(cancel);
        result
    }
}

async fn poll_loop(
    api: Arc<dyn ExecutionApi>,
    execution_id: String,
    period: Duration,
    mut cancel: oneshot::Receiver<()>,
    state: watch::Sender<PollState>,
    outcome: oneshot::Sender<PollOutcome>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u64;

    let finished = loop {
        tokio::select! {
            biased;
            _ = &mut cancel => break None,
            _ = ticker.tick() => {}
        }

        attempts += 1;
        let fetched = tokio::select! {
            biased;
            _ = &mut cancel => break None,
            result = api.get_execution(&execution_id) => result,
        };

        match fetched {
            Ok(execution) => match execution.review_status {
                ReviewStatus::Completed => {
                    tracing::info!(execution = %execution_id, attempts, "Review completed");
                    break Some((
                        PollState::Completed,
                        PollOutcome::Completed(ReviewUpdate::from_execution(execution)),
                    ));
                }
                ReviewStatus::Rejected => {
                    tracing::info!(execution = %execution_id, attempts, "Review rejected");
                    break Some((
                        PollState::Rejected,
                        PollOutcome::Rejected {
                            note: execution.review_note,
                        },
                    ));
                }
                status => {
                    tracing::debug!(execution = %execution_id, status = %status, "Review still open");
                }
            },
            Err(e) => {
                tracing::warn!(
                    execution = %execution_id,
                    attempts,
                    error = %e,
                    "Failed to fetch review status, retrying next tick"
                );
            }
        }
    };

    match finished {
        Some((terminal, result)) => {
            state.send_replace(terminal);
            let _ = outcome.send(result);
        }
        None => {
            tracing::debug!(execution = %execution_id, attempts, "Review poll cancelled");
            state.send_replace(PollState::Idle);
        }
    }
}
