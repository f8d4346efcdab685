use crate::api::types::Execution;
use crate::review::ReviewUpdate;

/// Result of running an agent, ready for display.
#[derive(Debug)]
pub struct RunReport {
    pub execution: Execution,
    pub rendered: String,
    /// Refined outputs, present once an expert has reviewed the run.
    pub refined: Option<String>,
}

/// Outcome of a review request or watch.
#[derive(Debug)]
pub enum ReviewOutcome {
    /// Request accepted; not watched.
    Requested { execution: Execution },
    /// Review finished with new outputs.
    Completed {
        update: ReviewUpdate,
        rendered: String,
    },
    Rejected { note: Option<String> },
    /// Watch stopped before the review finished.
    Cancelled,
    /// The execution has no open review to wait on.
    NotPending { execution: Execution },
}
