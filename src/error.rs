use thiserror::Error;

/// Failure raised by a stage task
///
/// A stage reports one of three outcomes: success (`Ok`), a terminal failure
/// recorded on that stage only, or a retryable condition. Only the
/// orchestrator's own bookkeeping failures trigger whole-pipeline retries;
/// stage failures are terminal for the run.
#[derive(Error, Debug)]
pub enum StageError {
    /// The external service raised or returned malformed output
    #[error("{0}")]
    Failed(String),

    /// Transient condition worth retrying at the pipeline level
    #[error("retryable: {0}")]
    Retryable(String),

    /// No usable input existed for the stage (e.g. no audio asset)
    #[error("missing input: {0}")]
    MissingInput(String),
}

impl StageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Retryable(_))
    }

    /// The human-readable message recorded in the stage state document
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Failure in the orchestrator's own bookkeeping (reset, state persistence,
/// finalization). These abort the run and are retried with backoff.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("visit not found: {0}")]
    VisitNotFound(String),

    #[error("visit {0} has reviewer-adjusted billable items; pass force to discard them")]
    AdjustedItemsPresent(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Only bookkeeping failures are worth retrying the whole run for
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Storage(_))
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;
