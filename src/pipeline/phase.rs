use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::{PipelineError, StageResult};
use crate::models::{StageId, StageState};
use crate::store::VisitStore;

/// A boxed stage task ready to execute
pub type StageFuture = Pin<Box<dyn Future<Output = StageResult<()>> + Send + 'static>>;

/// A group of stages the orchestrator runs together
///
/// All stages in a phase execute concurrently as spawned tasks; the phase
/// completes only when every stage has reached a terminal state. A stage
/// failure is recorded on that stage alone and never interrupts its
/// siblings. Only bookkeeping failures (persisting stage state) abort the
/// phase.
pub struct Phase {
    name: &'static str,
    stages: Vec<(StageId, StageFuture)>,
}

impl Phase {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stages: Vec::new(),
        }
    }

    pub fn add<F>(mut self, id: StageId, task: F) -> Self
    where
        F: Future<Output = StageResult<()>> + Send + 'static,
    {
        self.stages.push((id, Box::pin(task)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage to a terminal state, persisting transitions
    pub async fn run(
        self,
        store: Arc<dyn VisitStore>,
        visit_id: &str,
    ) -> Result<(), PipelineError> {
        if self.stages.is_empty() {
            return Ok(());
        }

        info!(phase = self.name, stages = self.stages.len(), "phase started");

        let mut set: JoinSet<Result<(), PipelineError>> = JoinSet::new();
        for (id, task) in self.stages {
            let store = store.clone();
            let visit_id = visit_id.to_string();
            set.spawn(async move { run_stage(store, &visit_id, id, task).await });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => result?,
                Err(e) => {
                    return Err(PipelineError::Storage(format!("stage task aborted: {e}")));
                }
            }
        }

        info!(phase = self.name, "phase complete");
        Ok(())
    }
}

/// Drive one stage through processing to a terminal state
///
/// The state document is the single source of truth, so both transitions
/// are persisted; a failure to persist is an orchestrator-level error.
async fn run_stage(
    store: Arc<dyn VisitStore>,
    visit_id: &str,
    id: StageId,
    task: StageFuture,
) -> Result<(), PipelineError> {
    let state = StageState::processing();
    store
        .update_stage(visit_id, id, state.clone())
        .map_err(|e| PipelineError::Storage(e.to_string()))?;

    let terminal = match task.await {
        Ok(()) => state.completed(),
        Err(e) => {
            warn!(stage = %id, visit_id, "stage failed: {e}");
            state.failed(e.message())
        }
    };

    store
        .update_stage(visit_id, id, terminal)
        .map_err(|e| PipelineError::Storage(e.to_string()))
}
