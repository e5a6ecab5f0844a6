use tracing::info;

use crate::error::{StageError, StageResult};
use crate::stages::{StageCtx, billing_summary, transcript_text};

/// Note stage: draft the structured visit note from transcript and billing
pub async fn run_note(ctx: &StageCtx, visit_id: &str) -> StageResult<()> {
    let segments = ctx
        .store
        .segments(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;
    if segments.is_empty() {
        return Err(StageError::MissingInput(format!(
            "no transcript segments for visit {visit_id}"
        )));
    }

    let items = ctx
        .store
        .billable_items(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    let note = ctx
        .llm
        .draft_note(&transcript_text(&segments), &billing_summary(&items))
        .await
        .map_err(|e| StageError::Failed(format!("note drafting: {e:#}")))?;

    info!(visit_id, "visit note drafted");

    ctx.store
        .put_note(visit_id, note)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    Ok(())
}
