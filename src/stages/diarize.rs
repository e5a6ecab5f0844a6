use tracing::info;

use crate::error::{StageError, StageResult};
use crate::stages::StageCtx;

/// Diarize stage: latest audio asset through the diarization service
pub async fn run_diarize(ctx: &StageCtx, visit_id: &str) -> StageResult<()> {
    let asset = ctx
        .store
        .latest_audio(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?
        .ok_or_else(|| StageError::MissingInput(format!("no audio asset for visit {visit_id}")))?;

    let turns = ctx
        .diarizer
        .diarize(&asset.uri)
        .await
        .map_err(|e| StageError::Failed(format!("diarization service: {e:#}")))?;

    info!(visit_id, count = turns.len(), "diarization complete");

    ctx.store
        .replace_turns(visit_id, turns)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    Ok(())
}
