use tracing::info;

use crate::error::{StageError, StageResult};
use crate::models::{AudioStatus, dedupe_segments};
use crate::stages::StageCtx;

/// Transcribe stage: latest audio asset through the speech-to-text service
///
/// Persists the de-duplicated segment set and marks the asset processed.
pub async fn run_transcribe(ctx: &StageCtx, visit_id: &str) -> StageResult<()> {
    let asset = ctx
        .store
        .latest_audio(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?
        .ok_or_else(|| StageError::MissingInput(format!("no audio asset for visit {visit_id}")))?;

    let segments = ctx
        .stt
        .transcribe(&asset.uri)
        .await
        .map_err(|e| StageError::Failed(format!("transcription service: {e:#}")))?;

    let segments = dedupe_segments(segments);
    info!(visit_id, count = segments.len(), "transcription complete");

    ctx.store
        .replace_segments(visit_id, segments)
        .map_err(|e| StageError::Failed(e.to_string()))?;
    ctx.store
        .set_audio_status(&asset.asset_id, AudioStatus::Processed)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    Ok(())
}
