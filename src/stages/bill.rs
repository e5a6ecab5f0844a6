use tracing::info;

use crate::engine::{BillingConfig, extract_billable_items};
use crate::error::{StageError, StageResult};
use crate::models::speech_window;
use crate::stages::StageCtx;

/// Bill stage: deterministic rule-engine pass over the committed segments
///
/// Prior items for the visit were cleared by the pipeline reset, so this is
/// the run's single generation of billable records.
pub async fn run_bill(ctx: &StageCtx, visit_id: &str, config: &BillingConfig) -> StageResult<()> {
    let segments = ctx
        .store
        .segments(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    let window = speech_window(&segments);
    let items = extract_billable_items(&segments, window, config);

    info!(
        visit_id,
        items = items.len(),
        flagged = items.iter().filter(|i| i.is_flagged).count(),
        "billing extraction complete"
    );

    ctx.store
        .replace_billable_items(visit_id, items)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    Ok(())
}
