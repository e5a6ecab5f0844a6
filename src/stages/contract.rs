use tracing::info;

use crate::engine::{BillingConfig, category_description};
use crate::error::{StageError, StageResult};
use crate::models::{BillableItem, ContractServiceLine};
use crate::stages::{StageCtx, billing_summary, transcript_text};

/// Contract stage: assemble a draft service contract from billing output
///
/// Service lines come straight from the billed categories; schedule, rate,
/// and free-text terms are extracted from the conversation by the language
/// model. Runs strictly after billing.
pub async fn run_contract(
    ctx: &StageCtx,
    visit_id: &str,
    config: &BillingConfig,
) -> StageResult<()> {
    let visit = ctx
        .store
        .visit(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?
        .ok_or_else(|| StageError::MissingInput(format!("visit not found: {visit_id}")))?;

    let segments = ctx
        .store
        .segments(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;
    let items = ctx
        .store
        .billable_items(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    let mut contract = ctx
        .llm
        .draft_contract(
            &transcript_text(&segments),
            &billing_summary(&items),
            &visit.client_name,
            &visit.caregiver_name,
        )
        .await
        .map_err(|e| StageError::Failed(format!("contract drafting: {e:#}")))?;

    contract.service_lines = service_lines(&items, config);

    info!(
        visit_id,
        lines = contract.service_lines.len(),
        "contract drafted"
    );

    ctx.store
        .put_contract(visit_id, contract)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    Ok(())
}

/// One service line per billed category, minutes summed across blocks
fn service_lines(items: &[BillableItem], config: &BillingConfig) -> Vec<ContractServiceLine> {
    let mut lines: Vec<ContractServiceLine> = Vec::new();
    for item in items {
        match lines.iter_mut().find(|l| l.category == item.category) {
            Some(line) => line.observed_minutes += item.billed_minutes(),
            None => lines.push(ContractServiceLine {
                category: item.category.clone(),
                description: category_description(&config.rules, &item.category)
                    .unwrap_or(&item.category)
                    .to_string(),
                observed_minutes: item.billed_minutes(),
            }),
        }
    }
    lines
}
