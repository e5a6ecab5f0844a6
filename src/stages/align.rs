use std::collections::HashMap;

use tracing::{info, warn};

use crate::engine::{align_speakers, resolve_speaker_names, unresolved_labels};
use crate::error::{StageError, StageResult};
use crate::models::TranscriptSegment;
use crate::services::SpeakerInferenceRequest;
use crate::stages::StageCtx;

/// Maximum transcript excerpts sent to the model per label
const MAX_EXCERPTS_PER_LABEL: usize = 5;
/// Maximum total characters of excerpt context
const MAX_CONTEXT_CHARS: usize = 8_000;

/// Align stage: label segments from diarization turns, then resolve labels
/// to display names
///
/// Alignment itself is deterministic. Identification is layered on top,
/// best-effort: voiceprint matches lock their labels, the language model is
/// asked only about the remainder, and anything still unknown keeps its raw
/// diarization tag. A failure in either identification source degrades to
/// "no identification" rather than failing the stage.
pub async fn run_align(ctx: &StageCtx, visit_id: &str) -> StageResult<()> {
    let mut segments = ctx
        .store
        .segments(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;
    let turns = ctx
        .store
        .turns(visit_id)
        .map_err(|e| StageError::Failed(e.to_string()))?;

    let result = align_speakers(&mut segments, &turns);
    info!(
        visit_id,
        contained = result.contained,
        nearest = result.nearest,
        "alignment complete"
    );

    ctx.store
        .replace_segments(visit_id, segments.clone())
        .map_err(|e| StageError::Failed(e.to_string()))?;

    // Speaker identification over the labels alignment produced
    let mut labels: Vec<String> = Vec::new();
    for turn in &turns {
        if !labels.contains(&turn.speaker) {
            labels.push(turn.speaker.clone());
        }
    }
    if labels.is_empty() {
        return Ok(());
    }

    let fingerprint = match ctx.store.latest_audio(visit_id) {
        Ok(Some(asset)) => ctx
            .voiceprint
            .match_speakers(&asset.uri, &labels, &ctx.roster)
            .await
            .unwrap_or_else(|e| {
                warn!(visit_id, "voiceprint matching unavailable: {e:#}");
                HashMap::new()
            }),
        _ => HashMap::new(),
    };

    let remaining = unresolved_labels(&labels, &fingerprint);
    let inferred = if remaining.is_empty() {
        HashMap::new()
    } else {
        let known_names = match ctx.store.visit(visit_id) {
            Ok(Some(visit)) => vec![visit.client_name, visit.caregiver_name],
            _ => Vec::new(),
        };
        let request = SpeakerInferenceRequest {
            labels_to_resolve: remaining,
            excerpts: label_excerpts(&segments),
            known_names,
        };
        ctx.llm.identify_speakers(&request).await.unwrap_or_else(|e| {
            warn!(visit_id, "speaker inference unavailable: {e:#}");
            HashMap::new()
        })
    };

    let resolution = resolve_speaker_names(&labels, &fingerprint, &inferred);
    let touched = ctx
        .store
        .apply_speaker_names(visit_id, &resolution.names)
        .map_err(|e| StageError::Failed(e.to_string()))?;
    info!(
        visit_id,
        touched,
        by_fingerprint = resolution.fingerprint_resolved.len(),
        by_llm = resolution.llm_resolved.len(),
        "speaker names applied"
    );

    Ok(())
}

/// Representative excerpts per label for the inference prompt
///
/// Takes each label's first two segments (introductions cluster early) plus
/// its longest remaining segments, capped per label and in total.
fn label_excerpts(segments: &[TranscriptSegment]) -> Vec<(String, Vec<String>)> {
    let mut by_label: Vec<(String, Vec<&TranscriptSegment>)> = Vec::new();
    for segment in segments {
        let Some(label) = &segment.speaker else {
            continue;
        };
        match by_label.iter_mut().find(|(l, _)| l == label) {
            Some((_, list)) => list.push(segment),
            None => by_label.push((label.clone(), vec![segment])),
        }
    }

    let mut total_chars = 0;
    let mut result = Vec::new();
    for (label, segs) in by_label {
        let mut selected: Vec<&TranscriptSegment> = segs.iter().take(2).copied().collect();

        let mut rest: Vec<&TranscriptSegment> = segs.iter().skip(2).copied().collect();
        rest.sort_by_key(|s| std::cmp::Reverse(s.text.len()));
        selected.extend(rest.into_iter().take(MAX_EXCERPTS_PER_LABEL.saturating_sub(2)));
        selected.sort_by_key(|s| s.start_ms);

        let mut excerpts = Vec::new();
        for seg in selected {
            if total_chars + seg.text.len() > MAX_CONTEXT_CHARS {
                break;
            }
            total_chars += seg.text.len();
            excerpts.push(seg.text.clone());
        }
        if !excerpts.is_empty() {
            result.push((label, excerpts));
        }
    }
    result
}
