pub mod align;
pub mod bill;
pub mod contract;
pub mod diarize;
pub mod note;
pub mod transcribe;

pub use align::*;
pub use bill::*;
pub use contract::*;
pub use diarize::*;
pub use note::*;
pub use transcribe::*;

use std::sync::Arc;

use crate::models::{BillableItem, TranscriptSegment};
use crate::services::{Diarizer, EnrolledSpeaker, LanguageModel, SpeechToText, VoiceprintMatcher};
use crate::store::VisitStore;

/// Shared handles every stage task works against
///
/// Stages read committed state from the store and persist their own output;
/// they never hand payloads to each other.
#[derive(Clone)]
pub struct StageCtx {
    pub store: Arc<dyn VisitStore>,
    pub stt: Arc<dyn SpeechToText>,
    pub diarizer: Arc<dyn Diarizer>,
    pub voiceprint: Arc<dyn VoiceprintMatcher>,
    pub llm: Arc<dyn LanguageModel>,
    /// Enrolled staff voice fingerprints for this deployment
    pub roster: Vec<EnrolledSpeaker>,
}

/// Render segments as plain dialogue text for LLM prompts
pub fn transcript_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| match &s.speaker {
            Some(speaker) => format!("{}: {}", speaker, s.text),
            None => s.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render billable items as a short summary for LLM prompts
pub fn billing_summary(items: &[BillableItem]) -> String {
    if items.is_empty() {
        return "No billable services detected.".to_string();
    }
    items
        .iter()
        .map(|i| {
            let flag = if i.is_flagged { " [flagged]" } else { "" };
            format!("- {}: {} min{}", i.category, i.billed_minutes(), flag)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_text_includes_speakers_when_present() {
        let mut a = TranscriptSegment::new(0, 1_000, "hello");
        a.speaker = Some("Grace".to_string());
        let b = TranscriptSegment::new(1_000, 2_000, "hi there");

        let text = transcript_text(&[a, b]);
        assert_eq!(text, "Grace: hello\nhi there");
    }

    #[test]
    fn test_billing_summary_empty() {
        assert!(billing_summary(&[]).contains("No billable services"));
    }

    #[test]
    fn test_billing_summary_prefers_adjusted_minutes() {
        let item = BillableItem {
            item_id: "i1".to_string(),
            category: "MEAL_PREP".to_string(),
            start_ms: 0,
            end_ms: 600_000,
            minutes: 10,
            evidence: vec![],
            is_flagged: false,
            flag_reason: None,
            adjusted_minutes: Some(8),
        };
        assert!(billing_summary(&[item]).contains("8 min"));
    }
}
