use serde::{Deserialize, Serialize};

/// A time-bounded span of transcribed speech
///
/// Produced by the transcription stage. The speaker label starts unset and
/// is filled in by alignment, then rewritten to a display name by speaker
/// identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Unique identifier (UUID)
    pub segment_id: String,
    /// Start timestamp in milliseconds
    pub start_ms: u64,
    /// End timestamp in milliseconds
    pub end_ms: u64,
    /// Transcribed text - immutable after ingestion
    pub text: String,
    /// Speaker label (diarization tag or resolved display name)
    pub speaker: Option<String>,
    /// Transcription confidence (0-1)
    pub confidence: Option<f64>,
}

impl TranscriptSegment {
    pub fn new(start_ms: u64, end_ms: u64, text: impl Into<String>) -> Self {
        Self {
            segment_id: uuid::Uuid::new_v4().to_string(),
            start_ms,
            end_ms,
            text: text.into(),
            speaker: None,
            confidence: None,
        }
    }

    /// Duration of this segment in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Temporal midpoint, used by diarization alignment
    pub fn midpoint_ms(&self) -> u64 {
        (self.start_ms + self.end_ms) / 2
    }
}

/// A time range attributed to one distinguishable speaker, independent of
/// transcript content. Read-only input to alignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationTurn {
    /// Start timestamp in milliseconds
    pub start_ms: u64,
    /// End timestamp in milliseconds
    pub end_ms: u64,
    /// Raw diarization tag (e.g. "SPEAKER_00")
    pub speaker: String,
    /// Diarization confidence (0-1)
    pub confidence: Option<f64>,
}

impl DiarizationTurn {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Normalize freshly transcribed segments into the stored evidence set
///
/// Sorts by start time and merges overlapping segments that carry identical
/// text (ASR engines occasionally emit the same utterance twice across a
/// chunk boundary). The result is monotonic and free of duplicate spans.
pub fn dedupe_segments(mut segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    segments.sort_by_key(|s| (s.start_ms, s.end_ms));

    let mut out: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());
    for seg in segments {
        if let Some(last) = out.last_mut() {
            let overlaps = seg.start_ms < last.end_ms;
            if overlaps && seg.text == last.text {
                last.end_ms = last.end_ms.max(seg.end_ms);
                continue;
            }
        }
        out.push(seg);
    }
    out
}

/// Overall speech-activity window covered by a segment set, `[start, end)`
///
/// Returns `None` for an empty set; billing treats that as a trivial window
/// and emits nothing.
pub fn speech_window(segments: &[TranscriptSegment]) -> Option<(u64, u64)> {
    let start = segments.iter().map(|s| s.start_ms).min()?;
    let end = segments.iter().map(|s| s.end_ms).max()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_ms: u64, end_ms: u64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start_ms, end_ms, text)
    }

    #[test]
    fn test_dedupe_merges_overlapping_identical_text() {
        let segments = vec![
            seg(0, 2_000, "good morning"),
            seg(1_500, 2_500, "good morning"),
            seg(3_000, 4_000, "how are you"),
        ];

        let out = dedupe_segments(segments);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start_ms, 0);
        assert_eq!(out[0].end_ms, 2_500);
        assert_eq!(out[1].text, "how are you");
    }

    #[test]
    fn test_dedupe_keeps_overlapping_different_text() {
        let segments = vec![seg(0, 2_000, "yes"), seg(1_000, 3_000, "no")];

        let out = dedupe_segments(segments);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_dedupe_sorts_by_start() {
        let segments = vec![seg(5_000, 6_000, "b"), seg(0, 1_000, "a")];

        let out = dedupe_segments(segments);
        assert_eq!(out[0].text, "a");
        assert_eq!(out[1].text, "b");
    }

    #[test]
    fn test_speech_window() {
        let segments = vec![seg(2_000, 5_000, "a"), seg(7_000, 9_000, "b")];
        assert_eq!(speech_window(&segments), Some((2_000, 9_000)));
        assert_eq!(speech_window(&[]), None);
    }

    #[test]
    fn test_segment_midpoint() {
        let s = seg(1_000, 3_000, "x");
        assert_eq!(s.midpoint_ms(), 2_000);
        assert_eq!(s.duration_ms(), 2_000);
    }
}
