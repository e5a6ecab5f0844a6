use tracing::debug;

use crate::models::{DiarizationTurn, TranscriptSegment};

/// Result of aligning diarization turns onto transcript segments
#[derive(Debug)]
pub struct AlignResult {
    /// Number of segments whose midpoint fell inside a turn
    pub contained: usize,
    /// Number of segments assigned by nearest-turn fallback
    pub nearest: usize,
    /// Number of segments left unlabeled (no turns available)
    pub unlabeled: usize,
}

/// Assign a speaker label to every segment using diarization turns
///
/// Per segment: find the turn containing the segment's temporal midpoint
/// (closed interval, `start <= midpoint <= end`); if none contains it, fall
/// back to the turn with minimum distance to the midpoint. With no turns at
/// all the segment keeps its unset label.
///
/// Midpoint containment rather than maximal overlap keeps the assignment
/// stable across short, rapidly alternating turns typical of dialogue.
pub fn align_speakers(
    segments: &mut [TranscriptSegment],
    turns: &[DiarizationTurn],
) -> AlignResult {
    let mut result = AlignResult {
        contained: 0,
        nearest: 0,
        unlabeled: 0,
    };

    if turns.is_empty() {
        result.unlabeled = segments.len();
        return result;
    }

    let mut sorted: Vec<&DiarizationTurn> = turns.iter().collect();
    sorted.sort_by_key(|t| t.start_ms);

    for segment in segments.iter_mut() {
        let midpoint = segment.midpoint_ms();

        let containing = sorted
            .iter()
            .find(|t| t.start_ms <= midpoint && midpoint <= t.end_ms);

        match containing {
            Some(turn) => {
                segment.speaker = Some(turn.speaker.clone());
                result.contained += 1;
            }
            None => {
                // Nearest turn by gap to the closer edge
                if let Some(nearest) = sorted.iter().min_by_key(|t| distance_to_turn(midpoint, t))
                {
                    segment.speaker = Some(nearest.speaker.clone());
                    result.nearest += 1;
                }
            }
        }
    }

    debug!(
        contained = result.contained,
        nearest = result.nearest,
        unlabeled = result.unlabeled,
        "aligned diarization turns onto segments"
    );
    result
}

/// Temporal distance from a point to a turn: 0 inside, else gap to the
/// nearer edge
fn distance_to_turn(point_ms: u64, turn: &DiarizationTurn) -> u64 {
    if point_ms < turn.start_ms {
        turn.start_ms - point_ms
    } else if point_ms > turn.end_ms {
        point_ms - turn.end_ms
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(start_ms: u64, end_ms: u64, speaker: &str) -> DiarizationTurn {
        DiarizationTurn {
            start_ms,
            end_ms,
            speaker: speaker.to_string(),
            confidence: Some(0.9),
        }
    }

    fn seg(start_ms: u64, end_ms: u64) -> TranscriptSegment {
        TranscriptSegment::new(start_ms, end_ms, "words")
    }

    #[test]
    fn test_midpoint_containment() {
        let turns = vec![turn(0, 5_000, "SPEAKER_00"), turn(5_001, 10_000, "SPEAKER_01")];
        // Midpoint 2_000 falls inside the first turn
        let mut segments = vec![seg(1_000, 3_000)];

        let result = align_speakers(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
        assert_eq!(result.contained, 1);
    }

    #[test]
    fn test_boundary_inclusive_at_turn_start() {
        let turns = vec![turn(2_000, 5_000, "SPEAKER_01")];
        // Midpoint exactly 2_000: closed interval includes the start edge
        let mut segments = vec![seg(1_000, 3_000)];

        let result = align_speakers(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_01"));
        assert_eq!(result.contained, 1);
        assert_eq!(result.nearest, 0);
    }

    #[test]
    fn test_boundary_inclusive_at_turn_end() {
        let turns = vec![turn(0, 2_000, "SPEAKER_00"), turn(2_001, 6_000, "SPEAKER_01")];
        // Midpoint exactly 2_000: closed interval includes the end edge, so
        // the earlier turn wins over the adjacent one
        let mut segments = vec![seg(1_000, 3_000)];

        let result = align_speakers(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
        assert_eq!(result.contained, 1);
    }

    #[test]
    fn test_nearest_turn_fallback() {
        let turns = vec![turn(0, 1_000, "SPEAKER_00"), turn(9_000, 10_000, "SPEAKER_01")];
        // Midpoint 7_500 is in the gap, 6_500 from SPEAKER_00's end and
        // 1_500 from SPEAKER_01's start
        let mut segments = vec![seg(7_000, 8_000)];

        let result = align_speakers(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_01"));
        assert_eq!(result.nearest, 1);
    }

    #[test]
    fn test_no_turns_leaves_labels_unset() {
        let mut segments = vec![seg(0, 1_000), seg(1_000, 2_000)];

        let result = align_speakers(&mut segments, &[]);
        assert!(segments.iter().all(|s| s.speaker.is_none()));
        assert_eq!(result.unlabeled, 2);
    }

    #[test]
    fn test_every_segment_gets_a_label_with_sparse_turns() {
        let turns = vec![turn(4_000, 5_000, "SPEAKER_00")];
        let mut segments = vec![seg(0, 1_000), seg(4_200, 4_800), seg(20_000, 21_000)];

        align_speakers(&mut segments, &turns);
        assert!(segments.iter().all(|s| s.speaker.is_some()));
    }

    #[test]
    fn test_unsorted_turns_are_handled() {
        let turns = vec![turn(5_000, 9_000, "SPEAKER_01"), turn(0, 4_999, "SPEAKER_00")];
        let mut segments = vec![seg(1_000, 2_000)];

        align_speakers(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
    }
}
