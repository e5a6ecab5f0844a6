use tracing::debug;

use crate::models::{BillableItem, BillingEvidence, TranscriptSegment};

/// One row of the keyword table: pattern terms mapped to a category code
#[derive(Debug, Clone)]
pub struct CategoryRule {
    /// Service category code (e.g. "MED_REMINDER")
    pub code: &'static str,
    /// Human description used on contracts and review screens
    pub description: &'static str,
    /// Lowercase keywords matched as substrings of segment text
    pub keywords: &'static [&'static str],
}

/// Category emitted when no rule matched anywhere in the visit
pub const FALLBACK_CATEGORY: &str = "COMPANIONSHIP";

/// Configuration for the billing rule engine
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Ordered rule table; a segment may match several rows
    pub rules: Vec<CategoryRule>,
    /// Blocks shorter than this many whole minutes are flagged
    pub min_block_minutes: u32,
    /// Same-category blocks separated by at most this gap are merged
    pub merge_gap_ms: u64,
    /// Maximum characters of segment text kept as evidence
    pub excerpt_max_chars: usize,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            min_block_minutes: 5,
            merge_gap_ms: 60_000,
            excerpt_max_chars: 160,
        }
    }
}

/// The stock rule table for home-care visits
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule {
            code: "MED_REMINDER",
            description: "Medication reminders and assistance",
            keywords: &["medication", "medicine", "pills", "prescription", "dosage"],
        },
        CategoryRule {
            code: "MEAL_PREP",
            description: "Meal preparation and feeding assistance",
            keywords: &[
                "meal", "breakfast", "lunch", "dinner", "cook", "eat", "food", "snack",
            ],
        },
        CategoryRule {
            code: "MOBILITY",
            description: "Mobility and transfer assistance",
            keywords: &["walk", "wheelchair", "transfer", "stand up", "exercise", "stairs"],
        },
        CategoryRule {
            code: "HYGIENE",
            description: "Personal hygiene assistance",
            keywords: &["bath", "shower", "dressing", "grooming", "toilet", "brush"],
        },
        CategoryRule {
            code: "HOUSEKEEPING",
            description: "Light housekeeping",
            keywords: &["laundry", "dishes", "cleaning", "vacuum", "tidy", "garbage"],
        },
        CategoryRule {
            code: "TRANSPORT",
            description: "Errands and transportation",
            keywords: &["drive", "appointment", "errand", "pharmacy", "grocery"],
        },
        CategoryRule {
            code: "COMPANIONSHIP",
            description: "Companionship and social engagement",
            keywords: &["cards", "puzzle", "game", "company", "visit together"],
        },
    ]
}

/// Look up the human description for a category code
pub fn category_description<'a>(rules: &'a [CategoryRule], code: &str) -> Option<&'a str> {
    rules.iter().find(|r| r.code == code).map(|r| r.description)
}

/// A pre-consolidation block: one rule match on one segment
#[derive(Debug, Clone)]
struct CandidateBlock {
    category: &'static str,
    start_ms: u64,
    end_ms: u64,
    evidence: Vec<BillingEvidence>,
}

/// Extract consolidated billable blocks from ordered transcript segments
///
/// Deterministic and rule-based so every charge is explainable: detection
/// scans each segment's text against the keyword table, consolidation merges
/// nearby same-category blocks, the minimum-duration policy flags or drops
/// short blocks, and a companionship fallback covers visits where speech was
/// recorded but no specific task was detected.
pub fn extract_billable_items(
    segments: &[TranscriptSegment],
    speech_window: Option<(u64, u64)>,
    config: &BillingConfig,
) -> Vec<BillableItem> {
    let candidates = detect(segments, config);
    let matched_any = !candidates.is_empty();
    let consolidated = consolidate(candidates, config.merge_gap_ms);
    let mut items = apply_duration_policy(consolidated, config.min_block_minutes);

    if !matched_any {
        if let Some(block) = fallback_block(speech_window) {
            items.push(block);
        }
    }

    debug!(items = items.len(), "billing extraction complete");
    items
}

/// Detection: every keyword hit produces one candidate spanning the segment
fn detect(segments: &[TranscriptSegment], config: &BillingConfig) -> Vec<CandidateBlock> {
    let mut candidates = Vec::new();

    for segment in segments {
        let text = segment.text.to_lowercase();
        for rule in &config.rules {
            let Some(keyword) = rule.keywords.iter().find(|k| keyword_matches(&text, k)) else {
                continue;
            };
            candidates.push(CandidateBlock {
                category: rule.code,
                start_ms: segment.start_ms,
                end_ms: segment.end_ms,
                evidence: vec![BillingEvidence {
                    segment_id: segment.segment_id.clone(),
                    start_ms: segment.start_ms,
                    end_ms: segment.end_ms,
                    excerpt: truncate(&segment.text, config.excerpt_max_chars),
                    matched_keyword: keyword.to_string(),
                }],
            });
        }
    }

    candidates
}

/// Consolidation: merge same-category blocks whose gap is within threshold
///
/// Blocks are processed in start order; merging unions the time range and
/// concatenates evidence, and never changes the category.
fn consolidate(mut candidates: Vec<CandidateBlock>, merge_gap_ms: u64) -> Vec<CandidateBlock> {
    candidates.sort_by_key(|c| (c.start_ms, c.end_ms));

    let mut blocks: Vec<CandidateBlock> = Vec::new();
    for cand in candidates {
        if let Some(open) = blocks.iter_mut().rev().find(|b| b.category == cand.category) {
            let gap = cand.start_ms.saturating_sub(open.end_ms);
            if gap <= merge_gap_ms {
                open.end_ms = open.end_ms.max(cand.end_ms);
                open.evidence.extend(cand.evidence);
                continue;
            }
        }
        blocks.push(cand);
    }
    blocks
}

/// Minimum-duration policy: floor to whole minutes, drop zeros, flag shorts
fn apply_duration_policy(blocks: Vec<CandidateBlock>, min_block_minutes: u32) -> Vec<BillableItem> {
    let mut items = Vec::new();

    for block in blocks {
        let minutes = ((block.end_ms - block.start_ms) / 60_000) as u32;
        if minutes == 0 {
            continue;
        }

        let (is_flagged, flag_reason) = if minutes < min_block_minutes {
            (
                true,
                Some(format!(
                    "Duration {minutes} min is below the {min_block_minutes} min minimum"
                )),
            )
        } else {
            (false, None)
        };

        items.push(BillableItem {
            item_id: uuid::Uuid::new_v4().to_string(),
            category: block.category.to_string(),
            start_ms: block.start_ms,
            end_ms: block.end_ms,
            minutes,
            evidence: block.evidence,
            is_flagged,
            flag_reason,
            adjusted_minutes: None,
        });
    }

    items
}

/// Fallback: one flagged companionship block over the whole speech window,
/// provided the window is non-trivial (at least one whole minute)
fn fallback_block(speech_window: Option<(u64, u64)>) -> Option<BillableItem> {
    let (start_ms, end_ms) = speech_window?;
    let minutes = ((end_ms.saturating_sub(start_ms)) / 60_000) as u32;
    if minutes == 0 {
        return None;
    }

    Some(BillableItem {
        item_id: uuid::Uuid::new_v4().to_string(),
        category: FALLBACK_CATEGORY.to_string(),
        start_ms,
        end_ms,
        minutes,
        evidence: Vec::new(),
        is_flagged: true,
        flag_reason: Some("No specific tasks detected; review whole-visit companionship".into()),
        adjusted_minutes: None,
    })
}

/// Match a keyword at a word start, prefix-style
///
/// "walk" matches "walking" but "eat" does not match "weather" or
/// "treatment". `text` must already be lowercased.
fn keyword_matches(text: &str, keyword: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = text[from..].find(keyword) {
        let at = from + pos;
        let at_word_start = at == 0
            || !text[..at]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        if at_word_start {
            return true;
        }
        from = at + 1;
    }
    false
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_ms: u64, end_ms: u64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start_ms, end_ms, text)
    }

    fn extract(segments: &[TranscriptSegment]) -> Vec<BillableItem> {
        let window = crate::models::speech_window(segments);
        extract_billable_items(segments, window, &BillingConfig::default())
    }

    #[test]
    fn test_empty_transcript_yields_no_items() {
        let items = extract(&[]);
        assert!(items.is_empty());
    }

    #[test]
    fn test_single_short_mention_is_flagged_with_shortfall() {
        // 3 minutes of medication talk, threshold 5
        let items = extract(&[seg(0, 180_000, "time for your medication now")]);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "MED_REMINDER");
        assert_eq!(items[0].minutes, 3);
        assert!(items[0].is_flagged);
        let reason = items[0].flag_reason.as_deref().unwrap();
        assert!(reason.contains('3') && reason.contains('5'), "{reason}");
    }

    #[test]
    fn test_consolidation_merges_within_gap() {
        let items = extract(&[
            seg(0, 120_000, "let's get your medication sorted"),
            // 30s gap, same category: merges
            seg(150_000, 400_000, "second round of pills after lunch break"),
        ]);

        let med: Vec<_> = items.iter().filter(|i| i.category == "MED_REMINDER").collect();
        assert_eq!(med.len(), 1);
        assert_eq!(med[0].start_ms, 0);
        assert_eq!(med[0].end_ms, 400_000);
        assert_eq!(med[0].evidence.len(), 2);
        // Evidence concatenated in original order
        assert!(med[0].evidence[0].start_ms < med[0].evidence[1].start_ms);
    }

    #[test]
    fn test_consolidation_respects_gap_threshold() {
        let items = extract(&[
            seg(0, 300_000, "medication first thing"),
            // 61s gap: stays separate
            seg(361_000, 700_000, "evening medicine round"),
        ]);

        let med: Vec<_> = items.iter().filter(|i| i.category == "MED_REMINDER").collect();
        assert_eq!(med.len(), 2);
    }

    #[test]
    fn test_merge_never_changes_category() {
        let items = extract(&[
            seg(0, 300_000, "help with the laundry pile"),
            seg(10_000, 310_000, "medication check"),
        ]);

        let categories: Vec<_> = items.iter().map(|i| i.category.as_str()).collect();
        assert!(categories.contains(&"HOUSEKEEPING"));
        assert!(categories.contains(&"MED_REMINDER"));
    }

    #[test]
    fn test_duration_boundary_just_below_threshold_flagged() {
        // 5 * 60_000 - 1 ms floors to 4 minutes: flagged
        let items = extract(&[seg(0, 299_999, "medication routine")]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].minutes, 4);
        assert!(items[0].is_flagged);
    }

    #[test]
    fn test_duration_boundary_at_threshold_not_flagged() {
        let items = extract(&[seg(0, 300_000, "medication routine")]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].minutes, 5);
        assert!(!items[0].is_flagged);
    }

    #[test]
    fn test_block_rounding_to_zero_is_dropped() {
        // Exactly 59_999 ms floors to 0 minutes
        let items = extract_billable_items(
            &[seg(0, 59_999, "quick medication check")],
            Some((0, 59_999)),
            &BillingConfig::default(),
        );
        assert!(items.is_empty());
    }

    #[test]
    fn test_multi_match_emits_all_categories() {
        // Matches both MEAL_PREP ("eat") and MED_REMINDER ("medication")
        let items = extract(&[seg(0, 300_000, "help me eat after my medication")]);

        let categories: Vec<_> = items.iter().map(|i| i.category.as_str()).collect();
        assert!(categories.contains(&"MEAL_PREP"));
        assert!(categories.contains(&"MED_REMINDER"));
        // Both span the same segment
        assert!(items.iter().all(|i| i.start_ms == 0 && i.end_ms == 300_000));
    }

    #[test]
    fn test_fallback_companionship_when_nothing_matched() {
        let items = extract(&[
            seg(0, 200_000, "lovely weather today"),
            seg(200_000, 900_000, "tell me about your grandchildren"),
        ]);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, FALLBACK_CATEGORY);
        assert_eq!(items[0].start_ms, 0);
        assert_eq!(items[0].end_ms, 900_000);
        assert!(items[0].is_flagged);
    }

    #[test]
    fn test_no_fallback_for_trivial_window() {
        // Under a minute of unmatched speech: nothing emitted
        let items = extract(&[seg(0, 45_000, "hello there")]);
        assert!(items.is_empty());
    }

    #[test]
    fn test_rerun_is_deterministic_on_categories() {
        let segments = vec![
            seg(0, 300_000, "walk to the kitchen and cook lunch"),
            seg(320_000, 700_000, "laundry and dishes"),
        ];

        let mut a: Vec<_> = extract(&segments).iter().map(|i| i.category.clone()).collect();
        let mut b: Vec<_> = extract(&segments).iter().map(|i| i.category.clone()).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_keyword_matches_at_word_start_only() {
        assert!(keyword_matches("she was eating lunch", "eat"));
        assert!(keyword_matches("out walking the dog", "walk"));
        assert!(!keyword_matches("lovely weather today", "eat"));
        assert!(!keyword_matches("after the treatment", "eat"));
        assert!(keyword_matches("please stand up slowly", "stand up"));
    }

    #[test]
    fn test_detection_is_case_insensitive() {
        let items = extract(&[seg(0, 300_000, "Time for your MEDICATION")]);
        assert_eq!(items[0].category, "MED_REMINDER");
    }

    #[test]
    fn test_evidence_carries_matched_keyword_and_excerpt() {
        let items = extract(&[seg(0, 300_000, "time for your medication now")]);
        let ev = &items[0].evidence[0];
        assert_eq!(ev.matched_keyword, "medication");
        assert_eq!(ev.excerpt, "time for your medication now");
    }
}
