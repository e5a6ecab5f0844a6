use serde::{Deserialize, Serialize};

/// Source excerpt backing a billable block
///
/// Every block carries the segments that produced it so a reviewer can trace
/// a charge back to the words that justified it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvidence {
    /// Segment the match came from
    pub segment_id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    /// Truncated text excerpt from the segment
    pub excerpt: String,
    /// The keyword that matched
    pub matched_keyword: String,
}

/// A consolidated, categorized, time-bounded unit of caregiving work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillableItem {
    /// Unique identifier (UUID)
    pub item_id: String,
    /// Service category code (e.g. "MED_REMINDER")
    pub category: String,
    pub start_ms: u64,
    pub end_ms: u64,
    /// Whole minutes, floor of (end - start) / 60_000
    pub minutes: u32,
    /// Segment excerpts that produced this block, in source order
    pub evidence: Vec<BillingEvidence>,
    /// Whether the block needs reviewer attention
    pub is_flagged: bool,
    /// Reason for the flag, if any
    pub flag_reason: Option<String>,
    /// Reviewer-adjusted duration; set only by human review
    pub adjusted_minutes: Option<u32>,
}

impl BillableItem {
    /// Duration the item will actually bill: the human adjustment if one
    /// exists, otherwise the computed minutes.
    pub fn billed_minutes(&self) -> u32 {
        self.adjusted_minutes.unwrap_or(self.minutes)
    }
}

/// Structured visit note produced by the note stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisitNote {
    /// One-paragraph narrative summary of the visit
    pub summary: String,
    /// Notable observations about the client's condition
    #[serde(default)]
    pub observations: Vec<String>,
    /// Tasks the caregiver performed, in plain language
    #[serde(default)]
    pub tasks_performed: Vec<String>,
    /// Items the agency should follow up on
    #[serde(default)]
    pub follow_ups: Vec<String>,
}

/// One service line on a draft contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractServiceLine {
    /// Category code carried over from billing
    pub category: String,
    /// Human description of the service
    pub description: String,
    /// Minutes observed in the recorded visit
    pub observed_minutes: u32,
}

/// Draft service contract assembled from billing output and LLM extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceContract {
    pub client_name: String,
    pub caregiver_name: String,
    /// Services the contract covers, derived from billed categories
    #[serde(default)]
    pub service_lines: Vec<ContractServiceLine>,
    /// Proposed visit schedule in plain language (e.g. "weekday mornings")
    pub schedule: Option<String>,
    /// Proposed hourly rate, if one was discussed in the visit
    pub hourly_rate: Option<f64>,
    /// Free-text terms extracted from the conversation
    #[serde(default)]
    pub notes: Vec<String>,
}
