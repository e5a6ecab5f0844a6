pub mod memory;

pub use memory::*;

use std::collections::HashMap;

use anyhow::Result;

use crate::models::{
    AudioAsset, AudioStatus, BillableItem, DiarizationTurn, PipelineState, ServiceContract,
    StageId, StageState, TranscriptSegment, Visit, VisitNote, VisitStatus,
};

/// Persistence boundary for visits and everything the pipeline generates
///
/// Stages never hand payloads to each other; they commit their output here
/// and later stages re-read it. Implementations must serialize access
/// internally: `update_stage` in particular is a read-modify-write of the
/// whole pipeline-state document and must hold the store's lock for its
/// duration so the concurrent Phase-1 pair cannot lose each other's writes.
pub trait VisitStore: Send + Sync {
    fn put_visit(&self, visit: Visit) -> Result<()>;
    fn visit(&self, visit_id: &str) -> Result<Option<Visit>>;
    fn set_visit_status(&self, visit_id: &str, status: VisitStatus) -> Result<()>;

    fn put_audio_asset(&self, asset: AudioAsset) -> Result<()>;
    /// The authoritative pipeline input: the most recently created asset
    fn latest_audio(&self, visit_id: &str) -> Result<Option<AudioAsset>>;
    fn set_audio_status(&self, asset_id: &str, status: AudioStatus) -> Result<()>;

    /// Replace the visit's segment set wholesale (sorted by caller)
    fn replace_segments(&self, visit_id: &str, segments: Vec<TranscriptSegment>) -> Result<()>;
    /// Segments in start-time order
    fn segments(&self, visit_id: &str) -> Result<Vec<TranscriptSegment>>;

    fn replace_turns(&self, visit_id: &str, turns: Vec<DiarizationTurn>) -> Result<()>;
    fn turns(&self, visit_id: &str) -> Result<Vec<DiarizationTurn>>;

    /// Rewrite segment speaker labels by value substitution in one update.
    /// Returns the number of segments touched.
    fn apply_speaker_names(&self, visit_id: &str, names: &HashMap<String, String>)
    -> Result<usize>;

    fn replace_billable_items(&self, visit_id: &str, items: Vec<BillableItem>) -> Result<()>;
    fn billable_items(&self, visit_id: &str) -> Result<Vec<BillableItem>>;

    fn put_note(&self, visit_id: &str, note: VisitNote) -> Result<()>;
    fn note(&self, visit_id: &str) -> Result<Option<VisitNote>>;

    fn put_contract(&self, visit_id: &str, contract: ServiceContract) -> Result<()>;
    fn contract(&self, visit_id: &str) -> Result<Option<ServiceContract>>;

    /// The whole state document; defaults to all-pending when none exists
    fn pipeline_state(&self, visit_id: &str) -> Result<PipelineState>;
    fn put_pipeline_state(&self, visit_id: &str, state: PipelineState) -> Result<()>;
    /// Read-modify-write one stage's slot under the store lock
    fn update_stage(&self, visit_id: &str, stage: StageId, state: StageState) -> Result<()>;

    /// Wipe generated entities (segments, turns, billable items, note,
    /// contract) ahead of a fresh pipeline run. Visits and audio assets
    /// survive.
    fn clear_generated(&self, visit_id: &str) -> Result<()>;
}
