use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::models::{
    AudioAsset, AudioStatus, BillableItem, DiarizationTurn, PipelineState, ServiceContract,
    StageId, StageState, TranscriptSegment, Visit, VisitNote, VisitStatus,
};
use crate::store::VisitStore;

#[derive(Default)]
struct Inner {
    visits: HashMap<String, Visit>,
    assets: HashMap<String, Vec<AudioAsset>>,
    segments: HashMap<String, Vec<TranscriptSegment>>,
    turns: HashMap<String, Vec<DiarizationTurn>>,
    items: HashMap<String, Vec<BillableItem>>,
    notes: HashMap<String, VisitNote>,
    contracts: HashMap<String, ServiceContract>,
    states: HashMap<String, PipelineState>,
}

/// In-memory store used by the CLI's file-backed mode and by tests
///
/// All operations take the single `RwLock`, which makes `update_stage` a
/// serialized read-modify-write of the state document.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Export everything stored for one visit
    pub fn snapshot(&self, visit_id: &str) -> Result<VisitSnapshot> {
        let inner = self.read();
        let visit = inner
            .visits
            .get(visit_id)
            .cloned()
            .ok_or_else(|| anyhow!("visit not found: {visit_id}"))?;
        Ok(VisitSnapshot {
            visit,
            assets: inner.assets.get(visit_id).cloned().unwrap_or_default(),
            segments: inner.segments.get(visit_id).cloned().unwrap_or_default(),
            turns: inner.turns.get(visit_id).cloned().unwrap_or_default(),
            billable_items: inner.items.get(visit_id).cloned().unwrap_or_default(),
            note: inner.notes.get(visit_id).cloned(),
            contract: inner.contracts.get(visit_id).cloned(),
            pipeline_state: inner.states.get(visit_id).cloned().unwrap_or_default(),
        })
    }

    /// Load a previously exported visit back into the store
    pub fn restore(&self, snapshot: VisitSnapshot) {
        let mut inner = self.write();
        let visit_id = snapshot.visit.visit_id.clone();
        inner.visits.insert(visit_id.clone(), snapshot.visit);
        inner.assets.insert(visit_id.clone(), snapshot.assets);
        inner.segments.insert(visit_id.clone(), snapshot.segments);
        inner.turns.insert(visit_id.clone(), snapshot.turns);
        inner.items.insert(visit_id.clone(), snapshot.billable_items);
        if let Some(note) = snapshot.note {
            inner.notes.insert(visit_id.clone(), note);
        }
        if let Some(contract) = snapshot.contract {
            inner.contracts.insert(visit_id.clone(), contract);
        }
        inner.states.insert(visit_id, snapshot.pipeline_state);
    }
}

impl VisitStore for MemoryStore {
    fn put_visit(&self, visit: Visit) -> Result<()> {
        self.write().visits.insert(visit.visit_id.clone(), visit);
        Ok(())
    }

    fn visit(&self, visit_id: &str) -> Result<Option<Visit>> {
        Ok(self.read().visits.get(visit_id).cloned())
    }

    fn set_visit_status(&self, visit_id: &str, status: VisitStatus) -> Result<()> {
        let mut inner = self.write();
        let visit = inner
            .visits
            .get_mut(visit_id)
            .ok_or_else(|| anyhow!("visit not found: {visit_id}"))?;
        visit.status = status;
        Ok(())
    }

    fn put_audio_asset(&self, asset: AudioAsset) -> Result<()> {
        self.write()
            .assets
            .entry(asset.visit_id.clone())
            .or_default()
            .push(asset);
        Ok(())
    }

    fn latest_audio(&self, visit_id: &str) -> Result<Option<AudioAsset>> {
        Ok(self
            .read()
            .assets
            .get(visit_id)
            .and_then(|assets| assets.iter().max_by_key(|a| a.created_at))
            .cloned())
    }

    fn set_audio_status(&self, asset_id: &str, status: AudioStatus) -> Result<()> {
        let mut inner = self.write();
        for assets in inner.assets.values_mut() {
            if let Some(asset) = assets.iter_mut().find(|a| a.asset_id == asset_id) {
                asset.status = status;
                return Ok(());
            }
        }
        Err(anyhow!("audio asset not found: {asset_id}"))
    }

    fn replace_segments(&self, visit_id: &str, segments: Vec<TranscriptSegment>) -> Result<()> {
        self.write().segments.insert(visit_id.to_string(), segments);
        Ok(())
    }

    fn segments(&self, visit_id: &str) -> Result<Vec<TranscriptSegment>> {
        let mut segments = self
            .read()
            .segments
            .get(visit_id)
            .cloned()
            .unwrap_or_default();
        segments.sort_by_key(|s| (s.start_ms, s.end_ms));
        Ok(segments)
    }

    fn replace_turns(&self, visit_id: &str, turns: Vec<DiarizationTurn>) -> Result<()> {
        self.write().turns.insert(visit_id.to_string(), turns);
        Ok(())
    }

    fn turns(&self, visit_id: &str) -> Result<Vec<DiarizationTurn>> {
        let mut turns = self.read().turns.get(visit_id).cloned().unwrap_or_default();
        turns.sort_by_key(|t| t.start_ms);
        Ok(turns)
    }

    fn apply_speaker_names(
        &self,
        visit_id: &str,
        names: &HashMap<String, String>,
    ) -> Result<usize> {
        let mut inner = self.write();
        let mut touched = 0;
        if let Some(segments) = inner.segments.get_mut(visit_id) {
            for segment in segments.iter_mut() {
                if let Some(label) = &segment.speaker
                    && let Some(name) = names.get(label)
                    && name != label
                {
                    segment.speaker = Some(name.clone());
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    fn replace_billable_items(&self, visit_id: &str, items: Vec<BillableItem>) -> Result<()> {
        self.write().items.insert(visit_id.to_string(), items);
        Ok(())
    }

    fn billable_items(&self, visit_id: &str) -> Result<Vec<BillableItem>> {
        Ok(self.read().items.get(visit_id).cloned().unwrap_or_default())
    }

    fn put_note(&self, visit_id: &str, note: VisitNote) -> Result<()> {
        self.write().notes.insert(visit_id.to_string(), note);
        Ok(())
    }

    fn note(&self, visit_id: &str) -> Result<Option<VisitNote>> {
        Ok(self.read().notes.get(visit_id).cloned())
    }

    fn put_contract(&self, visit_id: &str, contract: ServiceContract) -> Result<()> {
        self.write().contracts.insert(visit_id.to_string(), contract);
        Ok(())
    }

    fn contract(&self, visit_id: &str) -> Result<Option<ServiceContract>> {
        Ok(self.read().contracts.get(visit_id).cloned())
    }

    fn pipeline_state(&self, visit_id: &str) -> Result<PipelineState> {
        Ok(self.read().states.get(visit_id).cloned().unwrap_or_default())
    }

    fn put_pipeline_state(&self, visit_id: &str, state: PipelineState) -> Result<()> {
        self.write().states.insert(visit_id.to_string(), state);
        Ok(())
    }

    fn update_stage(&self, visit_id: &str, stage: StageId, state: StageState) -> Result<()> {
        let mut inner = self.write();
        let doc = inner.states.entry(visit_id.to_string()).or_default();
        doc.set_stage(stage, state);
        Ok(())
    }

    fn clear_generated(&self, visit_id: &str) -> Result<()> {
        let mut inner = self.write();
        inner.segments.remove(visit_id);
        inner.turns.remove(visit_id);
        inner.items.remove(visit_id);
        inner.notes.remove(visit_id);
        inner.contracts.remove(visit_id);
        Ok(())
    }
}

/// Everything stored for one visit, serializable as a single JSON file
///
/// The CLI persists a visit as one of these between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitSnapshot {
    pub visit: Visit,
    #[serde(default)]
    pub assets: Vec<AudioAsset>,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub turns: Vec<DiarizationTurn>,
    #[serde(default)]
    pub billable_items: Vec<BillableItem>,
    #[serde(default)]
    pub note: Option<VisitNote>,
    #[serde(default)]
    pub contract: Option<ServiceContract>,
    #[serde(default)]
    pub pipeline_state: PipelineState,
}

impl VisitSnapshot {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }
}
