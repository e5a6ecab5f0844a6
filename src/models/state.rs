use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one unit of pipeline work
///
/// This is the stage registry: the orchestrator and stores address stage
/// state through these identifiers rather than free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Transcription,
    Diarization,
    Alignment,
    Billing,
    Note,
    Contract,
    FullPipeline,
}

impl StageId {
    /// All stages in canonical execution order
    pub const ALL: [StageId; 7] = [
        StageId::Transcription,
        StageId::Diarization,
        StageId::Alignment,
        StageId::Billing,
        StageId::Note,
        StageId::Contract,
        StageId::FullPipeline,
    ];

    /// The stage key used in the persisted state document and in logging
    pub fn name(self) -> &'static str {
        match self {
            StageId::Transcription => "transcription",
            StageId::Diarization => "diarization",
            StageId::Alignment => "alignment",
            StageId::Billing => "billing",
            StageId::Note => "note",
            StageId::Contract => "contract",
            StageId::FullPipeline => "full_pipeline",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage status within a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Skipped,
    Failed,
}

impl StageStatus {
    /// Terminal states are never re-entered within a run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StageStatus::Completed | StageStatus::Skipped | StageStatus::Failed
        )
    }
}

/// State of one stage: status, timing, and failure detail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message or skip reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageState {
    pub fn processing() -> Self {
        Self {
            status: StageStatus::Processing,
            started_at: Some(Utc::now()),
            finished_at: None,
            error: None,
        }
    }

    /// Transition a processing stage to completed, keeping its start time
    pub fn completed(self) -> Self {
        Self {
            status: StageStatus::Completed,
            finished_at: Some(Utc::now()),
            error: None,
            ..self
        }
    }

    /// Transition a processing stage to failed with a human-readable message
    pub fn failed(self, error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            finished_at: Some(Utc::now()),
            error: Some(error.into()),
            ..self
        }
    }

    /// Mark a stage skipped without attempting it
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            started_at: None,
            finished_at: Some(Utc::now()),
            error: Some(reason.into()),
        }
    }
}

/// The persisted scheduling state for one visit's pipeline run
///
/// One field per known stage; this struct is the single source of truth for
/// what has been done to a visit. It is read and written as a whole at the
/// storage boundary, where serde produces the stage-keyed JSON document
/// external status readers consume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    #[serde(default)]
    pub transcription: StageState,
    #[serde(default)]
    pub diarization: StageState,
    #[serde(default)]
    pub alignment: StageState,
    #[serde(default)]
    pub billing: StageState,
    #[serde(default)]
    pub note: StageState,
    #[serde(default)]
    pub contract: StageState,
    #[serde(default)]
    pub full_pipeline: StageState,
}

impl PipelineState {
    /// Fresh state with every stage pending
    pub fn reset() -> Self {
        Self::default()
    }

    pub fn stage(&self, id: StageId) -> &StageState {
        match id {
            StageId::Transcription => &self.transcription,
            StageId::Diarization => &self.diarization,
            StageId::Alignment => &self.alignment,
            StageId::Billing => &self.billing,
            StageId::Note => &self.note,
            StageId::Contract => &self.contract,
            StageId::FullPipeline => &self.full_pipeline,
        }
    }

    pub fn set_stage(&mut self, id: StageId, state: StageState) {
        let slot = match id {
            StageId::Transcription => &mut self.transcription,
            StageId::Diarization => &mut self.diarization,
            StageId::Alignment => &mut self.alignment,
            StageId::Billing => &mut self.billing,
            StageId::Note => &mut self.note,
            StageId::Contract => &mut self.contract,
            StageId::FullPipeline => &mut self.full_pipeline,
        };
        *slot = state;
    }

    pub fn status(&self, id: StageId) -> StageStatus {
        self.stage(id).status
    }
}
