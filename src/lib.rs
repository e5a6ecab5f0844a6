pub mod engine;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod stages;
pub mod store;

pub use engine::{
    AlignResult, BillingConfig, CategoryRule, SpeakerResolution, align_speakers,
    extract_billable_items, resolve_speaker_names, unresolved_labels,
};
pub use error::{PipelineError, StageError, StageResult};
pub use models::{
    AudioAsset, BillableItem, DiarizationTurn, PipelineState, StageId, StageState, StageStatus,
    TranscriptSegment, Visit, VisitNote, VisitStatus,
};
pub use pipeline::{Orchestrator, PipelineConfig, PipelineStatus, RetryPolicy};
pub use services::{
    AnthropicClient, AnthropicConfig, AsrConfig, Diarizer, DiarizerConfig, EnrolledSpeaker,
    HttpDiarizer, HttpSpeechToText, HttpVoiceprintMatcher, LanguageModel, SpeechToText,
    VoiceprintConfig, VoiceprintMatcher,
};
pub use stages::StageCtx;
pub use store::{MemoryStore, VisitSnapshot, VisitStore};
