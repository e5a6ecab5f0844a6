pub mod asr;
pub mod diarizer;
pub mod llm;
pub mod prompts;
pub mod voiceprint;

pub use asr::*;
pub use diarizer::*;
pub use llm::*;
pub use voiceprint::*;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{DiarizationTurn, ServiceContract, TranscriptSegment, VisitNote};

/// Speech-to-text boundary: audio in, timestamped text out
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe the audio at `audio_uri` into ordered segments
    async fn transcribe(&self, audio_uri: &str) -> Result<Vec<TranscriptSegment>>;
}

/// Diarization boundary: audio in, speaker turns out
#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, audio_uri: &str) -> Result<Vec<DiarizationTurn>>;
}

/// An enrolled staff member's voice signature
#[derive(Debug, Clone)]
pub struct EnrolledSpeaker {
    pub display_name: String,
    /// Voice embedding vector produced at enrollment
    pub fingerprint: Vec<f32>,
}

/// Voiceprint boundary: match visit audio against enrolled fingerprints
#[async_trait]
pub trait VoiceprintMatcher: Send + Sync {
    /// Returns a partial `diarization label -> display name` map covering
    /// only the labels that matched an enrolled speaker
    async fn match_speakers(
        &self,
        audio_uri: &str,
        labels: &[String],
        roster: &[EnrolledSpeaker],
    ) -> Result<HashMap<String, String>>;
}

/// Input for language-model speaker inference
#[derive(Debug, Clone)]
pub struct SpeakerInferenceRequest {
    /// Labels still unresolved after voiceprint matching. Labels absent
    /// from this list must not appear in the response.
    pub labels_to_resolve: Vec<String>,
    /// Per-label transcript excerpts giving the model context
    pub excerpts: Vec<(String, Vec<String>)>,
    /// Names known to be involved in the visit (client, caregiver)
    pub known_names: Vec<String>,
}

/// Language-model boundary: prompt in, structured JSON out
///
/// All methods are best-effort from the pipeline's point of view: callers
/// degrade failures and empty answers to "no result".
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Infer display names for the requested labels from transcript content
    async fn identify_speakers(
        &self,
        request: &SpeakerInferenceRequest,
    ) -> Result<HashMap<String, String>>;

    /// Draft a structured visit note from the transcript and billing summary
    async fn draft_note(&self, transcript: &str, billing_summary: &str) -> Result<VisitNote>;

    /// Draft a service contract from the transcript and billed services
    async fn draft_contract(
        &self,
        transcript: &str,
        billing_summary: &str,
        client_name: &str,
        caregiver_name: &str,
    ) -> Result<ServiceContract>;
}
