use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    /// Recorded but not yet processed
    Pending,
    /// Pipeline is currently running
    Processing,
    /// Pipeline finished; awaiting human review of billing and note
    PendingReview,
    /// Reviewer approved the generated records
    Approved,
    /// Visit was cancelled; no further processing
    Cancelled,
}

/// One scheduled/occurred care encounter between a caregiver and a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    /// Unique identifier (UUID)
    pub visit_id: String,
    /// Client receiving care
    pub client_name: String,
    /// Caregiver providing care
    pub caregiver_name: String,
    /// Current lifecycle status
    pub status: VisitStatus,
    /// When the visit record was created
    pub created_at: DateTime<Utc>,
}

impl Visit {
    pub fn new(client_name: impl Into<String>, caregiver_name: impl Into<String>) -> Self {
        Self {
            visit_id: uuid::Uuid::new_v4().to_string(),
            client_name: client_name.into(),
            caregiver_name: caregiver_name.into(),
            status: VisitStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Processing status of an audio asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStatus {
    Uploaded,
    Processed,
}

/// One uploaded or recorded audio object for a visit
///
/// A visit may accumulate several assets over time (re-uploads, corrected
/// recordings); the latest by `created_at` is the authoritative input to
/// transcription and diarization. Immutable once processed except for the
/// status field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioAsset {
    /// Unique identifier (UUID)
    pub asset_id: String,
    /// Visit this asset belongs to
    pub visit_id: String,
    /// Location of the audio bytes (file path or object URL)
    pub uri: String,
    pub status: AudioStatus,
    pub created_at: DateTime<Utc>,
}

impl AudioAsset {
    pub fn new(visit_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            asset_id: uuid::Uuid::new_v4().to_string(),
            visit_id: visit_id.into(),
            uri: uri.into(),
            status: AudioStatus::Uploaded,
            created_at: Utc::now(),
        }
    }
}
