use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::TranscriptSegment;
use crate::services::SpeechToText;

/// Configuration for the speech-to-text service client
#[derive(Debug, Clone)]
pub struct AsrConfig {
    /// Base URL of the transcription service
    pub base_url: String,
    /// API key (from ASR_API_KEY env var)
    pub api_key: String,
    /// Language hint passed to the engine
    pub language: String,
}

impl AsrConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("ASR_API_URL").context("ASR_API_URL environment variable not set")?;
        let api_key =
            std::env::var("ASR_API_KEY").context("ASR_API_KEY environment variable not set")?;

        Ok(Self {
            base_url,
            api_key,
            language: "en".to_string(),
        })
    }
}

/// HTTP client for the transcription service
pub struct HttpSpeechToText {
    client: Client,
    config: AsrConfig,
}

impl HttpSpeechToText {
    pub fn new(config: AsrConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(&self, audio_uri: &str) -> Result<Vec<TranscriptSegment>> {
        let request = TranscribeRequest {
            audio_url: audio_uri.to_string(),
            language: self.config.language.clone(),
            timestamps: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/transcribe", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to transcription service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Transcription service error: {} - {}", status, body);
        }

        let response: TranscribeResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;

        Ok(response
            .segments
            .into_iter()
            .map(|s| TranscriptSegment {
                segment_id: uuid::Uuid::new_v4().to_string(),
                start_ms: s.start_ms,
                end_ms: s.end_ms,
                text: s.text,
                speaker: None,
                confidence: s.confidence,
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct TranscribeRequest {
    audio_url: String,
    language: String,
    timestamps: bool,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    segments: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    start_ms: u64,
    end_ms: u64,
    text: String,
    #[serde(default)]
    confidence: Option<f64>,
}
