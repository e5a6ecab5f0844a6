use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::DiarizationTurn;
use crate::services::Diarizer;

/// Configuration for the diarization service client
#[derive(Debug, Clone)]
pub struct DiarizerConfig {
    pub base_url: String,
    /// API key (from DIARIZER_API_KEY env var)
    pub api_key: String,
    /// Upper bound on distinguishable speakers
    pub max_speakers: u32,
}

impl DiarizerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DIARIZER_API_URL")
            .context("DIARIZER_API_URL environment variable not set")?;
        let api_key = std::env::var("DIARIZER_API_KEY")
            .context("DIARIZER_API_KEY environment variable not set")?;

        Ok(Self {
            base_url,
            api_key,
            max_speakers: 4,
        })
    }
}

/// HTTP client for the diarization service
pub struct HttpDiarizer {
    client: Client,
    config: DiarizerConfig,
}

impl HttpDiarizer {
    pub fn new(config: DiarizerConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Diarizer for HttpDiarizer {
    async fn diarize(&self, audio_uri: &str) -> Result<Vec<DiarizationTurn>> {
        let request = DiarizeRequest {
            audio_url: audio_uri.to_string(),
            max_speakers: self.config.max_speakers,
        };

        let response = self
            .client
            .post(format!("{}/v1/diarize", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to diarization service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Diarization service error: {} - {}", status, body);
        }

        let response: DiarizeResponse = response
            .json()
            .await
            .context("Failed to parse diarization response")?;

        Ok(response
            .turns
            .into_iter()
            .map(|t| DiarizationTurn {
                start_ms: t.start_ms,
                end_ms: t.end_ms,
                speaker: t.speaker,
                confidence: t.confidence,
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct DiarizeRequest {
    audio_url: String,
    max_speakers: u32,
}

#[derive(Debug, Deserialize)]
struct DiarizeResponse {
    #[serde(default)]
    turns: Vec<WireTurn>,
}

#[derive(Debug, Deserialize)]
struct WireTurn {
    start_ms: u64,
    end_ms: u64,
    speaker: String,
    #[serde(default)]
    confidence: Option<f64>,
}
