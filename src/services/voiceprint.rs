use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::{EnrolledSpeaker, VoiceprintMatcher};

/// Configuration for the voice-embedding service client
#[derive(Debug, Clone)]
pub struct VoiceprintConfig {
    pub base_url: String,
    /// API key (from VOICEPRINT_API_KEY env var)
    pub api_key: String,
    /// Minimum cosine similarity to accept a match
    pub similarity_threshold: f32,
}

impl VoiceprintConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("VOICEPRINT_API_URL")
            .context("VOICEPRINT_API_URL environment variable not set")?;
        let api_key = std::env::var("VOICEPRINT_API_KEY")
            .context("VOICEPRINT_API_KEY environment variable not set")?;

        Ok(Self {
            base_url,
            api_key,
            similarity_threshold: 0.75,
        })
    }
}

/// Voiceprint matcher backed by an embedding service
///
/// The service extracts one voice embedding per diarization label from the
/// visit audio; matching against the enrolled roster happens locally by
/// cosine similarity.
pub struct HttpVoiceprintMatcher {
    client: Client,
    config: VoiceprintConfig,
}

impl HttpVoiceprintMatcher {
    pub fn new(config: VoiceprintConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl VoiceprintMatcher for HttpVoiceprintMatcher {
    async fn match_speakers(
        &self,
        audio_uri: &str,
        labels: &[String],
        roster: &[EnrolledSpeaker],
    ) -> Result<HashMap<String, String>> {
        if labels.is_empty() || roster.is_empty() {
            return Ok(HashMap::new());
        }

        let request = EmbedRequest {
            audio_url: audio_uri.to_string(),
            labels: labels.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/v1/speaker-embeddings", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to voiceprint service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Voiceprint service error: {} - {}", status, body);
        }

        let response: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse voiceprint response")?;

        let mut names = HashMap::new();
        for (label, embedding) in response.embeddings {
            if let Some(speaker) = best_match(&embedding, roster, self.config.similarity_threshold)
            {
                debug!(%label, name = %speaker.display_name, "voiceprint match");
                names.insert(label, speaker.display_name.clone());
            }
        }
        Ok(names)
    }
}

/// Pick the enrolled speaker whose fingerprint is most similar to the
/// embedding, requiring at least `threshold` cosine similarity
pub fn best_match<'a>(
    embedding: &[f32],
    roster: &'a [EnrolledSpeaker],
    threshold: f32,
) -> Option<&'a EnrolledSpeaker> {
    roster
        .iter()
        .map(|s| (s, cosine_similarity(embedding, &s.fingerprint)))
        .filter(|(_, score)| *score >= threshold)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(speaker, _)| speaker)
}

/// Cosine similarity between two embeddings; 0.0 when shapes mismatch
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    audio_url: String,
    labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    /// One embedding per diarization label found in the audio
    #[serde(default)]
    embeddings: HashMap<String, Vec<f32>>,
}
