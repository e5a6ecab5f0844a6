use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{ServiceContract, VisitNote};
use crate::services::prompts;
use crate::services::{LanguageModel, SpeakerInferenceRequest};

/// Configuration for the Anthropic API client
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key (from ANTHROPIC_API_KEY env var)
    pub api_key: String,
    /// Model to use
    pub model: String,
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Maximum tokens in response
    pub max_tokens: u32,
}

impl AnthropicConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set")?;

        Ok(Self {
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
        })
    }
}

/// Anthropic API client used for speaker inference, note, and contract drafts
///
/// Every call forces a tool response so the answer is structured JSON rather
/// than free text.
pub struct AnthropicClient {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Send a tool-forced message and return the tool input as JSON
    async fn send_with_tool(
        &self,
        system: &str,
        user: &str,
        tool_name: &str,
        tool_description: &str,
        input_schema: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            system: Some(system.to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: user.to_string(),
            }],
            tools: vec![Tool {
                name: tool_name.to_string(),
                description: tool_description.to_string(),
                input_schema,
            }],
            tool_choice: Some(ToolChoice {
                choice_type: "tool".to_string(),
                name: tool_name.to_string(),
            }),
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error: {} - {}", status, body);
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;

        for content in response.content {
            if content.content_type == "tool_use"
                && content.name.as_deref() == Some(tool_name)
                && let Some(input) = content.input
            {
                return Ok(input);
            }
        }

        anyhow::bail!("No tool_use response found")
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn identify_speakers(
        &self,
        request: &SpeakerInferenceRequest,
    ) -> Result<HashMap<String, String>> {
        if request.labels_to_resolve.is_empty() {
            return Ok(HashMap::new());
        }

        let input = self
            .send_with_tool(
                &prompts::speaker_system_prompt(),
                &prompts::speaker_user_prompt(request),
                "submit_speaker_names",
                "Submit the label-to-name mapping for the requested labels",
                prompts::speaker_tool_schema(),
            )
            .await?;

        let answer: SpeakerNamesAnswer =
            serde_json::from_value(input).context("Failed to parse speaker names answer")?;

        // The model is told to answer only for the requested labels; drop
        // anything else it returned anyway.
        let mut names = HashMap::new();
        for (label, name) in answer.names {
            if request.labels_to_resolve.contains(&label) {
                names.insert(label, name);
            } else {
                warn!(%label, "model answered for an excluded label; dropped");
            }
        }
        Ok(names)
    }

    async fn draft_note(&self, transcript: &str, billing_summary: &str) -> Result<VisitNote> {
        let input = self
            .send_with_tool(
                &prompts::note_system_prompt(),
                &prompts::note_user_prompt(transcript, billing_summary),
                "submit_visit_note",
                "Submit the structured visit note",
                prompts::note_tool_schema(),
            )
            .await?;

        serde_json::from_value(input).context("Failed to parse visit note answer")
    }

    async fn draft_contract(
        &self,
        transcript: &str,
        billing_summary: &str,
        client_name: &str,
        caregiver_name: &str,
    ) -> Result<ServiceContract> {
        let input = self
            .send_with_tool(
                &prompts::contract_system_prompt(),
                &prompts::contract_user_prompt(
                    transcript,
                    billing_summary,
                    client_name,
                    caregiver_name,
                ),
                "submit_contract",
                "Submit the extracted contract terms",
                prompts::contract_tool_schema(),
            )
            .await?;

        let answer: ContractAnswer =
            serde_json::from_value(input).context("Failed to parse contract answer")?;

        Ok(ServiceContract {
            client_name: client_name.to_string(),
            caregiver_name: caregiver_name.to_string(),
            service_lines: Vec::new(),
            schedule: answer.schedule,
            hourly_rate: answer.hourly_rate,
            notes: answer.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SpeakerNamesAnswer {
    #[serde(default)]
    names: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ContractAnswer {
    #[serde(default)]
    schedule: Option<String>,
    #[serde(default)]
    hourly_rate: Option<f64>,
    #[serde(default)]
    notes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}
