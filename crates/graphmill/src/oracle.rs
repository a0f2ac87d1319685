//! Extraction-oracle providers and prompt assembly.
//!
//! Defines the concrete [`ExtractionOracle`] implementations:
//! - **[`DisabledOracle`]** — returns errors; documents still chunk and
//!   persist, they just contribute no entities.
//! - **[`OpenAiOracle`]** — calls an OpenAI-compatible chat-completions
//!   endpoint with bounded retry and backoff.
//!
//! # Retry Strategy
//!
//! Transient errors use exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use async_trait::async_trait;

use graphmill_core::error::{PipelineError, Result};
use graphmill_core::models::Entity;
use graphmill_core::oracle::{ExtractionOracle, OracleRequest};

use crate::config::ExtractionConfig;

/// Maximum known-entity names embedded into a prompt as context.
const MAX_CONTEXT_ENTITIES: usize = 50;

/// Build the prompt for one chunk: instructions, the entity-type allowlist,
/// known-entity context, and the chunk text itself.
pub fn build_extraction_prompt(
    chunk_text: &str,
    entity_types: &[String],
    known_entities: &[Entity],
) -> String {
    let mut prompt = String::with_capacity(chunk_text.len() + 1024);
    prompt.push_str(
        "Extract the entities and relationships present in the text below.\n\
         Respond with a single JSON object of the form:\n\
         {\"entities\": [{\"name\", \"type\", \"description\", \"confidence\"}],\n \
         \"relationships\": [{\"source\", \"target\", \"type\", \"description\", \
         \"weight\", \"bidirectional\", \"confidence\"}]}\n\
         Confidence and weight are numbers between 0 and 1. Relationship source \
         and target are entity names from your own entity list.\n\n",
    );
    prompt.push_str(&format!(
        "Allowed entity types: {}\n",
        entity_types.join(", ")
    ));
    if !known_entities.is_empty() {
        let names: Vec<&str> = known_entities
            .iter()
            .take(MAX_CONTEXT_ENTITIES)
            .map(|e| e.name.as_str())
            .collect();
        prompt.push_str(&format!(
            "Entities already known to the graph (reuse these names when the text refers to them): {}\n",
            names.join(", ")
        ));
    }
    prompt.push_str("\nText:\n");
    prompt.push_str(chunk_text);
    prompt
}

/// A no-op oracle that always returns errors.
///
/// Used when `extraction.provider = "disabled"`. The pipeline treats each
/// failed call as a degraded chunk, so ingestion still works — documents
/// are chunked, embedded, and persisted without graph extraction.
pub struct DisabledOracle;

#[async_trait]
impl ExtractionOracle for DisabledOracle {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract(&self, _request: &OracleRequest) -> Result<String> {
        Err(PipelineError::Extraction {
            reason: "extraction provider is disabled".to_string(),
        })
    }
}

/// Oracle backed by an OpenAI-compatible chat-completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. The base URL is
/// configurable so any compatible endpoint works.
pub struct OpenAiOracle {
    model: String,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiOracle {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            PipelineError::Config("extraction.model required for OpenAI provider".to_string())
        })?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(PipelineError::Config(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }
        Ok(Self {
            model,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn extract(&self, request: &OracleRequest) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::Config("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Extraction {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(|e| PipelineError::Extraction {
                                reason: format!("invalid response body: {}", e),
                            })?;
                        return extract_message_content(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("oracle API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::Extraction {
                        reason: format!("oracle API error {}: {}", status, body_text),
                    });
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(PipelineError::Extraction {
            reason: last_err.unwrap_or_else(|| "oracle call failed after retries".to_string()),
        })
    }
}

/// Pull `choices[0].message.content` out of a chat-completions response.
fn extract_message_content(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::Extraction {
            reason: "oracle response missing choices[0].message.content".to_string(),
        })
}

/// Create the appropriate [`ExtractionOracle`] based on configuration.
pub fn create_oracle(config: &ExtractionConfig) -> Result<Box<dyn ExtractionOracle>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledOracle)),
        "openai" => Ok(Box::new(OpenAiOracle::new(config)?)),
        other => Err(PipelineError::Config(format!(
            "Unknown extraction provider: {}",
            other
        ))),
    }
}
