use crate::core::category::{CategoryInference, Inference};
use crate::providers::util::http_client;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Used when the model omits a confidence score.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Categorizes merchants with an OpenAI chat completion constrained to JSON output.
pub struct OpenAiCategorizer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCategorizer {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryAnswer {
    category: String,
    confidence: Option<f64>,
}

fn system_prompt(vocabulary: &[String]) -> String {
    format!(
        "You are an expense categorizer. Given a merchant name and optional notes, return the \
         most appropriate category from this list: [{}]. Respond ONLY with valid JSON: \
         {{\"category\": \"...\", \"confidence\": 0.0-1.0}}",
        vocabulary.join(", ")
    )
}

fn user_prompt(merchant: &str, notes: Option<&str>) -> String {
    match notes {
        Some(notes) => format!("Merchant: \"{merchant}\", Notes: \"{notes}\""),
        None => format!("Merchant: \"{merchant}\""),
    }
}

fn parse_answer(content: &str) -> Result<Inference> {
    let answer: CategoryAnswer = serde_json::from_str(content.trim())
        .with_context(|| format!("Failed to parse categorization answer: '{content}'"))?;
    Ok(Inference {
        category: answer.category.trim().to_string(),
        confidence: answer.confidence.unwrap_or(DEFAULT_CONFIDENCE),
    })
}

#[async_trait]
impl CategoryInference for OpenAiCategorizer {
    #[instrument(name = "OpenAiCategorize", skip(self, vocabulary))]
    async fn infer(
        &self,
        merchant: &str,
        notes: Option<&str>,
        vocabulary: &[String],
    ) -> Result<Inference> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(vocabulary),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt(merchant, notes),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_tokens: 100,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("OpenAI request error: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("OpenAI request failed with {}", status);
            debug!("OpenAI error body: {}", error_text);
            return Err(anyhow!("OpenAI HTTP error: {}", status));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse OpenAI response: {}", e))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("Empty response from OpenAI"))?;
        debug!("OpenAI answered {}", content);

        parse_answer(&content)
    }
}
