//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::prompt::{IMAGE_INSTRUCTION, SYSTEM_PROMPT, TEXT_INSTRUCTION};
use super::response::parse_llm_content;
use super::{ExtractionInput, FieldExtractor};
use crate::error::LlmError;
use crate::models::config::LlmConfig;
use crate::models::invoice::PartialRecord;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// [`FieldExtractor`] backed by an OpenAI-compatible vision model.
pub struct OpenAiExtractor {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiExtractor {
    /// Build a client from configuration. Fails without an API key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::CredentialMissing)?;

        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, input: &ExtractionInput<'_>) -> ChatRequest {
        let user_content = match input {
            ExtractionInput::Text(text) => vec![ContentPart::Text {
                text: format!(
                    "{TEXT_INSTRUCTION}\n\n{}",
                    truncate_chars(text, self.config.max_text_chars)
                ),
            }],
            ExtractionInput::Image(png) => vec![
                ContentPart::Text {
                    text: IMAGE_INSTRUCTION.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!(
                            "data:image/png;base64,{}",
                            base64::engine::general_purpose::STANDARD.encode(png)
                        ),
                        detail: self.config.image_detail.clone(),
                    },
                },
            ],
        };

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: vec![ContentPart::Text {
                        text: SYSTEM_PROMPT.to_string(),
                    }],
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<(StatusCode, String), LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        Ok((status, body))
    }
}

#[async_trait]
impl FieldExtractor for OpenAiExtractor {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn extract(
        &self,
        input: ExtractionInput<'_>,
        timeout: Duration,
    ) -> Result<Vec<PartialRecord>, LlmError> {
        let request = self.build_request(&input);
        debug!("Calling {} in {} mode", self.config.model, input.mode_name());

        let (status, body) = tokio::time::timeout(timeout, self.send(&request))
            .await
            .map_err(|_| LlmError::Timeout(timeout.as_secs()))??;

        let records = parse_completion(status, &body)?;
        info!("{} returned {} invoice(s)", self.config.model, records.len());
        Ok(records)
    }
}

/// Interpret a chat-completions HTTP response.
fn parse_completion(status: StatusCode, body: &str) -> Result<Vec<PartialRecord>, LlmError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited(body.to_string()));
    }
    if !status.is_success() {
        return Err(LlmError::Http {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let response: ChatResponse = serde_json::from_str(body).map_err(|e| LlmError::Parse {
        reason: format!("invalid completion payload: {e}"),
        content: body.to_string(),
    })?;

    if let Some(error) = response.error {
        return Err(LlmError::Api(error.message));
    }

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or(LlmError::EmptyChoices)?
        .message
        .content
        .unwrap_or_default();

    Ok(parse_llm_content(&content)?
        .into_iter()
        .map(|invoice| invoice.into_partial())
        .collect())
}

fn transport_error(e: reqwest::Error) -> LlmError {
    LlmError::Transport(e.to_string())
}

/// Cut `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
