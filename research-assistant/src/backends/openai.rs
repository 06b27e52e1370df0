//! OpenAI-compatible chat completion backend
//!
//! Talks to either the OpenAI API or an Azure OpenAI deployment. Structured
//! output uses `response_format: json_schema` in strict mode. Timeouts, rate
//! limits and 5xx responses are retried with exponential backoff up to the
//! configured budget; every other failure is returned immediately.

use std::time::Duration;

use research_assistant_sdk::{async_trait, log_warning};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::research::backend::{ChatMessage, GenerationBackend, GenerationRequest, OutputSchema};
use crate::research::error::{ResearchError, Result};
use crate::research::settings::{ModelProvider, Settings};

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

pub struct OpenAiBackend {
    client: reqwest::Client,
    provider: ModelProvider,
    temperature: f32,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

/// Outcome of a single failed attempt
#[derive(Debug, PartialEq)]
enum CallError {
    Retryable(String),
    Fatal(String),
}

impl OpenAiBackend {
    pub fn new(
        provider: ModelProvider,
        temperature: f32,
        max_retries: u32,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                ResearchError::InvalidConfig(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            provider,
            temperature,
            max_retries,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.require_provider()?.clone(),
            settings.temperature,
            settings.max_retries,
            settings.request_timeout,
        )
    }

    pub fn model_label(&self) -> &str {
        self.provider.model_label()
    }

    fn endpoint(&self) -> String {
        match &self.provider {
            ModelProvider::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, api_version
            ),
            ModelProvider::OpenAi { base_url, .. } => format!("{}/chat/completions", base_url),
        }
    }

    /// Build the request body for the API
    fn build_request_body(
        &self,
        request: &GenerationRequest,
        schema: Option<&OutputSchema>,
    ) -> Value {
        let messages: Vec<ChatMessage> =
            std::iter::once(ChatMessage::system(request.instructions.clone()))
                .chain(request.messages.iter().cloned())
                .collect();

        let mut body = json!({
            "messages": messages,
            "temperature": self.temperature,
        });

        if let ModelProvider::OpenAi { model, .. } = &self.provider {
            body["model"] = json!(model);
        }

        if let Some(schema) = schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true
                }
            });
        }

        body
    }

    async fn send_once(&self, body: &Value) -> std::result::Result<String, CallError> {
        let builder = self.client.post(self.endpoint()).json(body);
        let builder = match &self.provider {
            ModelProvider::Azure { api_key, .. } => builder.header("api-key", api_key),
            ModelProvider::OpenAi { api_key, .. } => builder.bearer_auth(api_key),
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                CallError::Retryable(e.to_string())
            } else {
                CallError::Fatal(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .map_err(|e| CallError::Retryable(e.to_string()))?;

        if status != 200 {
            return Err(classify_status(status, &body_text));
        }

        let parsed: ChatResponse = serde_json::from_str(&body_text)
            .map_err(|e| CallError::Fatal(format!("failed to parse response: {}", e)))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| CallError::Fatal("response contained no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(CallError::Fatal(format!("model refused: {}", refusal)));
        }
        message
            .content
            .ok_or_else(|| CallError::Fatal("response contained no content".to_string()))
    }

    /// One logical call with the bounded retry budget applied
    async fn complete(
        &self,
        request: &GenerationRequest,
        schema: Option<&OutputSchema>,
    ) -> Result<String> {
        let body = self.build_request_body(request, schema);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(content) => return Ok(content),
                Err(CallError::Retryable(message)) if attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    log_warning!(
                        "{:?} call failed ({}), retrying in {:?} ({}/{})",
                        request.purpose,
                        message,
                        delay,
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(CallError::Retryable(message)) | Err(CallError::Fatal(message)) => {
                    return Err(ResearchError::generation(format!(
                        "{:?} call failed: {}",
                        request.purpose, message
                    )));
                }
            }
        }
    }
}

fn classify_status(status: u16, body: &str) -> CallError {
    match status {
        408 | 429 | 500..=599 => CallError::Retryable(format!("HTTP {}: {}", status, body)),
        401 | 403 => CallError::Fatal(format!("HTTP {}: authentication failed", status)),
        _ => CallError::Fatal(format!("HTTP {}: {}", status, body)),
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let millis = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_millis(millis.min(MAX_BACKOFF_MS))
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn generate_text(&self, request: GenerationRequest) -> Result<String> {
        self.complete(&request, None).await
    }

    async fn generate_json(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<Value> {
        let content = self.complete(&request, Some(schema)).await?;
        serde_json::from_str(&content).map_err(|e| {
            ResearchError::generation(format!("{} output is not valid JSON: {}", schema.name, e))
        })
    }
}
