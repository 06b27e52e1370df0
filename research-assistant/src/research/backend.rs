//! Collaborator interfaces consumed by the workflow.
//!
//! Everything that talks to the outside world (model, search providers,
//! report destination) is reached through the traits in this module and
//! injected as `Arc<dyn ...>`, so tests can swap in scripted doubles.

use research_assistant_sdk::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::research::error::{ResearchError, Result};
use crate::research::types::{Role, Turn};

/// What a generation call is for.
///
/// Backends ignore it; it exists so logs and test doubles can tell calls
/// apart without parsing prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Analysts,
    Question,
    SearchQuery,
    Answer,
    Section,
    Introduction,
    Conclusion,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    /// Instructions that frame the whole conversation
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Map interview turns onto a chat conversation seen from `speaker`'s side.
///
/// The speaker's own turns become assistant messages, everything else is
/// user input.
pub fn conversation_for(speaker: Role, turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| {
            if turn.role == speaker {
                ChatMessage::assistant(turn.text.clone())
            } else {
                ChatMessage::user(turn.text.clone())
            }
        })
        .collect()
}

/// One generation call: system instructions plus the conversation so far
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub purpose: Purpose,
    pub instructions: String,
    pub messages: Vec<ChatMessage>,
}

impl GenerationRequest {
    pub fn new(purpose: Purpose, instructions: impl Into<String>) -> Self {
        Self {
            purpose,
            instructions: instructions.into(),
            messages: Vec::new(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_user_message(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }
}

/// JSON schema constraining a structured generation call
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

impl OutputSchema {
    pub fn perspectives() -> Self {
        let analyst = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the analyst." },
                "affiliation": { "type": "string", "description": "Primary affiliation of the analyst." },
                "role": { "type": "string", "description": "Role of the analyst in the context of the topic." },
                "description": { "type": "string", "description": "Description of the analyst focus, concerns, and motives." }
            },
            "required": ["name", "affiliation", "role", "description"],
            "additionalProperties": false
        });
        Self {
            name: "perspectives",
            schema: json!({
                "type": "object",
                "properties": {
                    "analysts": {
                        "type": "array",
                        "description": "Comprehensive list of analysts with their roles and affiliations.",
                        "items": analyst
                    }
                },
                "required": ["analysts"],
                "additionalProperties": false
            }),
        }
    }

    pub fn search_query() -> Self {
        Self {
            name: "search_query",
            schema: json!({
                "type": "object",
                "properties": {
                    "search_query": { "type": "string", "description": "Search query for retrieval." }
                },
                "required": ["search_query"],
                "additionalProperties": false
            }),
        }
    }
}

/// Generative model capability set.
///
/// Implementations own temperature, timeout and their bounded retry policy.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_text(&self, request: GenerationRequest) -> Result<String>;

    /// Produce a JSON value conforming to `schema`
    async fn generate_json(&self, request: GenerationRequest, schema: &OutputSchema)
        -> Result<Value>;
}

/// Structured generation decoded into `T`; malformed output is a generation error
pub async fn generate_structured<T: DeserializeOwned>(
    backend: &dyn GenerationBackend,
    request: GenerationRequest,
    schema: &OutputSchema,
) -> Result<T> {
    let value = backend.generate_json(request, schema).await?;
    serde_json::from_value(value).map_err(|e| {
        ResearchError::generation(format!("malformed {} output: {}", schema.name, e))
    })
}

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// URL or page reference
    pub identifier: String,
    pub text: String,
}

#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    /// Short source name used in logs and errors
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Render hits as tagged document blocks, one context entry per search
pub fn format_documents(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("<Document ref=\"{}\">\n{}\n</Document>", hit.identifier, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Destination for the finished report
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Write `report` to `destination`, replacing anything already there
    async fn save(&self, report: &str, destination: &str) -> Result<()>;
}
