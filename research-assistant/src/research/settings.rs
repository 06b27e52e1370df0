//! Environment-driven settings for backends and defaults for a run

use std::time::Duration;

use crate::research::error::{ResearchError, Result};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TOPIC: &str = "The application of ai agents";
pub const DEFAULT_NUM_ANALYSTS: usize = 1;
pub const DEFAULT_MAX_INTERVIEW_TURNS: usize = 1;
pub const DEFAULT_DOCS_PER_SEARCH: usize = 1;
pub const DEFAULT_OUTPUT_FILE: &str = "research_report.md";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Which chat completion service to talk to
#[derive(Debug, Clone, PartialEq)]
pub enum ModelProvider {
    Azure {
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    },
    OpenAi {
        api_key: String,
        model: String,
        base_url: String,
    },
}

impl ModelProvider {
    /// Model or deployment name for display
    pub fn model_label(&self) -> &str {
        match self {
            ModelProvider::Azure { deployment, .. } => deployment,
            ModelProvider::OpenAi { model, .. } => model,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` when no credentials were found
    pub provider: Option<ModelProvider>,
    pub tavily_api_key: Option<String>,
    pub temperature: f32,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub docs_per_search: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: None,
            tavily_api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            docs_per_search: DEFAULT_DOCS_PER_SEARCH,
        }
    }
}

impl Settings {
    /// Read settings from the process environment (call `dotenv` first)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    ///
    /// Azure wins when both its key and endpoint are set; otherwise an
    /// OpenAI key is used. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let provider = match (get("AZURE_OPENAI_API_KEY"), get("AZURE_OPENAI_ENDPOINT")) {
            (Some(api_key), Some(endpoint)) => {
                let deployment = get("AZURE_OPENAI_DEPLOYMENT").ok_or_else(|| {
                    ResearchError::InvalidConfig(
                        "AZURE_OPENAI_DEPLOYMENT is required when using Azure".to_string(),
                    )
                })?;
                Some(ModelProvider::Azure {
                    api_key,
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    deployment,
                    api_version: get("AZURE_OPENAI_API_VERSION")
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                })
            }
            _ => get("OPENAI_API_KEY").map(|api_key| ModelProvider::OpenAi {
                api_key,
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url: get("OPENAI_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            }),
        };

        let temperature = match get("RESEARCH_TEMPERATURE") {
            Some(raw) => parse_value::<f32>("RESEARCH_TEMPERATURE", &raw)?,
            None => DEFAULT_TEMPERATURE,
        };
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ResearchError::InvalidConfig(format!(
                "RESEARCH_TEMPERATURE must be between 0 and 2, got {}",
                temperature
            )));
        }

        let max_retries = match get("RESEARCH_MAX_RETRIES") {
            Some(raw) => parse_value::<u32>("RESEARCH_MAX_RETRIES", &raw)?,
            None => DEFAULT_MAX_RETRIES,
        };

        let timeout_secs = match get("RESEARCH_REQUEST_TIMEOUT_SECS") {
            Some(raw) => parse_value::<u64>("RESEARCH_REQUEST_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(ResearchError::InvalidConfig(
                "RESEARCH_REQUEST_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let docs_per_search = match get("RESEARCH_DOCS_PER_SEARCH") {
            Some(raw) => parse_value::<usize>("RESEARCH_DOCS_PER_SEARCH", &raw)?.max(1),
            None => DEFAULT_DOCS_PER_SEARCH,
        };

        Ok(Self {
            provider,
            tavily_api_key: get("TAVILY_API_KEY"),
            temperature,
            max_retries,
            request_timeout: Duration::from_secs(timeout_secs),
            docs_per_search,
        })
    }

    pub fn require_provider(&self) -> Result<&ModelProvider> {
        self.provider.as_ref().ok_or_else(|| {
            ResearchError::InvalidConfig(
                "No OpenAI API key provided. Set AZURE_OPENAI_API_KEY and AZURE_OPENAI_ENDPOINT, or OPENAI_API_KEY."
                    .to_string(),
            )
        })
    }

    pub fn require_tavily_key(&self) -> Result<&str> {
        self.tavily_api_key.as_deref().ok_or_else(|| {
            ResearchError::InvalidConfig("TAVILY_API_KEY is not set".to_string())
        })
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| {
            ResearchError::InvalidConfig(format!("{} has an invalid value: '{}'", key, raw))
        })
}
