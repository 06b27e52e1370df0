//! Tavily web search

use std::time::Duration;

use research_assistant_sdk::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::research::backend::{RetrievalBackend, SearchHit};
use crate::research::error::{ResearchError, Result};
use crate::research::settings::Settings;

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";
const SOURCE_NAME: &str = "web";

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>, max_results: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResearchError::retrieval(SOURCE_NAME, e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            max_results: max_results.max(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.require_tavily_key()?,
            settings.docs_per_search,
            settings.request_timeout,
        )
    }
}

fn parse_response(body: &str) -> Result<Vec<SearchHit>> {
    let parsed: TavilyResponse = serde_json::from_str(body)
        .map_err(|e| ResearchError::retrieval(SOURCE_NAME, format!("unexpected response: {}", e)))?;

    Ok(parsed
        .results
        .into_iter()
        .map(|r| SearchHit {
            identifier: r.url,
            text: r.content,
        })
        .collect())
}

#[async_trait]
impl RetrievalBackend for TavilySearch {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .post(TAVILY_SEARCH_URL)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| ResearchError::retrieval(SOURCE_NAME, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ResearchError::retrieval(SOURCE_NAME, e.to_string()))?;

        if !status.is_success() {
            return Err(ResearchError::retrieval(
                SOURCE_NAME,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }

        let mut hits = parse_response(&body)?;
        hits.truncate(self.max_results);
        Ok(hits)
    }
}
