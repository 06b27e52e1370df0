//! Wikipedia search through the MediaWiki query API

use std::collections::HashMap;
use std::time::Duration;

use research_assistant_sdk::async_trait;
use serde::Deserialize;

use crate::research::backend::{RetrievalBackend, SearchHit};
use crate::research::error::{ResearchError, Result};
use crate::research::settings::Settings;

const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const USER_AGENT: &str = concat!("research-assistant/", env!("CARGO_PKG_VERSION"));
const SOURCE_NAME: &str = "wikipedia";

pub struct WikipediaSearch {
    client: reqwest::Client,
    api_url: String,
    max_docs: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    /// Search rank
    #[serde(default)]
    index: u32,
    fullurl: Option<String>,
    #[serde(default)]
    extract: String,
}

impl WikipediaSearch {
    pub fn new(max_docs: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ResearchError::retrieval(SOURCE_NAME, e.to_string()))?;

        Ok(Self {
            client,
            api_url: DEFAULT_API_URL.to_string(),
            max_docs: max_docs.max(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.docs_per_search, settings.request_timeout)
    }

    /// Point at another MediaWiki install or language edition
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

fn parse_response(body: &str) -> Result<Vec<SearchHit>> {
    let parsed: QueryResponse = serde_json::from_str(body)
        .map_err(|e| ResearchError::retrieval(SOURCE_NAME, format!("unexpected response: {}", e)))?;

    let mut pages: Vec<Page> = parsed
        .query
        .map(|q| q.pages.into_values().collect())
        .unwrap_or_default();
    pages.sort_by_key(|page| page.index);

    Ok(pages
        .into_iter()
        .map(|page| SearchHit {
            identifier: page.fullurl.unwrap_or(page.title),
            text: page.extract,
        })
        .collect())
}

#[async_trait]
impl RetrievalBackend for WikipediaSearch {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let limit = self.max_docs.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrlimit", limit.as_str()),
                ("prop", "extracts|info"),
                ("inprop", "url"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", "max"),
            ])
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
        hits.truncate(self.max_docs);
        Ok(hits)
    }
}
