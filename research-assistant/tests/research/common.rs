//! Scripted in-process backends shared by the research integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};

use research_assistant::research::backend::{
    ChatMessage, ChatRole, GenerationRequest, OutputSchema, Purpose,
};
use research_assistant::research::types::CLOSING_PHRASE;
use research_assistant::research::workflow::SnapshotStream;
use research_assistant::research::{
    Analyst, Checkpointer, GenerationBackend, ReportSink, ResearchError, ResearchWorkflow, Result,
    RetrievalBackend, SearchHit, StateUpdate, WorkflowConfig,
};
use research_assistant_sdk::async_trait;

pub const TOPIC: &str = "Open source LLM tooling";

pub fn analyst(name: &str) -> Analyst {
    Analyst {
        name: name.to_string(),
        affiliation: format!("{} Institute", name),
        role: "Researcher".to_string(),
        description: focus_of(name),
    }
}

pub fn analysts(names: &[&str]) -> Vec<Analyst> {
    names.iter().map(|name| analyst(name)).collect()
}

/// Unique marker each analyst carries into every prompt built from its persona
pub fn focus_of(name: &str) -> String {
    format!("Focus area of {}", name)
}

/// Section text the scripted backend writes for `name`
pub fn section_of(name: &str) -> String {
    format!("## Findings\n{}", focus_of(name))
}

/// A recorded generation call
#[derive(Debug, Clone)]
pub struct Call {
    pub purpose: Purpose,
    pub instructions: String,
    pub messages: Vec<ChatMessage>,
}

/// Generation backend that answers from a script instead of a model
pub struct ScriptedGenerator {
    analyst_batches: Vec<Vec<Analyst>>,
    closing_on_question: Option<usize>,
    report_parts: [String; 3],
    delays: HashMap<String, Duration>,
    writer_delay: Option<Duration>,
    failing: Vec<String>,
    analyst_calls: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGenerator {
    /// Each analyst request returns the next batch; the last one repeats
    pub fn new(analyst_batches: Vec<Vec<Analyst>>) -> Self {
        Self {
            analyst_batches,
            closing_on_question: None,
            report_parts: [
                "## Introduction\nIntro text".to_string(),
                "## Insights\nBody text\n## Sources\n[1] https://example.com".to_string(),
                "## Conclusion\nClosing text".to_string(),
            ],
            delays: HashMap::new(),
            writer_delay: None,
            failing: Vec::new(),
            analyst_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The `n`th question of every interview (1-based) ends the conversation
    pub fn closing_on_question(mut self, n: usize) -> Self {
        self.closing_on_question = Some(n);
        self
    }

    pub fn with_report_parts(mut self, introduction: &str, body: &str, conclusion: &str) -> Self {
        self.report_parts = [introduction.to_string(), body.to_string(), conclusion.to_string()];
        self
    }

    /// Slow down every question asked by `name`
    pub fn with_delay(mut self, name: &str, millis: u64) -> Self {
        self.delays.insert(focus_of(name), Duration::from_millis(millis));
        self
    }

    /// Slow down each of the introduction, body and conclusion writers
    pub fn with_writer_delay(mut self, millis: u64) -> Self {
        self.writer_delay = Some(Duration::from_millis(millis));
        self
    }

    /// Questions asked by `name` fail
    pub fn failing_for(mut self, name: &str) -> Self {
        self.failing.push(focus_of(name));
        self
    }

    pub fn calls(&self, purpose: Purpose) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.purpose == purpose)
            .cloned()
            .collect()
    }

    pub fn count(&self, purpose: Purpose) -> usize {
        self.calls(purpose).len()
    }

    /// Expert answers generated for the interview led by `name`
    pub fn answers_for(&self, name: &str) -> usize {
        let focus = focus_of(name);
        self.calls(Purpose::Answer)
            .iter()
            .filter(|call| call.instructions.contains(&focus))
            .count()
    }

    fn record(&self, request: &GenerationRequest) {
        self.calls.lock().unwrap().push(Call {
            purpose: request.purpose,
            instructions: request.instructions.clone(),
            messages: request.messages.clone(),
        });
    }

    fn focus_in(&self, instructions: &str) -> Option<String> {
        self.analyst_batches
            .iter()
            .flatten()
            .map(|a| a.description.clone())
            .find(|focus| instructions.contains(focus.as_str()))
    }
}

#[async_trait]
impl GenerationBackend for ScriptedGenerator {
    async fn generate_text(&self, request: GenerationRequest) -> Result<String> {
        self.record(&request);
        let focus = self.focus_in(&request.instructions);

        match request.purpose {
            Purpose::Question => {
                if let Some(focus) = &focus {
                    if let Some(delay) = self.delays.get(focus) {
                        tokio::time::sleep(*delay).await;
                    }
                    if self.failing.contains(focus) {
                        let message = format!("scripted failure: {}", focus);
                        return Err(ResearchError::generation(message));
                    }
                }
                let asked = request
                    .messages
                    .iter()
                    .filter(|m| m.role == ChatRole::Assistant)
                    .count()
                    + 1;
                if self.closing_on_question == Some(asked) {
                    Ok(format!("That covers it. {}!", CLOSING_PHRASE))
                } else {
                    Ok(format!("Question {}: what changed recently?", asked))
                }
            }
            Purpose::Answer => Ok("Adoption doubled last year [1].".to_string()),
            Purpose::Section => {
                let focus = focus.unwrap_or_default();
                Ok(format!("## Findings\n{}", focus))
            }
            Purpose::Introduction | Purpose::Report | Purpose::Conclusion => {
                if let Some(delay) = self.writer_delay {
                    tokio::time::sleep(delay).await;
                }
                let part = match request.purpose {
                    Purpose::Introduction => 0,
                    Purpose::Report => 1,
                    _ => 2,
                };
                Ok(self.report_parts[part].clone())
            }
            other => Err(ResearchError::generation(format!(
                "unexpected text request: {:?}",
                other
            ))),
        }
    }

    async fn generate_json(
        &self,
        request: GenerationRequest,
        schema: &OutputSchema,
    ) -> Result<Value> {
        self.record(&request);

        match request.purpose {
            Purpose::Analysts => {
                let call = self.analyst_calls.fetch_add(1, Ordering::SeqCst);
                let batch = self
                    .analyst_batches
                    .get(call)
                    .or_else(|| self.analyst_batches.last())
                    .cloned()
                    .unwrap_or_default();
                Ok(json!({ "analysts": batch }))
            }
            Purpose::SearchQuery => Ok(json!({ "search_query": "llm tooling adoption" })),
            other => Err(ResearchError::generation(format!(
                "unexpected {} request: {:?}",
                schema.name, other
            ))),
        }
    }
}

/// Retrieval source returning fixed hits
pub struct StaticSearch {
    name: String,
    hits: Vec<SearchHit>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticSearch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hits: vec![SearchHit {
                identifier: format!("https://{}.example.com/doc", name),
                text: format!("Document from {}", name),
            }],
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every search takes at least `millis`
    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalBackend for StaticSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.hits.clone())
    }
}

/// Retrieval source that is always down
pub struct FailingSearch {
    name: String,
}

impl FailingSearch {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl RetrievalBackend for FailingSearch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Err(ResearchError::retrieval(&self.name, "service unavailable"))
    }
}

/// Report sink that keeps saved reports in memory
#[derive(Default)]
pub struct RecordingSink {
    pub saved: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn save(&self, report: &str, destination: &str) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((destination.to_string(), report.to_string()));
        Ok(())
    }
}

pub fn workflow(
    generator: Arc<ScriptedGenerator>,
    checkpointer: Arc<dyn Checkpointer>,
    config: WorkflowConfig,
) -> ResearchWorkflow {
    ResearchWorkflow::new(
        generator,
        Arc::new(StaticSearch::new("web")),
        Arc::new(StaticSearch::new("wikipedia")),
        checkpointer,
        config,
    )
}

/// Collect every update, stopping at the first error
pub async fn drain(mut updates: SnapshotStream) -> Result<Vec<StateUpdate>> {
    let mut collected = Vec::new();
    while let Some(update) = updates.next().await {
        collected.push(update?);
    }
    Ok(collected)
}
