//! Interview state machine
//!
//! One analyst interviews a simulated expert:
//!
//! ```text
//! AskQuestion -> Search (primary || secondary) -> Answer -> Route
//!      ^                                                      |
//!      +------------------ continue --------------------------+
//!                                                             | done
//!                                       SaveTranscript -> WriteSection -> Done
//! ```
//!
//! `Route` stops the loop once the expert has answered `max_num_turns` times,
//! or as soon as the question before the latest answer contains
//! [`CLOSING_PHRASE`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use research_assistant_sdk::{
    log_agent_complete, log_agent_failed, log_agent_message, log_agent_start, log_task_progress,
    log_warning,
};

use crate::research::backend::{
    conversation_for, format_documents, generate_structured, GenerationBackend,
    GenerationRequest, OutputSchema, Purpose, RetrievalBackend,
};
use crate::research::error::{ResearchError, Result};
use crate::research::prompts;
use crate::research::types::{
    count_expert_answers, render_transcript, InterviewState, Role, SearchQuery, Turn,
    CLOSING_PHRASE,
};

/// What to do when a retrieval source fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalFailurePolicy {
    /// Any failed search aborts the interview
    #[default]
    FailFast,
    /// Keep whatever the other source returned; fail only if both fail
    Degrade,
}

/// Decision taken after every expert answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AskQuestion,
    SaveTranscript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    AskQuestion,
    Search,
    Answer,
    Route,
    SaveTranscript,
    WriteSection,
    Done,
}

/// Turn-limit and closing-phrase guard
pub fn route_messages(messages: &[Turn], max_num_turns: usize) -> Result<Route> {
    if messages.len() < 2 {
        return Err(ResearchError::Routing(format!(
            "need at least 2 turns to route, got {}",
            messages.len()
        )));
    }

    if count_expert_answers(messages) >= max_num_turns {
        return Ok(Route::SaveTranscript);
    }

    let last_question = &messages[messages.len() - 2];
    if last_question.text.contains(CLOSING_PHRASE) {
        return Ok(Route::SaveTranscript);
    }

    Ok(Route::AskQuestion)
}

/// Runs interviews against injected generation and retrieval backends
pub struct InterviewRunner {
    generator: Arc<dyn GenerationBackend>,
    primary: Arc<dyn RetrievalBackend>,
    secondary: Arc<dyn RetrievalBackend>,
    retrieval_policy: RetrievalFailurePolicy,
}

impl InterviewRunner {
    pub fn new(
        generator: Arc<dyn GenerationBackend>,
        primary: Arc<dyn RetrievalBackend>,
        secondary: Arc<dyn RetrievalBackend>,
    ) -> Self {
        Self {
            generator,
            primary,
            secondary,
            retrieval_policy: RetrievalFailurePolicy::default(),
        }
    }

    pub fn with_retrieval_policy(mut self, policy: RetrievalFailurePolicy) -> Self {
        self.retrieval_policy = policy;
        self
    }

    /// Drive `state` to completion; the returned state carries one section
    pub async fn run(&self, mut state: InterviewState, task_id: &str) -> Result<InterviewState> {
        let agent_name = state.analyst.name.clone();
        log_agent_start!(task_id, &agent_name, &state.analyst.role);

        let mut step = Step::AskQuestion;
        while step != Step::Done {
            match self.advance(step, &mut state, task_id).await {
                Ok(next) => step = next,
                Err(e) => {
                    log_agent_failed!(task_id, &agent_name, e);
                    return Err(e);
                }
            }
        }

        log_agent_complete!(
            task_id,
            &agent_name,
            format!("{} expert answers", state.expert_answers())
        );
        Ok(state)
    }

    async fn advance(&self, step: Step, state: &mut InterviewState, task_id: &str) -> Result<Step> {
        let next = match step {
            Step::AskQuestion => {
                let question = self.ask_question(state).await?;
                log_agent_message!(task_id, &state.analyst.name, &question);
                state.messages.push(Turn::analyst(question));
                Step::Search
            }
            Step::Search => {
                let blocks = self.search(state, task_id).await?;
                state.context.extend(blocks);
                Step::Answer
            }
            Step::Answer => {
                let answer = self.answer_question(state).await?;
                log_agent_message!(task_id, "Expert", &answer);
                state.messages.push(Turn::expert(answer));
                Step::Route
            }
            Step::Route => match route_messages(&state.messages, state.max_num_turns)? {
                Route::AskQuestion => Step::AskQuestion,
                Route::SaveTranscript => Step::SaveTranscript,
            },
            Step::SaveTranscript => {
                state.interview = Some(render_transcript(&state.messages));
                Step::WriteSection
            }
            Step::WriteSection => {
                log_task_progress!(task_id, "Writing section");
                let section = self.write_section(state).await?;
                state.sections = vec![section];
                Step::Done
            }
            Step::Done => Step::Done,
        };
        Ok(next)
    }

    async fn ask_question(&self, state: &InterviewState) -> Result<String> {
        let request = GenerationRequest::new(
            Purpose::Question,
            prompts::question_instructions(&state.analyst.persona()),
        )
        .with_messages(conversation_for(Role::Analyst, &state.messages));

        let question = self.generator.generate_text(request).await?;
        require_text(question, "question")
    }

    /// One query, issued once per source; both searches always run to completion
    async fn search(&self, state: &InterviewState, task_id: &str) -> Result<Vec<String>> {
        let request =
            GenerationRequest::new(Purpose::SearchQuery, prompts::SEARCH_QUERY_INSTRUCTIONS)
                .with_user_message(render_transcript(&state.messages));
        let query: SearchQuery =
            generate_structured(self.generator.as_ref(), request, &OutputSchema::search_query())
                .await?;
        let query = require_text(query.search_query, "search query")?;
        log_task_progress!(task_id, format!("Searching: {}", query));

        let (primary, secondary) = futures::join!(
            retrieve(self.primary.as_ref(), &query),
            retrieve(self.secondary.as_ref(), &query)
        );

        match self.retrieval_policy {
            RetrievalFailurePolicy::FailFast => Ok(vec![primary?, secondary?]),
            RetrievalFailurePolicy::Degrade => {
                let mut blocks = Vec::new();
                let mut first_error = None;
                for result in [primary, secondary] {
                    match result {
                        Ok(block) => blocks.push(block),
                        Err(e) => {
                            log_warning!("{} (continuing without it)", e);
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                }
                match first_error {
                    Some(e) if blocks.is_empty() => Err(e),
                    _ => Ok(blocks),
                }
            }
        }
    }

    async fn answer_question(&self, state: &InterviewState) -> Result<String> {
        let request = GenerationRequest::new(
            Purpose::Answer,
            prompts::answer_instructions(&state.analyst.persona(), &state.joined_context()),
        )
        .with_messages(conversation_for(Role::Expert, &state.messages));

        let answer = self.generator.generate_text(request).await?;
        require_text(answer, "answer")
    }

    /// Conditioned on retrieved context only, never on the transcript
    async fn write_section(&self, state: &InterviewState) -> Result<String> {
        let request = GenerationRequest::new(
            Purpose::Section,
            prompts::section_instructions(&state.analyst.description),
        )
        .with_user_message(prompts::section_user_message(&state.joined_context()));

        let section = self.generator.generate_text(request).await?;
        require_text(section, "section")
    }
}

async fn retrieve(source: &dyn RetrievalBackend, query: &str) -> Result<String> {
    let hits = source.search(query).await.map_err(|e| match e {
        err @ ResearchError::Retrieval { .. } => err,
        other => ResearchError::retrieval(source.name(), other.to_string()),
    })?;
    Ok(format_documents(&hits))
}

fn require_text(text: String, what: &str) -> Result<String> {
    if text.trim().is_empty() {
        Err(ResearchError::generation(format!("backend returned an empty {}", what)))
    } else {
        Ok(text)
    }
}
