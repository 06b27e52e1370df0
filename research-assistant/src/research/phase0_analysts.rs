//! Phase 0: Analyst persona generation
//!
//! Turns a topic, a target count and optional editorial feedback into a list
//! of analyst personas with one structured generation call. Feedback triggers
//! a full regeneration; the previous list is never patched.

use std::sync::Arc;

use research_assistant_sdk::{
    log_agent_complete, log_agent_failed, log_agent_start, log_warning,
};

use crate::research::backend::{
    generate_structured, GenerationBackend, GenerationRequest, OutputSchema, Purpose,
};
use crate::research::error::{ResearchError, Result};
use crate::research::prompts;
use crate::research::types::{Analyst, Perspectives};

const TASK_ID: &str = "create_analysts";
const AGENT_NAME: &str = "Persona Generator";

pub struct AnalystGenerator {
    backend: Arc<dyn GenerationBackend>,
}

impl AnalystGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Request exactly `max_analysts` personas.
    ///
    /// A shortfall is accepted with a warning and surplus entries are
    /// dropped. Malformed or empty output fails with a generation error.
    pub async fn generate(
        &self,
        topic: &str,
        max_analysts: usize,
        feedback: Option<&str>,
    ) -> Result<Vec<Analyst>> {
        let description = match feedback {
            Some(_) => format!("Regenerating {} analysts with feedback", max_analysts),
            None => format!("Generating {} analysts", max_analysts),
        };
        log_agent_start!(TASK_ID, AGENT_NAME, description);

        let request = GenerationRequest::new(
            Purpose::Analysts,
            prompts::analyst_instructions(topic, max_analysts, feedback),
        )
        .with_user_message(prompts::ANALYSTS_USER_MESSAGE);

        let result = generate_structured::<Perspectives>(
            self.backend.as_ref(),
            request,
            &OutputSchema::perspectives(),
        )
        .await
        .and_then(|perspectives| validate_analysts(perspectives.analysts, max_analysts));

        match &result {
            Ok(analysts) => {
                log_agent_complete!(TASK_ID, AGENT_NAME, format!("{} analysts", analysts.len()));
            }
            Err(e) => {
                log_agent_failed!(TASK_ID, AGENT_NAME, e);
            }
        }
        result
    }
}

/// Enforce the count contract on backend output
pub fn validate_analysts(mut analysts: Vec<Analyst>, max_analysts: usize) -> Result<Vec<Analyst>> {
    if analysts.is_empty() {
        return Err(ResearchError::generation("backend returned no analysts"));
    }

    if let Some(position) = analysts.iter().position(|a| a.name.trim().is_empty()) {
        return Err(ResearchError::generation(format!(
            "analyst {} has an empty name",
            position + 1
        )));
    }

    if analysts.len() > max_analysts {
        log_warning!(
            "Backend returned {} analysts, keeping the first {}",
            analysts.len(),
            max_analysts
        );
        analysts.truncate(max_analysts);
    } else if analysts.len() < max_analysts {
        log_warning!(
            "Analyst shortfall: requested {}, received {}",
            max_analysts,
            analysts.len()
        );
    }

    Ok(analysts)
}
