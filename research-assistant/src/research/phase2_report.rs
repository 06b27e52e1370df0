//! Phase 2: Report assembly
//!
//! Three independent writers (introduction, body, conclusion) read the merged
//! sections; [`finalize_report`] then splices their output into one document.

use std::sync::Arc;

use crate::research::backend::{GenerationBackend, GenerationRequest, Purpose};
use crate::research::error::{ResearchError, Result};
use crate::research::prompts;

/// Separator between report parts, and between sections handed to writers
pub const PART_SEPARATOR: &str = "\n\n---\n\n";

const INSIGHTS_HEADING: &str = "## Insights";
const SOURCES_MARKER: &str = "\n## Sources\n";
const SOURCES_SUFFIX: &str = "\n\n## Sources\n";

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Report(String),
    /// The run finished but every generated part was blank
    NoResult,
}

impl ReportOutcome {
    pub fn from_report(report: &str) -> Self {
        if is_blank_report(report) {
            ReportOutcome::NoResult
        } else {
            ReportOutcome::Report(report.to_string())
        }
    }
}

pub fn join_sections(sections: &[String]) -> String {
    sections.join(PART_SEPARATOR)
}

pub struct ReportWriter {
    backend: Arc<dyn GenerationBackend>,
}

impl ReportWriter {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    pub async fn write_introduction(&self, sections: &[String], topic: &str) -> Result<String> {
        let request = GenerationRequest::new(
            Purpose::Introduction,
            prompts::intro_conclusion_instructions(topic, &join_sections(sections)),
        )
        .with_user_message(prompts::INTRODUCTION_USER_MESSAGE);
        self.backend.generate_text(request).await
    }

    pub async fn write_conclusion(&self, sections: &[String], topic: &str) -> Result<String> {
        let request = GenerationRequest::new(
            Purpose::Conclusion,
            prompts::intro_conclusion_instructions(topic, &join_sections(sections)),
        )
        .with_user_message(prompts::CONCLUSION_USER_MESSAGE);
        self.backend.generate_text(request).await
    }

    /// Body text; may open with "## Insights" and end with a "## Sources" block
    pub async fn write_report(&self, sections: &[String], topic: &str) -> Result<String> {
        let request = GenerationRequest::new(
            Purpose::Report,
            prompts::report_instructions(topic, &join_sections(sections)),
        )
        .with_user_message(prompts::REPORT_USER_MESSAGE);
        self.backend.generate_text(request).await
    }
}

/// Split a body on the first sources marker
pub fn split_sources(body: &str) -> (&str, Option<&str>) {
    match body.split_once(SOURCES_MARKER) {
        Some((content, sources)) => (content, Some(sources)),
        None => (body, None),
    }
}

/// Splice introduction, body and conclusion into the final document.
///
/// A leading "## Insights" heading is removed only when the body starts with
/// it. Any sources block in the body is moved after the conclusion.
pub fn finalize_report(
    introduction: Option<&str>,
    body: Option<&str>,
    conclusion: Option<&str>,
) -> Result<String> {
    let missing: Vec<&str> = [
        ("introduction", introduction.is_none()),
        ("content", body.is_none()),
        ("conclusion", conclusion.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    let (Some(introduction), Some(body), Some(conclusion)) = (introduction, body, conclusion) else {
        return Err(ResearchError::Convergence(format!(
            "cannot finalize without: {}",
            missing.join(", ")
        )));
    };

    let body = body.strip_prefix(INSIGHTS_HEADING).unwrap_or(body);
    let (body, sources) = split_sources(body);

    let mut report = format!(
        "{}{}{}{}{}",
        introduction, PART_SEPARATOR, body, PART_SEPARATOR, conclusion
    );
    if let Some(sources) = sources {
        report.push_str(SOURCES_SUFFIX);
        report.push_str(sources);
    }
    Ok(report)
}

/// True when every part between separators, and the sources block, is whitespace
pub fn is_blank_report(report: &str) -> bool {
    let (main, sources) = report.split_once(SOURCES_SUFFIX).unwrap_or((report, ""));
    sources.trim().is_empty() && main.split(PART_SEPARATOR).all(|part| part.trim().is_empty())
}
