//! Phase 1: Parallel interviews
//!
//! Maps every analyst onto its own interview task and merges the resulting
//! sections back in completion order. Each interview returns its own section
//! and only this module appends, so parallel branches never share state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use research_assistant_sdk::{log_parallel_complete, log_parallel_start, log_warning};

use crate::research::error::{ResearchError, Result};
use crate::research::interview::InterviewRunner;
use crate::research::types::{Analyst, InterviewState, Node};
use crate::workflow_utils::{execute_batch, execute_task};

/// What a failed interview means for the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewFailurePolicy {
    /// Let the siblings finish, then fail the run with the first failure
    #[default]
    AbortRun,
    /// Keep the sections that were written; fail only if none were
    SkipFailed,
}

pub struct InterviewDispatcher {
    runner: Arc<InterviewRunner>,
    max_concurrent: Option<usize>,
    failure_policy: InterviewFailurePolicy,
}

impl InterviewDispatcher {
    pub fn new(runner: Arc<InterviewRunner>) -> Self {
        Self {
            runner,
            max_concurrent: None,
            failure_policy: InterviewFailurePolicy::default(),
        }
    }

    /// Cap on interviews in flight; `None` runs them all at once
    pub fn with_max_concurrent(mut self, max_concurrent: Option<usize>) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_failure_policy(mut self, policy: InterviewFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Run one interview per analyst and merge their sections.
    ///
    /// The returned order follows completion, not `analysts`.
    pub async fn dispatch(
        &self,
        analysts: &[Analyst],
        topic: &str,
        max_num_turns: usize,
    ) -> Result<Vec<String>> {
        if analysts.is_empty() {
            return Ok(Vec::new());
        }

        let total = analysts.len();
        log_parallel_start!(total, "interviews");

        let runner = self.runner.clone();
        let topic = topic.to_string();
        let settled = execute_batch(
            Node::ConductInterviews.phase(),
            analysts.to_vec(),
            self.max_concurrent.unwrap_or(total),
            move |analyst: Analyst, ctx| {
                let runner = runner.clone();
                let state = InterviewState::new(analyst, &topic, max_num_turns);
                async move {
                    let task_id = format!("interview_{}", ctx.task_number);
                    let name = state.analyst.name.clone();
                    let description = format!("Interview with {}", name);

                    execute_task(task_id.clone(), description, ctx, || async {
                        let finished = runner.run(state, &task_id).await?;
                        let answers = finished.expert_answers();
                        let section = finished.sections.into_iter().next().ok_or_else(|| {
                            ResearchError::generation("interview finished without a section")
                        })?;
                        Ok::<_, ResearchError>((section, format!("{} expert answers", answers)))
                    })
                    .await
                    .map_err(|source| ResearchError::InterviewFailed {
                        index: ctx.index(),
                        analyst: name,
                        source: Box::new(source),
                    })
                }
            },
        )
        .await;

        let mut sections = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (ctx, result) in settled {
            match result {
                Ok(section) => sections.push(section),
                Err(e) => failures.push((ctx.index(), e)),
            }
        }

        log_parallel_complete!(sections.len(), "interviews");

        if failures.is_empty() {
            return Ok(sections);
        }

        // Report the failure for the earliest analyst so reruns are deterministic
        failures.sort_by_key(|(index, _)| *index);
        match self.failure_policy {
            InterviewFailurePolicy::SkipFailed if !sections.is_empty() => {
                for (_, e) in &failures {
                    log_warning!("Skipping failed interview: {}", e);
                }
                Ok(sections)
            }
            _ => {
                let (_, first) = failures.swap_remove(0);
                Err(first)
            }
        }
    }
}
