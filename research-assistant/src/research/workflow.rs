//! Workflow orchestration for the research assistant
//!
//! The engine is an explicit state machine over [`Node`]s:
//!
//! ```text
//! create_analysts -> [human_feedback] -> conduct_interviews -> write_report -> finalize_report
//!        ^                  |
//!        +-- feedback given-+
//! ```
//!
//! Every node runs as one superstep. After each superstep the full
//! [`WorkflowState`] and the next node are checkpointed under the caller's
//! thread id, and the fields that changed are streamed to the caller as a
//! [`StateUpdate`]. Execution always pauses before `human_feedback`;
//! [`ResearchWorkflow::submit_feedback`] and [`ResearchWorkflow::resume`]
//! continue from the stored checkpoint, in this process or a later one.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use research_assistant::backends::{OpenAiBackend, TavilySearch, WikipediaSearch};
//! use research_assistant::research::{
//!     collect_report, MemoryCheckpointer, ResearchWorkflow, Settings, WorkflowConfig,
//! };
//!
//! # async fn example() -> research_assistant::research::Result<()> {
//! let settings = Settings::from_env()?;
//! let workflow = ResearchWorkflow::new(
//!     Arc::new(OpenAiBackend::from_settings(&settings)?),
//!     Arc::new(TavilySearch::from_settings(&settings)?),
//!     Arc::new(WikipediaSearch::from_settings(&settings)?),
//!     Arc::new(MemoryCheckpointer::new()),
//!     WorkflowConfig::default(),
//! );
//!
//! let mut updates = workflow.start("thread-1", "The application of ai agents", 3, 2);
//! while let Some(update) = updates.next().await {
//!     println!("{:?}", update?.delta.analysts);
//! }
//!
//! let outcome = collect_report(workflow.resume("thread-1")).await?;
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures::{Future, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use research_assistant_sdk::{
    log_checkpoint, log_interrupt, log_phase_complete, log_phase_complete_console,
    log_phase_failed, log_phase_start, log_phase_start_console, log_state_file,
};

use crate::research::backend::{GenerationBackend, ReportSink, RetrievalBackend};
use crate::research::checkpoint::{Checkpoint, Checkpointer};
use crate::research::error::{ResearchError, Result};
use crate::research::interview::{InterviewRunner, RetrievalFailurePolicy};
use crate::research::phase0_analysts::AnalystGenerator;
use crate::research::phase1_interviews::{InterviewDispatcher, InterviewFailurePolicy};
use crate::research::phase2_report::{finalize_report, ReportOutcome, ReportWriter};
use crate::research::types::{Node, StateDelta, StateUpdate, WorkflowState};
use crate::workflow_utils::{execute_task, TaskContext};

const TOTAL_PHASES: usize = Node::ALL.len();
const UPDATE_BUFFER: usize = 16;

/// Incremental state snapshots, one per superstep; a failure ends the stream
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<StateUpdate>> + Send>>;

type UpdateSender = mpsc::Sender<Result<StateUpdate>>;

/// Engine tunables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Cap on interviews in flight; `None` runs one task per analyst at once
    pub max_concurrent_interviews: Option<usize>,
    pub retrieval_failure_policy: RetrievalFailurePolicy,
    pub interview_failure_policy: InterviewFailurePolicy,
}

/// Reject run inputs that could never produce a report
pub fn validate_inputs(topic: &str, max_analysts: usize, max_interview_turns: usize) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(ResearchError::InvalidConfig("topic must not be empty".to_string()));
    }
    if max_analysts == 0 {
        return Err(ResearchError::InvalidConfig("max_analysts must be at least 1".to_string()));
    }
    if max_interview_turns == 0 {
        return Err(ResearchError::InvalidConfig(
            "max_interview_turns must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Routing guard evaluated when leaving the feedback point
pub fn route_after_feedback(state: &WorkflowState) -> Node {
    if state.pending_feedback().is_some() {
        Node::CreateAnalysts
    } else {
        Node::ConductInterviews
    }
}

/// Check that `state` carries what `node` needs before it runs
fn validate_transition(node: Node, state: &WorkflowState) -> Result<()> {
    match node {
        Node::CreateAnalysts => {
            validate_inputs(&state.topic, state.max_analysts, state.max_interview_turns)
                .map_err(|e| ResearchError::invalid_state(node, e.to_string()))
        }
        Node::HumanFeedback | Node::ConductInterviews if state.analysts.is_empty() => {
            Err(ResearchError::invalid_state(node, "no analysts have been generated"))
        }
        Node::WriteReport if state.sections.is_empty() => {
            Err(ResearchError::invalid_state(node, "no interview sections to write from"))
        }
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct ResearchWorkflow {
    checkpointer: Arc<dyn Checkpointer>,
    analysts: Arc<AnalystGenerator>,
    dispatcher: Arc<InterviewDispatcher>,
    writer: Arc<ReportWriter>,
}

impl ResearchWorkflow {
    pub fn new(
        generator: Arc<dyn GenerationBackend>,
        primary: Arc<dyn RetrievalBackend>,
        secondary: Arc<dyn RetrievalBackend>,
        checkpointer: Arc<dyn Checkpointer>,
        config: WorkflowConfig,
    ) -> Self {
        let runner = InterviewRunner::new(generator.clone(), primary, secondary)
            .with_retrieval_policy(config.retrieval_failure_policy);
        let dispatcher = InterviewDispatcher::new(Arc::new(runner))
            .with_max_concurrent(config.max_concurrent_interviews)
            .with_failure_policy(config.interview_failure_policy);

        Self {
            checkpointer,
            analysts: Arc::new(AnalystGenerator::new(generator.clone())),
            dispatcher: Arc::new(dispatcher),
            writer: Arc::new(ReportWriter::new(generator)),
        }
    }

    /// Begin a new run under `thread_id` and execute until the feedback point.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        thread_id: &str,
        topic: &str,
        max_analysts: usize,
        max_interview_turns: usize,
    ) -> SnapshotStream {
        let thread_id = thread_id.to_string();
        let state = WorkflowState::new(topic.trim(), max_analysts, max_interview_turns);

        self.spawn_run(move |engine, tx| async move {
            validate_inputs(&state.topic, state.max_analysts, state.max_interview_turns)?;
            if engine.checkpointer.load(&thread_id).await?.is_some() {
                return Err(ResearchError::InvalidConfig(format!(
                    "thread '{}' already exists; resume it or pick another id",
                    thread_id
                )));
            }

            let checkpoint = Checkpoint::new(thread_id, 0, state, Some(Node::CreateAnalysts));
            engine.persist(&checkpoint).await?;
            engine.execute(checkpoint, &tx).await
        })
    }

    /// Inject feedback at the feedback point and regenerate the analysts.
    ///
    /// Blank feedback approves the current analysts, exactly like [`resume`].
    ///
    /// [`resume`]: ResearchWorkflow::resume
    pub fn submit_feedback(&self, thread_id: &str, feedback: &str) -> SnapshotStream {
        let thread_id = thread_id.to_string();
        let feedback = feedback.trim().to_string();

        self.spawn_run(move |engine, tx| async move {
            let mut checkpoint = engine.awaiting_feedback(&thread_id).await?;
            let value = (!feedback.is_empty()).then_some(feedback);
            engine.leave_feedback_point(&mut checkpoint, value).await?;
            engine.execute(checkpoint, &tx).await
        })
    }

    /// Continue a paused or interrupted run through to the end.
    ///
    /// At the feedback point this approves the current analysts and clears
    /// any stored feedback. A finished thread yields an empty stream.
    pub fn resume(&self, thread_id: &str) -> SnapshotStream {
        let thread_id = thread_id.to_string();

        self.spawn_run(move |engine, tx| async move {
            let mut checkpoint = engine.get_state(&thread_id).await?;
            if checkpoint.next == Some(Node::HumanFeedback) {
                engine.leave_feedback_point(&mut checkpoint, None).await?;
            }
            engine.execute(checkpoint, &tx).await
        })
    }

    /// Latest checkpoint for `thread_id`
    pub async fn get_state(&self, thread_id: &str) -> Result<Checkpoint> {
        self.checkpointer
            .load(thread_id)
            .await?
            .ok_or_else(|| ResearchError::UnknownThread(thread_id.to_string()))
    }

    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        self.checkpointer.history(thread_id).await
    }

    async fn awaiting_feedback(&self, thread_id: &str) -> Result<Checkpoint> {
        let checkpoint = self.get_state(thread_id).await?;
        if checkpoint.next != Some(Node::HumanFeedback) {
            return Err(ResearchError::NotAwaitingFeedback {
                thread_id: thread_id.to_string(),
                next: checkpoint
                    .next
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "done".to_string()),
            });
        }
        Ok(checkpoint)
    }

    /// Pass the feedback point as one superstep, storing `feedback` and routing on it
    async fn leave_feedback_point(
        &self,
        checkpoint: &mut Checkpoint,
        feedback: Option<String>,
    ) -> Result<()> {
        validate_transition(Node::HumanFeedback, &checkpoint.state)
            .map_err(|e| e.in_stage(Node::HumanFeedback))?;

        let delta = StateDelta {
            human_feedback: Some(feedback),
            ..Default::default()
        };
        checkpoint.state.apply(&delta);
        checkpoint.step += 1;
        checkpoint.next = Some(route_after_feedback(&checkpoint.state));
        checkpoint.updated_at = Utc::now();
        self.persist(checkpoint).await
    }

    /// Run the engine on a background task and stream its updates
    fn spawn_run<F, Fut>(&self, run: F) -> SnapshotStream
    where
        F: FnOnce(ResearchWorkflow, UpdateSender) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let error_tx = tx.clone();
        let fut = run(self.clone(), tx);

        tokio::spawn(async move {
            if let Err(e) = fut.await {
                let _ = error_tx.send(Err(e)).await;
            }
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    /// Superstep loop: run, merge, checkpoint, stream; pause before feedback
    async fn execute(&self, mut checkpoint: Checkpoint, tx: &UpdateSender) -> Result<()> {
        while let Some(node) = checkpoint.next {
            if node == Node::HumanFeedback {
                log_interrupt!(&checkpoint.thread_id, node);
                break;
            }

            let (delta, next) = self.run_stage(node, &checkpoint.state).await?;

            checkpoint.state.apply(&delta);
            checkpoint.step += 1;
            checkpoint.next = next;
            checkpoint.updated_at = Utc::now();
            self.persist(&checkpoint).await?;

            let update = StateUpdate {
                thread_id: checkpoint.thread_id.clone(),
                step: checkpoint.step,
                node,
                delta,
                next,
            };
            if tx.send(Ok(update)).await.is_err() {
                // Nobody is listening; progress so far is checkpointed
                break;
            }
        }
        Ok(())
    }

    async fn persist(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.checkpointer.save(checkpoint).await?;
        log_checkpoint!(&checkpoint.thread_id, checkpoint.step, checkpoint.next);
        Ok(())
    }

    /// Run one node with stage markers; errors come back tagged with the stage
    async fn run_stage(
        &self,
        node: Node,
        state: &WorkflowState,
    ) -> Result<(StateDelta, Option<Node>)> {
        let phase = node.phase();
        log_phase_start!(phase, node.title(), TOTAL_PHASES);
        log_phase_start_console!(phase, node.title(), describe(node, state));

        let result = match validate_transition(node, state) {
            Ok(()) => self.run_node(node, state).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                log_phase_complete!(phase, node.title());
                log_phase_complete_console!(phase);
            }
            Err(e) => {
                log_phase_failed!(phase, node.title(), e);
            }
        }
        result.map_err(|e| e.in_stage(node))
    }

    async fn run_node(
        &self,
        node: Node,
        state: &WorkflowState,
    ) -> Result<(StateDelta, Option<Node>)> {
        match node {
            Node::CreateAnalysts => {
                let analysts = self
                    .analysts
                    .generate(&state.topic, state.max_analysts, state.pending_feedback())
                    .await?;
                let delta = StateDelta {
                    analysts: Some(analysts),
                    ..Default::default()
                };
                Ok((delta, Some(Node::HumanFeedback)))
            }
            Node::HumanFeedback => Err(ResearchError::invalid_state(
                node,
                "the feedback point is passed by submit_feedback or resume",
            )),
            Node::ConductInterviews => {
                let sections = self
                    .dispatcher
                    .dispatch(&state.analysts, &state.topic, state.max_interview_turns)
                    .await?;
                let delta = StateDelta {
                    sections,
                    ..Default::default()
                };
                Ok((delta, Some(Node::WriteReport)))
            }
            Node::WriteReport => {
                let (introduction, content, conclusion) = self.write_report_parts(state).await?;
                let delta = StateDelta {
                    introduction: Some(introduction),
                    content: Some(content),
                    conclusion: Some(conclusion),
                    ..Default::default()
                };
                Ok((delta, Some(Node::FinalizeReport)))
            }
            Node::FinalizeReport => {
                let report = finalize_report(
                    state.introduction.as_deref(),
                    state.content.as_deref(),
                    state.conclusion.as_deref(),
                )?;
                let delta = StateDelta {
                    final_report: Some(report),
                    ..Default::default()
                };
                Ok((delta, None))
            }
        }
    }

    /// Introduction, body and conclusion writers run concurrently and must all finish
    async fn write_report_parts(&self, state: &WorkflowState) -> Result<(String, String, String)> {
        let phase = Node::WriteReport.phase();
        let ctx = |task_number| TaskContext {
            phase,
            task_number,
            total_tasks: 3,
        };
        let sections = &state.sections;
        let topic = &state.topic;

        tokio::try_join!(
            execute_task("write_introduction", "Write introduction", ctx(1), || async {
                let text = self.writer.write_introduction(sections, topic).await?;
                Ok::<_, ResearchError>((text, "Introduction written".to_string()))
            }),
            execute_task("write_report", "Write report body", ctx(2), || async {
                let text = self.writer.write_report(sections, topic).await?;
                Ok::<_, ResearchError>((text, "Report body written".to_string()))
            }),
            execute_task("write_conclusion", "Write conclusion", ctx(3), || async {
                let text = self.writer.write_conclusion(sections, topic).await?;
                Ok::<_, ResearchError>((text, "Conclusion written".to_string()))
            }),
        )
    }
}

fn describe(node: Node, state: &WorkflowState) -> String {
    match node {
        Node::CreateAnalysts => match state.pending_feedback() {
            Some(feedback) => format!(
                "Regenerating {} analysts for '{}' with feedback: {}",
                state.max_analysts, state.topic, feedback
            ),
            None => format!("Generating {} analysts for '{}'", state.max_analysts, state.topic),
        },
        Node::HumanFeedback => "Waiting for feedback on the analysts".to_string(),
        Node::ConductInterviews => format!(
            "Interviewing experts with {} analysts, up to {} turns each",
            state.analysts.len(),
            state.max_interview_turns
        ),
        Node::WriteReport => format!("Writing report parts from {} sections", state.sections.len()),
        Node::FinalizeReport => "Assembling the final report".to_string(),
    }
}

/// Drain a stream and report whether it produced a usable report.
///
/// Fails with the first streamed error, or when the stream ends before the
/// report was finalized (for example at the feedback point).
pub async fn collect_report(mut updates: SnapshotStream) -> Result<ReportOutcome> {
    let mut final_report = None;
    while let Some(update) = updates.next().await {
        if let Some(report) = update?.delta.final_report {
            final_report = Some(report);
        }
    }

    match final_report {
        Some(report) => Ok(ReportOutcome::from_report(&report)),
        None => Err(ResearchError::invalid_state(
            Node::FinalizeReport,
            "run stopped before the report was finalized",
        )),
    }
}

/// Persist a finished report; a "no result" outcome writes nothing.
///
/// Returns whether anything was saved.
pub async fn save_outcome(
    sink: &dyn ReportSink,
    outcome: &ReportOutcome,
    destination: &str,
) -> Result<bool> {
    match outcome {
        ReportOutcome::Report(report) => {
            sink.save(report, destination).await?;
            log_state_file!(Node::FinalizeReport.phase(), destination, "Final research report");
            Ok(true)
        }
        ReportOutcome::NoResult => Ok(false),
    }
}
