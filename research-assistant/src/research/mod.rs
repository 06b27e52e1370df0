//! Research workflow module
//!
//! Generates analyst personas for a topic, pauses for human feedback,
//! interviews a simulated expert once per analyst in parallel, and assembles
//! the resulting sections into one report.

pub mod backend;
pub mod checkpoint;
pub mod cli;
pub mod error;
pub mod interview;
pub mod phase0_analysts;
pub mod phase1_interviews;
pub mod phase2_report;
pub mod prompts;
pub mod settings;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use backend::{GenerationBackend, ReportSink, RetrievalBackend, SearchHit};
pub use checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer, SqliteCheckpointer};
pub use error::{ResearchError, Result};
pub use interview::{InterviewRunner, RetrievalFailurePolicy};
pub use phase0_analysts::AnalystGenerator;
pub use phase1_interviews::{InterviewDispatcher, InterviewFailurePolicy};
pub use phase2_report::{finalize_report, ReportOutcome, ReportWriter};
pub use settings::Settings;
pub use types::{Analyst, InterviewState, Node, StateDelta, StateUpdate, Turn, WorkflowState};
pub use workflow::{collect_report, ResearchWorkflow, WorkflowConfig};
