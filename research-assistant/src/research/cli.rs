//! CLI argument parsing for the research assistant

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::research::interview::RetrievalFailurePolicy;
use crate::research::phase1_interviews::InterviewFailurePolicy;
use crate::research::settings::{
    DEFAULT_MAX_INTERVIEW_TURNS, DEFAULT_NUM_ANALYSTS, DEFAULT_OUTPUT_FILE, DEFAULT_TOPIC,
};
use crate::research::types::Analyst;
use crate::research::workflow::WorkflowConfig;

/// Characters of the report echoed to the terminal after a run
pub const PREVIEW_CHARS: usize = 500;

/// Multi-analyst research assistant
#[derive(Parser, Debug, Clone)]
#[command(
    name = "research-assistant",
    version,
    about = "Generate analyst personas, interview experts in parallel, and assemble a research report"
)]
pub struct Cli {
    /// SQLite checkpoint database (default: ~/.research-assistant/checkpoints.db)
    #[arg(long, global = true)]
    pub checkpoint_db: Option<PathBuf>,

    /// Do not emit structured progress events on stderr
    #[arg(long, global = true)]
    pub no_events: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run interactively: generate analysts, ask for feedback, then write the report
    Run {
        #[command(flatten)]
        topic: TopicArgs,

        /// Output file for the research report
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
        output: String,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Start a run and stop at the feedback point
    Start {
        #[command(flatten)]
        topic: TopicArgs,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Regenerate the analysts of a paused run using feedback
    Feedback {
        /// Thread id printed by `start`
        thread_id: String,

        /// What to change about the analysts
        feedback: String,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Approve the analysts (or continue an interrupted run) and write the report
    Resume {
        thread_id: String,

        /// Output file for the research report
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
        output: String,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the stored state of a thread as YAML, or list threads
    Show {
        thread_id: Option<String>,

        /// Print every checkpoint instead of only the latest
        #[arg(long)]
        history: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TopicArgs {
    /// Research topic
    #[arg(short, long, default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Number of analysts to generate
    #[arg(short = 'n', long, default_value_t = DEFAULT_NUM_ANALYSTS)]
    pub analysts: usize,

    /// Maximum number of expert answers per interview
    #[arg(long, default_value_t = DEFAULT_MAX_INTERVIEW_TURNS)]
    pub turns: usize,

    /// Thread id for checkpoints (default: a new UUID)
    #[arg(long)]
    pub thread_id: Option<String>,
}

impl TopicArgs {
    pub fn thread_id(&self) -> String {
        self.thread_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Maximum interviews running at once (default: all)
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Keep the other source's results when one search provider fails
    #[arg(long)]
    pub degrade_retrieval: bool,

    /// Write the report from the interviews that succeeded
    #[arg(long)]
    pub skip_failed_interviews: bool,
}

impl From<&EngineArgs> for WorkflowConfig {
    fn from(args: &EngineArgs) -> Self {
        Self {
            max_concurrent_interviews: args.max_concurrent,
            retrieval_failure_policy: if args.degrade_retrieval {
                RetrievalFailurePolicy::Degrade
            } else {
                RetrievalFailurePolicy::FailFast
            },
            interview_failure_policy: if args.skip_failed_interviews {
                InterviewFailurePolicy::SkipFailed
            } else {
                InterviewFailurePolicy::AbortRun
            },
        }
    }
}

/// Human-readable analyst listing
pub fn format_analysts(analysts: &[Analyst]) -> String {
    analysts
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "{}. {}\n   Affiliation: {}\n   Role: {}\n   Description: {}",
                i + 1,
                a.name,
                a.affiliation,
                a.role,
                a.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First `max_chars` characters, and whether anything was cut
pub fn preview(report: &str, max_chars: usize) -> (String, bool) {
    match report.char_indices().nth(max_chars) {
        Some((cut, _)) => (report[..cut].to_string(), true),
        None => (report.to_string(), false),
    }
}
