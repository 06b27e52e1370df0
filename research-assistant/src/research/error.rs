//! Error taxonomy for the research workflow

use crate::research::types::Node;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResearchError>;

#[derive(Error, Debug)]
pub enum ResearchError {
    /// Backend returned no output, invalid structured output, or the call failed
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Retrieval error ({source_name}): {message}")]
    Retrieval {
        source_name: String,
        message: String,
    },

    /// Turn-limit/closing-phrase check received a malformed transcript
    #[error("Routing error: {0}")]
    Routing(String),

    /// Finalize invoked before all report parts exist
    #[error("Convergence error: {0}")]
    Convergence(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Invalid state at {node}: {message}")]
    InvalidState { node: Node, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Thread '{thread_id}' is not waiting for feedback (next: {next})")]
    NotAwaitingFeedback { thread_id: String, next: String },

    #[error("Unknown thread: {0}")]
    UnknownThread(String),

    /// `index` is the analyst's 0-based position; the message counts from 1
    #[error("Interview {} ({analyst}) failed: {source}", .index + 1)]
    InterviewFailed {
        index: usize,
        analyst: String,
        #[source]
        source: Box<ResearchError>,
    },

    /// Wraps any failure with the stage that produced it
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: Node,
        #[source]
        source: Box<ResearchError>,
    },
}

impl ResearchError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    pub fn retrieval(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Retrieval {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(node: Node, message: impl Into<String>) -> Self {
        Self::InvalidState {
            node,
            message: message.into(),
        }
    }

    pub fn in_stage(self, stage: Node) -> Self {
        match self {
            // Already tagged
            err @ Self::StageFailed { .. } => err,
            err => Self::StageFailed {
                stage,
                source: Box::new(err),
            },
        }
    }

    /// Innermost error, skipping stage and interview wrappers
    pub fn root_cause(&self) -> &ResearchError {
        match self {
            Self::StageFailed { source, .. } | Self::InterviewFailed { source, .. } => {
                source.root_cause()
            }
            err => err,
        }
    }

    /// Stage the error was raised in, if it has been tagged
    pub fn stage(&self) -> Option<Node> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ResearchError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Checkpoint(err.to_string())
    }
}
