//! Progress reporting for research-assistant workflows.
//!
//! Two channels are provided:
//!
//! - [`WorkflowLog`] events, serialized as JSON and written to stderr with the
//!   `__WF_EVENT__:` prefix so a supervising process (CLI wrapper, UI) can follow
//!   a run in real time. The `log_*!` macros build and emit them.
//! - Colored console macros (`log_info!`, `log_warning!`, ...) for the human
//!   sitting in front of the terminal.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

// Re-export async trait for convenience
pub use async_trait::async_trait;

static EVENTS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Turn structured event emission on or off for the whole process.
///
/// Console macros are unaffected.
pub fn set_events_enabled(enabled: bool) {
    EVENTS_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Whether [`WorkflowLog::emit`] currently writes anything.
pub fn events_enabled() -> bool {
    EVENTS_ENABLED.load(Ordering::Relaxed)
}

/// Lifecycle of a research run as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    NotStarted,
    Running,
    AwaitingFeedback,
    Completed,
    Failed,
}

/// Structured progress events emitted while a research workflow runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowLog {
    /// A workflow stage (graph node) started
    PhaseStarted {
        phase: usize,
        name: String,
        total_phases: usize,
    },
    PhaseCompleted {
        phase: usize,
        name: String,
    },
    PhaseFailed {
        phase: usize,
        name: String,
        error: String,
    },
    /// A unit of work inside a stage (one interview, one report writer)
    TaskStarted {
        phase: usize,
        task_id: String,
        description: String,
        total_tasks: Option<usize>,
    },
    TaskProgress {
        task_id: String,
        message: String,
    },
    TaskCompleted {
        task_id: String,
        result: Option<String>,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    /// A persona acting inside a task (analyst or expert)
    AgentStarted {
        task_id: String,
        agent_name: String,
        description: String,
    },
    AgentMessage {
        task_id: String,
        agent_name: String,
        message: String,
    },
    AgentCompleted {
        task_id: String,
        agent_name: String,
        result: Option<String>,
    },
    AgentFailed {
        task_id: String,
        agent_name: String,
        error: String,
    },
    /// Workflow state was checkpointed after a superstep
    CheckpointSaved {
        thread_id: String,
        step: u64,
        next: Option<String>,
    },
    /// Execution paused waiting for an external value
    Interrupted {
        thread_id: String,
        node: String,
    },
    /// A file was written (final report)
    StateFileCreated {
        phase: usize,
        file_path: String,
        description: String,
    },
}

impl WorkflowLog {
    /// Write this event to stderr as a single `__WF_EVENT__:` line
    pub fn emit(&self) {
        if !events_enabled() {
            return;
        }
        if let Ok(json) = serde_json::to_string(self) {
            use std::io::Write;
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "__WF_EVENT__:{}", json);
            let _ = stderr.flush();
        }
    }

    /// Parse a line previously produced by [`WorkflowLog::emit`]
    pub fn parse_line(line: &str) -> Option<Self> {
        line.strip_prefix("__WF_EVENT__:")
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

#[macro_export]
macro_rules! log_phase_start {
    ($phase:expr, $name:expr, $total:expr) => {
        $crate::WorkflowLog::PhaseStarted {
            phase: $phase,
            name: $name.to_string(),
            total_phases: $total,
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_complete {
    ($phase:expr, $name:expr) => {
        $crate::WorkflowLog::PhaseCompleted {
            phase: $phase,
            name: $name.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_phase_failed {
    ($phase:expr, $name:expr, $error:expr) => {
        $crate::WorkflowLog::PhaseFailed {
            phase: $phase,
            name: $name.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_start {
    ($phase:expr, $task_id:expr, $desc:expr) => {
        $crate::WorkflowLog::TaskStarted {
            phase: $phase,
            task_id: $task_id.to_string(),
            description: $desc.to_string(),
            total_tasks: None,
        }
        .emit();
    };
    ($phase:expr, $task_id:expr, $desc:expr, $total:expr) => {
        $crate::WorkflowLog::TaskStarted {
            phase: $phase,
            task_id: $task_id.to_string(),
            description: $desc.to_string(),
            total_tasks: Some($total),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_progress {
    ($task_id:expr, $msg:expr) => {
        $crate::WorkflowLog::TaskProgress {
            task_id: $task_id.to_string(),
            message: $msg.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_complete {
    ($task_id:expr) => {
        $crate::WorkflowLog::TaskCompleted {
            task_id: $task_id.to_string(),
            result: None,
        }
        .emit();
    };
    ($task_id:expr, $result:expr) => {
        $crate::WorkflowLog::TaskCompleted {
            task_id: $task_id.to_string(),
            result: Some($result.to_string()),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_task_failed {
    ($task_id:expr, $error:expr) => {
        $crate::WorkflowLog::TaskFailed {
            task_id: $task_id.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_agent_start {
    ($task_id:expr, $agent:expr, $desc:expr) => {
        $crate::WorkflowLog::AgentStarted {
            task_id: $task_id.to_string(),
            agent_name: $agent.to_string(),
            description: $desc.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_agent_message {
    ($task_id:expr, $agent:expr, $msg:expr) => {
        $crate::WorkflowLog::AgentMessage {
            task_id: $task_id.to_string(),
            agent_name: $agent.to_string(),
            message: $msg.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_agent_complete {
    ($task_id:expr, $agent:expr) => {
        $crate::WorkflowLog::AgentCompleted {
            task_id: $task_id.to_string(),
            agent_name: $agent.to_string(),
            result: None,
        }
        .emit();
    };
    ($task_id:expr, $agent:expr, $result:expr) => {
        $crate::WorkflowLog::AgentCompleted {
            task_id: $task_id.to_string(),
            agent_name: $agent.to_string(),
            result: Some($result.to_string()),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_agent_failed {
    ($task_id:expr, $agent:expr, $error:expr) => {
        $crate::WorkflowLog::AgentFailed {
            task_id: $task_id.to_string(),
            agent_name: $agent.to_string(),
            error: $error.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_checkpoint {
    ($thread_id:expr, $step:expr, $next:expr) => {
        $crate::WorkflowLog::CheckpointSaved {
            thread_id: $thread_id.to_string(),
            step: $step,
            next: $next.map(|n| n.to_string()),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_interrupt {
    ($thread_id:expr, $node:expr) => {
        $crate::WorkflowLog::Interrupted {
            thread_id: $thread_id.to_string(),
            node: $node.to_string(),
        }
        .emit();
    };
}

#[macro_export]
macro_rules! log_state_file {
    ($phase:expr, $path:expr, $desc:expr) => {
        $crate::WorkflowLog::StateFileCreated {
            phase: $phase,
            file_path: $path.to_string(),
            description: $desc.to_string(),
        }
        .emit();
    };
}

// ============================================================================
// Console Logging Macros
// ============================================================================

/// Prints a stage banner with a short description.
///
/// ```text
/// ═══ STEP 1: Create Analysts ═══
/// Generating 3 analysts for 'quantum sensing'
/// ```
#[macro_export]
macro_rules! log_phase_start_console {
    ($phase:expr, $title:expr, $description:expr) => {
        println!("\x1b[1;36m═══ STEP {}: {} ═══\x1b[0m", $phase, $title);
        println!("\x1b[36m{}\x1b[0m", $description);
    };
}

#[macro_export]
macro_rules! log_phase_complete_console {
    ($phase:expr) => {
        println!("\x1b[32m✓ Step {} complete\x1b[0m", $phase);
    };
}

/// ```text
/// → Running 3 interviews in parallel
/// ```
#[macro_export]
macro_rules! log_parallel_start {
    ($num_items:expr, $item_type:expr) => {
        println!(
            "\x1b[36m→ Running {} {} in parallel\x1b[0m",
            $num_items, $item_type
        );
    };
}

#[macro_export]
macro_rules! log_parallel_complete {
    ($num_items:expr, $item_type:expr) => {
        println!("\x1b[32m✓ {} {} completed\x1b[0m", $num_items, $item_type);
    };
}

#[macro_export]
macro_rules! log_found {
    ($count:expr, $item_type:expr) => {
        println!("\x1b[36mFound {} {}\x1b[0m", $count, $item_type);
    };
}

#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

#[macro_export]
macro_rules! log_error {
    ($message:expr) => {
        eprintln!("\x1b[1;31m✗ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        eprintln!("\x1b[1;31m✗ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        println!("\x1b[32m✓ Saved: {}\x1b[0m", $path);
    };
}
