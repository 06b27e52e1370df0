//! Workflow utilities for standardized batch/task execution
//!
//! - **batch**: Concurrent fan-out with a concurrency cap, all tasks settle
//! - **task**: Task-level logging around a unit of work

pub mod batch;
pub mod task;

pub use batch::{execute_batch, TaskContext};
pub use task::execute_task;
