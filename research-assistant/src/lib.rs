//! Multi-analyst research report workflow.
//!
//! - [`research`]: the workflow engine and its components (persona generation,
//!   interviews, report assembly, checkpointing)
//! - [`workflow_utils`]: fan-out and stage logging helpers shared by the phases
//! - [`backends`]: concrete generation, retrieval and persistence backends

pub mod backends;
pub mod research;
pub mod workflow_utils;
