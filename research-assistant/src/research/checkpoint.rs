//! Durable workflow checkpoints
//!
//! A [`Checkpoint`] is written after every superstep: the full
//! [`WorkflowState`] plus the node execution continues from. Loading the
//! latest checkpoint for a thread is enough to resume a paused or interrupted
//! run, including after a process restart when the SQLite store is used.
//!
//! # Database Schema
//!
//! 1. **checkpoints** - latest checkpoint per thread
//! 2. **checkpoint_history** - every superstep, keyed by (thread, step)
//! 3. **schema_version** - schema version for migrations

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use research_assistant_sdk::{async_trait, WorkflowStatus};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::research::error::{ResearchError, Result};
use crate::research::types::{Node, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Number of supersteps completed so far
    pub step: u64,
    pub state: WorkflowState,
    /// Node to run on resume; `None` once the run has finished
    pub next: Option<Node>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        thread_id: impl Into<String>,
        step: u64,
        state: WorkflowState,
        next: Option<Node>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step,
            state,
            next,
            updated_at: Utc::now(),
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        match self.next {
            None => WorkflowStatus::Completed,
            Some(Node::HumanFeedback) => WorkflowStatus::AwaitingFeedback,
            Some(_) => WorkflowStatus::Running,
        }
    }
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Latest checkpoint for `thread_id`
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Every checkpoint for `thread_id`, oldest first
    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;

    /// Known thread ids, most recently updated first
    async fn list_threads(&self) -> Result<Vec<String>>;
}

/// Process-local checkpoints
#[derive(Default)]
pub struct MemoryCheckpointer {
    threads: tokio::sync::Mutex<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let threads = self.threads.lock().await;
        Ok(threads.get(thread_id).and_then(|history| history.last().cloned()))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut threads = self.threads.lock().await;
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        history.retain(|existing| existing.step != checkpoint.step);
        history.push(checkpoint.clone());
        history.sort_by_key(|c| c.step);
        Ok(())
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let threads = self.threads.lock().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let threads = self.threads.lock().await;
        let mut latest: Vec<(DateTime<Utc>, String)> = threads
            .iter()
            .filter_map(|(id, history)| history.last().map(|c| (c.updated_at, id.clone())))
            .collect();
        latest.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(latest.into_iter().map(|(_, id)| id).collect())
    }
}

/// SQLite-backed checkpoints that survive restarts
#[derive(Clone)]
pub struct SqliteCheckpointer {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointer {
    /// Open (or create) the database at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ResearchError::Checkpoint(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(&path)?;
        // Enable WAL mode for better concurrent access
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `~/.research-assistant/checkpoints.db`
    pub fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".research-assistant").join("checkpoints.db"))
            .ok_or_else(|| {
                ResearchError::Checkpoint("could not determine home directory".to_string())
            })
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                step INTEGER NOT NULL,
                next_node TEXT,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checkpoint_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                next_node TEXT,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,

                UNIQUE(thread_id, step)
            );

            CREATE INDEX IF NOT EXISTS idx_history_thread ON checkpoint_history(thread_id, step);

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        conn.execute("INSERT OR IGNORE INTO schema_version (version) VALUES (1)", [])?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.lock()?;
        let version =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| {
                ResearchError::Checkpoint("checkpoint connection lock poisoned".to_string())
            })
    }

    /// Run blocking SQLite work off the async runtime
    async fn with_conn<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| {
                ResearchError::Checkpoint("checkpoint connection lock poisoned".to_string())
            })?;
            work(&guard)
        })
        .await
        .map_err(|e| ResearchError::Checkpoint(format!("checkpoint task failed: {}", e)))?
    }
}

/// Raw column values of one checkpoint row
type CheckpointRow = (String, i64, Option<String>, String, String);

fn decode_row(row: CheckpointRow) -> Result<Checkpoint> {
    let (thread_id, step, next_node, state, updated_at) = row;

    let next = match next_node {
        Some(name) => Some(Node::parse(&name).ok_or_else(|| {
            ResearchError::Checkpoint(format!("unknown node '{}' in checkpoint", name))
        })?),
        None => None,
    };
    let state: WorkflowState = serde_json::from_str(&state)
        .map_err(|e| ResearchError::Checkpoint(format!("corrupt checkpoint state: {}", e)))?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| ResearchError::Checkpoint(format!("corrupt checkpoint timestamp: {}", e)))?
        .with_timezone(&Utc);

    Ok(Checkpoint {
        thread_id,
        step: step as u64,
        state,
        next,
        updated_at,
    })
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let row: Option<CheckpointRow> = conn
                .query_row(
                    "SELECT thread_id, step, next_node, state, updated_at
                     FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )
                .optional()?;
            row.map(decode_row).transpose()
        })
        .await
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let state = serde_json::to_string(&checkpoint.state)
            .map_err(|e| ResearchError::Checkpoint(format!("failed to serialize state: {}", e)))?;
        let thread_id = checkpoint.thread_id.clone();
        let step = checkpoint.step as i64;
        let next = checkpoint.next.map(|n| n.as_str().to_string());
        let updated_at = checkpoint.updated_at.to_rfc3339();

        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO checkpoints (thread_id, step, next_node, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    step = excluded.step,
                    next_node = excluded.next_node,
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                params![thread_id, step, next, state, updated_at],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO checkpoint_history
                    (thread_id, step, next_node, state, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![thread_id, step, next, state, updated_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let thread_id = thread_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT thread_id, step, next_node, state, created_at
                 FROM checkpoint_history WHERE thread_id = ?1 ORDER BY step ASC",
            )?;
            let rows = stmt
                .query_map(params![thread_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
                })?
                .collect::<std::result::Result<Vec<CheckpointRow>, _>>()?;
            rows.into_iter().map(decode_row).collect()
        })
        .await
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT thread_id FROM checkpoints ORDER BY updated_at DESC")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
    }
}
