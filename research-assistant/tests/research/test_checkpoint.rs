//! Checkpoint persistence, including resuming after a restart

use std::sync::Arc;

use research_assistant::research::{
    collect_report, Checkpoint, Checkpointer, MemoryCheckpointer, Node, ReportOutcome,
    SqliteCheckpointer, WorkflowConfig, WorkflowState,
};
use tempfile::TempDir;

use super::common::{analysts, drain, workflow, ScriptedGenerator, TOPIC};

#[tokio::test]
async fn test_sqlite_resume_after_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state").join("checkpoints.db");

    {
        let checkpointer = Arc::new(SqliteCheckpointer::open(&db_path).unwrap());
        let generator = Arc::new(ScriptedGenerator::new(vec![analysts(&["Ada", "Grace"])]));
        let wf = workflow(generator, checkpointer, WorkflowConfig::default());

        drain(wf.start("thread-1", TOPIC, 2, 1)).await.unwrap();
    }

    // Fresh process: new connection, new backends
    let checkpointer = Arc::new(SqliteCheckpointer::open(&db_path).unwrap());
    let generator = Arc::new(ScriptedGenerator::new(vec![analysts(&["Unused"])]));
    let wf = workflow(generator.clone(), checkpointer.clone(), WorkflowConfig::default());

    let paused = wf.get_state("thread-1").await.unwrap();
    assert_eq!(paused.next, Some(Node::HumanFeedback));
    assert_eq!(paused.state.analysts.len(), 2);

    let outcome = collect_report(wf.resume("thread-1")).await.unwrap();
    assert!(matches!(outcome, ReportOutcome::Report(_)));

    // The stored analysts were interviewed, not regenerated ones
    assert_eq!(generator.answers_for("Ada"), 1);
    assert_eq!(generator.answers_for("Grace"), 1);

    let done = checkpointer.load("thread-1").await.unwrap().unwrap();
    assert_eq!(done.next, None);
    assert_eq!(done.state.sections.len(), 2);
}

#[tokio::test]
async fn test_sqlite_history_is_ordered_by_step() {
    let checkpointer = Arc::new(SqliteCheckpointer::in_memory().unwrap());
    let generator = Arc::new(ScriptedGenerator::new(vec![analysts(&["Ada"])]));
    let wf = workflow(generator, checkpointer.clone(), WorkflowConfig::default());

    drain(wf.start("thread-1", TOPIC, 1, 1)).await.unwrap();
    drain(wf.resume("thread-1")).await.unwrap();

    let history = checkpointer.history("thread-1").await.unwrap();
    let nexts: Vec<Option<Node>> = history.iter().map(|c| c.next).collect();
    assert_eq!(
        nexts,
        vec![
            Some(Node::CreateAnalysts),
            Some(Node::HumanFeedback),
            Some(Node::ConductInterviews),
            Some(Node::WriteReport),
            Some(Node::FinalizeReport),
            None,
        ]
    );
    assert_eq!(history.first().unwrap().step, 0);
    assert_eq!(history.last().unwrap().step, 5);
    assert_eq!(checkpointer.schema_version().unwrap(), 1);
}

#[tokio::test]
async fn test_sqlite_and_memory_store_the_same_state() {
    let mut state = WorkflowState::new(TOPIC, 2, 3);
    state.analysts = analysts(&["Ada", "Grace"]);
    state.human_feedback = Some("more economists".to_string());
    let checkpoint = Checkpoint::new("thread-1", 1, state, Some(Node::HumanFeedback));

    let sqlite = SqliteCheckpointer::in_memory().unwrap();
    let memory = MemoryCheckpointer::new();
    sqlite.save(&checkpoint).await.unwrap();
    memory.save(&checkpoint).await.unwrap();

    let from_sqlite = sqlite.load("thread-1").await.unwrap().unwrap();
    let from_memory = memory.load("thread-1").await.unwrap().unwrap();
    assert_eq!(from_sqlite.state, from_memory.state);
    assert_eq!(from_sqlite.next, from_memory.next);
    assert_eq!(from_sqlite.step, 1);

    assert!(sqlite.load("other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_threads_most_recent_first() {
    let checkpointer = SqliteCheckpointer::in_memory().unwrap();

    let state = WorkflowState::new(TOPIC, 1, 1);
    let older = Checkpoint::new("older", 0, state.clone(), Some(Node::CreateAnalysts));
    let mut newer = Checkpoint::new("newer", 0, state, Some(Node::CreateAnalysts));
    newer.updated_at = older.updated_at + chrono::Duration::seconds(5);

    checkpointer.save(&older).await.unwrap();
    checkpointer.save(&newer).await.unwrap();

    assert_eq!(checkpointer.list_threads().await.unwrap(), vec!["newer", "older"]);
}
