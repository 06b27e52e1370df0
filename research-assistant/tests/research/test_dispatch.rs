//! Parallel interview dispatch

use std::collections::HashSet;
use std::sync::Arc;

use research_assistant::research::{
    InterviewDispatcher, InterviewFailurePolicy, InterviewRunner, ResearchError,
};

use super::common::{analysts, section_of, ScriptedGenerator, StaticSearch, TOPIC};

fn dispatcher(generator: Arc<ScriptedGenerator>) -> InterviewDispatcher {
    let runner = InterviewRunner::new(
        generator,
        Arc::new(StaticSearch::new("web")),
        Arc::new(StaticSearch::new("wikipedia")),
    );
    InterviewDispatcher::new(Arc::new(runner))
}

fn as_set(sections: &[String]) -> HashSet<String> {
    sections.iter().cloned().collect()
}

#[tokio::test]
async fn test_one_section_per_analyst_regardless_of_completion_order() {
    let team = analysts(&["Ada", "Grace", "Alan"]);
    // First analyst finishes last
    let generator = Arc::new(
        ScriptedGenerator::new(vec![team.clone()])
            .with_delay("Ada", 80)
            .with_delay("Grace", 40),
    );

    let sections = dispatcher(generator).dispatch(&team, TOPIC, 1).await.unwrap();

    assert_eq!(sections.len(), 3);
    let expected: HashSet<String> =
        ["Ada", "Grace", "Alan"].iter().map(|n| section_of(n)).collect();
    assert_eq!(as_set(&sections), expected);
}

#[tokio::test]
async fn test_concurrency_cap_still_covers_every_analyst() {
    let team = analysts(&["Ada", "Grace", "Alan", "Barbara"]);
    let generator = Arc::new(ScriptedGenerator::new(vec![team.clone()]));

    let sections = dispatcher(generator)
        .with_max_concurrent(Some(1))
        .dispatch(&team, TOPIC, 2)
        .await
        .unwrap();

    assert_eq!(sections.len(), 4);
}

#[tokio::test]
async fn test_no_analysts_yields_no_sections() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Vec::new()]));

    let sections = dispatcher(generator).dispatch(&[], TOPIC, 1).await.unwrap();

    assert!(sections.is_empty());
}

#[tokio::test]
async fn test_abort_run_reports_failed_interview_after_siblings_finish() {
    let team = analysts(&["Ada", "Grace", "Alan"]);
    let generator = Arc::new(ScriptedGenerator::new(vec![team.clone()]).failing_for("Grace"));

    let err = dispatcher(generator.clone())
        .dispatch(&team, TOPIC, 1)
        .await
        .unwrap_err();

    match &err {
        ResearchError::InterviewFailed { index, analyst, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(analyst, "Grace");
        }
        other => panic!("expected interview failure, got {other:?}"),
    }
    assert!(matches!(err.root_cause(), ResearchError::Generation(_)));

    // Siblings were not cancelled
    assert_eq!(generator.answers_for("Ada"), 1);
    assert_eq!(generator.answers_for("Alan"), 1);
}

#[tokio::test]
async fn test_skip_failed_merges_successful_sections() {
    let team = analysts(&["Ada", "Grace", "Alan"]);
    let generator = Arc::new(ScriptedGenerator::new(vec![team.clone()]).failing_for("Ada"));

    let sections = dispatcher(generator)
        .with_failure_policy(InterviewFailurePolicy::SkipFailed)
        .dispatch(&team, TOPIC, 1)
        .await
        .unwrap();

    let expected: HashSet<String> = ["Grace", "Alan"].iter().map(|n| section_of(n)).collect();
    assert_eq!(as_set(&sections), expected);
}

#[tokio::test]
async fn test_skip_failed_still_fails_when_nothing_succeeds() {
    let team = analysts(&["Ada", "Grace"]);
    let generator = Arc::new(
        ScriptedGenerator::new(vec![team.clone()])
            .failing_for("Ada")
            .failing_for("Grace"),
    );

    let err = dispatcher(generator)
        .with_failure_policy(InterviewFailurePolicy::SkipFailed)
        .dispatch(&team, TOPIC, 1)
        .await
        .unwrap_err();

    assert!(matches!(err, ResearchError::InterviewFailed { index: 0, .. }));
}
