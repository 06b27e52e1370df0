//! Interview state machine: turn limit, closing phrase, retrieval policies

use std::sync::Arc;
use std::time::{Duration, Instant};

use research_assistant::research::backend::{ChatRole, Purpose};
use research_assistant::research::interview::{route_messages, Route};
use research_assistant::research::types::{Role, Turn, CLOSING_PHRASE};
use research_assistant::research::{
    InterviewRunner, InterviewState, ResearchError, RetrievalFailurePolicy,
};

use super::common::{analyst, section_of, FailingSearch, ScriptedGenerator, StaticSearch, TOPIC};

fn runner(generator: Arc<ScriptedGenerator>) -> InterviewRunner {
    InterviewRunner::new(
        generator,
        Arc::new(StaticSearch::new("web")),
        Arc::new(StaticSearch::new("wikipedia")),
    )
}

#[tokio::test]
async fn test_stops_after_max_expert_turns() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let state = InterviewState::new(analyst("Ada"), TOPIC, 3);

    let finished = runner(generator.clone()).run(state, "interview_1").await.unwrap();

    assert_eq!(finished.expert_answers(), 3);
    assert_eq!(generator.answers_for("Ada"), 3);
    assert_eq!(finished.messages[0].role, Role::Host);
    // Two sources per search step
    assert_eq!(finished.context.len(), 6);
    assert_eq!(finished.sections, vec![section_of("Ada")]);

    let transcript = finished.interview.unwrap();
    assert!(transcript.starts_with("Host: So you said you were writing an article on"));
}

#[tokio::test]
async fn test_closing_phrase_ends_interview_early() {
    let generator =
        Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]).closing_on_question(2));
    let state = InterviewState::new(analyst("Ada"), TOPIC, 10);

    let finished = runner(generator).run(state, "interview_1").await.unwrap();

    assert_eq!(finished.expert_answers(), 2);
    let last_question = finished
        .messages
        .iter()
        .rev()
        .find(|turn| turn.role == Role::Analyst)
        .unwrap();
    assert!(last_question.text.contains(CLOSING_PHRASE));
}

#[tokio::test]
async fn test_turn_limit_wins_over_missing_closing_phrase() {
    let generator =
        Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]).closing_on_question(5));
    let state = InterviewState::new(analyst("Ada"), TOPIC, 1);

    let finished = runner(generator).run(state, "interview_1").await.unwrap();

    assert_eq!(finished.expert_answers(), 1);
}

#[tokio::test]
async fn test_analyst_sees_own_turns_as_assistant_messages() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let state = InterviewState::new(analyst("Ada"), TOPIC, 2);

    runner(generator.clone()).run(state, "interview_1").await.unwrap();

    let questions = generator.calls(Purpose::Question);
    assert_eq!(questions.len(), 2);
    let roles: Vec<_> = questions[1].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]);
}

#[test]
fn test_routing_decisions() {
    let opening = Turn::host("So you said you were writing an article on x?");

    assert!(matches!(
        route_messages(&[opening.clone()], 2),
        Err(ResearchError::Routing(_))
    ));

    let messages = vec![opening.clone(), Turn::analyst("Why?"), Turn::expert("Because.")];
    assert_eq!(route_messages(&messages, 2).unwrap(), Route::AskQuestion);
    assert_eq!(route_messages(&messages, 1).unwrap(), Route::SaveTranscript);

    let closing = vec![
        opening,
        Turn::analyst(format!("{}!", CLOSING_PHRASE)),
        Turn::expert("You're welcome."),
    ];
    assert_eq!(route_messages(&closing, 5).unwrap(), Route::SaveTranscript);
}

#[tokio::test]
async fn test_fail_fast_aborts_on_retrieval_error() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let runner = InterviewRunner::new(
        generator,
        Arc::new(FailingSearch::new("web")),
        Arc::new(StaticSearch::new("wikipedia")),
    );

    let err = runner
        .run(InterviewState::new(analyst("Ada"), TOPIC, 1), "interview_1")
        .await
        .unwrap_err();

    match err {
        ResearchError::Retrieval { source_name, .. } => assert_eq!(source_name, "web"),
        other => panic!("expected retrieval error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_degrade_keeps_surviving_source() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let wikipedia = Arc::new(StaticSearch::new("wikipedia"));
    let runner = InterviewRunner::new(
        generator,
        Arc::new(FailingSearch::new("web")),
        wikipedia.clone(),
    )
    .with_retrieval_policy(RetrievalFailurePolicy::Degrade);

    let finished = runner
        .run(InterviewState::new(analyst("Ada"), TOPIC, 2), "interview_1")
        .await
        .unwrap();

    assert_eq!(wikipedia.calls(), 2);
    assert_eq!(finished.context.len(), 2);
    assert!(finished.context[0].contains("<Document ref=\"https://wikipedia.example.com/doc\">"));
}

#[tokio::test]
async fn test_sources_are_searched_concurrently() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let web = Arc::new(StaticSearch::new("web").with_delay(300));
    let wikipedia = Arc::new(StaticSearch::new("wikipedia").with_delay(300));
    let runner = InterviewRunner::new(generator.clone(), web.clone(), wikipedia.clone());

    let started = Instant::now();
    let finished = runner
        .run(InterviewState::new(analyst("Ada"), TOPIC, 1), "interview_1")
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(600), "searches ran serially: {elapsed:?}");
    assert_eq!(finished.context.len(), 2);
    assert_eq!((web.calls(), wikipedia.calls()), (1, 1));
    // Both sources share the one generated query
    assert_eq!(generator.count(Purpose::SearchQuery), 1);
}

#[tokio::test]
async fn test_one_search_query_per_turn() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let state = InterviewState::new(analyst("Ada"), TOPIC, 3);

    let finished = runner(generator.clone()).run(state, "interview_1").await.unwrap();

    assert_eq!(finished.expert_answers(), 3);
    assert_eq!(generator.count(Purpose::SearchQuery), 3);
}

#[tokio::test]
async fn test_degrade_fails_when_both_sources_fail() {
    let generator = Arc::new(ScriptedGenerator::new(vec![vec![analyst("Ada")]]));
    let runner = InterviewRunner::new(
        generator,
        Arc::new(FailingSearch::new("web")),
        Arc::new(FailingSearch::new("wikipedia")),
    )
    .with_retrieval_policy(RetrievalFailurePolicy::Degrade);

    let err = runner
        .run(InterviewState::new(analyst("Ada"), TOPIC, 1), "interview_1")
        .await
        .unwrap_err();

    assert!(matches!(err, ResearchError::Retrieval { .. }));
}
