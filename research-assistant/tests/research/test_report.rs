//! Report assembly and the "no result" outcome

use std::sync::Arc;
use std::time::{Duration, Instant};

use research_assistant::research::backend::Purpose;
use research_assistant::research::phase2_report::PART_SEPARATOR;
use research_assistant::research::workflow::save_outcome;
use research_assistant::research::{finalize_report, ReportOutcome, ReportWriter, ResearchError};

use super::common::{RecordingSink, ScriptedGenerator};

#[test]
fn test_finalize_strips_insights_and_moves_sources() {
    let report =
        finalize_report(Some("I"), Some("## InsightsX\n## Sources\nS1"), Some("C")).unwrap();
    assert_eq!(report, "I\n\n---\n\nX\n\n---\n\nC\n\n## Sources\nS1");
}

#[test]
fn test_finalize_plain_body() {
    let report = finalize_report(Some("I"), Some("plain body"), Some("C")).unwrap();
    assert_eq!(report, "I\n\n---\n\nplain body\n\n---\n\nC");
}

#[test]
fn test_insights_heading_is_only_removed_as_prefix() {
    let body = "Intro line\n## Insights\nmore";
    let report = finalize_report(Some("I"), Some(body), Some("C")).unwrap();
    assert!(report.contains("## Insights"));
}

#[test]
fn test_finalize_requires_every_part() {
    let err = finalize_report(Some("I"), None, None).unwrap_err();
    match err {
        ResearchError::Convergence(message) => {
            assert!(message.contains("content"));
            assert!(message.contains("conclusion"));
            assert!(!message.contains("introduction"));
        }
        other => panic!("expected convergence error, got {other:?}"),
    }
}

#[test]
fn test_whitespace_parts_are_no_result() {
    let report = finalize_report(Some("  "), Some("\n\t"), Some("")).unwrap();
    assert_eq!(ReportOutcome::from_report(&report), ReportOutcome::NoResult);

    let report =
        finalize_report(Some(" "), Some("## Insights \n## Sources\n "), Some(" ")).unwrap();
    assert_eq!(ReportOutcome::from_report(&report), ReportOutcome::NoResult);

    let report = finalize_report(Some(" "), Some("real content"), Some(" ")).unwrap();
    assert!(matches!(ReportOutcome::from_report(&report), ReportOutcome::Report(_)));
}

#[tokio::test]
async fn test_writers_receive_joined_sections() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Vec::new()]));
    let writer = ReportWriter::new(generator.clone());
    let sections = vec!["## One\nfirst".to_string(), "## Two\nsecond".to_string()];

    let (introduction, body, conclusion) = tokio::join!(
        writer.write_introduction(&sections, "topic"),
        writer.write_report(&sections, "topic"),
        writer.write_conclusion(&sections, "topic"),
    );
    assert!(introduction.unwrap().starts_with("## Introduction"));
    assert!(body.unwrap().starts_with("## Insights"));
    assert!(conclusion.unwrap().starts_with("## Conclusion"));

    let joined = format!("## One\nfirst{}## Two\nsecond", PART_SEPARATOR);
    for purpose in [Purpose::Introduction, Purpose::Report, Purpose::Conclusion] {
        let calls = generator.calls(purpose);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].instructions.contains(&joined));
    }
}

#[tokio::test]
async fn test_report_parts_are_written_concurrently() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Vec::new()]).with_writer_delay(300));
    let writer = ReportWriter::new(generator.clone());
    let sections = vec!["## One\nfirst".to_string()];

    let started = Instant::now();
    let (introduction, body, conclusion) = tokio::join!(
        writer.write_introduction(&sections, "topic"),
        writer.write_report(&sections, "topic"),
        writer.write_conclusion(&sections, "topic"),
    );
    let elapsed = started.elapsed();

    assert!(introduction.is_ok() && body.is_ok() && conclusion.is_ok());
    assert!(elapsed < Duration::from_millis(600), "writers ran serially: {elapsed:?}");
}

#[tokio::test]
async fn test_no_result_is_not_saved() {
    let sink = RecordingSink::default();

    let saved = save_outcome(&sink, &ReportOutcome::NoResult, "out.md").await.unwrap();
    assert!(!saved);
    assert!(sink.saved.lock().unwrap().is_empty());

    let outcome = ReportOutcome::Report("I\n\n---\n\nB\n\n---\n\nC".to_string());
    let saved = save_outcome(&sink, &outcome, "out.md").await.unwrap();
    assert!(saved);
    assert_eq!(sink.saved.lock().unwrap()[0].0, "out.md");
}
