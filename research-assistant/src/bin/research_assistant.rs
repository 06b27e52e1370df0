/*
┌─────────────────────────────────────────────────────────────────────────────┐
│                       MULTI-ANALYST RESEARCH ASSISTANT                       │
└─────────────────────────────────────────────────────────────────────────────┘

  Step 1: CREATE ANALYSTS
    └─> One structured call: topic + count (+ feedback) -> analyst personas

         ↓

  Step 2: HUMAN FEEDBACK (pause, checkpointed)
    ├─> feedback given  -> back to Step 1
    └─> approved        -> Step 3

         ↓

  Step 3: CONDUCT INTERVIEWS (one task per analyst)
    └─> question -> web || wikipedia search -> answer -> ... -> section

         ↓

  Step 4: WRITE REPORT (introduction || body || conclusion)

         ↓

  Step 5: FINALIZE REPORT
    └─> introduction --- body --- conclusion + sources

EXAMPLE COMMANDS:

  # Interactive run
  research-assistant run --topic "Open source LLM tooling" -n 3 --turns 2

  # Same flow across separate invocations
  research-assistant start --topic "Open source LLM tooling" -n 3 --thread-id llm-tools
  research-assistant feedback llm-tools "Add an analyst from a startup"
  research-assistant resume llm-tools --output reports/llm_tools.md
  research-assistant show llm-tools
*/

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;

use research_assistant::backends::{FileSink, OpenAiBackend, TavilySearch, WikipediaSearch};
use research_assistant::research::cli::{
    format_analysts, preview, Cli, Command, EngineArgs, PREVIEW_CHARS,
};
use research_assistant::research::workflow::{save_outcome, SnapshotStream};
use research_assistant::research::{
    Node, ReportOutcome, ResearchWorkflow, Settings, SqliteCheckpointer, WorkflowConfig,
};
use research_assistant_sdk::{
    log_error, log_file_saved, log_found, log_info, log_warning, set_events_enabled,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_events {
        set_events_enabled(false);
    }

    let checkpointer = Arc::new(open_checkpointer(cli.checkpoint_db.clone())?);

    let result = match cli.command {
        Command::Run { topic, output, engine } => {
            let workflow = build_workflow(&engine, checkpointer)?;
            let thread_id = topic.thread_id();
            log_info!("Research topic: {} (thread {})", topic.topic, thread_id);

            follow(workflow.start(&thread_id, &topic.topic, topic.analysts, topic.turns)).await?;
            while let Some(feedback) = ask_for_feedback().await? {
                follow(workflow.submit_feedback(&thread_id, &feedback)).await?;
            }
            log_info!("Proceeding without additional feedback");

            let report = follow(workflow.resume(&thread_id)).await?;
            finish(report, &output).await
        }
        Command::Start { topic, engine } => {
            let workflow = build_workflow(&engine, checkpointer)?;
            let thread_id = topic.thread_id();
            follow(workflow.start(&thread_id, &topic.topic, topic.analysts, topic.turns)).await?;

            println!();
            println!("Thread: {}", thread_id);
            println!("  research-assistant feedback {} \"<what to change>\"", thread_id);
            println!("  research-assistant resume {}", thread_id);
            Ok(())
        }
        Command::Feedback { thread_id, feedback, engine } => {
            let workflow = build_workflow(&engine, checkpointer)?;
            follow(workflow.submit_feedback(&thread_id, &feedback)).await?;
            Ok(())
        }
        Command::Resume { thread_id, output, engine } => {
            let workflow = build_workflow(&engine, checkpointer)?;
            let report = follow(workflow.resume(&thread_id)).await?;
            finish(report, &output).await
        }
        Command::Show { thread_id, history } => show(checkpointer, thread_id, history).await,
    };

    if let Err(e) = &result {
        log_error!("An error occurred: {:#}", e);
    }
    result
}

fn open_checkpointer(path: Option<PathBuf>) -> Result<SqliteCheckpointer> {
    let path = match path {
        Some(path) => path,
        None => SqliteCheckpointer::default_path()?,
    };
    SqliteCheckpointer::open(&path)
        .with_context(|| format!("Failed to open checkpoint database: {}", path.display()))
}

fn build_workflow(
    engine: &EngineArgs,
    checkpointer: Arc<SqliteCheckpointer>,
) -> Result<ResearchWorkflow> {
    let settings = Settings::from_env().context("Invalid configuration")?;
    let generator = OpenAiBackend::from_settings(&settings)?;
    log_info!("Using model: {}", generator.model_label());

    Ok(ResearchWorkflow::new(
        Arc::new(generator),
        Arc::new(TavilySearch::from_settings(&settings)?),
        Arc::new(WikipediaSearch::from_settings(&settings)?),
        checkpointer,
        WorkflowConfig::from(engine),
    ))
}

/// Print updates as they arrive; returns the final report if one was produced
async fn follow(mut updates: SnapshotStream) -> Result<Option<String>> {
    let mut final_report = None;

    while let Some(update) = updates.next().await {
        let update = update?;
        match update.node {
            Node::CreateAnalysts => {
                if let Some(analysts) = &update.delta.analysts {
                    log_found!(analysts.len(), "analysts");
                    println!("\n{}\n", format_analysts(analysts));
                }
            }
            Node::ConductInterviews => {
                log_found!(update.delta.sections.len(), "sections");
            }
            Node::WriteReport => {
                log_info!("Report introduction, body and conclusion generated");
            }
            Node::FinalizeReport => {
                final_report = update.delta.final_report;
            }
            Node::HumanFeedback => {}
        }
    }

    Ok(final_report)
}

/// `Some(feedback)` to regenerate, `None` to continue
async fn ask_for_feedback() -> Result<Option<String>> {
    loop {
        let question = "Do you want to provide feedback on the analysts? (y/n): ";
        let Some(answer) = prompt(question).await? else {
            return Ok(None);
        };
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => {
                let feedback = prompt("Please provide your feedback: ").await?.unwrap_or_default();
                if feedback.trim().is_empty() {
                    log_warning!("Empty feedback, keeping the current analysts");
                    return Ok(None);
                }
                return Ok(Some(feedback.trim().to_string()));
            }
            "n" | "no" => return Ok(None),
            _ => log_warning!("Invalid input. Please enter 'y' or 'n'."),
        }
    }
}

/// Read one line from stdin; `None` at end of input
async fn prompt(message: &str) -> Result<Option<String>> {
    print!("\x1b[33m{}\x1b[0m", message);
    io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).map(|read| (read > 0).then_some(line))
    })
    .await
    .context("Failed to read from stdin")??;
    Ok(line)
}

async fn finish(report: Option<String>, output: &str) -> Result<()> {
    let Some(report) = report else {
        bail!("The run stopped before the report was finalized");
    };

    let outcome = ReportOutcome::from_report(&report);
    if !save_outcome(&FileSink::new(), &outcome, output).await? {
        log_warning!("No report content was generated.");
        return Ok(());
    }
    log_file_saved!(output);

    let (text, truncated) = preview(&report, PREVIEW_CHARS);
    if truncated {
        println!("\n\x1b[35mReport Preview:\x1b[0m");
        println!("{}...\n\x1b[90m(Truncated - see full report in {})\x1b[0m", text, output);
    } else {
        println!("\n\x1b[35mGenerated Report:\x1b[0m");
        println!("{}", text);
    }
    Ok(())
}

async fn show(
    checkpointer: Arc<SqliteCheckpointer>,
    thread_id: Option<String>,
    history: bool,
) -> Result<()> {
    use research_assistant::research::Checkpointer;

    let Some(thread_id) = thread_id else {
        let threads = checkpointer.list_threads().await?;
        if threads.is_empty() {
            log_info!("No threads recorded yet");
        }
        for id in threads {
            if let Some(checkpoint) = checkpointer.load(&id).await? {
                println!(
                    "{}  {:?}  step {}  {}",
                    id,
                    checkpoint.status(),
                    checkpoint.step,
                    checkpoint.state.topic
                );
            }
        }
        return Ok(());
    };

    let checkpoints = if history {
        checkpointer.history(&thread_id).await?
    } else {
        checkpointer.load(&thread_id).await?.into_iter().collect()
    };
    if checkpoints.is_empty() {
        bail!("Unknown thread: {}", thread_id);
    }

    for checkpoint in checkpoints {
        println!("---");
        print!("{}", serde_yaml::to_string(&checkpoint)?);
    }
    Ok(())
}
