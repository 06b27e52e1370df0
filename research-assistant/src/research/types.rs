//! Data structures for research workflows

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phrase an analyst uses to wrap up; seeing it in a question ends the interview
pub const CLOSING_PHRASE: &str = "Thank you so much for your help";

/// A generated persona with a fixed viewpoint, used to drive one interview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analyst {
    pub name: String,
    pub affiliation: String,
    pub role: String,
    pub description: String,
}

impl Analyst {
    /// Persona text handed to the question and answer prompts
    pub fn persona(&self) -> String {
        format!(
            "Name: {}\nRole: {}\nAffiliation: {}\nDescription: {}\n",
            self.name, self.role, self.affiliation, self.description
        )
    }
}

/// Structured output requested from the generation backend for analysts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perspectives {
    pub analysts: Vec<Analyst>,
}

/// Structured output requested when turning a transcript into a search query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub search_query: String,
}

/// Who spoke a turn.
///
/// `Host` marks the scripted opening prompt; it is never counted as an
/// expert answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Analyst,
    Expert,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Host => "Host",
            Role::Analyst => "Analyst",
            Role::Expert => "Expert",
        }
    }
}

/// One turn of an interview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn host(text: impl Into<String>) -> Self {
        Self {
            role: Role::Host,
            text: text.into(),
        }
    }

    pub fn analyst(text: impl Into<String>) -> Self {
        Self {
            role: Role::Analyst,
            text: text.into(),
        }
    }

    pub fn expert(text: impl Into<String>) -> Self {
        Self {
            role: Role::Expert,
            text: text.into(),
        }
    }
}

/// Scripted turn every interview starts with
pub fn opening_turn(topic: &str) -> Turn {
    Turn::host(format!("So you said you were writing an article on {}?", topic))
}

/// Flatten turns into role-prefixed dialogue lines
pub fn render_transcript(messages: &[Turn]) -> String {
    messages
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Working state of a single analyst interview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewState {
    pub analyst: Analyst,
    pub messages: Vec<Turn>,
    pub max_num_turns: usize,
    /// Formatted retrieval blocks, append-only
    pub context: Vec<String>,
    /// Transcript, set by the save step
    pub interview: Option<String>,
    /// Singleton once the section has been written
    pub sections: Vec<String>,
}

impl InterviewState {
    /// Fresh interview seeded with the opening turn for `topic`
    pub fn new(analyst: Analyst, topic: &str, max_num_turns: usize) -> Self {
        Self {
            analyst,
            messages: vec![opening_turn(topic)],
            max_num_turns,
            context: Vec::new(),
            interview: None,
            sections: Vec::new(),
        }
    }

    pub fn expert_answers(&self) -> usize {
        count_expert_answers(&self.messages)
    }

    /// All retrieved context joined into one block
    pub fn joined_context(&self) -> String {
        self.context.join("\n\n")
    }
}

pub fn count_expert_answers(messages: &[Turn]) -> usize {
    messages.iter().filter(|m| m.role == Role::Expert).count()
}

/// Top-level persistent record of one research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub topic: String,
    pub max_analysts: usize,
    pub max_interview_turns: usize,
    #[serde(default)]
    pub analysts: Vec<Analyst>,
    #[serde(default)]
    pub human_feedback: Option<String>,
    /// Merge-only; order follows interview completion, not analyst order
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default)]
    pub introduction: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub final_report: Option<String>,
}

impl WorkflowState {
    pub fn new(topic: impl Into<String>, max_analysts: usize, max_interview_turns: usize) -> Self {
        Self {
            topic: topic.into(),
            max_analysts,
            max_interview_turns,
            analysts: Vec::new(),
            human_feedback: None,
            sections: Vec::new(),
            introduction: None,
            content: None,
            conclusion: None,
            final_report: None,
        }
    }

    /// Feedback that should trigger regeneration (non-blank only)
    pub fn pending_feedback(&self) -> Option<&str> {
        self.human_feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Merge the output of one superstep into the state
    pub fn apply(&mut self, delta: &StateDelta) {
        if let Some(analysts) = &delta.analysts {
            self.analysts = analysts.clone();
        }
        if let Some(feedback) = &delta.human_feedback {
            self.human_feedback = feedback.clone();
        }
        self.sections.extend(delta.sections.iter().cloned());
        if let Some(introduction) = &delta.introduction {
            self.introduction = Some(introduction.clone());
        }
        if let Some(content) = &delta.content {
            self.content = Some(content.clone());
        }
        if let Some(conclusion) = &delta.conclusion {
            self.conclusion = Some(conclusion.clone());
        }
        if let Some(final_report) = &delta.final_report {
            self.final_report = Some(final_report.clone());
        }
    }
}

/// Fields written by one superstep.
///
/// `analysts` replaces the list, `sections` is appended, and
/// `human_feedback` is `Some(None)` when feedback was cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StateDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysts: Option<Vec<Analyst>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<Option<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        *self == StateDelta::default()
    }
}

/// Nodes of the top-level research graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    CreateAnalysts,
    HumanFeedback,
    ConductInterviews,
    /// Introduction, body and conclusion writers running side by side
    WriteReport,
    FinalizeReport,
}

impl Node {
    pub const ALL: [Node; 5] = [
        Node::CreateAnalysts,
        Node::HumanFeedback,
        Node::ConductInterviews,
        Node::WriteReport,
        Node::FinalizeReport,
    ];

    /// Stable identifier used in checkpoints and events
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::CreateAnalysts => "create_analysts",
            Node::HumanFeedback => "human_feedback",
            Node::ConductInterviews => "conduct_interviews",
            Node::WriteReport => "write_report",
            Node::FinalizeReport => "finalize_report",
        }
    }

    pub fn parse(value: &str) -> Option<Node> {
        Node::ALL.into_iter().find(|node| node.as_str() == value)
    }

    /// 1-based stage number for progress events
    pub fn phase(&self) -> usize {
        match self {
            Node::CreateAnalysts => 1,
            Node::HumanFeedback => 2,
            Node::ConductInterviews => 3,
            Node::WriteReport => 4,
            Node::FinalizeReport => 5,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Node::CreateAnalysts => "Create Analysts",
            Node::HumanFeedback => "Human Feedback",
            Node::ConductInterviews => "Conduct Interviews",
            Node::WriteReport => "Write Report",
            Node::FinalizeReport => "Finalize Report",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One incremental snapshot streamed to callers after a superstep
#[derive(Debug, Clone, Serialize)]
pub struct StateUpdate {
    pub thread_id: String,
    /// Checkpoint step this update was saved under.
    ///
    /// Passing the feedback point consumes a step that is checkpointed but
    /// never streamed, so the first update after `submit_feedback` or
    /// `resume` skips one step number. `history` shows every step.
    pub step: u64,
    pub node: Node,
    pub delta: StateDelta,
    /// Where execution goes next; `None` once the run is done
    pub next: Option<Node>,
}
