//! Analysis results and the reply shapes the model is asked to produce.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// One support case in a ticket channel.
    Ticket,
    /// Periodic summary of a monitored channel.
    General,
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMode::Ticket => write!(f, "ticket"),
            AnalysisMode::General => write!(f, "general"),
        }
    }
}

/// What the model returns for a ticket conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct TicketReply {
    /// False when the conversation contains no actionable problem.
    pub is_valid: bool,
    /// Short category label, e.g. "Bug report" or "Feature request".
    #[serde(default)]
    pub problem_type: String,
    /// One-sentence summary of the problem.
    #[serde(default)]
    pub summary: String,
    /// Objective restatement of the problem.
    #[serde(default)]
    pub details: String,
    /// Name of the user who raised the problem.
    #[serde(default)]
    pub user: String,
    /// The message that best states the problem, verbatim.
    #[serde(default)]
    pub original: String,
}

/// What the model returns for a chat summary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ChatReply {
    /// Overall mood of the channel.
    #[serde(default)]
    pub emotion: String,
    /// Main topics of discussion.
    #[serde(default)]
    pub discussion_summary: String,
    /// Events worth an operator's attention.
    #[serde(default)]
    pub key_events: String,
    /// One concrete follow-up for the operators.
    #[serde(default)]
    pub suggestion: String,
}

/// A problem extracted from a ticket channel.
///
/// `source`, `timestamp` and `link` are computed locally, never by the model.
/// `id` stays 0 until the scheduler assigns one right before delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketProblem {
    pub id: u64,
    pub problem_type: String,
    pub summary: String,
    pub details: String,
    pub source: String,
    pub user: String,
    pub timestamp: String,
    pub original: String,
    pub is_valid: bool,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSummary {
    pub emotion: String,
    pub discussion_summary: String,
    pub key_events: String,
    pub suggestion: String,
    pub publish_time: String,
    /// Window length in hours.
    pub monitor_period: u32,
    pub monitored_messages: usize,
    pub total_messages: usize,
}

impl From<ChatReply> for ChatSummary {
    /// Window metadata is left zeroed for the caller to fill.
    fn from(reply: ChatReply) -> Self {
        Self {
            emotion: reply.emotion,
            discussion_summary: reply.discussion_summary,
            key_events: reply.key_events,
            suggestion: reply.suggestion,
            publish_time: String::new(),
            monitor_period: 0,
            monitored_messages: 0,
            total_messages: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Ticket(TicketProblem),
    Chat(ChatSummary),
}

impl AnalysisResult {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            AnalysisResult::Ticket(_) => AnalysisMode::Ticket,
            AnalysisResult::Chat(_) => AnalysisMode::General,
        }
    }
}

/// Pretty JSON schema for a reply type, embedded in prompts.
pub fn reply_schema<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}
