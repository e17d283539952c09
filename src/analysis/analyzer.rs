//! The analyzer: renders a prompt, makes exactly one model call, and turns
//! the raw reply into a typed result.

use crate::analysis::format_local_time;
use crate::analysis::types::{
    AnalysisMode, AnalysisResult, ChatReply, ChatSummary, TicketProblem, TicketReply, reply_schema,
};
use crate::conversation::{ConversationMessage, channel_link, transcript};
use crate::error::AnalysisError;
use crate::llm::{CompletionRequest, Completer};
use crate::prompts::{PromptEngine, RenderedPrompt};
use crate::settings::LlmCredentials;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::{Arc, LazyLock};

static FENCED_JSON_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("hardcoded fenced json regex")
});

static BRACED_SPAN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("hardcoded braced span regex"));

/// Everything about a ticket channel the analyzer needs besides the messages.
#[derive(Debug, Clone)]
pub struct TicketContext {
    pub guild_id: String,
    pub channel_id: u64,
    pub channel_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub timezone_offset: i32,
    pub credentials: Option<LlmCredentials>,
}

#[derive(Debug, Clone)]
pub struct ChatContext {
    pub period_hours: u32,
    pub credentials: Option<LlmCredentials>,
}

#[derive(Debug, Clone)]
pub enum AnalysisContext {
    Ticket(TicketContext),
    General(ChatContext),
}

impl AnalysisContext {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            AnalysisContext::Ticket(_) => AnalysisMode::Ticket,
            AnalysisContext::General(_) => AnalysisMode::General,
        }
    }
}

pub struct Analyzer {
    completer: Arc<dyn Completer>,
    prompts: PromptEngine,
    ticket_schema: String,
    chat_schema: String,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").finish_non_exhaustive()
    }
}

impl Analyzer {
    pub fn new(completer: Arc<dyn Completer>) -> Result<Self, AnalysisError> {
        Ok(Self {
            completer,
            prompts: PromptEngine::new()?,
            ticket_schema: reply_schema::<TicketReply>(),
            chat_schema: reply_schema::<ChatReply>(),
        })
    }

    /// Analyze a conversation in the mode implied by `context`.
    pub async fn analyze(
        &self,
        conversation: &[ConversationMessage],
        context: &AnalysisContext,
    ) -> Result<AnalysisResult, AnalysisError> {
        match context {
            AnalysisContext::Ticket(context) => self
                .analyze_ticket(conversation, context)
                .await
                .map(AnalysisResult::Ticket),
            AnalysisContext::General(context) => self
                .analyze_chat(conversation, context)
                .await
                .map(AnalysisResult::Chat),
        }
    }

    /// Extract the problem raised in a ticket channel.
    ///
    /// An empty conversation is a "no issue" result without a model call.
    pub async fn analyze_ticket(
        &self,
        conversation: &[ConversationMessage],
        context: &TicketContext,
    ) -> Result<TicketProblem, AnalysisError> {
        let source = context.channel_name.clone();
        let link = channel_link(&context.guild_id, context.channel_id);
        let opened_at = context
            .created_at
            .or_else(|| conversation.first().map(|message| message.timestamp))
            .unwrap_or_else(Utc::now);
        let timestamp = format_local_time(opened_at, context.timezone_offset);

        if conversation.is_empty() {
            tracing::debug!(channel_id = context.channel_id, "empty ticket conversation, skipping model call");
            return Ok(TicketProblem {
                id: 0,
                problem_type: String::new(),
                summary: String::new(),
                details: String::new(),
                source,
                user: String::new(),
                timestamp,
                original: String::new(),
                is_valid: false,
                link,
            });
        }

        let prompt = self.prompts.render_ticket(
            &self.ticket_schema,
            &context.channel_name,
            &transcript(conversation),
            conversation.len(),
        )?;
        let raw = self.complete(prompt, context.credentials.clone()).await?;
        let reply: TicketReply = parse_reply(&raw)?;

        if reply.is_valid && reply.summary.trim().is_empty() {
            return Err(AnalysisError::MalformedResponse(
                "reply marked valid but has an empty summary".into(),
            ));
        }

        let user = if reply.user.trim().is_empty() {
            conversation
                .first()
                .map(|message| message.user.clone())
                .unwrap_or_default()
        } else {
            reply.user
        };

        tracing::info!(
            channel_id = context.channel_id,
            is_valid = reply.is_valid,
            problem_type = %reply.problem_type,
            "ticket analysis complete"
        );

        Ok(TicketProblem {
            id: 0,
            problem_type: reply.problem_type,
            summary: reply.summary,
            details: reply.details,
            source,
            user,
            timestamp,
            original: reply.original,
            is_valid: reply.is_valid,
            link,
        })
    }

    /// Summarize a monitored channel. Window metadata is left for the caller.
    pub async fn analyze_chat(
        &self,
        conversation: &[ConversationMessage],
        context: &ChatContext,
    ) -> Result<ChatSummary, AnalysisError> {
        let prompt = self.prompts.render_chat(
            &self.chat_schema,
            context.period_hours,
            &transcript(conversation),
            conversation.len(),
        )?;
        let raw = self.complete(prompt, context.credentials.clone()).await?;
        let reply: ChatReply = parse_reply(&raw)?;

        if reply.discussion_summary.trim().is_empty() {
            return Err(AnalysisError::MalformedResponse(
                "chat summary has an empty discussion_summary".into(),
            ));
        }

        Ok(ChatSummary::from(reply))
    }

    async fn complete(
        &self,
        prompt: RenderedPrompt,
        credentials: Option<LlmCredentials>,
    ) -> Result<String, AnalysisError> {
        self.completer
            .complete(CompletionRequest {
                system_prompt: prompt.system,
                user_prompt: prompt.user,
                credentials,
            })
            .await
            .map_err(|error| AnalysisError::TransportFailure(error.to_string()))
    }
}

/// Decode a model reply: raw JSON, a fenced code block, or the first braced span.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, AnalysisError> {
    let trimmed = raw.trim();
    let mut last_error = None;

    let candidates = std::iter::once(trimmed)
        .chain(
            FENCED_JSON_REGEX
                .captures(trimmed)
                .and_then(|captures| captures.get(1))
                .map(|found| found.as_str()),
        )
        .chain(BRACED_SPAN_REGEX.find(trimmed).map(|found| found.as_str()));

    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(reply) => return Ok(reply),
            Err(error) => last_error = Some(error),
        }
    }

    let reason = last_error
        .map(|error| error.to_string())
        .unwrap_or_else(|| "no JSON object found".into());
    let (excerpt, _) = crate::logging::truncate_for_log(trimmed, 200);
    Err(AnalysisError::MalformedResponse(format!(
        "{reason} (reply: {excerpt})"
    )))
}
