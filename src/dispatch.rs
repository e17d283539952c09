//! Result delivery: fixed templates and a single send attempt.

use crate::analysis::{AnalysisResult, ChatSummary, TicketProblem};
use crate::error::DeliveryError;
use crate::messaging::MessagingDyn;

use std::sync::Arc;

/// Formats analysis results and hands them to the destination adapter.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn MessagingDyn>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sink", &self.sink.name())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn MessagingDyn>) -> Self {
        Self { sink }
    }

    /// Render a result with its variant's template.
    pub fn format(result: &AnalysisResult) -> String {
        match result {
            AnalysisResult::Ticket(problem) => format_ticket(problem),
            AnalysisResult::Chat(summary) => format_chat(summary),
        }
    }

    /// Deliver once. Failures are reported, not retried.
    pub async fn deliver(&self, result: &AnalysisResult, target: &str) -> Result<(), DeliveryError> {
        let text = Self::format(result);
        match self.sink.send_message(target, &text).await {
            Ok(()) => {
                tracing::info!(push_target = target, mode = %result.mode(), adapter = self.sink.name(), "result delivered");
                Ok(())
            }
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(%error, push_target = target, "transient delivery failure");
                } else {
                    tracing::error!(%error, push_target = target, "permanent delivery failure");
                }
                Err(error)
            }
        }
    }
}

fn format_ticket(problem: &TicketProblem) -> String {
    format!(
        "**Problem #{}**\n\
         **Type**: {}\n\
         **Summary**: {}\n\
         **Details**: {}\n\
         **Source**: {}\n\
         **User**: {}\n\
         **Time**: {}\n\
         **Link**: {}\n\
         **Original**:\n{}",
        problem.id,
        problem.problem_type,
        problem.summary,
        problem.details,
        problem.source,
        problem.user,
        problem.timestamp,
        problem.link,
        problem.original,
    )
}

fn format_chat(summary: &ChatSummary) -> String {
    format!(
        "**Chat Summary**\n\
         **Published**: {}\n\
         **Period**: last {}h ({}/{} messages analyzed)\n\
         **Mood**: {}\n\
         **Discussion**: {}\n\
         **Key events**: {}\n\
         **Suggestion**: {}",
        summary.publish_time,
        summary.monitor_period,
        summary.monitored_messages,
        summary.total_messages,
        summary.emotion,
        summary.discussion_summary,
        summary.key_events,
        summary.suggestion,
    )
}
