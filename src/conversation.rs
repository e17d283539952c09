//! Conversation windows pulled from source channels.

pub mod fetcher;

pub use fetcher::{ChannelInfo, ConversationFetcher, FetchWindow};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message of a fetched conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub user: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(user: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            content: content.into(),
            timestamp,
        }
    }
}

/// Keep only the most recent `max` messages of an oldest-first window.
///
/// Older messages beyond the cap are dropped from analysis, not re-queued.
pub fn most_recent(mut messages: Vec<ConversationMessage>, max: usize) -> Vec<ConversationMessage> {
    if messages.len() > max {
        messages.drain(..messages.len() - max);
    }
    messages
}

/// Render a conversation as one `[timestamp] user: content` line per message.
pub fn transcript(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            format!(
                "[{}] {}: {}",
                message.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                message.user,
                message.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deep link to a source channel.
pub fn channel_link(guild_id: &str, channel_id: u64) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}")
}
