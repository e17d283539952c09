//! Windowing contract for pulling messages out of a source channel.

use crate::conversation::ConversationMessage;
use crate::error::FetchError;

use chrono::{DateTime, Utc};

/// Which slice of a channel's history to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// The newest `limit` messages.
    Latest { limit: usize },
    /// Every message at or after `since`, bounded by `ceiling` to protect
    /// against runaway channels.
    Since { since: DateTime<Utc>, ceiling: usize },
}

/// Metadata about a source channel needed to describe a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel_id: u64,
    pub guild_id: String,
    pub name: String,
    pub category_id: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Source-platform collaborator that reads channel history.
///
/// Implementations return messages oldest first.
#[async_trait::async_trait]
pub trait ConversationFetcher: Send + Sync + 'static {
    async fn fetch(
        &self,
        channel_id: u64,
        window: FetchWindow,
    ) -> Result<Vec<ConversationMessage>, FetchError>;

    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo, FetchError>;
}
