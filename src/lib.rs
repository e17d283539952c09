//! ticketrelay: watches Discord ticket and chat channels, summarizes them with
//! a language model, and forwards the results to Telegram.

pub mod access;
pub mod analysis;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod llm;
pub mod logging;
pub mod messaging;
pub mod prompts;
pub mod scheduler;
pub mod secrets;
pub mod settings;

pub use error::{Error, Result};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message observed on the source platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_id: u64,
    /// None for direct messages.
    pub guild_id: Option<String>,
    /// Parent category when the adapter knows it.
    pub category_id: Option<u64>,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Authored by this bot.
    pub from_self: bool,
}

/// A channel created on the source platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCreated {
    pub channel_id: u64,
    pub category_id: Option<u64>,
}
