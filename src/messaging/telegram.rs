//! Telegram destination adapter (teloxide).

use crate::error::{DeliveryError, Result};
use crate::messaging::traits::Messaging;
use crate::messaging::truncate_message;

use anyhow::Context as _;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient};

/// Telegram's limit on a single text message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Sends formatted results to Telegram chats through the Bot API.
#[derive(Clone)]
pub struct TelegramAdapter {
    bot: Bot,
}

impl std::fmt::Debug for TelegramAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAdapter").finish_non_exhaustive()
    }
}

impl TelegramAdapter {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Long-poll for updates and answer `/chat_id` with the id of the chat
    /// it was sent in, so operators can find a value for `set_push_target`.
    ///
    /// Runs until the dispatcher stops.
    pub async fn run_chat_id_responder(&self) {
        tracing::info!("starting Telegram long polling");

        let handler = Update::filter_message().endpoint(|bot: Bot, msg: Message| async move {
            let Some(text) = msg.text() else {
                return respond(());
            };
            if !is_chat_id_command(text) {
                return respond(());
            }

            tracing::debug!(chat_id = msg.chat.id.0, "answering chat id request");
            if let Err(error) = bot
                .send_message(msg.chat.id, format!("Chat ID: {}", msg.chat.id.0))
                .await
            {
                tracing::warn!(%error, chat_id = msg.chat.id.0, "failed to answer chat id request");
            }
            respond(())
        });

        Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|_| async {})
            .build()
            .dispatch()
            .await;

        tracing::info!("Telegram long polling stopped");
    }
}

impl Messaging for TelegramAdapter {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_message(&self, target: &str, text: &str) -> std::result::Result<(), DeliveryError> {
        let chat_id = parse_chat_id(target)?;
        let text = truncate_message(text, MAX_MESSAGE_CHARS);

        self.bot
            .send_message(Recipient::Id(chat_id), text)
            .await
            .map_err(|error| classify_error(target, &error))?;

        tracing::debug!(chat_id = chat_id.0, "telegram message sent");
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let me = self
            .bot
            .get_me()
            .await
            .context("telegram get_me failed")?;
        tracing::debug!(username = ?me.username, "telegram bot reachable");
        Ok(())
    }
}

fn parse_chat_id(target: &str) -> std::result::Result<ChatId, DeliveryError> {
    target
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| DeliveryError::Permanent {
            target: target.to_string(),
            message: "target is not a numeric chat id".into(),
        })
}

/// Rate limits and connection problems are worth retrying; API rejections
/// such as an unknown chat or a kicked bot are not.
fn classify_error(target: &str, error: &RequestError) -> DeliveryError {
    let target = target.to_string();
    let message = error.to_string();
    match error {
        RequestError::RetryAfter(_) | RequestError::Network(_) | RequestError::Io(_) => {
            DeliveryError::Transient { target, message }
        }
        _ => DeliveryError::Permanent { target, message },
    }
}

/// Matches `/chat_id` and the `/chat_id@botname` form used in groups.
fn is_chat_id_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .and_then(|command| command.split('@').next())
        .is_some_and(|command| command == "/chat_id")
}
