//! Discord source adapter (serenity): gateway events, slash commands, and
//! channel history for the analyzer.

use crate::access::{AccessLevel, Actor};
use crate::commands::{COMMANDS, CommandRequest, CommandRouter, CommandSpec, OptionKind};
use crate::conversation::{ChannelInfo, ConversationFetcher, ConversationMessage, FetchWindow};
use crate::error::FetchError;
use crate::messaging::truncate_message;
use crate::scheduler::TriggerScheduler;
use crate::{ChannelCreated, InboundMessage};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    Channel, ChannelId, Command, CommandDataOptionValue, CommandInteraction, CommandOptionType,
    Context, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse, EventHandler, GatewayIntents,
    GetMessages, GuildChannel, GuildId, Interaction, Message, MessageId, Permissions, Ready,
    Timestamp, UserId,
};
use serenity::Client;
use serenity::http::Http;
use std::collections::HashMap;
use std::sync::Arc;

/// Discord returns at most this many messages per history request.
const PAGE_SIZE: usize = 100;

/// Interaction replies are capped at this many characters.
const MAX_REPLY_CHARS: usize = 2000;

/// Reads channel history over the Discord REST API.
#[derive(Clone)]
pub struct DiscordFetcher {
    http: Arc<Http>,
}

impl std::fmt::Debug for DiscordFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordFetcher").finish_non_exhaustive()
    }
}

impl DiscordFetcher {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Confirm the token is accepted by fetching the bot's own user.
    pub async fn health_check(&self) -> crate::Result<()> {
        let user = self
            .http
            .get_current_user()
            .await
            .context("discord get_current_user failed")?;
        tracing::debug!(username = %user.name, "discord bot reachable");
        Ok(())
    }
}

#[async_trait]
impl ConversationFetcher for DiscordFetcher {
    async fn fetch(
        &self,
        channel_id: u64,
        window: FetchWindow,
    ) -> Result<Vec<ConversationMessage>, FetchError> {
        let channel = ChannelId::new(channel_id);
        let (since, max) = match window {
            FetchWindow::Latest { limit } => (None, limit),
            FetchWindow::Since { since, ceiling } => (Some(since), ceiling),
        };

        let mut collected: Vec<ConversationMessage> = Vec::new();
        let mut before: Option<MessageId> = None;

        while collected.len() < max {
            let page_size = (max - collected.len()).min(PAGE_SIZE);
            let mut request = GetMessages::new().limit(page_size as u8);
            if let Some(before) = before {
                request = request.before(before);
            }

            let page = channel
                .messages(self.http.as_ref(), request)
                .await
                .map_err(|error| fetch_error(channel_id, error))?;
            let full_page = page.len() == page_size;
            before = page.last().map(|message| message.id);

            let converted = page.iter().map(to_conversation_message).collect();
            let reached_since = extend_newest_first(&mut collected, converted, since, max);
            if reached_since || !full_page {
                break;
            }
        }

        collected.reverse();
        tracing::debug!(channel_id, fetched = collected.len(), "discord history fetched");
        Ok(collected)
    }

    async fn channel_info(&self, channel_id: u64) -> Result<ChannelInfo, FetchError> {
        let id = ChannelId::new(channel_id);
        let channel = id
            .to_channel(self.http.as_ref())
            .await
            .map_err(|error| fetch_error(channel_id, error))?;

        let Channel::Guild(channel) = channel else {
            return Err(FetchError::Platform(format!(
                "channel {channel_id} is not a guild channel"
            )));
        };

        Ok(ChannelInfo {
            channel_id,
            guild_id: channel.guild_id.to_string(),
            name: channel.name.clone(),
            category_id: channel.parent_id.map(|parent| parent.get()),
            created_at: Some(to_utc(id.created_at())),
        })
    }
}

/// Append one newest-first page to `collected`, stopping at the first
/// message older than `since` or once `max` messages are held.
///
/// Returns true when the page crossed `since`, meaning older pages are not
/// needed.
fn extend_newest_first(
    collected: &mut Vec<ConversationMessage>,
    page: Vec<ConversationMessage>,
    since: Option<DateTime<Utc>>,
    max: usize,
) -> bool {
    for message in page {
        if since.is_some_and(|since| message.timestamp < since) {
            return true;
        }
        if collected.len() >= max {
            break;
        }
        collected.push(message);
    }
    false
}

fn to_conversation_message(message: &Message) -> ConversationMessage {
    let user = message
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| message.author.global_name.clone())
        .unwrap_or_else(|| message.author.name.clone());
    ConversationMessage::new(
        user,
        message.content.clone(),
        to_utc(message.timestamp),
    )
}

fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    *timestamp
}

fn fetch_error(channel_id: u64, error: serenity::Error) -> FetchError {
    if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) = &error
        && response.status_code.as_u16() == 404
    {
        return FetchError::ChannelNotFound { channel_id };
    }
    FetchError::Platform(error.to_string())
}

/// Bridges gateway events into the scheduler and the command router.
pub struct DiscordHandler {
    scheduler: TriggerScheduler,
    router: Arc<CommandRouter>,
}

impl DiscordHandler {
    pub fn new(scheduler: TriggerScheduler, router: Arc<CommandRouter>) -> Self {
        Self { scheduler, router }
    }

    async fn register_commands(&self, ctx: &Context) {
        match Command::set_global_commands(&ctx.http, build_commands()).await {
            Ok(registered) => {
                tracing::info!(count = registered.len(), "registered global slash commands");
            }
            Err(error) => tracing::warn!(%error, "failed to register global slash commands"),
        }
    }

    async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) {
        let deferred = command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(
                    CreateInteractionResponseMessage::new().ephemeral(true),
                ),
            )
            .await;
        if let Err(error) = deferred {
            tracing::warn!(%error, command = %command.data.name, "failed to defer interaction");
            return;
        }

        let request = CommandRequest {
            name: command.data.name.clone(),
            actor: actor_from_interaction(command),
            guild_id: command.guild_id.map(|guild_id| guild_id.to_string()),
            channel_id: command.channel_id.get(),
            args: command
                .data
                .options
                .iter()
                .filter_map(|option| {
                    option_value_to_string(&option.value).map(|value| (option.name.clone(), value))
                })
                .collect::<HashMap<_, _>>(),
        };

        let reply = self.router.handle(request).await;
        let edited = command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new().content(truncate_message(&reply, MAX_REPLY_CHARS)),
            )
            .await;
        if let Err(error) = edited {
            tracing::warn!(%error, command = %command.data.name, "failed to send interaction reply");
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(username = %ready.user.name, guilds = ready.guilds.len(), "discord connected");
        self.register_commands(&ctx).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let own_id = ctx.cache.current_user().id;
        let inbound = InboundMessage {
            channel_id: msg.channel_id.get(),
            guild_id: msg.guild_id.map(|guild_id| guild_id.to_string()),
            category_id: cached_category(&ctx, msg.guild_id, msg.channel_id),
            author: msg.author.name.clone(),
            content: msg.content.clone(),
            created_at: to_utc(msg.timestamp),
            from_self: is_self_authored(msg.author.id, own_id),
        };

        let outcome = self.scheduler.on_message(&inbound);
        tracing::trace!(channel_id = inbound.channel_id, ?outcome, "message handled");
    }

    async fn channel_create(&self, _ctx: Context, channel: GuildChannel) {
        self.scheduler.on_channel_created(ChannelCreated {
            channel_id: channel.id.get(),
            category_id: channel.parent_id.map(|parent| parent.get()),
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            self.handle_command(&ctx, &command).await;
        }
    }
}

/// Connect to the gateway and process events until the connection ends.
pub async fn run_discord(token: &str, handler: DiscordHandler) -> anyhow::Result<()> {
    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("failed to create discord client")?;

    client.start().await.context("discord client stopped")?;
    Ok(())
}

/// Only this bot's own messages are self-authored; other bots' messages are
/// ordinary traffic.
fn is_self_authored(author: UserId, own_id: UserId) -> bool {
    author == own_id
}

fn cached_category(ctx: &Context, guild_id: Option<GuildId>, channel_id: ChannelId) -> Option<u64> {
    let guild = ctx.cache.guild(guild_id?)?;
    let parent = guild.channels.get(&channel_id)?.parent_id?;
    Some(parent.get())
}

fn actor_from_interaction(command: &CommandInteraction) -> Actor {
    let member = command.member.as_deref();
    Actor {
        user_id: command.user.id.get(),
        display_name: command
            .user
            .global_name
            .clone()
            .unwrap_or_else(|| command.user.name.clone()),
        role_ids: member
            .map(|member| member.roles.iter().map(|role| role.get()).collect())
            .unwrap_or_default(),
        is_administrator: member
            .and_then(|member| member.permissions)
            .is_some_and(|permissions| permissions.administrator()),
    }
}

fn option_value_to_string(value: &CommandDataOptionValue) -> Option<String> {
    match value {
        CommandDataOptionValue::String(value) => Some(value.clone()),
        CommandDataOptionValue::Integer(value) => Some(value.to_string()),
        CommandDataOptionValue::Channel(channel) => Some(format!("<#{channel}>")),
        _ => None,
    }
}

fn build_commands() -> Vec<CreateCommand> {
    COMMANDS.iter().map(build_command).collect()
}

fn build_command(spec: &CommandSpec) -> CreateCommand {
    let mut command = CreateCommand::new(spec.name).description(spec.description);
    if spec.level == AccessLevel::Admin {
        command = command.default_member_permissions(Permissions::ADMINISTRATOR);
    }
    for option in spec.options {
        let kind = match option.kind {
            OptionKind::String => CommandOptionType::String,
            OptionKind::Integer => CommandOptionType::Integer,
        };
        command = command.add_option(
            CreateCommandOption::new(kind, option.name, option.description)
                .required(option.required),
        );
    }
    command
}
