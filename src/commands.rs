//! Platform-neutral command surface: authorization, validation, and the
//! configuration mutations behind each slash command.

use crate::access::{AccessGuard, AccessLevel, Actor};
use crate::error::{Error, ValidationError};
use crate::scheduler::TriggerScheduler;
use crate::secrets::secret_matches;
use crate::settings::{
    self, ConfigStore, GuildConfig, LlmCredentials, MAX_MONITOR_CHANNELS, Setting,
};
use crate::Result;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
}

#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
}

/// A command as registered on the source platform.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub options: &'static [OptionSpec],
    pub level: AccessLevel,
}

const fn required(name: &'static str, description: &'static str) -> OptionSpec {
    OptionSpec {
        name,
        description,
        kind: OptionKind::String,
        required: true,
    }
}

const fn optional_integer(name: &'static str, description: &'static str) -> OptionSpec {
    OptionSpec {
        name,
        description,
        kind: OptionKind::Integer,
        required: false,
    }
}

/// Argument value that empties a list or unsets the push target.
const CLEAR: &str = "none";

fn is_clear(raw: &str) -> bool {
    raw.eq_ignore_ascii_case(CLEAR)
}

const ROLE: &[OptionSpec] = &[required("role", "Role id")];

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "help",
        description: "List available commands",
        options: &[],
        level: AccessLevel::Public,
    },
    CommandSpec {
        name: "server_id",
        description: "Show this server's id",
        options: &[],
        level: AccessLevel::Public,
    },
    CommandSpec {
        name: "set_ticket_categories",
        description: "Set the categories whose channels are tickets",
        options: &[required("ids", "Comma-separated category ids, or none to clear")],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "get_ticket_categories",
        description: "Show the ticket categories",
        options: &[],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "set_monitor_channels",
        description: "Set up to 5 channels to summarize periodically",
        options: &[required("ids", "Comma-separated channel ids, or none to clear")],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "get_monitor_channels",
        description: "Show the monitored channels",
        options: &[],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "set_monitor_params",
        description: "Set the summary period and message cap",
        options: &[
            optional_integer("period_hours", "Summary period in hours"),
            optional_integer("max_messages", "Maximum messages analyzed per summary"),
        ],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "get_monitor_params",
        description: "Show the summary period and message cap",
        options: &[],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "set_push_target",
        description: "Set the Telegram chat that receives results",
        options: &[required("target", "Telegram chat id, or none to clear")],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "get_push_target",
        description: "Show the Telegram chat that receives results",
        options: &[],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "set_timezone",
        description: "Set the display timezone as a UTC offset in hours",
        options: &[required("offset", "Offset from -12 to 14")],
        level: AccessLevel::Standard,
    },
    CommandSpec {
        name: "add_allowed_role",
        description: "Allow a role to use configuration commands",
        options: ROLE,
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "remove_allowed_role",
        description: "Revoke a role's access to configuration commands",
        options: ROLE,
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "list_allowed_roles",
        description: "Show roles allowed to use configuration commands",
        options: &[],
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "add_privileged_role",
        description: "Allow a role to run manual analysis",
        options: ROLE,
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "remove_privileged_role",
        description: "Revoke a role's access to manual analysis",
        options: ROLE,
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "list_privileged_roles",
        description: "Show roles allowed to run manual analysis",
        options: &[],
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "analyze_now",
        description: "Analyze a channel immediately",
        options: &[OptionSpec {
            name: "channel",
            description: "Channel id (defaults to this channel)",
            kind: OptionKind::String,
            required: false,
        }],
        level: AccessLevel::Privileged,
    },
    CommandSpec {
        name: "activate",
        description: "Activate this server with the installation secret",
        options: &[required("secret", "Activation secret")],
        level: AccessLevel::Admin,
    },
    CommandSpec {
        name: "activate_custom",
        description: "Activate this server with your own model credentials",
        options: &[
            required("api_key", "API key"),
            required("model", "Model id"),
            OptionSpec {
                name: "base_url",
                description: "OpenAI-compatible base URL",
                kind: OptionKind::String,
                required: false,
            },
        ],
        level: AccessLevel::Admin,
    },
];

pub fn find_command(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|command| command.name == name)
}

/// One command invocation from the source platform.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub actor: Actor,
    /// None when invoked outside a guild.
    pub guild_id: Option<String>,
    pub channel_id: u64,
    pub args: HashMap<String, String>,
}

impl CommandRequest {
    fn arg(&self, name: &'static str) -> Option<&str> {
        self.args
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn required_arg(&self, name: &'static str) -> std::result::Result<&str, ValidationError> {
        self.arg(name).ok_or(ValidationError::MissingArgument(name))
    }
}

pub struct CommandRouter {
    store: Arc<ConfigStore>,
    guard: AccessGuard,
    scheduler: TriggerScheduler,
    activation_secret: String,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter").finish_non_exhaustive()
    }
}

impl CommandRouter {
    pub fn new(
        store: Arc<ConfigStore>,
        scheduler: TriggerScheduler,
        activation_secret: impl Into<String>,
    ) -> Self {
        Self {
            guard: AccessGuard::new(store.clone()),
            store,
            scheduler,
            activation_secret: activation_secret.into(),
        }
    }

    /// Run a command and produce the reply shown to the actor.
    ///
    /// Rejections and validation failures come back as reply text; nothing
    /// here is fatal.
    pub async fn handle(&self, request: CommandRequest) -> String {
        let Some(spec) = find_command(&request.name) else {
            return format!("Unknown command: {}", request.name);
        };

        if spec.name == "help" {
            return help_text();
        }

        let Some(guild_id) = request.guild_id.clone() else {
            return "This command can only be used inside a server.".into();
        };

        match self.execute(spec, &guild_id, &request).await {
            Ok(reply) => reply,
            Err(Error::Authorization(error)) => error.to_string(),
            Err(Error::Validation(error)) => format!("Invalid input: {error}"),
            Err(error) => {
                tracing::warn!(%error, guild_id, command = spec.name, "command failed");
                format!("Command failed: {error}")
            }
        }
    }

    async fn execute(
        &self,
        spec: &CommandSpec,
        guild_id: &str,
        request: &CommandRequest,
    ) -> Result<String> {
        self.guard.check(&request.actor, guild_id, spec.level)?;
        tracing::debug!(guild_id, command = spec.name, user_id = request.actor.user_id, "running command");

        let reply = match spec.name {
            "server_id" => format!("Server id: {guild_id}"),

            "set_ticket_categories" => {
                let raw = request.required_arg("ids")?;
                let ids = if is_clear(raw) {
                    Vec::new()
                } else {
                    settings::parse_id_list(raw)?
                };
                let config = self
                    .store
                    .set(
                        guild_id,
                        Setting::TicketCategories(ids.into_iter().collect::<BTreeSet<_>>()),
                    )
                    .await?;
                if config.ticket_category_ids.is_empty() {
                    "Ticket categories cleared.".into()
                } else {
                    format!("Ticket categories set to: {}", join_ids(&config.ticket_category_ids))
                }
            }
            "get_ticket_categories" => {
                let config = self.store.get(guild_id);
                list_or_none("Ticket categories", &config.ticket_category_ids)
            }

            "set_monitor_channels" => {
                let raw = request.required_arg("ids")?;
                let ids = if is_clear(raw) {
                    Vec::new()
                } else {
                    settings::parse_id_list(raw)?
                };
                if ids.len() > MAX_MONITOR_CHANNELS {
                    return Err(ValidationError::TooManyMonitorChannels {
                        count: ids.len(),
                        max: MAX_MONITOR_CHANNELS,
                    }
                    .into());
                }
                let config = self
                    .store
                    .set(guild_id, Setting::MonitorChannels(ids))
                    .await?;
                if config.monitor_channel_ids.is_empty() {
                    "Monitor channels cleared; periodic summaries are off.".into()
                } else {
                    format!("Monitor channels set to: {}", join_ids(&config.monitor_channel_ids))
                }
            }
            "get_monitor_channels" => {
                let config = self.store.get(guild_id);
                list_or_none("Monitor channels", &config.monitor_channel_ids)
            }

            "set_monitor_params" => {
                let period = request
                    .arg("period_hours")
                    .map(settings::parse_monitor_period)
                    .transpose()?;
                let max_messages = request
                    .arg("max_messages")
                    .map(settings::parse_monitor_max_messages)
                    .transpose()?;
                if period.is_none() && max_messages.is_none() {
                    return Err(ValidationError::MissingArgument("period_hours or max_messages").into());
                }
                if let Some(hours) = period {
                    self.store
                        .set(guild_id, Setting::MonitorPeriodHours(hours))
                        .await?;
                }
                if let Some(max) = max_messages {
                    self.store
                        .set(guild_id, Setting::MonitorMaxMessages(max))
                        .await?;
                }
                describe_monitor_params(&self.store.get(guild_id))
            }
            "get_monitor_params" => describe_monitor_params(&self.store.get(guild_id)),

            "set_push_target" => {
                let target = request.required_arg("target")?;
                if is_clear(target) {
                    self.store.set(guild_id, Setting::PushTarget(None)).await?;
                    return Ok("Push target cleared.".into());
                }
                target
                    .parse::<i64>()
                    .map_err(|_| ValidationError::InvalidId {
                        value: target.to_string(),
                    })?;
                self.store
                    .set(guild_id, Setting::PushTarget(Some(target.to_string())))
                    .await?;
                format!("Push target set to {target}.")
            }
            "get_push_target" => match self.store.get(guild_id).push_target {
                Some(target) => format!("Push target: {target}"),
                None => "No push target configured.".into(),
            },

            "set_timezone" => {
                let offset = settings::parse_timezone(request.required_arg("offset")?)?;
                self.store
                    .set(guild_id, Setting::TimezoneOffset(offset))
                    .await?;
                format!("Timezone set to UTC{offset:+}.")
            }

            "add_allowed_role" => {
                let role = settings::parse_id(request.required_arg("role")?)?;
                self.store.set(guild_id, Setting::AddAllowedRole(role)).await?;
                format!("Role {role} may now use configuration commands.")
            }
            "remove_allowed_role" => {
                let role = settings::parse_id(request.required_arg("role")?)?;
                self.store
                    .set(guild_id, Setting::RemoveAllowedRole(role))
                    .await?;
                format!("Role {role} removed from configuration access.")
            }
            "list_allowed_roles" => {
                list_or_none("Allowed roles", &self.store.get(guild_id).allowed_role_ids)
            }
            "add_privileged_role" => {
                let role = settings::parse_id(request.required_arg("role")?)?;
                self.store
                    .set(guild_id, Setting::AddPrivilegedRole(role))
                    .await?;
                format!("Role {role} may now run manual analysis.")
            }
            "remove_privileged_role" => {
                let role = settings::parse_id(request.required_arg("role")?)?;
                self.store
                    .set(guild_id, Setting::RemovePrivilegedRole(role))
                    .await?;
                format!("Role {role} removed from manual analysis access.")
            }
            "list_privileged_roles" => list_or_none(
                "Privileged roles",
                &self.store.get(guild_id).privileged_command_role_ids,
            ),

            "analyze_now" => {
                let channel_id = match request.arg("channel") {
                    Some(raw) => settings::parse_id(raw.trim_start_matches("<#").trim_end_matches('>'))?,
                    None => request.channel_id,
                };
                self.scheduler.analyze_now(guild_id, channel_id).await?
            }

            "activate" => {
                let secret = request.required_arg("secret")?;
                if !secret_matches(secret, &self.activation_secret) {
                    tracing::debug!(guild_id, user_id = request.actor.user_id, "activation secret rejected");
                    return Ok("Invalid activation secret.".into());
                }
                self.store.set(guild_id, Setting::Activated(true)).await?;
                self.store.mark_installation_activated().await?;
                tracing::info!(guild_id, "guild activated with installation secret");
                "Server activated.".into()
            }
            "activate_custom" => {
                let credentials = LlmCredentials {
                    api_key: request.required_arg("api_key")?.to_string(),
                    model_id: request.required_arg("model")?.to_string(),
                    base_url: request.arg("base_url").map(str::to_string),
                };
                let model_id = credentials.model_id.clone();
                self.store.set_llm_credentials(guild_id, credentials).await?;
                self.store.set(guild_id, Setting::Activated(true)).await?;
                tracing::info!(guild_id, model_id = %model_id, "guild activated with custom credentials");
                format!("Server activated with custom model {model_id}.")
            }

            other => format!("Unknown command: {other}"),
        };

        Ok(reply)
    }
}

fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for command in COMMANDS {
        text.push_str(&format!(
            "/{} - {} ({})\n",
            command.name, command.description, command.level
        ));
    }
    text.trim_end().to_string()
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a u64>) -> String {
    ids.into_iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_or_none<'a>(label: &str, ids: impl IntoIterator<Item = &'a u64>) -> String {
    let joined = join_ids(ids);
    if joined.is_empty() {
        format!("{label}: none configured.")
    } else {
        format!("{label}: {joined}")
    }
}

fn describe_monitor_params(config: &GuildConfig) -> String {
    format!(
        "Monitor period: {}h, max messages: {}",
        config.monitor_period_hours, config.monitor_max_messages
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::test_support::*;

    fn admin() -> Actor {
        Actor {
            user_id: 1,
            display_name: "admin".into(),
            role_ids: vec![],
            is_administrator: true,
        }
    }

    fn member(roles: &[u64]) -> Actor {
        Actor {
            user_id: 2,
            display_name: "member".into(),
            role_ids: roles.to_vec(),
            is_administrator: false,
        }
    }

    fn request(name: &str, actor: Actor, args: &[(&str, &str)]) -> CommandRequest {
        CommandRequest {
            name: name.into(),
            actor,
            guild_id: Some(GUILD.into()),
            channel_id: GENERAL_CHANNEL,
            args: args
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    fn router(harness: &Harness) -> CommandRouter {
        CommandRouter::new(harness.store.clone(), harness.scheduler.clone(), "open-sesame")
    }

    #[test]
    fn every_command_is_registered_once() {
        let mut names: Vec<_> = COMMANDS.iter().map(|command| command.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COMMANDS.len());
        assert_eq!(find_command("analyze_now").unwrap().level, AccessLevel::Privileged);
    }

    #[tokio::test]
    async fn help_and_server_id_are_public() {
        let harness = Harness::new().await;
        let router = router(&harness);

        let help = router.handle(request("help", member(&[]), &[])).await;
        assert!(help.contains("/set_ticket_categories"));

        let reply = router.handle(request("server_id", member(&[]), &[])).await;
        assert_eq!(reply, format!("Server id: {GUILD}"));
    }

    #[tokio::test]
    async fn standard_commands_need_an_allowed_role() {
        let harness = Harness::new().await;
        let router = router(&harness);

        let reply = router
            .handle(request("set_ticket_categories", member(&[5]), &[("ids", "1,2")]))
            .await;
        assert_eq!(
            reply,
            "you are not allowed to run this command (standard access required)"
        );
        assert!(harness.store.get(GUILD).ticket_category_ids.is_empty());

        router
            .handle(request("add_allowed_role", admin(), &[("role", "5")]))
            .await;
        let reply = router
            .handle(request("set_ticket_categories", member(&[5]), &[("ids", "1, 2,2")]))
            .await;
        assert_eq!(reply, "Ticket categories set to: 1, 2");
    }

    #[tokio::test]
    async fn role_lists_grant_independent_access() {
        let harness = Harness::new().await;
        let router = router(&harness);
        router
            .handle(request("add_allowed_role", admin(), &[("role", "5")]))
            .await;
        router
            .handle(request("add_privileged_role", admin(), &[("role", "6")]))
            .await;

        let reply = router.handle(request("analyze_now", member(&[5]), &[])).await;
        assert!(reply.contains("not allowed"), "{reply}");

        let reply = router
            .handle(request("get_push_target", member(&[6]), &[]))
            .await;
        assert!(reply.contains("not allowed"), "{reply}");

        let reply = router
            .handle(request("list_allowed_roles", member(&[5, 6]), &[]))
            .await;
        assert!(reply.contains("administrator access required"), "{reply}");
    }

    #[tokio::test]
    async fn validation_errors_are_reported_to_the_actor() {
        let harness = Harness::new().await;
        let router = router(&harness);

        let reply = router
            .handle(request("set_ticket_categories", admin(), &[("ids", "12,abc")]))
            .await;
        assert!(reply.starts_with("Invalid input"), "{reply}");
        assert!(reply.contains("12,abc"));

        let reply = router
            .handle(request("set_monitor_channels", admin(), &[("ids", "1,2,3,4,5,6")]))
            .await;
        assert!(reply.contains("at most 5"), "{reply}");
        assert!(harness.store.get(GUILD).monitor_channel_ids.is_empty());

        let reply = router
            .handle(request("set_timezone", admin(), &[("offset", "eight")]))
            .await;
        assert!(reply.starts_with("Invalid input"), "{reply}");

        let reply = router
            .handle(request("set_timezone", admin(), &[("offset", "+8")]))
            .await;
        assert_eq!(reply, "Timezone set to UTC+8.");
        assert_eq!(harness.store.get(GUILD).timezone_offset, 8);
    }

    #[tokio::test]
    async fn monitor_params_accept_partial_updates() {
        let harness = Harness::new().await;
        let router = router(&harness);

        let reply = router
            .handle(request("set_monitor_params", admin(), &[("max_messages", "250")]))
            .await;
        assert_eq!(reply, "Monitor period: 2h, max messages: 250");

        let reply = router.handle(request("set_monitor_params", admin(), &[])).await;
        assert!(reply.contains("missing argument"), "{reply}");

        let reply = router
            .handle(request("set_monitor_params", admin(), &[("period_hours", "0")]))
            .await;
        assert!(reply.starts_with("Invalid input"), "{reply}");
    }

    #[tokio::test]
    async fn activation_requires_the_installation_secret() {
        let harness = Harness::new().await;
        let router = router(&harness);
        let mut wrong = request("activate", admin(), &[("secret", "guess")]);
        wrong.guild_id = Some("77".into());

        assert_eq!(router.handle(wrong).await, "Invalid activation secret.");
        assert!(!harness.store.get("77").activated);

        let mut right = request("activate", admin(), &[("secret", " open-sesame ")]);
        right.guild_id = Some("77".into());
        assert_eq!(router.handle(right).await, "Server activated.");
        assert!(harness.store.get("77").activated);
        assert!(harness.store.installation_activated());
    }

    #[tokio::test]
    async fn custom_activation_stores_sealed_credentials() {
        let harness = Harness::new().await;
        let router = router(&harness);
        let mut custom = request(
            "activate_custom",
            admin(),
            &[("api_key", "sk-guild"), ("model", "model-y")],
        );
        custom.guild_id = Some("77".into());

        let reply = router.handle(custom).await;
        assert_eq!(reply, "Server activated with custom model model-y.");

        let credentials = harness.store.llm_credentials("77").unwrap().unwrap();
        assert_eq!(credentials.api_key, "sk-guild");
        assert_eq!(credentials.base_url, None);
        assert!(harness.store.get("77").activated);
    }

    #[tokio::test(start_paused = true)]
    async fn analyze_now_defaults_to_the_invoking_channel() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(GENERAL_CHANNEL, None, 2);
        harness.completer.push_reply(CHAT_REPLY);
        let router = router(&harness);

        let reply = router.handle(request("analyze_now", admin(), &[])).await;
        assert_eq!(reply, format!("Chat summary delivered to {PUSH_TARGET}."));
    }

    #[tokio::test]
    async fn none_clears_lists_and_the_push_target() {
        let harness = Harness::new().await;
        harness.fetcher.add_channel(GENERAL_CHANNEL, None, 3);
        harness.completer.push_reply(CHAT_REPLY);
        let router = router(&harness);

        router
            .handle(request("set_monitor_channels", admin(), &[("ids", "500")]))
            .await;
        assert_eq!(harness.scheduler.sweep_once().await.channels, 1);

        let reply = router
            .handle(request("set_monitor_channels", admin(), &[("ids", "None")]))
            .await;
        assert_eq!(reply, "Monitor channels cleared; periodic summaries are off.");
        assert!(harness.store.get(GUILD).monitor_channel_ids.is_empty());
        assert_eq!(harness.scheduler.sweep_once().await.channels, 0);
        assert_eq!(harness.completer.calls(), 1);

        let reply = router
            .handle(request("set_ticket_categories", admin(), &[("ids", "none")]))
            .await;
        assert_eq!(reply, "Ticket categories cleared.");
        assert!(harness.store.get(GUILD).ticket_category_ids.is_empty());

        let reply = router
            .handle(request("set_push_target", admin(), &[("target", "none")]))
            .await;
        assert_eq!(reply, "Push target cleared.");
        assert_eq!(harness.store.get(GUILD).push_target, None);

        let reply = router
            .handle(request("set_monitor_channels", admin(), &[("ids", ",")]))
            .await;
        assert!(reply.starts_with("Invalid input"), "{reply}");
    }

    #[tokio::test]
    async fn commands_outside_a_guild_are_refused() {
        let harness = Harness::new().await;
        let router = router(&harness);
        let mut direct = request("get_push_target", admin(), &[]);
        direct.guild_id = None;

        assert!(router.handle(direct).await.contains("inside a server"));
    }
}
