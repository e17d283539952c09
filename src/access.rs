//! Role-based authorization for configuration and manual-trigger commands.

use crate::error::AuthorizationError;
use crate::settings::{ConfigStore, GuildConfig};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Access level a command requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Anyone in the guild.
    Public,
    /// Members of `allowed_role_ids`.
    Standard,
    /// Members of `privileged_command_role_ids`. Gates the manual analysis command.
    Privileged,
    /// Platform administrators only.
    Admin,
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessLevel::Public => write!(f, "public"),
            AccessLevel::Standard => write!(f, "standard"),
            AccessLevel::Privileged => write!(f, "privileged"),
            AccessLevel::Admin => write!(f, "administrator"),
        }
    }
}

/// The member invoking a command, as reported by the source platform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: u64,
    pub display_name: String,
    pub role_ids: Vec<u64>,
    pub is_administrator: bool,
}

/// Evaluates actors against the guild's allow-lists.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    store: Arc<ConfigStore>,
}

impl AccessGuard {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self { store }
    }

    pub fn is_authorized(&self, actor: &Actor, guild_id: &str, required: AccessLevel) -> bool {
        is_authorized(actor, &self.store.get(guild_id), required)
    }

    pub fn check(
        &self,
        actor: &Actor,
        guild_id: &str,
        required: AccessLevel,
    ) -> Result<(), AuthorizationError> {
        if self.is_authorized(actor, guild_id, required) {
            Ok(())
        } else {
            tracing::debug!(
                guild_id,
                user_id = actor.user_id,
                %required,
                "command rejected"
            );
            Err(AuthorizationError { required })
        }
    }
}

/// Administrators pass every level. Otherwise each level consults only its own
/// list; an empty list admits no one but administrators.
pub fn is_authorized(actor: &Actor, config: &GuildConfig, required: AccessLevel) -> bool {
    if actor.is_administrator {
        return true;
    }

    match required {
        AccessLevel::Public => true,
        AccessLevel::Standard => actor
            .role_ids
            .iter()
            .any(|role| config.allowed_role_ids.contains(role)),
        AccessLevel::Privileged => actor
            .role_ids
            .iter()
            .any(|role| config.privileged_command_role_ids.contains(role)),
        AccessLevel::Admin => false,
    }
}
