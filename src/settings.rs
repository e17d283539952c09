//! Per-guild settings and the persisted state document.

pub mod store;

pub use store::ConfigStore;

use crate::error::ValidationError;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maximum number of channels a guild may sweep periodically.
pub const MAX_MONITOR_CHANNELS: usize = 5;

/// Upper bound accepted for `monitor_max_messages`.
pub const MAX_MONITOR_MESSAGES: usize = 1000;

/// Upper bound accepted for `monitor_period_hours` (one week).
pub const MAX_MONITOR_PERIOD_HOURS: u32 = 168;

pub const DEFAULT_MONITOR_PERIOD_HOURS: u32 = 2;
pub const DEFAULT_MONITOR_MAX_MESSAGES: usize = 100;

/// Configuration for one source-platform guild.
///
/// Every field defaults when absent so older state documents stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    pub ticket_category_ids: BTreeSet<u64>,
    pub monitor_channel_ids: Vec<u64>,
    pub monitor_period_hours: u32,
    pub monitor_max_messages: usize,
    /// Downstream chat that receives results for this guild.
    pub push_target: Option<String>,
    pub allowed_role_ids: BTreeSet<u64>,
    pub privileged_command_role_ids: BTreeSet<u64>,
    /// Display-only offset in whole hours.
    pub timezone_offset: i32,
    pub llm_credentials: Option<StoredLlmCredentials>,
    pub activated: bool,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            ticket_category_ids: BTreeSet::new(),
            monitor_channel_ids: Vec::new(),
            monitor_period_hours: DEFAULT_MONITOR_PERIOD_HOURS,
            monitor_max_messages: DEFAULT_MONITOR_MAX_MESSAGES,
            push_target: None,
            allowed_role_ids: BTreeSet::new(),
            privileged_command_role_ids: BTreeSet::new(),
            timezone_offset: 0,
            llm_credentials: None,
            activated: false,
        }
    }
}

impl GuildConfig {
    pub fn is_ticket_category(&self, category_id: u64) -> bool {
        self.ticket_category_ids.contains(&category_id)
    }

    pub fn monitor_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.monitor_period_hours.max(1)) * 3600)
    }
}

/// LLM credentials as persisted: the API key is sealed with the installation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLlmCredentials {
    pub sealed_api_key: String,
    pub model_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Decrypted per-guild LLM credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct LlmCredentials {
    pub api_key: String,
    pub model_id: String,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for LlmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCredentials")
            .field("api_key", &"[REDACTED]")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub guilds: BTreeMap<String, GuildConfig>,
    /// Last problem id handed out. Never decreases.
    pub problem_id_counter: u64,
    /// Base64 installation key used to seal stored API keys.
    pub encryption_key: Option<String>,
    /// Set once the installation secret has been redeemed by any guild.
    pub activated: bool,
}

/// A single configuration mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    TicketCategories(BTreeSet<u64>),
    MonitorChannels(Vec<u64>),
    MonitorPeriodHours(u32),
    MonitorMaxMessages(usize),
    PushTarget(Option<String>),
    TimezoneOffset(i32),
    AddAllowedRole(u64),
    RemoveAllowedRole(u64),
    AddPrivilegedRole(u64),
    RemovePrivilegedRole(u64),
    Activated(bool),
}

impl Setting {
    /// Apply the mutation to a guild config in place.
    pub fn apply(self, config: &mut GuildConfig) {
        match self {
            Setting::TicketCategories(ids) => config.ticket_category_ids = ids,
            Setting::MonitorChannels(ids) => config.monitor_channel_ids = ids,
            Setting::MonitorPeriodHours(hours) => config.monitor_period_hours = hours,
            Setting::MonitorMaxMessages(max) => config.monitor_max_messages = max,
            Setting::PushTarget(target) => config.push_target = target,
            Setting::TimezoneOffset(offset) => config.timezone_offset = offset,
            Setting::AddAllowedRole(role) => {
                config.allowed_role_ids.insert(role);
            }
            Setting::RemoveAllowedRole(role) => {
                config.allowed_role_ids.remove(&role);
            }
            Setting::AddPrivilegedRole(role) => {
                config.privileged_command_role_ids.insert(role);
            }
            Setting::RemovePrivilegedRole(role) => {
                config.privileged_command_role_ids.remove(&role);
            }
            Setting::Activated(activated) => config.activated = activated,
        }
    }
}

/// Parse a single numeric id.
pub fn parse_id(raw: &str) -> Result<u64, ValidationError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ValidationError::InvalidId {
            value: raw.trim().to_string(),
        })
}

/// Parse a comma-separated id list, preserving order and dropping duplicates.
pub fn parse_id_list(raw: &str) -> Result<Vec<u64>, ValidationError> {
    let invalid = || ValidationError::InvalidIdList {
        value: raw.trim().to_string(),
    };

    let mut ids = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let id = part.parse::<u64>().map_err(|_| invalid())?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    if ids.is_empty() {
        return Err(invalid());
    }
    Ok(ids)
}

pub fn parse_timezone(raw: &str) -> Result<i32, ValidationError> {
    let offset = raw
        .trim()
        .trim_start_matches('+')
        .parse::<i32>()
        .map_err(|_| ValidationError::InvalidTimezone {
            value: raw.trim().to_string(),
        })?;
    if !(-12..=14).contains(&offset) {
        return Err(ValidationError::TimezoneOutOfRange { offset });
    }
    Ok(offset)
}

pub fn parse_monitor_period(raw: &str) -> Result<u32, ValidationError> {
    let hours = parse_positive("monitor period (hours)", raw)?;
    if hours > u64::from(MAX_MONITOR_PERIOD_HOURS) {
        return Err(ValidationError::TooLarge {
            field: "monitor period (hours)",
            value: hours,
            max: u64::from(MAX_MONITOR_PERIOD_HOURS),
        });
    }
    Ok(hours as u32)
}

pub fn parse_monitor_max_messages(raw: &str) -> Result<usize, ValidationError> {
    let max = parse_positive("max messages", raw)?;
    if max > MAX_MONITOR_MESSAGES as u64 {
        return Err(ValidationError::TooLarge {
            field: "max messages",
            value: max,
            max: MAX_MONITOR_MESSAGES as u64,
        });
    }
    Ok(max as usize)
}

fn parse_positive(field: &'static str, raw: &str) -> Result<u64, ValidationError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ValidationError::NotPositive {
            field,
            value: raw.trim().to_string(),
        }),
    }
}
