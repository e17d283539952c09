//! Process configuration loading and validation.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then environment variables.

use crate::error::{ConfigError, Result};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";

/// ticketrelay configuration.
#[derive(Clone)]
pub struct Config {
    /// Directory holding the persisted state document.
    pub data_dir: PathBuf,

    /// Directory for rolling log files.
    pub log_dir: PathBuf,

    /// Source platform bot token.
    pub discord_token: String,

    /// Destination platform bot token.
    pub telegram_token: String,

    /// Installation activation secret. Required.
    pub activation_secret: String,

    pub llm: LlmConfig,

    pub scheduler: SchedulerConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("log_dir", &self.log_dir)
            .field("llm", &self.llm)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Default language-model provider used when a guild has no custom credentials.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model_id: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Scheduling tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay between arming a ticket channel and analyzing it.
    pub ticket_delay_secs: u64,

    /// How many recent messages a ticket analysis reads.
    pub ticket_history_limit: usize,

    /// Hard bound on messages pulled for one sweep window.
    pub sweep_history_ceiling: usize,

    /// Sweep sleep while no guild has monitor channels.
    pub idle_sweep_interval_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ticket_delay_secs: 3600,
            ticket_history_limit: 50,
            sweep_history_ceiling: 5000,
            idle_sweep_interval_hours: 2,
        }
    }
}

impl SchedulerConfig {
    pub fn ticket_delay(&self) -> Duration {
        Duration::from_secs(self.ticket_delay_secs)
    }

    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_sweep_interval_hours.max(1)) * 3600)
    }
}

/// On-disk TOML shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    activation_secret: Option<String>,
    discord: TokenSection,
    telegram: TokenSection,
    llm: LlmSection,
    scheduler: SchedulerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TokenSection {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LlmSection {
    api_key: Option<String>,
    model_id: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SchedulerSection {
    ticket_delay_secs: Option<u64>,
    ticket_history_limit: Option<usize>,
    sweep_history_ceiling: Option<usize>,
    idle_sweep_interval_hours: Option<u32>,
}

impl Config {
    /// Load configuration from the environment only.
    pub fn load() -> Result<Self> {
        Self::resolve(FileConfig::default(), |key| std::env::var(key).ok())
    }

    /// Load from a TOML file, with environment variables taking precedence.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(error),
        })?;
        let file = parse_file(path, &content)?;
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let data_dir = env("TICKETRELAY_DATA_DIR")
            .map(PathBuf::from)
            .or(file.data_dir)
            .unwrap_or_else(Self::default_data_dir);
        let log_dir = env("TICKETRELAY_LOG_DIR")
            .map(PathBuf::from)
            .or(file.log_dir)
            .unwrap_or_else(|| data_dir.join("logs"));

        let activation_secret = env("ACTIVATION_SECRET")
            .or(file.activation_secret)
            .ok_or_else(|| ConfigError::MissingKey("ACTIVATION_SECRET".into()))?;
        let discord_token = env("DISCORD_TOKEN")
            .or(file.discord.token)
            .ok_or_else(|| ConfigError::MissingKey("DISCORD_TOKEN".into()))?;
        let telegram_token = env("TELEGRAM_TOKEN")
            .or(file.telegram.token)
            .ok_or_else(|| ConfigError::MissingKey("TELEGRAM_TOKEN".into()))?;

        let llm = LlmConfig {
            api_key: env("LLM_API_KEY").or(file.llm.api_key),
            model_id: env("MODEL_ID")
                .or(file.llm.model_id)
                .ok_or_else(|| ConfigError::MissingKey("MODEL_ID".into()))?,
            base_url: env("LLM_BASE_URL")
                .or(file.llm.base_url)
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into()),
            timeout_secs: file.llm.timeout_secs.unwrap_or(120),
        };

        let defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            ticket_delay_secs: file
                .scheduler
                .ticket_delay_secs
                .unwrap_or(defaults.ticket_delay_secs),
            ticket_history_limit: file
                .scheduler
                .ticket_history_limit
                .unwrap_or(defaults.ticket_history_limit),
            sweep_history_ceiling: file
                .scheduler
                .sweep_history_ceiling
                .unwrap_or(defaults.sweep_history_ceiling),
            idle_sweep_interval_hours: file
                .scheduler
                .idle_sweep_interval_hours
                .unwrap_or(defaults.idle_sweep_interval_hours),
        };

        if scheduler.ticket_history_limit == 0 || scheduler.sweep_history_ceiling == 0 {
            return Err(ConfigError::Invalid(
                "scheduler history limits must be greater than zero".into(),
            )
            .into());
        }

        Ok(Self {
            data_dir,
            log_dir,
            discord_token,
            telegram_token,
            activation_secret,
            llm,
            scheduler,
        })
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("ticketrelay"))
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// Path of the persisted state document.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

fn parse_file(path: &Path, content: &str) -> Result<FileConfig> {
    toml::from_str(content).map_err(|error| {
        ConfigError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        }
        .into()
    })
}
