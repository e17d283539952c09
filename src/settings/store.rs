//! Write-through settings store backed by a single JSON document.
//!
//! Reads are lock-free snapshots. Every mutation takes the write lock,
//! persists the full document, and only then publishes the new snapshot,
//! so a crash loses at most the mutation that was in flight.

use crate::error::{Result, StoreError};
use crate::secrets::SecretCipher;
use crate::settings::{GuildConfig, LlmCredentials, PersistedState, Setting, StoredLlmCredentials};

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Mutex;

/// Durable per-guild configuration shared by every component.
pub struct ConfigStore {
    path: PathBuf,
    state: ArcSwap<PersistedState>,
    write_lock: Mutex<()>,
    cipher: SecretCipher,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Open the store at `path`, creating the document if it does not exist.
    ///
    /// A missing installation key is generated and persisted before returning.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = read_state(&path).await?;

        let (cipher, generated) = match state.encryption_key.as_deref() {
            Some(encoded) => (SecretCipher::from_base64(encoded)?, false),
            None => (SecretCipher::generate(), true),
        };

        if generated {
            state.encryption_key = Some(cipher.to_base64());
            write_state(&path, &state).await?;
            tracing::info!(path = %path.display(), "generated installation encryption key");
        }

        tracing::info!(
            path = %path.display(),
            guilds = state.guilds.len(),
            problem_id_counter = state.problem_id_counter,
            "settings store opened"
        );

        Ok(Self {
            path,
            state: ArcSwap::from_pointee(state),
            write_lock: Mutex::new(()),
            cipher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configuration for a guild, or the default when none was ever written.
    pub fn get(&self, guild_id: &str) -> GuildConfig {
        self.state
            .load()
            .guilds
            .get(guild_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every configured guild, in key order.
    pub fn guilds(&self) -> Vec<(String, GuildConfig)> {
        self.state
            .load()
            .guilds
            .iter()
            .map(|(id, config)| (id.clone(), config.clone()))
            .collect()
    }

    /// The current document snapshot.
    pub fn snapshot(&self) -> Arc<PersistedState> {
        self.state.load_full()
    }

    pub fn installation_activated(&self) -> bool {
        self.state.load().activated
    }

    /// Apply one setting to a guild, creating its config on first write.
    pub async fn set(&self, guild_id: &str, setting: Setting) -> Result<GuildConfig> {
        let guild_id = guild_id.to_string();
        let updated = self
            .mutate(move |state| {
                let config = state.guilds.entry(guild_id).or_default();
                setting.apply(config);
                config.clone()
            })
            .await?;
        Ok(updated)
    }

    /// Hand out the next problem id. The counter is persisted before returning.
    pub async fn next_problem_id(&self) -> Result<u64> {
        self.mutate(|state| {
            state.problem_id_counter += 1;
            state.problem_id_counter
        })
        .await
    }

    /// Record that the installation secret has been redeemed.
    pub async fn mark_installation_activated(&self) -> Result<()> {
        if self.installation_activated() {
            return Ok(());
        }
        self.mutate(|state| state.activated = true).await
    }

    /// Store custom LLM credentials for a guild, sealing the API key.
    pub async fn set_llm_credentials(
        &self,
        guild_id: &str,
        credentials: LlmCredentials,
    ) -> Result<()> {
        let stored = StoredLlmCredentials {
            sealed_api_key: self.cipher.seal(&credentials.api_key)?,
            model_id: credentials.model_id,
            base_url: credentials.base_url,
        };
        let guild_id = guild_id.to_string();
        self.mutate(move |state| {
            state.guilds.entry(guild_id).or_default().llm_credentials = Some(stored);
        })
        .await
    }

    /// Decrypted custom credentials for a guild, if it has any.
    pub fn llm_credentials(&self, guild_id: &str) -> Result<Option<LlmCredentials>> {
        let state = self.state.load();
        let Some(stored) = state
            .guilds
            .get(guild_id)
            .and_then(|config| config.llm_credentials.as_ref())
        else {
            return Ok(None);
        };

        Ok(Some(LlmCredentials {
            api_key: self.cipher.open(&stored.sealed_api_key)?,
            model_id: stored.model_id.clone(),
            base_url: stored.base_url.clone(),
        }))
    }

    /// Serialized read-modify-persist-publish cycle.
    async fn mutate<T>(&self, change: impl FnOnce(&mut PersistedState) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().await;

        let mut next = PersistedState::clone(&self.state.load());
        let output = change(&mut next);

        write_state(&self.path, &next).await?;
        self.state.store(Arc::new(next));

        Ok(output)
    }
}

async fn read_state(path: &Path) -> Result<PersistedState> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PersistedState::default());
        }
        Err(error) => {
            return Err(StoreError::Read {
                path: path.display().to_string(),
                source: Arc::new(error),
            }
            .into());
        }
    };

    if content.trim().is_empty() {
        return Ok(PersistedState::default());
    }

    serde_json::from_str(&content).map_err(|error| {
        StoreError::Corrupt {
            path: path.display().to_string(),
            message: error.to_string(),
        }
        .into()
    })
}

async fn write_state(path: &Path, state: &PersistedState) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(state)
        .map_err(|error| StoreError::Persist(error.to_string()))?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            StoreError::Persist(format!(
                "failed to create {}: {error}",
                parent.display()
            ))
        })?;
    }

    let temp_path = path.with_extension("json.tmp");
    let write_error = |error: std::io::Error| {
        StoreError::Persist(format!("failed to write {}: {error}", temp_path.display()))
    };
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(write_error)?;
    file.write_all(&serialized).await.map_err(write_error)?;
    // The rename must not become visible before the contents are on disk.
    file.sync_all().await.map_err(write_error)?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await.map_err(|error| {
        StoreError::Persist(format!("failed to replace {}: {error}", path.display()))
    })?;

    Ok(())
}
