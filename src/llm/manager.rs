//! LLM manager: routes each completion to the guild's own credentials or the
//! process-wide default.

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::client::{ChatEndpoint, chat_completion};
use crate::llm::{CompletionRequest, Completer};

use anyhow::Context as _;

/// Owns the HTTP client and the default provider credentials.
pub struct LlmManager {
    config: LlmConfig,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for LlmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmManager")
            .field("model_id", &self.config.model_id)
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl LlmManager {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        if config.api_key.is_none() {
            tracing::warn!(
                "no default LLM API key configured; only guilds with custom credentials can be analyzed"
            );
        }

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait::async_trait]
impl Completer for LlmManager {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<String, LlmError> {
        let endpoint = match &request.credentials {
            Some(credentials) => ChatEndpoint {
                base_url: credentials
                    .base_url
                    .as_deref()
                    .unwrap_or(&self.config.base_url),
                api_key: &credentials.api_key,
                model: &credentials.model_id,
            },
            None => ChatEndpoint {
                base_url: &self.config.base_url,
                api_key: self
                    .config
                    .api_key
                    .as_deref()
                    .ok_or(LlmError::MissingApiKey)?,
                model: &self.config.model_id,
            },
        };

        tracing::debug!(
            model = endpoint.model,
            custom_credentials = request.credentials.is_some(),
            "requesting completion"
        );

        chat_completion(
            &self.http_client,
            endpoint,
            &request.system_prompt,
            &request.user_prompt,
        )
        .await
    }
}
