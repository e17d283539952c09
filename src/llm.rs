//! Language-model access: the completion seam and its HTTP implementation.

pub mod client;
pub mod manager;

pub use manager::LlmManager;

use crate::error::LlmError;
use crate::settings::LlmCredentials;

/// A single system + user prompt exchange.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Guild-specific credentials. `None` uses the process-wide default.
    pub credentials: Option<LlmCredentials>,
}

/// External analysis collaborator: returns the raw completion text.
///
/// Retries, if any, belong to the implementation.
#[async_trait::async_trait]
pub trait Completer: Send + Sync + 'static {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
