//! OpenAI-compatible chat completions over HTTP.

use crate::error::LlmError;

/// Resolved endpoint and credentials for one call.
#[derive(Debug, Clone)]
pub struct ChatEndpoint<'a> {
    pub base_url: &'a str,
    pub api_key: &'a str,
    pub model: &'a str,
}

impl ChatEndpoint<'_> {
    pub fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Build the JSON request body for a two-message exchange.
pub fn request_body(model: &str, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "temperature": 0,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ],
    })
}

pub async fn chat_completion(
    http_client: &reqwest::Client,
    endpoint: ChatEndpoint<'_>,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String, LlmError> {
    let body = request_body(endpoint.model, system_prompt, user_prompt);

    let response = http_client
        .post(endpoint.url())
        .header("authorization", format!("Bearer {}", endpoint.api_key))
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|error| LlmError::ProviderRequest(error.to_string()))?;

    let status = response.status();
    let response_text = response.text().await.map_err(|error| {
        LlmError::ProviderRequest(format!("failed to read response body: {error}"))
    })?;

    let response_body: serde_json::Value =
        serde_json::from_str(&response_text).map_err(|error| {
            LlmError::ProviderRequest(format!(
                "response ({status}) is not valid JSON: {error}\nBody: {}",
                truncate_body(&response_text)
            ))
        })?;

    if !status.is_success() {
        let message = response_body["error"]["message"]
            .as_str()
            .unwrap_or("unknown error");
        return Err(LlmError::ProviderRequest(format!(
            "API error ({status}): {message}"
        )));
    }

    parse_completion(&response_body)
}

/// Pull the assistant text out of a chat completions response.
pub fn parse_completion(body: &serde_json::Value) -> Result<String, LlmError> {
    let message = &body["choices"][0]["message"];

    if let Some(text) = message["content"].as_str().filter(|text| !text.trim().is_empty()) {
        return Ok(text.to_string());
    }

    // Some reasoning models put everything in a separate field.
    if let Some(reasoning) = message["reasoning_content"]
        .as_str()
        .filter(|text| !text.trim().is_empty())
    {
        tracing::debug!("extracted reasoning_content as main content");
        return Ok(reasoning.to_string());
    }

    Err(LlmError::EmptyCompletion)
}

fn truncate_body(body: &str) -> &str {
    const LIMIT: usize = 500;
    match body.char_indices().nth(LIMIT) {
        Some((byte_index, _)) => &body[..byte_index],
        None => body,
    }
}
