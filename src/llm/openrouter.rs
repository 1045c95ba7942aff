//! OpenRouter chat-completion client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Reusable OpenRouter client (connection-pooled)
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AgentError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: OPENROUTER_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "OPENROUTER_API_KEY not configured".to_string(),
            ));
        }

        let body = ChatRequest::from(request);

        debug!(model = %request.model_id, "Calling OpenRouter");

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("OpenRouter request failed: {}", e);
                AgentError::TransportError(format!("OpenRouter API request error: {}", e))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AgentError::TransportError(format!("Failed to read OpenRouter response: {}", e))
        })?;

        debug!(status = %status, "OpenRouter response received");

        if !status.is_success() {
            let snippet: String = text.chars().take(500).collect();
            error!(status = %status, body = %snippet, "OpenRouter HTTP error");
            return Err(AgentError::TransportError(format!(
                "OpenRouter returned {}: {}",
                status, snippet
            )));
        }

        extract_completion(&text)
    }
}

/// Pull the assistant text out of a chat-completion body
fn extract_completion(body: &str) -> Result<String> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        let snippet: String = body.chars().take(1000).collect();
        AgentError::ResponseFormatError(format!(
            "OpenRouter returned invalid JSON ({}): {}",
            e, snippet
        ))
    })?;

    if let Some(choice) = parsed.choices.into_iter().next() {
        if let Some(content) = choice.message.and_then(|m| m.content) {
            return Ok(content);
        }
        if let Some(text) = choice.text {
            return Ok(text);
        }
    }

    if let Some(err) = parsed.error {
        let message = err.message.unwrap_or_else(|| "unknown error".to_string());
        error!("OpenRouter error: {}", message);
        return Err(AgentError::ResponseFormatError(format!(
            "OpenRouter error: {}",
            message
        )));
    }

    Err(AgentError::ResponseFormatError(
        "Unexpected OpenRouter response format: no completion choices".to_string(),
    ))
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl From<&CompletionRequest> for ChatRequest {
    fn from(request: &CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_ref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        Self {
            model: request.model_id.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let mut request = CompletionRequest::new("Should I buy AAPL?", "openai/gpt-4o-mini");
        request.system_prompt = Some("You are a trader".to_string());

        let json = serde_json::to_value(ChatRequest::from(&request)).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Should I buy AAPL?");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_extract_message_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"action\":\"think\"}"}}]}"#;
        assert_eq!(extract_completion(body).unwrap(), r#"{"action":"think"}"#);

        let legacy = r#"{"choices":[{"text":"hello"}]}"#;
        assert_eq!(extract_completion(legacy).unwrap(), "hello");
    }

    #[test]
    fn test_extract_errors() {
        let err = extract_completion("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, AgentError::ResponseFormatError(_)));

        let err = extract_completion(r#"{"error":{"message":"rate limited","code":429}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));

        let err = extract_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, AgentError::ResponseFormatError(_)));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = OpenRouterClient::new(String::new()).unwrap();
        let err = client
            .complete(&CompletionRequest::new("hi", "m"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
