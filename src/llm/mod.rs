//! Language model trait and implementations
//!
//! The agent only needs one capability from a model: turn a prompt into
//! free text. Everything about structure is handled by the parser.

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub mod openrouter;
pub use openrouter::OpenRouterClient;

pub const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// One completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model_id: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model_id: model_id.into(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// Trait for text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        (**self).complete(request).await
    }
}

/// Replays canned responses in order, then repeats a fallback.
/// Keeps the loop runnable without a network.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fallback: r#"{"action": "done", "trade_action": "done", "reasoning": "script exhausted"}"#
                .to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Same answer forever
    pub fn repeating(response: impl Into<String>) -> Self {
        let mut model = Self::new(Vec::<String>::new());
        model.fallback = response.into();
        model
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        let next = self
            .responses
            .lock()
            .map_err(|_| AgentError::TransportError("scripted model poisoned".to_string()))?
            .pop_front();

        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Always fails with a transport error
pub struct FailingModel {
    message: String,
}

impl FailingModel {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for FailingModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Err(AgentError::TransportError(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_scripted_model_replays_then_falls_back() {
        let model = ScriptedModel::new(["one", "two"]);
        let request = CompletionRequest::new("p", DEFAULT_MODEL);

        assert_eq!(model.complete(&request).await.unwrap(), "one");
        assert_eq!(model.complete(&request).await.unwrap(), "two");
        let third = assert_ok!(model.complete(&request).await);
        assert!(third.contains("script exhausted"));
        assert_eq!(model.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = FailingModel::new("connection refused");
        let err = assert_err!(model.complete(&CompletionRequest::new("p", "m")).await);
        assert!(matches!(err, AgentError::TransportError(_)));
    }
}
