use async_trait::async_trait;
use log::error;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ProviderError, TranslationError};

use super::ollama::status_to_error;
use super::{classify_output, render_prompt, PromptSettings, Translator};

/// Translator for OpenAI-compatible chat completion APIs (OpenAI, LM Studio)
#[derive(Debug)]
pub struct OpenAiTranslator {
    /// HTTP client for API requests
    client: Client,
    /// API key, may be empty for local servers
    api_key: String,
    /// API base URL, e.g. `https://api.openai.com/v1`
    endpoint: String,
    /// Model to use
    model: String,
    /// Prompt and output handling
    settings: PromptSettings,
}

/// Chat message
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

/// Individual choice in a chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl OpenAiTranslator {
    /// Public OpenAI endpoint
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: impl Into<String>, endpoint: &str, model: impl Into<String>, timeout_secs: u64) -> Self {
        let endpoint = if endpoint.trim().is_empty() {
            Self::DEFAULT_ENDPOINT.to_string()
        } else {
            endpoint.trim_end_matches('/').to_string()
        };

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint,
            model: model.into(),
            settings: PromptSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PromptSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }

    pub fn build_request(&self, segment_source: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: render_prompt(&self.settings.template, segment_source),
            }],
            temperature: self.settings.temperature,
        }
    }

    async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, ProviderError> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .header(header::CONTENT_TYPE, "application/json")
            .json(request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ProviderError::ConnectionError(format!("Failed to send request to OpenAI API: {}", e))
            } else {
                ProviderError::RequestFailed(format!("Failed to send request to OpenAI API: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenAI API error ({}): {}", status, error_text);
            return Err(status_to_error(status, error_text));
        }

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Failed to parse OpenAI API response: {}", e)))
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, segment_source: &str) -> Result<String, TranslationError> {
        let request = self.build_request(segment_source);
        let response = self.complete(&request).await?;
        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        classify_output(&text, &self.settings.diagnostic_markers)
    }

    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }
}
