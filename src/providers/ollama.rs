use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::{ProviderError, TranslationError};

use super::{classify_output, render_prompt, PromptSettings, Translator};

/// Translator backed by a local Ollama server
#[derive(Debug)]
pub struct OllamaTranslator {
    /// Base URL of the Ollama API
    base_url: String,
    /// Model name to use for generation
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Prompt and output handling
    settings: PromptSettings,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    stream: bool,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Non-streaming response of `/api/generate`
#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    /// Model that produced the response
    #[serde(default)]
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether generation finished
    #[serde(default)]
    pub done: bool,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options = Some(GenerationOptions { temperature: Some(temperature) });
        self
    }
}

/// Normalize `host[:port]` or a full URL into a base URL with scheme and port
pub fn normalize_base_url(endpoint: &str, default_port: u16) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let endpoint = if endpoint.is_empty() { "localhost" } else { endpoint };
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    match Url::parse(&with_scheme) {
        Ok(mut url) => {
            if url.port().is_none() {
                // Only fails for cannot-be-a-base URLs
                let _ = url.set_port(Some(default_port));
            }
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => with_scheme,
    }
}

impl OllamaTranslator {
    /// Default Ollama port
    pub const DEFAULT_PORT: u16 = 11434;

    pub fn new(endpoint: &str, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: normalize_base_url(endpoint, Self::DEFAULT_PORT),
            model: model.into(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                // Ollama uses HTTP/1.1
                .http1_only()
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(20)
                .tcp_keepalive(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            settings: PromptSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PromptSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request body for one segment
    pub fn build_request(&self, segment_source: &str) -> GenerationRequest {
        GenerationRequest::new(&self.model, render_prompt(&self.settings.template, segment_source))
            .temperature(self.settings.temperature)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::ConnectionError(format!("Failed to send request to Ollama API: {}", e))
                } else {
                    ProviderError::RequestFailed(format!("Failed to send request to Ollama API: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(status_to_error(status, error_text));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to get response text from Ollama API: {}", e)))?;

        serde_json::from_str::<GenerationResponse>(&response_text).map_err(|e| {
            let preview: String = response_text.chars().take(500).collect();
            error!("Failed to parse Ollama API response: {}. Raw response (first 500 chars): {}", e, preview);
            ProviderError::ParseError(e.to_string())
        })
    }
}

/// Map an HTTP error status to a provider error
pub(crate) fn status_to_error(status: StatusCode, message: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationError(message),
        _ => ProviderError::ApiError { status_code: status.as_u16(), message },
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    async fn translate(&self, segment_source: &str) -> Result<String, TranslationError> {
        let request = self.build_request(segment_source);
        let response = self.generate(&request).await?;
        debug!("Ollama model {} returned {} chars", response.model, response.response.len());
        classify_output(&response.response, &self.settings.diagnostic_markers)
    }

    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }
}
