//! Advisor capability: free-text guidance from a language model.
//!
//! The engine treats the advisor strictly as an opaque text producer. Callers
//! must tolerate its absence and its failures; see [`crate::hint::HintPolicy`]
//! for the fallback behavior.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::AdvisorConfig;
use crate::error::{AdvisorErrorKind, Result, TutorError};

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Produces free-text guidance for a prompt.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Completes `prompt`, producing at most roughly `max_tokens` tokens.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Advisor backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdvisor {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl AnthropicAdvisor {
    /// Creates an advisor with an explicit API key.
    pub fn new(api_key: impl Into<String>, config: &AdvisorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .build()
            .map_err(|e| TutorError::advisor_api_error(AdvisorErrorKind::Other, e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    /// Creates an advisor from configuration, reading the key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::AdvisorUnavailable` when the advisor is disabled or
    /// the API key variable is unset or empty.
    pub fn from_config(config: &AdvisorConfig) -> Result<Self> {
        if !config.enabled {
            return Err(TutorError::advisor_unavailable("disabled in configuration"));
        }

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                TutorError::advisor_unavailable(format!("{} is not set", config.api_key_env))
            })?;

        info!(model = %config.model, "Advisor configured");
        Self::new(api_key, config)
    }

    fn classify(error: &reqwest::Error) -> AdvisorErrorKind {
        if error.is_timeout() {
            AdvisorErrorKind::Timeout
        } else if let Some(status) = error.status() {
            AdvisorErrorKind::from_status(status.as_u16())
        } else {
            AdvisorErrorKind::Network
        }
    }
}

#[async_trait]
impl Advisor for AnthropicAdvisor {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        debug!(prompt_len = prompt.len(), max_tokens, "Sending advisor request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TutorError::advisor_api_error(Self::classify(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TutorError::advisor_api_error(
                AdvisorErrorKind::from_status(status.as_u16()),
                format!("HTTP {status}: {body}"),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TutorError::advisor_api_error(AdvisorErrorKind::InvalidResponse, e.to_string()))?;

        extract_text(&body)
    }
}

/// Pulls the first text block out of a Messages API response.
fn extract_text(body: &Value) -> Result<String> {
    body["content"][0]["text"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| {
            TutorError::advisor_api_error(
                AdvisorErrorKind::InvalidResponse,
                "response has no text content",
            )
        })
}
