//! Text-generation cross-check via an OpenAI-compatible chat completions API.
//!
//! The verifier never fails a row: transport errors, non-200 statuses, and
//! malformed bodies are logged and reported as [`Advisory::Unavailable`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use category_matcher_core::advisory::{Advisory, DisabledVerifier, Verifier};

use crate::config::VerifierConfig;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response format: {0}")]
    Format(String),
}

/// Verifier backed by OpenRouter (or any chat completions endpoint).
pub struct OpenRouterVerifier {
    url: String,
    model: String,
    system_prompt: Option<String>,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl OpenRouterVerifier {
    pub fn new(config: &VerifierConfig, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .context("invalid verifier API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_str(&config.referer).context("invalid verifier.referer")?,
        );
        headers.insert(
            "X-Title",
            HeaderValue::from_str(&config.title).context("invalid verifier.title")?,
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build verifier HTTP client")?;

        Ok(Self {
            url: config.url.clone(),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            headers,
            client,
        })
    }

    async fn request(&self, system: &str, prompt: &str) -> Result<String, VerifierError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt.as_deref().unwrap_or(system),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(VerifierError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        parse_chat_response(&text)
    }
}

/// Extract `choices[0].message.content`, trimmed.
fn parse_chat_response(body: &str) -> Result<String, VerifierError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| VerifierError::Format(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.trim().to_string())
        .ok_or_else(|| VerifierError::Format("no choices in response".to_string()))
}

#[async_trait]
impl Verifier for OpenRouterVerifier {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn verify(&self, system: &str, prompt: &str) -> Advisory {
        match self.request(system, prompt).await {
            Ok(text) => Advisory::Response(text),
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "verifier call failed");
                Advisory::Unavailable
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

/// Create the [`Verifier`] selected by `config.provider`.
///
/// A missing API key is not an error: the cross-check is advisory, so the
/// service runs with a [`DisabledVerifier`] and logs a warning.
pub fn create_verifier(config: &VerifierConfig) -> Result<Arc<dyn Verifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledVerifier)),
        "openrouter" => match config.api_key() {
            Some(key) => Ok(Arc::new(OpenRouterVerifier::new(config, &key)?)),
            None => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "verifier API key not set, cross-check disabled"
                );
                Ok(Arc::new(DisabledVerifier))
            }
        },
        other => anyhow::bail!("Unknown verifier provider: {}", other),
    }
}
