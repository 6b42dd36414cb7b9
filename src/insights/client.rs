//! Chat-completion client for the narrative summary.
//!
//! One POST per request, bounded by `tokio::time::timeout`. The caller decides
//! what to do on failure; the controller swaps in the canned summary.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::NarrativeConfig;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NarrativeError {
    #[error("Narrative endpoint is not configured")]
    NotConfigured,
    #[error("Invalid narrative endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Narrative request timed out after {0} seconds")]
    Timeout(u64),
    #[error("Narrative request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Narrative endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Narrative response had no content")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    /// Raw completion text for the prompt.
    async fn complete(&self, prompt: &str) -> Result<String, NarrativeError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl ChatCompletionClient {
    pub fn from_config(config: &NarrativeConfig) -> Result<Self, NarrativeError> {
        let raw = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(NarrativeError::NotConfigured)?;
        let endpoint =
            url::Url::parse(raw).map_err(|e| NarrativeError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl NarrativeProvider for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, NarrativeError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let mut req = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NarrativeError::Status { status, body });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(NarrativeError::EmptyResponse)
    }
}

/// Run one completion under a hard deadline.
pub async fn generate_narrative(
    provider: &dyn NarrativeProvider,
    prompt: &str,
    timeout_secs: u64,
) -> Result<String, NarrativeError> {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), provider.complete(prompt)).await
    {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Narrative request exceeded {}s", timeout_secs);
            Err(NarrativeError::Timeout(timeout_secs))
        }
    }
}
