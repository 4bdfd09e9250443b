//! Minimal client for an OpenRouter-style chat completions endpoint.
//!
//! One outbound POST per invocation, a single user-role message turn, no
//! conversation state, no caching. The reply's `choices[0].message.content`
//! is returned raw; structuring it is the extractor's job.
//!
//! NOTE: We never log the API key and we keep payload truncations short.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::ProviderConfig;
use crate::error::AppError;

/// Raw provider outcome for a 2xx response. `raw_text` may be empty, prose,
/// fenced JSON, or valid JSON.
#[derive(Debug, Clone)]
pub struct ProviderReply {
  pub raw_text: String,
  pub http_status: u16,
}

/// Seam between the retry orchestrator and the network. Tests drive the
/// orchestrator with stub implementations of this trait.
#[async_trait]
pub trait ChatProvider: Send + Sync {
  async fn complete(&self, prompt: &str) -> Result<ProviderReply, AppError>;
}

#[derive(Clone)]
pub struct OpenRouterClient {
  client: reqwest::Client,
  api_key: Option<String>,
  api_url: String,
  model: String,
}

impl OpenRouterClient {
  pub fn new(cfg: &ProviderConfig) -> Result<Self, AppError> {
    let client = reqwest::Client::builder()
      .timeout(cfg.request_timeout)
      .build()
      .map_err(|e| AppError::Transport(e.to_string()))?;

    Ok(Self {
      client,
      api_key: cfg.api_key.clone(),
      api_url: cfg.api_url.clone(),
      model: cfg.model.clone(),
    })
  }
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn complete(&self, prompt: &str) -> Result<ProviderReply, AppError> {
    // Fail fast on a missing credential; never burn a network attempt on it.
    let api_key = self
      .api_key
      .as_deref()
      .filter(|k| !k.trim().is_empty())
      .ok_or(AppError::Configuration)?;

    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
    };

    let res = self.client.post(&self.api_url)
      .header(USER_AGENT, "studybuddy-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| AppError::Transport(e.to_string()))?;

    let status = res.status();
    if status.as_u16() == 401 {
      return Err(AppError::Authentication);
    }
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      let msg = extract_provider_error(&body).unwrap_or(body);
      return Err(AppError::Transport(format!("provider HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| AppError::Transport(format!("invalid provider envelope: {}", e)))?;

    if let Some(usage) = &body.usage {
      info!(target: "llm", prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "provider usage");
    }

    let raw_text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    Ok(ProviderReply { raw_text, http_status: status.as_u16() })
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from a provider error body.
fn extract_provider_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
