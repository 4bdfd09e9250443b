//! Retry orchestration for provider calls.
//!
//! Parse failures are "ugly but retriable": the model produced something,
//! just not the JSON we asked for, so we ask again up to the configured
//! budget. Authentication, configuration and transport failures are
//! "something is broken" and terminate the loop immediately.
//!
//! Backoff is linear: `backoff_base * (k-1)` before attempt k. The
//! generation path configures a zero base and retries immediately.

use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::extract::{extract_json, ExtractError};
use crate::provider::ChatProvider;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
  /// Attempts are numbered 1..=max_attempts.
  pub max_attempts: u32,
  pub backoff_base: Duration,
}

impl RetryPolicy {
  pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
    Self { max_attempts, backoff_base }
  }

  /// Delay applied before attempt `k` (none before the first).
  pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
    if attempt <= 1 || self.backoff_base.is_zero() {
      None
    } else {
      Some(self.backoff_base * (attempt - 1))
    }
  }
}

/// Drive `provider` until an extracted JSON object passes `validate`.
///
/// The validator runs after structural extraction succeeds; a semantic
/// rejection re-enters the loop the same way a parse failure does. Any
/// non-parse provider error passes through unmodified.
pub async fn run_with_retries<V>(
  provider: &dyn ChatProvider,
  prompt: &str,
  policy: &RetryPolicy,
  validate: V,
) -> Result<Value, AppError>
where
  V: Fn(&Value) -> Result<(), String>,
{
  let mut last: Option<ExtractError> = None;

  for attempt in 1..=policy.max_attempts {
    if let Some(delay) = policy.delay_before(attempt) {
      sleep(delay).await;
    }

    let reply = match provider.complete(prompt).await {
      Ok(reply) => reply,
      // Bad credential: terminal, must not consume the parse-retry budget.
      Err(AppError::Authentication) => return Err(AppError::Authentication),
      // Configuration/transport/anything else: fatal, passed through as-is.
      Err(e) => return Err(e),
    };

    match extract_json(&reply.raw_text) {
      Ok(value) => match validate(&value) {
        Ok(()) => return Ok(value),
        Err(reason) => {
          warn!(target: "llm", attempt, max = policy.max_attempts, %reason, "extracted JSON failed validation");
          debug!(target: "llm", status = reply.http_status, raw = %reply.raw_text, "raw provider reply");
          last = Some(ExtractError::MalformedJson(format!("schema validation failed: {reason}")));
        }
      },
      Err(e) => {
        warn!(target: "llm", attempt, max = policy.max_attempts, error = %e, "cannot parse provider reply");
        debug!(target: "llm", raw = %reply.raw_text, "raw provider reply");
        last = Some(e);
      }
    }
  }

  Err(AppError::ExhaustedRetries {
    attempts: policy.max_attempts,
    last: last.unwrap_or(ExtractError::EmptyResponse),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::provider::ProviderReply;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;

  /// Replays a scripted sequence of outcomes and counts attempts.
  struct ScriptedProvider {
    script: Mutex<Vec<Result<String, AppError>>>,
    calls: AtomicU32,
  }

  impl ScriptedProvider {
    fn new(script: Vec<Result<String, AppError>>) -> Self {
      let mut script = script;
      script.reverse(); // pop from the back in call order
      Self { script: Mutex::new(script), calls: AtomicU32::new(0) }
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl ChatProvider for ScriptedProvider {
    async fn complete(&self, _prompt: &str) -> Result<ProviderReply, AppError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let next = self.script.lock().unwrap().pop().expect("script exhausted");
      next.map(|raw_text| ProviderReply { raw_text, http_status: 200 })
    }
  }

  fn no_delay(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO)
  }

  fn accept_all(_: &Value) -> Result<(), String> {
    Ok(())
  }

  #[tokio::test]
  async fn succeeds_on_attempt_k_with_exactly_k_calls() {
    let provider = ScriptedProvider::new(vec![
      Ok("still thinking...".into()),
      Ok("almost {broken".into()),
      Ok(r#"{"ok": true}"#.into()),
    ]);
    let value = run_with_retries(&provider, "p", &no_delay(5), accept_all).await.unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(provider.calls(), 3);
  }

  #[tokio::test]
  async fn exhausts_budget_then_reports_attempt_count_and_last_error() {
    let provider = ScriptedProvider::new(vec![
      Ok("prose".into()),
      Ok("prose".into()),
      Ok("prose".into()),
    ]);
    match run_with_retries(&provider, "p", &no_delay(3), accept_all).await {
      Err(AppError::ExhaustedRetries { attempts, last }) => {
        assert_eq!(attempts, 3);
        assert_eq!(last, ExtractError::NoJsonFound);
      }
      other => panic!("expected ExhaustedRetries, got {other:?}"),
    }
    assert_eq!(provider.calls(), 3);
  }

  #[tokio::test]
  async fn http_401_short_circuits_without_consuming_retry_budget() {
    let provider = ScriptedProvider::new(vec![Err(AppError::Authentication)]);
    match run_with_retries(&provider, "p", &no_delay(5), accept_all).await {
      Err(AppError::Authentication) => {}
      other => panic!("expected Authentication, got {other:?}"),
    }
    assert_eq!(provider.calls(), 1);
  }

  #[tokio::test]
  async fn transport_errors_pass_through_unmodified() {
    let provider = ScriptedProvider::new(vec![Err(AppError::Transport("timeout".into()))]);
    match run_with_retries(&provider, "p", &no_delay(5), accept_all).await {
      Err(AppError::Transport(msg)) => assert_eq!(msg, "timeout"),
      other => panic!("expected Transport, got {other:?}"),
    }
    assert_eq!(provider.calls(), 1);
  }

  #[tokio::test]
  async fn validator_rejection_is_retriable() {
    let provider = ScriptedProvider::new(vec![
      Ok(r#"{"Hints": {}}"#.into()),
      Ok(r#"{"Hints": {"Hint1": "x"}}"#.into()),
    ]);
    let value = run_with_retries(&provider, "p", &no_delay(3), |v| {
      if v["Hints"]["Hint1"].is_string() { Ok(()) } else { Err("missing Hint1".into()) }
    })
    .await
    .unwrap();
    assert!(value["Hints"]["Hint1"].is_string());
    assert_eq!(provider.calls(), 2);
  }

  #[tokio::test]
  async fn empty_reply_counts_as_a_parse_failure() {
    let provider = ScriptedProvider::new(vec![Ok(String::new()), Ok(r#"{"a": 1}"#.into())]);
    let value = run_with_retries(&provider, "p", &no_delay(2), accept_all).await.unwrap();
    assert_eq!(value["a"], 1);
    assert_eq!(provider.calls(), 2);
  }

  #[test]
  fn backoff_is_linear_in_attempt_index() {
    let policy = RetryPolicy::new(5, Duration::from_millis(500));
    assert_eq!(policy.delay_before(1), None);
    assert_eq!(policy.delay_before(2), Some(Duration::from_millis(500)));
    assert_eq!(policy.delay_before(3), Some(Duration::from_millis(1000)));
    assert_eq!(policy.delay_before(5), Some(Duration::from_millis(2000)));
  }

  #[test]
  fn zero_base_means_immediate_retries() {
    let policy = no_delay(5);
    assert_eq!(policy.delay_before(4), None);
  }
}
