//! Task generation and solution evaluation over the retry orchestrator.
//!
//! Two call shapes:
//! - Generate: topic + difficulty -> task object (name, description, sample
//!   cases, three hints of increasing specificity). Retries immediately on
//!   bad output; nothing safe exists to hand back, so exhaustion is an error.
//! - Evaluate: task + submission -> either an answer to a clarifying
//!   question or a correctness verdict. Retries with linear backoff; on
//!   exhaustion degrades to a fixed apologetic verdict instead of an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::config::RetryBudgets;
use crate::error::AppError;
use crate::extract::ExtractError;
use crate::provider::ChatProvider;
use crate::retry::{run_with_retries, RetryPolicy};

const HINT_KEYS: [&str; 3] = ["Hint1", "Hint2", "Hint3"];

const EVALUATION_FALLBACK_FEEDBACK: &str = "\u{26a0}\u{fe0f} It was not possible to evaluate \
the solution because the LLM returned malformed output. Please try again later.";

#[derive(Debug, Clone)]
pub struct GenerateRequest {
  pub topic: String,
  pub difficulty: String,
}

#[derive(Debug, Clone)]
pub struct EvaluateRequest {
  pub task_description: String,
  pub submission_text: String,
}

/// Discriminated evaluation result: the provider first decides whether the
/// submission was a clarifying question or a candidate solution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvaluationOutcome {
  Question { question: bool, feedback: String },
  Verdict { question: bool, correct: bool, feedback: String },
}

impl EvaluationOutcome {
  pub fn question(feedback: String) -> Self {
    EvaluationOutcome::Question { question: true, feedback }
  }

  pub fn verdict(correct: bool, feedback: String) -> Self {
    EvaluationOutcome::Verdict { question: false, correct, feedback }
  }

  /// User-facing default when the retry budget is exhausted.
  pub fn fallback() -> Self {
    Self::verdict(false, EVALUATION_FALLBACK_FEEDBACK.to_string())
  }
}

pub fn build_generate_prompt(req: &GenerateRequest) -> String {
  format!(
    "Create one Python programming task on '{}' with '{}' difficulty.\n\
     Respond ONLY with valid JSON (no markdown, no explanations).\n\
     Do NOT use Python tuples like ('a', 1). Use JSON arrays like [\"a\", 1].\n\
     Use double quotes for all strings (not single quotes).\n\
     The structure must be:\n\
     {{\n\
       \"Task name\": string,\n\
       \"Task description\": string,\n\
       \"Sample input cases\": [ {{\"input\": \"<in>\", \"expected_output\": \"<out>\"}} ],\n\
       \"Hints\": {{\n\
         \"Hint1\": \"general concept\",\n\
         \"Hint2\": \"solution logic\",\n\
         \"Hint3\": \"partial solution or specific guidance\"\n\
       }}\n\
     }}\n\
     Each subsequent hint must be more specific than the previous one (e.g., concept -> logic -> partial guidance).\n\
     The first hint MUST be about general concept, the second hint MUST be about solution logic, the third hint MUST\n\
     be about partial guidance to solution.\n\
     All hint keys MUST be present and use exact casing: \"Hint1\", \"Hint2\", \"Hint3\".\n\
     Each hint MUST be meaningful. Do NOT leave any hint blank or undefined.",
    req.topic, req.difficulty
  )
}

pub fn build_evaluate_prompt(req: &EvaluateRequest) -> String {
  format!(
    "Task:\n{}\n\n\
     User message:\n {}\n\
     Check if the user message is a code solution or question regarding task\n\
     If the message is a question - respond with a JSON object with fields: 'question': true, \
     'feedback': answer for the question. Do not give away solution, only help with understanding \
     task requirements\n\
     If the message is a code solution - Analyze the above code for correctness against the task \
     requirements. Respond with a JSON object with fields: 'question': false 'correct': true or false, \
     'feedback': a brief explanation (only if correct is false, if true - make a compliment). \
     Do not include additional comments or formatting",
    req.task_description, req.submission_text
  )
}

/// Post-extraction schema check for the Generate path. The prompt alone is
/// not a guarantee; enforcing the shape here turns a malformed-but-parseable
/// task into a retriable failure.
pub fn validate_generated_task(value: &Value) -> Result<(), String> {
  for key in ["Task name", "Task description"] {
    match value.get(key).and_then(Value::as_str) {
      Some(s) if !s.trim().is_empty() => {}
      _ => return Err(format!("missing or empty string field '{key}'")),
    }
  }

  match value.get("Sample input cases").and_then(Value::as_array) {
    Some(cases) if !cases.is_empty() => {}
    _ => return Err("'Sample input cases' must be a non-empty array".into()),
  }

  let hints = value
    .get("Hints")
    .and_then(Value::as_object)
    .ok_or_else(|| "'Hints' must be an object".to_string())?;
  for key in HINT_KEYS {
    match hints.get(key).and_then(Value::as_str) {
      Some(s) if !s.trim().is_empty() => {}
      _ => return Err(format!("hint '{key}' is missing or blank")),
    }
  }

  Ok(())
}

/// Classify an extracted evaluation reply via the boolean `question`
/// discriminator. A reply that parses but matches neither shape is rejected
/// so the retry loop can ask again.
pub fn classify_evaluation(value: &Value) -> Result<EvaluationOutcome, String> {
  let is_question = value
    .get("question")
    .and_then(Value::as_bool)
    .ok_or_else(|| "missing boolean 'question' discriminator".to_string())?;

  let feedback = value.get("feedback").and_then(Value::as_str).unwrap_or("").to_string();

  if is_question {
    if feedback.trim().is_empty() {
      return Err("question reply is missing 'feedback'".into());
    }
    return Ok(EvaluationOutcome::question(feedback));
  }

  let correct = value
    .get("correct")
    .and_then(Value::as_bool)
    .ok_or_else(|| "solution reply is missing boolean 'correct'".to_string())?;

  Ok(EvaluationOutcome::verdict(correct, feedback))
}

/// The two LLM use cases behind the HTTP surface, each with its own retry
/// budget.
#[derive(Clone)]
pub struct TaskService {
  provider: Arc<dyn ChatProvider>,
  generation: RetryPolicy,
  evaluation: RetryPolicy,
}

impl TaskService {
  pub fn new(provider: Arc<dyn ChatProvider>, budgets: &RetryBudgets) -> Self {
    Self {
      provider,
      // Generation retries immediately: its failures come from cheap
      // JSON-shape validation, not from waiting out provider hiccups.
      generation: RetryPolicy::new(budgets.generation_max_attempts, Duration::ZERO),
      evaluation: RetryPolicy::new(budgets.evaluation_max_attempts, budgets.evaluation_backoff_base),
    }
  }

  #[instrument(level = "info", skip(self), fields(topic = %req.topic, difficulty = %req.difficulty))]
  pub async fn generate_task(&self, req: &GenerateRequest) -> Result<Value, AppError> {
    let prompt = build_generate_prompt(req);
    run_with_retries(self.provider.as_ref(), &prompt, &self.generation, validate_generated_task).await
  }

  #[instrument(level = "info", skip(self, req), fields(task_len = req.task_description.len(), submission_len = req.submission_text.len()))]
  pub async fn evaluate_submission(&self, req: &EvaluateRequest) -> Result<EvaluationOutcome, AppError> {
    let prompt = build_evaluate_prompt(req);
    let validate = |v: &Value| classify_evaluation(v).map(|_| ());

    match run_with_retries(self.provider.as_ref(), &prompt, &self.evaluation, validate).await {
      Ok(value) => classify_evaluation(&value)
        .map_err(|reason| AppError::Parse(ExtractError::MalformedJson(reason))),
      Err(AppError::ExhaustedRetries { attempts, last }) => {
        warn!(target: "llm", attempts, error = %last, "evaluation retries exhausted, returning fallback verdict");
        Ok(EvaluationOutcome::fallback())
      }
      Err(e) => Err(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::provider::ProviderReply;
  use async_trait::async_trait;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct FixedProvider {
    outcome: Box<dyn Fn() -> Result<String, AppError> + Send + Sync>,
    calls: AtomicU32,
  }

  impl FixedProvider {
    fn text(s: &'static str) -> Self {
      Self { outcome: Box::new(move || Ok(s.to_string())), calls: AtomicU32::new(0) }
    }

    fn auth_failure() -> Self {
      Self { outcome: Box::new(|| Err(AppError::Authentication)), calls: AtomicU32::new(0) }
    }
  }

  #[async_trait]
  impl ChatProvider for FixedProvider {
    async fn complete(&self, _prompt: &str) -> Result<ProviderReply, AppError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      (self.outcome)().map(|raw_text| ProviderReply { raw_text, http_status: 200 })
    }
  }

  fn budgets() -> RetryBudgets {
    RetryBudgets {
      generation_max_attempts: 3,
      evaluation_max_attempts: 3,
      evaluation_backoff_base: Duration::ZERO,
    }
  }

  fn valid_task() -> Value {
    json!({
      "Task name": "Reverse a string",
      "Task description": "Write a function that reverses its input.",
      "Sample input cases": [{"input": "abc", "expected_output": "cba"}],
      "Hints": {
        "Hint1": "Strings are sequences.",
        "Hint2": "Walk the input from the end.",
        "Hint3": "Try s[::-1]."
      }
    })
  }

  #[test]
  fn generate_prompt_carries_topic_difficulty_and_hint_casing() {
    let prompt = build_generate_prompt(&GenerateRequest {
      topic: "recursion".into(),
      difficulty: "Hard".into(),
    });
    assert!(prompt.contains("'recursion'"));
    assert!(prompt.contains("'Hard'"));
    assert!(prompt.contains("\"Hint1\", \"Hint2\", \"Hint3\""));
    assert!(prompt.contains("Sample input cases"));
  }

  #[test]
  fn evaluate_prompt_embeds_task_and_submission() {
    let prompt = build_evaluate_prompt(&EvaluateRequest {
      task_description: "sum two numbers".into(),
      submission_text: "def add(a, b): return a + b".into(),
    });
    assert!(prompt.contains("sum two numbers"));
    assert!(prompt.contains("def add(a, b)"));
    assert!(prompt.contains("'question': true"));
  }

  #[test]
  fn task_validator_accepts_the_full_shape() {
    assert!(validate_generated_task(&valid_task()).is_ok());
  }

  #[test]
  fn task_validator_rejects_missing_and_blank_hints() {
    let mut v = valid_task();
    v["Hints"].as_object_mut().unwrap().remove("Hint2");
    assert!(validate_generated_task(&v).unwrap_err().contains("Hint2"));

    let mut v = valid_task();
    v["Hints"]["Hint3"] = json!("   ");
    assert!(validate_generated_task(&v).unwrap_err().contains("Hint3"));
  }

  #[test]
  fn task_validator_rejects_wrong_hint_casing() {
    let mut v = valid_task();
    let hints = v["Hints"].as_object_mut().unwrap();
    let h = hints.remove("Hint1").unwrap();
    hints.insert("hint1".into(), h);
    assert!(validate_generated_task(&v).is_err());
  }

  #[test]
  fn task_validator_rejects_empty_sample_cases() {
    let mut v = valid_task();
    v["Sample input cases"] = json!([]);
    assert!(validate_generated_task(&v).is_err());
  }

  #[test]
  fn classify_splits_question_and_verdict_paths() {
    let q = classify_evaluation(&json!({"question": true, "feedback": "what input size?"})).unwrap();
    assert_eq!(q, EvaluationOutcome::question("what input size?".into()));

    let v = classify_evaluation(&json!({"question": false, "correct": true, "feedback": "nice work"})).unwrap();
    assert_eq!(v, EvaluationOutcome::verdict(true, "nice work".into()));
  }

  #[test]
  fn classify_rejects_shapes_matching_neither_path() {
    assert!(classify_evaluation(&json!({"feedback": "??"})).is_err());
    assert!(classify_evaluation(&json!({"question": false, "feedback": "no verdict"})).is_err());
    assert!(classify_evaluation(&json!({"question": true})).is_err());
  }

  #[test]
  fn outcome_serializes_with_flat_discriminator() {
    let out = serde_json::to_value(EvaluationOutcome::verdict(false, "off by one".into())).unwrap();
    assert_eq!(out, json!({"question": false, "correct": false, "feedback": "off by one"}));

    let out = serde_json::to_value(EvaluationOutcome::question("which base?".into())).unwrap();
    assert_eq!(out, json!({"question": true, "feedback": "which base?"}));
  }

  #[tokio::test]
  async fn generation_exhaustion_is_an_error() {
    let provider = FixedProvider::text("not json at all");
    let svc = TaskService::new(Arc::new(provider), &budgets());
    let res = svc
      .generate_task(&GenerateRequest { topic: "loops".into(), difficulty: "Easy".into() })
      .await;
    assert!(matches!(res, Err(AppError::ExhaustedRetries { attempts: 3, .. })));
  }

  #[tokio::test]
  async fn evaluation_exhaustion_degrades_to_the_fallback_verdict() {
    let provider = FixedProvider::text("the model rambles with no braces");
    let svc = TaskService::new(Arc::new(provider), &budgets());
    let out = svc
      .evaluate_submission(&EvaluateRequest {
        task_description: "t".into(),
        submission_text: "s".into(),
      })
      .await
      .unwrap();
    match out {
      EvaluationOutcome::Verdict { question, correct, feedback } => {
        assert!(!question);
        assert!(!correct);
        assert!(feedback.contains("not possible to evaluate"));
      }
      other => panic!("expected fallback verdict, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn auth_failure_propagates_on_both_paths() {
    let svc = TaskService::new(Arc::new(FixedProvider::auth_failure()), &budgets());
    let gen = svc
      .generate_task(&GenerateRequest { topic: "t".into(), difficulty: "Easy".into() })
      .await;
    assert!(matches!(gen, Err(AppError::Authentication)));

    let svc = TaskService::new(Arc::new(FixedProvider::auth_failure()), &budgets());
    let eval = svc
      .evaluate_submission(&EvaluateRequest { task_description: "t".into(), submission_text: "s".into() })
      .await;
    assert!(matches!(eval, Err(AppError::Authentication)));
  }

  #[tokio::test]
  async fn generation_success_returns_the_validated_object() {
    let provider = FixedProvider::text(
      r#"```json
{"Task name": "FizzBuzz", "Task description": "Classic.", "Sample input cases": [{"input": "3", "expected_output": "Fizz"}], "Hints": {"Hint1": "a", "Hint2": "b", "Hint3": "c"}}
```"#,
    );
    let svc = TaskService::new(Arc::new(provider), &budgets());
    let task = svc
      .generate_task(&GenerateRequest { topic: "modulo".into(), difficulty: "Easy".into() })
      .await
      .unwrap();
    assert_eq!(task["Task name"], "FizzBuzz");
  }
}
