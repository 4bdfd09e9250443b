//! Extraction of a JSON object from free-form LLM output.
//!
//! Providers routinely wrap structured answers in prose or markdown fences.
//! The heuristic here: strip an optional ```/```json fence, then take the
//! inclusive span between the *first* `{` and the *last* `}`. Truncated or
//! syntactically broken JSON is NOT repaired; that failure class belongs to
//! the retry layer.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
  #[error("LLM returned an empty string")]
  EmptyResponse,

  #[error("no JSON object found in the response")]
  NoJsonFound,

  /// Keeps the original parser diagnostic for debug logging.
  #[error("malformed JSON in response: {0}")]
  MalformedJson(String),
}

fn fence_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").expect("fence regex"))
}

/// Extract the first JSON object from an LLM reply.
///
/// Steps (order matters for reproducibility):
/// 1. If a fenced code block exists, keep only its content; else the full text.
/// 2. Candidate span = first `{` ..= last `}` of that body.
/// 3. Parse the span with serde_json.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
  if text.trim().is_empty() {
    return Err(ExtractError::EmptyResponse);
  }

  let body = match fence_re().captures(text) {
    Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(""),
    None => text,
  };
  let body = body.trim();

  let start = body.find('{').ok_or(ExtractError::NoJsonFound)?;
  let end = body.rfind('}').ok_or(ExtractError::NoJsonFound)?;
  if end < start {
    return Err(ExtractError::NoJsonFound);
  }

  serde_json::from_str::<Value>(&body[start..=end])
    .map_err(|e| ExtractError::MalformedJson(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn plain_json_is_identity() {
    let text = r#"{"a": 1, "b": [2, 3], "c": {"d": null}}"#;
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(extract_json(text).unwrap(), parsed);
  }

  #[test]
  fn fenced_json_with_prose_equals_bare_object() {
    let obj = r#"{"Task name": "FizzBuzz", "correct": true}"#;
    let wrapped = format!("Sure! Here is the task you asked for:\n```json\n{obj}\n```\nGood luck!");
    assert_eq!(extract_json(&wrapped).unwrap(), extract_json(obj).unwrap());
  }

  #[test]
  fn fence_tag_is_case_insensitive() {
    let wrapped = "```JSON\n{\"x\": 1}\n```";
    assert_eq!(extract_json(wrapped).unwrap(), json!({"x": 1}));
  }

  #[test]
  fn untagged_fence_is_accepted() {
    let wrapped = "```\n{\"x\": 2}\n```";
    assert_eq!(extract_json(wrapped).unwrap(), json!({"x": 2}));
  }

  #[test]
  fn leading_and_trailing_prose_without_fence() {
    let text = "The answer is {\"correct\": false, \"feedback\": \"off by one\"} as shown.";
    assert_eq!(
      extract_json(text).unwrap(),
      json!({"correct": false, "feedback": "off by one"})
    );
  }

  #[test]
  fn empty_and_whitespace_fail_with_empty_response() {
    assert_eq!(extract_json(""), Err(ExtractError::EmptyResponse));
    assert_eq!(extract_json("   "), Err(ExtractError::EmptyResponse));
    assert_eq!(extract_json("\n\t "), Err(ExtractError::EmptyResponse));
  }

  #[test]
  fn prose_without_braces_fails_with_no_json() {
    assert_eq!(extract_json("no braces here"), Err(ExtractError::NoJsonFound));
  }

  #[test]
  fn reversed_braces_fail_with_no_json() {
    assert_eq!(extract_json("} oops {"), Err(ExtractError::NoJsonFound));
  }

  #[test]
  fn malformed_span_fails_with_diagnostic_not_a_crash() {
    let res = extract_json(r#"{"a":1,"b":[2,3}"#);
    match res {
      Err(ExtractError::MalformedJson(diag)) => assert!(!diag.is_empty()),
      other => panic!("expected MalformedJson, got {other:?}"),
    }
  }

  #[test]
  fn first_open_and_last_close_brace_span_is_used() {
    // Nested objects survive because the span runs to the LAST closing brace.
    let text = "prefix {\"outer\": {\"inner\": 1}} suffix";
    assert_eq!(extract_json(text).unwrap(), json!({"outer": {"inner": 1}}));
  }
}
