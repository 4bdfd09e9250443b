//! Signup/login plumbing: bcrypt password hashes and HS256 access tokens.
//!
//! Deliberately thin; the interesting failure handling lives in the LLM
//! pipeline, not here. Unknown user and wrong password produce the same
//! client-visible message.

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

use crate::error::AppError;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Serialize)]
struct Claims {
  sub: String,
  exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
  if password.len() < 6 {
    return Err(AppError::Validation("Password must be at least 6 characters long".into()));
  }
  hash(password, DEFAULT_COST).map_err(|e| AppError::Validation(format!("could not hash password: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
  verify(password, password_hash).unwrap_or(false)
}

pub fn issue_token(secret: &str, login: &str) -> Result<String, AppError> {
  let claims = Claims {
    sub: login.to_string(),
    exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
  };
  encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
    .map_err(|e| AppError::Validation(format!("could not issue token: {e}")))
}
