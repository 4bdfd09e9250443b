//! Application error taxonomy and its HTTP mapping.
//!
//! The split matters for the LLM pipeline: parse failures are retried
//! internally and never reach a client as raw provider text, while
//! configuration/authentication failures terminate a call immediately.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::extract::ExtractError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing/empty provider credential. Raised before any network attempt.
    #[error("provider API key is not configured")]
    Configuration,

    /// The provider rejected the credential (HTTP 401). Terminal, never retried.
    #[error("Invalid API Key")]
    Authentication,

    /// Network/timeout/non-auth HTTP failure talking to the provider.
    #[error("provider request failed: {0}")]
    Transport(String),

    /// The provider reply could not be turned into structured JSON.
    /// Retried by the orchestrator; only surfaces when wrapped in [`AppError::ExhaustedRetries`].
    #[error(transparent)]
    Parse(#[from] ExtractError),

    /// Retry budget consumed without a successful extraction.
    #[error("failed to get valid JSON after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: ExtractError },

    /// Store unavailable or constraint violation.
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// User-correctable input problem (duplicate email, short password, ...).
    #[error("{0}")]
    Validation(String),

    /// Unknown user or wrong password; one message for both cases.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// SMTP delivery failure.
    #[error("email delivery failed: {0}")]
    Mail(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Authentication | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration
            | AppError::Parse(_)
            | AppError::ExhaustedRetries { .. }
            | AppError::Persistence(_)
            | AppError::Mail(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(target: "studybuddy", error = %self, "request failed");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_maps_to_401() {
        let resp = AppError::Authentication.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn validation_maps_to_400() {
        let resp = AppError::Validation("Email already registered".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn exhausted_retries_message_names_attempt_count() {
        let err = AppError::ExhaustedRetries {
            attempts: 5,
            last: ExtractError::NoJsonFound,
        };
        assert!(err.to_string().contains("5 attempts"));
    }
}
