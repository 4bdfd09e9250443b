//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs include parameters and basic result info.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Local;
use tracing::{info, instrument};

use crate::auth::{hash_password, issue_token, verify_password};
use crate::db::parse_days;
use crate::error::AppError;
use crate::protocol::*;
use crate::state::AppState;
use crate::tasks::{EvaluateRequest, EvaluationOutcome, GenerateRequest};

#[instrument(level = "info")]
pub async fn http_health() -> Json<HealthOut> {
    Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state), fields(topic = %q.topic, difficulty = %q.difficulty))]
pub async fn http_generate_task(
    State(state): State<Arc<AppState>>,
    Query(q): Query<GenerateTaskQuery>,
) -> Result<Json<GeneratedTaskOut>, AppError> {
    let req = GenerateRequest { topic: q.topic, difficulty: q.difficulty };
    let task = state.tasks.generate_task(&req).await?;
    info!(target: "llm", task_name = %task["Task name"].as_str().unwrap_or(""), "task generated");
    Ok(Json(GeneratedTaskOut { task }))
}

#[instrument(level = "info", skip(state, body), fields(task_len = body.task.len(), code_len = body.code.len()))]
pub async fn http_evaluate_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EvaluateIn>,
) -> Result<Json<EvaluationOutcome>, AppError> {
    let req = EvaluateRequest {
        task_description: body.task,
        submission_text: body.code,
    };
    let outcome = state.tasks.evaluate_submission(&req).await?;
    Ok(Json(outcome))
}

/// Backward-compatible alias for `/evaluate_code`; same handler, no fork.
pub async fn http_submit_code(
    state: State<Arc<AppState>>,
    body: Json<EvaluateIn>,
) -> Result<Json<EvaluationOutcome>, AppError> {
    http_evaluate_code(state, body).await
}

#[instrument(level = "info", skip(state, body), fields(topic_count = body.topics.len()))]
pub async fn http_save_syllabus(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SyllabusIn>,
) -> Result<Json<MessageOut>, AppError> {
    state.store.replace_syllabus(&body.topics).await?;
    Ok(Json(MessageOut { message: "Syllabus saved".into() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_syllabus(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyllabusOut>, AppError> {
    let topics = state.store.syllabus().await?;
    Ok(Json(SyllabusOut { topics }))
}

#[instrument(level = "info", skip(state, body), fields(login = %body.login))]
pub async fn http_signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupIn>,
) -> Result<Json<SignupOut>, AppError> {
    if !body.email.contains('@') {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    let password_hash = hash_password(&body.password)?;
    let now = Local::now().to_rfc3339();
    state
        .store
        .create_user(&body.email, &body.login, &password_hash, &now)
        .await?;
    Ok(Json(SignupOut { name: body.login.to_lowercase() }))
}

#[instrument(level = "info", skip(state, body), fields(identifier = %body.identifier))]
pub async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginIn>,
) -> Result<Json<LoginOut>, AppError> {
    let user = state
        .store
        .find_user(&body.identifier)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    if !verify_password(&body.password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }
    let token = issue_token(&state.jwt_secret, &user.login)?;
    Ok(Json(LoginOut { name: user.login, token }))
}

#[instrument(level = "info", skip(state), fields(user_id = q.user_id))]
pub async fn http_get_notification_settings(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NotificationSettingsQuery>,
) -> Result<Json<NotificationSettingsOut>, AppError> {
    let s = state.store.notification_settings(q.user_id).await?;
    Ok(Json(to_settings_out(s)))
}

#[instrument(level = "info", skip(state, body), fields(user_id = body.user_id, enabled = body.enabled))]
pub async fn http_update_notification_settings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NotificationSettingsIn>,
) -> Result<Json<NotificationSettingsOut>, AppError> {
    validate_time(&body.notification_time)?;
    let days: BTreeSet<u8> = body.notification_days.iter().copied().collect();
    if days.is_empty() || days.iter().any(|d| !(1..=7).contains(d)) {
        return Err(AppError::Validation("notification_days must be weekday numbers 1-7".into()));
    }
    let s = state
        .store
        .update_notification_settings(body.user_id, body.enabled, &body.notification_time, &days)
        .await?;
    Ok(Json(to_settings_out(s)))
}

/// Manual scheduler pass, equivalent to one tick at the current local time.
#[instrument(level = "info", skip(state))]
pub async fn http_send_notification(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SendNotificationOut>, AppError> {
    let sent = state.scheduler.run_tick(Local::now().naive_local()).await?;
    Ok(Json(SendNotificationOut { sent }))
}

fn to_settings_out(s: crate::db::NotificationSetting) -> NotificationSettingsOut {
    NotificationSettingsOut {
        user_id: s.user_id,
        enabled: s.enabled,
        notification_days: parse_days(&s.notification_days).into_iter().collect(),
        notification_time: s.notification_time,
        last_notification_date: s.last_notification_date,
    }
}

fn validate_time(hhmm: &str) -> Result<(), AppError> {
    let ok = matches!(hhmm.split_once(':'), Some((h, m))
        if h.parse::<u8>().map_or(false, |h| h < 24) && m.parse::<u8>().map_or(false, |m| m < 60)
        && h.len() == 2 && m.len() == 2);
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation("notification_time must be formatted as HH:MM".into()))
    }
}
