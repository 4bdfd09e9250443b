//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct GenerateTaskQuery {
    pub topic: String,
    pub difficulty: String,
}

#[derive(Serialize)]
pub struct GeneratedTaskOut {
    pub task: Value,
}

/// Body for `/evaluate_code` and its `/submit_code` alias.
#[derive(Debug, Deserialize)]
pub struct EvaluateIn {
    pub task: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SyllabusIn {
    pub topics: Vec<String>,
}

#[derive(Serialize)]
pub struct SyllabusOut {
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignupIn {
    pub email: String,
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginIn {
    /// Email or login name.
    pub identifier: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignupOut {
    pub name: String,
}

#[derive(Serialize)]
pub struct LoginOut {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationSettingsQuery {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct NotificationSettingsIn {
    pub user_id: i64,
    pub enabled: bool,
    /// "HH:MM"
    pub notification_time: String,
    /// ISO weekday numbers, Monday=1 .. Sunday=7.
    pub notification_days: Vec<u8>,
}

#[derive(Serialize)]
pub struct NotificationSettingsOut {
    pub user_id: i64,
    pub enabled: bool,
    pub notification_time: String,
    pub notification_days: Vec<u8>,
    pub last_notification_date: Option<NaiveDate>,
}

#[derive(Serialize)]
pub struct SendNotificationOut {
    pub sent: usize,
}

#[derive(Serialize)]
pub struct MessageOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
