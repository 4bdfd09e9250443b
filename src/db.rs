//! SQLite persistence: users, syllabus topics, per-user notification settings.
//!
//! The schema is created at startup (idempotent CREATE IF NOT EXISTS).
//! Syllabus saves are full replacement inside one transaction; there is no
//! per-topic identity. Notification rows are created lazily with defaults
//! the first time a user's settings are read.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeSet;
use tracing::info;

use crate::error::AppError;

const DEFAULT_NOTIFICATION_TIME: &str = "09:00";
const DEFAULT_NOTIFICATION_DAYS: &str = "1,2,3,4,5";

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
  pub user_id: i64,
  pub email: String,
  pub login: String,
  pub password_hash: String,
}

/// A row from the `notification_settings` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationSetting {
  pub user_id: i64,
  pub enabled: bool,
  /// "HH:MM", local time.
  pub notification_time: String,
  /// CSV of ISO weekday numbers, Monday=1 .. Sunday=7.
  pub notification_days: String,
  pub last_notification_date: Option<NaiveDate>,
}

/// Settings joined with the user columns the mailer needs.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationCandidate {
  pub user_id: i64,
  pub email: String,
  pub login: String,
  pub notification_time: String,
  pub notification_days: String,
  pub last_notification_date: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct Store {
  pool: SqlitePool,
}

impl Store {
  pub async fn connect(database_url: &str) -> Result<Self, AppError> {
    let pool = SqlitePoolOptions::new()
      .max_connections(5)
      .connect(database_url)
      .await?;
    let store = Self { pool };
    store.init_schema().await?;
    info!(target: "studybuddy", %database_url, "database ready");
    Ok(store)
  }

  /// Single-connection in-memory database for tests (each sqlite::memory:
  /// connection is its own database, so the pool must not grow).
  #[cfg(test)]
  pub async fn in_memory() -> Self {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect("sqlite::memory:")
      .await
      .expect("in-memory sqlite");
    let store = Self { pool };
    store.init_schema().await.expect("schema");
    store
  }

  async fn init_schema(&self) -> Result<(), AppError> {
    let statements = [
      "CREATE TABLE IF NOT EXISTS users (
         user_id INTEGER PRIMARY KEY AUTOINCREMENT,
         email TEXT NOT NULL,
         login TEXT NOT NULL,
         password_hash TEXT NOT NULL,
         registration_date TEXT NOT NULL
       )",
      "CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_email ON users(LOWER(email))",
      "CREATE UNIQUE INDEX IF NOT EXISTS idx_unique_login ON users(LOWER(login))",
      "CREATE TABLE IF NOT EXISTS syllabus (
         id INTEGER PRIMARY KEY AUTOINCREMENT,
         topic TEXT NOT NULL
       )",
      "CREATE TABLE IF NOT EXISTS notification_settings (
         user_id INTEGER PRIMARY KEY,
         enabled INTEGER NOT NULL DEFAULT 1,
         notification_time TEXT NOT NULL DEFAULT '09:00',
         notification_days TEXT NOT NULL DEFAULT '1,2,3,4,5',
         last_notification_date TEXT
       )",
    ];
    for sql in statements {
      sqlx::query(sql).execute(&self.pool).await?;
    }
    Ok(())
  }

  // --- users ---

  pub async fn create_user(
    &self,
    email: &str,
    login: &str,
    password_hash: &str,
    registration_date: &str,
  ) -> Result<i64, AppError> {
    let email = email.to_lowercase();
    let login = login.to_lowercase();

    let email_taken: Option<(i64,)> =
      sqlx::query_as("SELECT 1 FROM users WHERE LOWER(email) = ?")
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;
    if email_taken.is_some() {
      return Err(AppError::Validation("Email already registered".into()));
    }

    let login_taken: Option<(i64,)> =
      sqlx::query_as("SELECT 1 FROM users WHERE LOWER(login) = ?")
        .bind(&login)
        .fetch_optional(&self.pool)
        .await?;
    if login_taken.is_some() {
      return Err(AppError::Validation("Login already taken".into()));
    }

    let res = sqlx::query(
      "INSERT INTO users (email, login, password_hash, registration_date) VALUES (?, ?, ?, ?)",
    )
    .bind(&email)
    .bind(&login)
    .bind(password_hash)
    .bind(registration_date)
    .execute(&self.pool)
    .await?;

    Ok(res.last_insert_rowid())
  }

  /// Look a user up by email or login name, case-insensitively.
  pub async fn find_user(&self, identifier: &str) -> Result<Option<UserRow>, AppError> {
    let ident = identifier.to_lowercase();
    let row = sqlx::query_as::<_, UserRow>(
      "SELECT user_id, email, login, password_hash FROM users
       WHERE LOWER(email) = ? OR LOWER(login) = ?",
    )
    .bind(&ident)
    .bind(&ident)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row)
  }

  // --- syllabus ---

  /// Full replacement: delete-all-then-insert in one transaction, so a
  /// repeated identical save is idempotent and readers never see a merge.
  pub async fn replace_syllabus(&self, topics: &[String]) -> Result<(), AppError> {
    let mut tx = self.pool.begin().await?;
    sqlx::query("DELETE FROM syllabus").execute(&mut *tx).await?;
    for topic in topics {
      sqlx::query("INSERT INTO syllabus (topic) VALUES (?)")
        .bind(topic)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
  }

  pub async fn syllabus(&self) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT topic FROM syllabus ORDER BY id")
      .fetch_all(&self.pool)
      .await?;
    Ok(rows.into_iter().map(|(t,)| t).collect())
  }

  // --- notification settings ---

  /// Read a user's settings, creating the default row if absent.
  pub async fn notification_settings(&self, user_id: i64) -> Result<NotificationSetting, AppError> {
    sqlx::query(
      "INSERT OR IGNORE INTO notification_settings (user_id, enabled, notification_time, notification_days)
       VALUES (?, 1, ?, ?)",
    )
    .bind(user_id)
    .bind(DEFAULT_NOTIFICATION_TIME)
    .bind(DEFAULT_NOTIFICATION_DAYS)
    .execute(&self.pool)
    .await?;

    let row = sqlx::query_as::<_, NotificationSetting>(
      "SELECT user_id, enabled, notification_time, notification_days, last_notification_date
       FROM notification_settings WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(&self.pool)
    .await?;
    Ok(row)
  }

  /// Upsert the user-editable fields; never touches `last_notification_date`,
  /// so a concurrent mark-as-sent cannot be overwritten by a settings save.
  pub async fn update_notification_settings(
    &self,
    user_id: i64,
    enabled: bool,
    notification_time: &str,
    notification_days: &BTreeSet<u8>,
  ) -> Result<NotificationSetting, AppError> {
    sqlx::query(
      "INSERT INTO notification_settings (user_id, enabled, notification_time, notification_days)
       VALUES (?, ?, ?, ?)
       ON CONFLICT(user_id) DO UPDATE SET
         enabled = excluded.enabled,
         notification_time = excluded.notification_time,
         notification_days = excluded.notification_days",
    )
    .bind(user_id)
    .bind(enabled)
    .bind(notification_time)
    .bind(days_to_csv(notification_days))
    .execute(&self.pool)
    .await?;

    self.notification_settings(user_id).await
  }

  /// All enabled settings joined with user identity; time/day filtering
  /// happens in the scheduler, where the tolerant window lives.
  pub async fn notification_candidates(&self) -> Result<Vec<NotificationCandidate>, AppError> {
    let rows = sqlx::query_as::<_, NotificationCandidate>(
      "SELECT u.user_id, u.email, u.login,
              s.notification_time, s.notification_days, s.last_notification_date
       FROM notification_settings s
       JOIN users u ON u.user_id = s.user_id
       WHERE s.enabled = 1",
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(rows)
  }

  /// Record a successful send. The WHERE guard keeps the write race-safe:
  /// the row is only stamped if it has not already been stamped for `today`
  /// (or later). Returns whether the stamp was applied.
  pub async fn mark_notified(&self, user_id: i64, today: NaiveDate) -> Result<bool, AppError> {
    let res = sqlx::query(
      "UPDATE notification_settings SET last_notification_date = ?
       WHERE user_id = ?
         AND (last_notification_date IS NULL OR last_notification_date < ?)",
    )
    .bind(today)
    .bind(user_id)
    .bind(today)
    .execute(&self.pool)
    .await?;
    Ok(res.rows_affected() > 0)
  }
}

pub fn parse_days(csv: &str) -> BTreeSet<u8> {
  csv
    .split(',')
    .filter_map(|s| s.trim().parse::<u8>().ok())
    .filter(|d| (1..=7).contains(d))
    .collect()
}

pub fn days_to_csv(days: &BTreeSet<u8>) -> String {
  days.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(",")
}
