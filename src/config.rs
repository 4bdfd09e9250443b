//! Runtime configuration, read once from the environment at startup.
//!
//! Everything the core needs is injected explicitly from here; deep call
//! paths never read `std::env` themselves. The provider API key is kept as
//! an `Option` on purpose: its absence must fail the first provider call
//! with a configuration error, not crash the process at boot.

use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::info;

#[derive(Clone, Debug)]
pub struct Config {
  pub port: u16,
  pub database_url: String,
  pub jwt_secret: String,
  pub provider: ProviderConfig,
  pub retries: RetryBudgets,
  pub smtp: SmtpConfig,
  /// Scheduler tick. Must stay at or below one minute or exact-time users
  /// can fall outside the eligibility window for a whole day.
  pub scheduler_tick: Duration,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
  /// Checked at call time, not at startup.
  pub api_key: Option<String>,
  pub api_url: String,
  pub model: String,
  pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct RetryBudgets {
  pub generation_max_attempts: u32,
  pub evaluation_max_attempts: u32,
  pub evaluation_backoff_base: Duration,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
  pub host: String,
  pub port: u16,
  pub username: Option<String>,
  pub password: Option<String>,
  pub from_email: String,
  pub app_name: String,
}

impl Config {
  pub fn from_env() -> Self {
    Self {
      port: try_load("PORT", "8005"),
      database_url: try_load("DATABASE_URL", "sqlite://users.db?mode=rwc"),
      jwt_secret: try_load("JWT_SECRET", "dev-secret-change-me"),
      provider: ProviderConfig {
        api_key: env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.trim().is_empty()),
        api_url: try_load("OPENROUTER_API_URL", "https://openrouter.ai/api/v1/chat/completions"),
        model: try_load("OPENROUTER_MODEL", "deepseek/deepseek-r1-0528-qwen3-8b:free"),
        request_timeout: Duration::from_secs(try_load("REQUEST_TIMEOUT_SECS", "30")),
      },
      retries: RetryBudgets {
        generation_max_attempts: try_load("GENERATION_MAX_RETRIES", "5"),
        evaluation_max_attempts: try_load("EVALUATION_MAX_ATTEMPTS", "5"),
        evaluation_backoff_base: Duration::from_millis(try_load("EVALUATION_BASE_DELAY_MS", "500")),
      },
      smtp: SmtpConfig {
        host: try_load("SMTP_HOST", "smtp.gmail.com"),
        port: try_load("SMTP_PORT", "587"),
        username: env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
        password: env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
        from_email: try_load("FROM_EMAIL", "noreply@studdybuddy.com"),
        app_name: try_load("APP_NAME", "Study Buddy"),
      },
      scheduler_tick: Duration::from_secs(try_load("NOTIFICATION_TICK_SECS", "60")),
    }
  }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
  T::Err: Display,
{
  let raw = env::var(key).unwrap_or_else(|_| {
    info!(target: "studybuddy", %key, %default, "env var not set, using default");
    default.to_string()
  });
  match raw.parse() {
    Ok(v) => v,
    Err(e) => panic!("invalid value for {key}: {e}"),
  }
}
