//! Study Buddy · Coding-Education Backend
//!
//! - Axum HTTP API for LLM task generation / solution evaluation
//! - SQLite persistence (users, syllabus, notification settings)
//! - Background email notification scheduler
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 8005)
//!   DATABASE_URL        : default "sqlite://users.db?mode=rwc"
//!   OPENROUTER_API_KEY  : required for provider calls (checked per call, not at boot)
//!   OPENROUTER_MODEL    : default "deepseek/deepseek-r1-0528-qwen3-8b:free"
//!   SMTP_HOST/SMTP_PORT/SMTP_USERNAME/SMTP_PASSWORD/FROM_EMAIL/APP_NAME
//!   NOTIFICATION_TICK_SECS : scheduler tick (default 60; keep <= 60)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod auth;
mod config;
mod db;
mod error;
mod extract;
mod notify;
mod protocol;
mod provider;
mod retry;
mod routes;
mod state;
mod tasks;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::config::Config;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = Config::from_env();

  // Build shared application state (store, provider, mailer, scheduler).
  let state = Arc::new(AppState::new(&config).await?);

  // The scheduler loop is an owned task tied to process lifetime; ticks run
  // sequentially inside it and never overlap.
  let scheduler_handle = state.scheduler.clone().spawn();

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "studybuddy", %addr, "HTTP server listening");

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "studybuddy", "shutdown signal received");
    })
    .await?;

  scheduler_handle.abort();
  info!(target: "studybuddy", "notification scheduler stopped");
  Ok(())
}
