//! Router assembly: HTTP endpoints, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - LLM task endpoints (`/generate_task`, `/evaluate_code` + alias)
/// - syllabus, auth and notification endpoints
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) - adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        .route("/health", get(http::http_health))
        // LLM pipeline
        .route("/generate_task", get(http::http_generate_task))
        .route("/evaluate_code", post(http::http_evaluate_code))
        .route("/submit_code", post(http::http_submit_code))
        // Syllabus
        .route("/save_syllabus", post(http::http_save_syllabus))
        .route("/get_syllabus", get(http::http_get_syllabus))
        // Auth
        .route("/signup", post(http::http_signup))
        .route("/login", post(http::http_login))
        // Notifications
        .route(
            "/notification-settings",
            get(http::http_get_notification_settings).post(http::http_update_notification_settings),
        )
        .route("/send-notification", post(http::http_send_notification))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
