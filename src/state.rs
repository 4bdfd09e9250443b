//! Application state: store handle, LLM task service, notification scheduler.
//!
//! Everything here is built once at startup from `Config` and shared behind
//! an `Arc`. The scheduler is also owned by `main` as a spawned task; the
//! copy kept on the state exists so `/send-notification` can run a manual
//! pass with the same store and mailer.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::Config;
use crate::db::Store;
use crate::error::AppError;
use crate::notify::{Scheduler, SmtpMailer};
use crate::provider::OpenRouterClient;
use crate::tasks::TaskService;

pub struct AppState {
    pub store: Store,
    pub tasks: TaskService,
    pub scheduler: Scheduler,
    pub jwt_secret: String,
}

impl AppState {
    #[instrument(level = "info", skip_all)]
    pub async fn new(config: &Config) -> Result<Self, AppError> {
        let store = Store::connect(&config.database_url).await?;

        let provider = OpenRouterClient::new(&config.provider)?;
        if config.provider.api_key.is_some() {
            info!(target: "studybuddy", model = %config.provider.model, "LLM provider enabled");
        } else {
            // Deliberate: the first /generate_task or /evaluate_code call
            // will fail with a configuration error instead of the process
            // refusing to boot.
            info!(target: "studybuddy", "OPENROUTER_API_KEY not set; provider calls will fail until configured");
        }
        let tasks = TaskService::new(Arc::new(provider), &config.retries);

        let mailer = SmtpMailer::new(&config.smtp)?;
        let scheduler = Scheduler::new(store.clone(), Arc::new(mailer), config.scheduler_tick);

        Ok(Self {
            store,
            tasks,
            scheduler,
            jwt_secret: config.jwt_secret.clone(),
        })
    }
}
