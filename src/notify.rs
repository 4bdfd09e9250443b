//! Email notifications: SMTP delivery plus the periodic scheduler.
//!
//! The scheduler is one owned tokio task ticking on a fixed interval; tick
//! bodies run sequentially inside that task, so two ticks can never overlap.
//! Delivery is at-least-once: the per-user "sent" stamp is written only
//! after a successful send, and a failed send leaves the row eligible for
//! the next matching tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use crate::config::SmtpConfig;
use crate::db::{parse_days, NotificationCandidate, Store};
use crate::error::AppError;

/// Delivery seam; tests drive the scheduler with recording/failing sinks.
#[async_trait]
pub trait NotificationSink: Send + Sync {
  async fn send(&self, to_email: &str, username: &str) -> Result<(), AppError>;
}

pub struct SmtpMailer {
  transport: AsyncSmtpTransport<Tokio1Executor>,
  from: Mailbox,
  app_name: String,
  has_credentials: bool,
}

impl SmtpMailer {
  pub fn new(cfg: &SmtpConfig) -> Result<Self, AppError> {
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
      .map_err(|e| AppError::Mail(e.to_string()))?
      .port(cfg.port);

    let has_credentials = match (&cfg.username, &cfg.password) {
      (Some(user), Some(pass)) => {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        true
      }
      _ => false,
    };

    let from: Mailbox = format!("{} <{}>", cfg.app_name, cfg.from_email)
      .parse()
      .map_err(|e| AppError::Mail(format!("invalid FROM_EMAIL: {e}")))?;

    Ok(Self {
      transport: builder.build(),
      from,
      app_name: cfg.app_name.clone(),
      has_credentials,
    })
  }

  fn body_for(&self, username: &str) -> String {
    format!(
      "Hi {username}!\n\n\
       We noticed you haven't been active on {app} for a while.\n\
       Don't let your coding skills get rusty!\n\n\
       Come back and:\n\
       - Practice with new coding challenges\n\
       - Improve your problem-solving skills\n\
       - Track your progress\n\n\
       Ready to code? Visit our platform now!\n\n\
       Best regards,\n\
       The {app} Team\n",
      app = self.app_name,
    )
  }
}

#[async_trait]
impl NotificationSink for SmtpMailer {
  #[instrument(level = "info", skip(self), fields(%to_email))]
  async fn send(&self, to_email: &str, username: &str) -> Result<(), AppError> {
    if !self.has_credentials {
      warn!(target: "notify", "SMTP credentials not configured, skipping email send");
      return Err(AppError::Mail("SMTP credentials not configured".into()));
    }

    let message = Message::builder()
      .from(self.from.clone())
      .to(to_email.parse().map_err(|e| AppError::Mail(format!("invalid recipient: {e}")))?)
      .subject(format!("Come back to {}! \u{1f680}", self.app_name))
      .body(self.body_for(username))
      .map_err(|e| AppError::Mail(e.to_string()))?;

    self.transport.send(message).await.map_err(|e| AppError::Mail(e.to_string()))?;
    info!(target: "notify", %to_email, "notification sent");
    Ok(())
  }
}

/// True when the candidate should be notified at `now`.
///
/// The stored HH:MM must fall within the last `window_minutes` minutes
/// (inclusive of now). An exact-minute match would skip a user for the whole
/// day whenever a tick landed late; the window tolerates that drift. The
/// daily stamp check keeps firings to one per calendar day.
pub fn is_eligible(candidate: &NotificationCandidate, now: NaiveDateTime, window_minutes: u32) -> bool {
  let Some(target) = minutes_of(&candidate.notification_time) else {
    return false;
  };

  let weekday = now.date().weekday().number_from_monday() as u8;
  if !parse_days(&candidate.notification_days).contains(&weekday) {
    return false;
  }

  let now_min = now.time().hour() * 60 + now.time().minute();
  // Modular distance handles the midnight wrap (23:59 tick, 00:00 target).
  let elapsed = (now_min + 24 * 60 - target) % (24 * 60);
  if elapsed > window_minutes {
    return false;
  }

  match candidate.last_notification_date {
    None => true,
    Some(last) => last < now.date(),
  }
}

fn minutes_of(hhmm: &str) -> Option<u32> {
  let (h, m) = hhmm.split_once(':')?;
  let h: u32 = h.trim().parse().ok()?;
  let m: u32 = m.trim().parse().ok()?;
  if h > 23 || m > 59 {
    return None;
  }
  Some(h * 60 + m)
}

#[derive(Clone)]
pub struct Scheduler {
  store: Store,
  sink: Arc<dyn NotificationSink>,
  tick: Duration,
}

impl Scheduler {
  pub fn new(store: Store, sink: Arc<dyn NotificationSink>, tick: Duration) -> Self {
    Self { store, sink, tick }
  }

  fn window_minutes(&self) -> u32 {
    ((self.tick.as_secs() + 59) / 60).max(1) as u32
  }

  /// One scheduler pass at `now`. Returns the number of successful sends.
  #[instrument(level = "info", skip(self), fields(%now))]
  pub async fn run_tick(&self, now: NaiveDateTime) -> Result<usize, AppError> {
    let window = self.window_minutes();
    let candidates = self.store.notification_candidates().await?;
    let due: Vec<&NotificationCandidate> =
      candidates.iter().filter(|c| is_eligible(c, now, window)).collect();

    if due.is_empty() {
      info!(target: "notify", "no users to notify at this time");
      return Ok(0);
    }
    info!(target: "notify", count = due.len(), "found users to notify");

    let mut sent = 0usize;
    for candidate in due {
      match self.sink.send(&candidate.email, &candidate.login).await {
        Ok(()) => {
          // Stamp only after a successful send; the guarded UPDATE makes a
          // concurrent duplicate stamp a no-op rather than a double send
          // being hidden.
          if self.store.mark_notified(candidate.user_id, now.date()).await? {
            sent += 1;
          } else {
            warn!(target: "notify", user_id = candidate.user_id, "already stamped for today, skipping count");
          }
        }
        Err(e) => {
          warn!(target: "notify", user_id = candidate.user_id, error = %e, "send failed, leaving user eligible");
        }
      }
    }

    info!(target: "notify", sent, total = candidates.len(), "notification pass finished");
    Ok(sent)
  }

  /// Start the periodic loop as an owned background task. Ticks that would
  /// overlap a still-running pass are skipped, never run in parallel.
  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(self.tick);
      interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        let now = Local::now().naive_local();
        if let Err(e) = self.run_tick(now).await {
          error!(target: "notify", error = %e, "scheduler tick failed");
        }
      }
    })
  }
}
