//! Per-user repeating jobs.
//!
//! Every scheduled user gets two tasks: a periodic TOP 5 report and a
//! threshold check. Jobs emit `Notification`s through an mpsc channel; the
//! Telegram layer receives these and sends them.

use crate::core::config;
use crate::core::error::AppResult;
use crate::core::metrics;
use crate::core::utils::now_millis;
use crate::market::MarketService;
use crate::report;
use crate::storage::{get_connection, get_user_settings, list_active_users, DbPool};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use strum::AsRefStr;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Report,
    Alert,
}

/// A message for one chat, rendered as Telegram HTML.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub chat_id: i64,
    pub text: String,
    pub kind: NotificationKind,
}

/// First-run delays and periods of both jobs.
#[derive(Debug, Clone, Copy)]
pub struct JobTiming {
    pub periodic_first: Duration,
    pub periodic_every: Duration,
    pub threshold_first: Duration,
    pub threshold_every: Duration,
}

impl Default for JobTiming {
    fn default() -> Self {
        Self {
            periodic_first: config::schedule::periodic_first(),
            periodic_every: config::schedule::periodic_interval(),
            threshold_first: config::schedule::threshold_first(),
            threshold_every: config::schedule::threshold_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Periodic,
    Threshold,
}

impl JobKind {
    fn name(self, user_id: i64) -> String {
        match self {
            JobKind::Periodic => format!("periodic_{}", user_id),
            JobKind::Threshold => format!("threshold_{}", user_id),
        }
    }
}

/// Runs the periodic report for one user. Inactive users get nothing.
pub async fn periodic_job(db_pool: &DbPool, market: &MarketService, user_id: i64) -> AppResult<Vec<Notification>> {
    let settings = {
        let conn = get_connection(db_pool)?;
        get_user_settings(&conn, user_id)?
    };
    if !settings.active {
        return Ok(Vec::new());
    }

    let view = market
        .get_all_funding_rates(&settings.exchanges, settings.spot_filter)
        .await;

    Ok(vec![Notification {
        chat_id: user_id,
        text: report::periodic_report(&view),
        kind: NotificationKind::Report,
    }])
}

/// Runs the threshold check for one user; empty when nothing crossed it.
pub async fn threshold_job(
    db_pool: &DbPool,
    market: &MarketService,
    user_id: i64,
    now_ms: i64,
) -> AppResult<Vec<Notification>> {
    let settings = {
        let conn = get_connection(db_pool)?;
        get_user_settings(&conn, user_id)?
    };
    if !settings.active {
        return Ok(Vec::new());
    }

    let view = market
        .get_all_funding_rates(&settings.exchanges, settings.spot_filter)
        .await;
    let alerts = report::threshold_alerts(&view, &settings);
    if !alerts.is_empty() {
        log::info!("User {}: {} funding alerts", user_id, alerts.len());
    }

    Ok(report::alert_messages(&alerts, now_ms)
        .into_iter()
        .map(|text| Notification {
            chat_id: user_id,
            text,
            kind: NotificationKind::Alert,
        })
        .collect())
}

/// Registry of running jobs keyed by user id.
pub struct UserJobs {
    db_pool: Arc<DbPool>,
    market: Arc<MarketService>,
    tx: mpsc::UnboundedSender<Notification>,
    timing: JobTiming,
    jobs: DashMap<i64, Vec<JoinHandle<()>>>,
}

impl UserJobs {
    /// Returns the registry and the receiver that should be consumed by the
    /// notification dispatcher.
    pub fn new(
        db_pool: Arc<DbPool>,
        market: Arc<MarketService>,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let jobs = Self {
            db_pool,
            market,
            tx,
            timing: JobTiming::default(),
            jobs: DashMap::new(),
        };
        (jobs, rx)
    }

    #[must_use]
    pub fn with_timing(mut self, timing: JobTiming) -> Self {
        self.timing = timing;
        self
    }

    /// (Re)starts both jobs for `user_id`, replacing any running ones.
    pub fn schedule(&self, user_id: i64) {
        let handles = vec![
            self.spawn_job(JobKind::Periodic, user_id),
            self.spawn_job(JobKind::Threshold, user_id),
        ];

        if let Some(old) = self.jobs.insert(user_id, handles) {
            old.iter().for_each(JoinHandle::abort);
            log::info!("Replaced jobs for user {}", user_id);
        } else {
            log::info!("Scheduled jobs for user {}", user_id);
        }
        self.update_gauge();
    }

    /// Stops the jobs of `user_id`. Returns whether any were running.
    pub fn unschedule(&self, user_id: i64) -> bool {
        let removed = self.jobs.remove(&user_id);
        if let Some((_, handles)) = &removed {
            handles.iter().for_each(JoinHandle::abort);
            log::info!("Unscheduled jobs for user {}", user_id);
        }
        self.update_gauge();
        removed.is_some()
    }

    /// Schedules every active user; used at startup.
    pub fn restore_all(&self) -> AppResult<usize> {
        let users = {
            let conn = get_connection(&self.db_pool)?;
            list_active_users(&conn)?
        };
        for &user_id in &users {
            self.schedule(user_id);
        }
        log::info!("Restored jobs for {} active users", users.len());
        Ok(users.len())
    }

    pub fn is_scheduled(&self, user_id: i64) -> bool {
        self.jobs.contains_key(&user_id)
    }

    pub fn scheduled_users(&self) -> usize {
        self.jobs.len()
    }

    fn update_gauge(&self) {
        metrics::SCHEDULED_USERS.set(self.jobs.len() as f64);
    }

    fn spawn_job(&self, kind: JobKind, user_id: i64) -> JoinHandle<()> {
        let (first, every) = match kind {
            JobKind::Periodic => (self.timing.periodic_first, self.timing.periodic_every),
            JobKind::Threshold => (self.timing.threshold_first, self.timing.threshold_every),
        };
        let db_pool = Arc::clone(&self.db_pool);
        let market = Arc::clone(&self.market);
        let tx = self.tx.clone();
        let name = kind.name(user_id);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + first, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                log::debug!("Running job {}", name);

                let result = match kind {
                    JobKind::Periodic => periodic_job(&db_pool, &market, user_id).await,
                    JobKind::Threshold => threshold_job(&db_pool, &market, user_id, now_millis()).await,
                };

                match result {
                    Ok(notifications) => {
                        for notification in notifications {
                            metrics::NOTIFICATIONS_TOTAL
                                .with_label_values(&[notification.kind.as_ref()])
                                .inc();
                            if tx.send(notification).is_err() {
                                log::warn!("Notification channel closed, stopping job {}", name);
                                return;
                            }
                        }
                    }
                    Err(e) => log::error!("Job {} failed: {}", name, e),
                }
            }
        })
    }
}

impl Drop for UserJobs {
    fn drop(&mut self) {
        for entry in self.jobs.iter() {
            entry.value().iter().for_each(JoinHandle::abort);
        }
    }
}
