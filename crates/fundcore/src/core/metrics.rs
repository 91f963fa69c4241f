//! Prometheus metrics for the funding-rate bot
//!
//! Tracks exchange fetch health, WebSocket stability and what the bot sends
//! to users.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec, Gauge, GaugeVec,
    HistogramVec,
};

// ======================
// MARKET METRICS
// ======================

/// Time spent fetching one exchange table
/// Labels: exchange, source (rest/stream)
pub static FETCH_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fundbot_fetch_duration_seconds",
        "Time spent fetching funding rates per exchange",
        &["exchange", "source"],
        vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]
    )
    .unwrap()
});

/// Failed fetches
/// Labels: exchange, kind (funding/spot)
pub static FETCH_FAILURE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fundbot_fetch_failure_total",
        "Total number of failed exchange requests",
        &["exchange", "kind"]
    )
    .unwrap()
});

/// Coins left after spot filtering in the latest aggregation
/// Labels: exchange
pub static COINS_PER_EXCHANGE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "fundbot_coins_per_exchange",
        "Number of coins returned by the latest aggregation",
        &["exchange"]
    )
    .unwrap()
});

/// WebSocket (re)connect attempts
/// Labels: exchange
pub static WS_RECONNECTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fundbot_ws_reconnects_total",
        "Total number of market WebSocket reconnect attempts",
        &["exchange"]
    )
    .unwrap()
});

/// Retried HTTP requests
/// Labels: attempt
pub static HTTP_RETRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("fundbot_http_retries_total", "Total number of retried HTTP requests", &["attempt"])
        .unwrap()
});

// ======================
// USER-FACING METRICS
// ======================

/// Notifications produced by jobs
/// Labels: kind (report/alert)
pub static NOTIFICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fundbot_notifications_total",
        "Total number of notifications produced by scheduled jobs",
        &["kind"]
    )
    .unwrap()
});

/// Command usage
/// Labels: command
pub static COMMANDS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!("fundbot_commands_total", "Total number of handled commands", &["command"]).unwrap()
});

/// Users with scheduled jobs
pub static SCHEDULED_USERS: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("fundbot_scheduled_users", "Number of users with scheduled jobs").unwrap());

/// Initialize metrics (call this at startup so everything shows up in /metrics)
pub fn init_metrics() {
    log::info!("Initializing metrics registry...");

    Lazy::force(&FETCH_DURATION_SECONDS);
    Lazy::force(&FETCH_FAILURE_TOTAL);
    Lazy::force(&COINS_PER_EXCHANGE);
    Lazy::force(&WS_RECONNECTS_TOTAL);
    Lazy::force(&HTTP_RETRIES_TOTAL);
    Lazy::force(&NOTIFICATIONS_TOTAL);
    Lazy::force(&COMMANDS_TOTAL);
    Lazy::force(&SCHEDULED_USERS);

    for kind in ["report", "alert"] {
        NOTIFICATIONS_TOTAL.with_label_values(&[kind]);
    }
}
