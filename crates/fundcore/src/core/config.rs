use once_cell::sync::Lazy;
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration constants for the bot.
///
/// Everything is read once from the process environment. `.env` files are
/// loaded by the binary before the first static is touched.

/// Telegram bot token
/// Read from TELEGRAM_BOT_TOKEN (required), falls back to TELOXIDE_TOKEN
pub static BOT_TOKEN: Lazy<Option<SecretString>> = Lazy::new(|| {
    env::var(TELEGRAM_BOT_TOKEN_VAR)
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .ok()
        .filter(|token| !token.trim().is_empty())
        .map(|token| SecretString::from(token.trim().to_string()))
});

/// Persistent data directory
/// Read from DATA_DIR environment variable
/// Default: "." (current directory)
pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    env::var(DATA_DIR_VAR)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
});

/// Database file path, always `$DATA_DIR/funding_bot.db`
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| DATA_DIR.join(DATABASE_FILE_NAME).to_string_lossy().into_owned());

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: $DATA_DIR/funding_bot.log
pub static LOG_FILE_PATH: Lazy<String> = Lazy::new(|| {
    env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| DATA_DIR.join("funding_bot.log").to_string_lossy().into_owned())
});

/// Default log filter when RUST_LOG is not set
/// Read from LOG_LEVEL environment variable
/// Default: info
pub static LOG_LEVEL: Lazy<String> = Lazy::new(|| env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));

pub const TELEGRAM_BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const DATA_DIR_VAR: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = ".";
pub const DATABASE_FILE_NAME: &str = "funding_bot.db";

/// Per-user job schedule
pub mod schedule {
    use super::Duration;

    /// TOP-5 report interval (30 minutes)
    pub const PERIODIC_INTERVAL_SECS: u64 = 1800;
    /// Delay before the first TOP-5 report after /start
    pub const PERIODIC_FIRST_SECS: u64 = 10;
    /// Threshold alert check interval (5 minutes)
    pub const THRESHOLD_INTERVAL_SECS: u64 = 300;
    /// Delay before the first threshold check after /start
    pub const THRESHOLD_FIRST_SECS: u64 = 5;

    pub fn periodic_interval() -> Duration {
        Duration::from_secs(PERIODIC_INTERVAL_SECS)
    }

    pub fn periodic_first() -> Duration {
        Duration::from_secs(PERIODIC_FIRST_SECS)
    }

    pub fn threshold_interval() -> Duration {
        Duration::from_secs(THRESHOLD_INTERVAL_SECS)
    }

    pub fn threshold_first() -> Duration {
        Duration::from_secs(THRESHOLD_FIRST_SECS)
    }
}

/// User settings defaults
pub mod defaults {
    /// Alert threshold in percent
    pub const THRESHOLD: f64 = 0.1;
    /// Minimum 24h quote volume in USDT
    pub const VOLUME_FILTER: f64 = 0.0;
    /// How many coins each TOP list shows
    pub const TOP_N: usize = 5;
}

/// Exchange access configuration
pub mod market {
    use super::Duration;
    use once_cell::sync::Lazy;
    use std::env;

    /// Spot symbol cache lifetime (1 hour)
    pub const SPOT_SYMBOL_TTL_SECS: u64 = 60 * 60;

    /// Delay between WebSocket reconnect attempts
    pub const WS_RECONNECT_DELAY_SECS: u64 = 5;

    /// Interval between client pings on market WebSockets
    pub const WS_HEARTBEAT_SECS: u64 = 30;

    /// OKX REST: instruments per concurrent batch
    pub const OKX_REST_BATCH: usize = 20;

    /// OKX WebSocket: subscription args per request
    pub const OKX_WS_SUBSCRIBE_BATCH: usize = 50;

    /// Pause between OKX batches (rate limit)
    pub const OKX_BATCH_PAUSE_MS: u64 = 100;

    /// How long the OKX stream waits for its first pushes on a cold snapshot
    pub const OKX_WARMUP_SECS: u64 = 3;

    /// Timeout for exchange HTTP requests
    pub const HTTP_TIMEOUT_SECS: u64 = 15;

    pub fn spot_symbol_ttl() -> Duration {
        Duration::from_secs(SPOT_SYMBOL_TTL_SECS)
    }

    pub fn ws_reconnect_delay() -> Duration {
        Duration::from_secs(WS_RECONNECT_DELAY_SECS)
    }

    pub fn ws_heartbeat() -> Duration {
        Duration::from_secs(WS_HEARTBEAT_SECS)
    }

    pub fn okx_batch_pause() -> Duration {
        Duration::from_millis(OKX_BATCH_PAUSE_MS)
    }

    pub fn okx_warmup() -> Duration {
        Duration::from_secs(OKX_WARMUP_SECS)
    }

    pub fn http_timeout() -> Duration {
        Duration::from_secs(HTTP_TIMEOUT_SECS)
    }

    /// Where Binance/OKX data comes from: "stream" (WebSocket) or "rest"
    /// Read from FUNDING_SOURCE_MODE environment variable
    /// Default: "stream"
    pub static SOURCE_MODE: Lazy<String> = Lazy::new(|| {
        env::var("FUNDING_SOURCE_MODE")
            .unwrap_or_else(|_| "stream".to_string())
            .trim()
            .to_lowercase()
    });
}

/// Metrics and health endpoint configuration
pub mod metrics {
    use once_cell::sync::Lazy;
    use std::env;

    /// Enable metrics collection and HTTP server
    /// Read from METRICS_ENABLED environment variable
    /// Default: true
    pub static ENABLED: Lazy<bool> = Lazy::new(|| {
        env::var("METRICS_ENABLED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true)
    });

    /// Port for the health/metrics HTTP server
    /// Read from METRICS_PORT, then PORT (set by Railway)
    /// Default: 9090
    pub static PORT: Lazy<u16> = Lazy::new(|| {
        env::var("METRICS_PORT")
            .or_else(|_| env::var("PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9090)
    });
}

/// Retry configuration for the dispatcher
pub mod retry {
    use super::Duration;

    /// Maximum number of retries for dispatcher reconnection
    pub const MAX_DISPATCHER_RETRIES: u32 = 5;

    /// Delay between dispatcher retry attempts (in seconds)
    pub const DISPATCHER_RETRY_DELAY_SECS: u64 = 5;

    pub fn dispatcher_delay() -> Duration {
        Duration::from_secs(DISPATCHER_RETRY_DELAY_SECS)
    }

    /// Base for exponential backoff calculation
    pub const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

    /// Resends of one notification after a rate limit or network error
    pub const NOTIFICATION_SEND_RETRIES: u32 = 3;
}

/// Network configuration for the Telegram client
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// State of one deployment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvVarState {
    /// Set to a non-empty value
    Set,
    /// Missing, the documented default is used
    Defaulted(String),
    /// Missing and required
    Missing,
}

/// Result of checking the deployment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvReport {
    pub entries: Vec<(&'static str, EnvVarState)>,
}

impl EnvReport {
    /// True when every required variable is present.
    pub fn is_ok(&self) -> bool {
        !self.entries.iter().any(|(_, state)| *state == EnvVarState::Missing)
    }

    pub fn missing(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, state)| *state == EnvVarState::Missing)
            .map(|(name, _)| *name)
            .collect()
    }
}

/// Checks the two deployment variables with an injectable lookup.
///
/// `TELEGRAM_BOT_TOKEN` must be set. `DATA_DIR` falls back to `.` and is
/// reported as defaulted, so operators see it was not configured.
pub fn check_env_with<F>(lookup: F) -> EnvReport
where
    F: Fn(&str) -> Option<String>,
{
    let present = |name: &str| lookup(name).map(|v| !v.trim().is_empty()).unwrap_or(false);

    let token = if present(TELEGRAM_BOT_TOKEN_VAR) {
        EnvVarState::Set
    } else {
        EnvVarState::Missing
    };
    let data_dir = if present(DATA_DIR_VAR) {
        EnvVarState::Set
    } else {
        EnvVarState::Defaulted(DEFAULT_DATA_DIR.to_string())
    };

    EnvReport {
        entries: vec![(TELEGRAM_BOT_TOKEN_VAR, token), (DATA_DIR_VAR, data_dir)],
    }
}

/// Checks the deployment variables against the real process environment.
pub fn check_required_env() -> EnvReport {
    check_env_with(|name| env::var(name).ok())
}
