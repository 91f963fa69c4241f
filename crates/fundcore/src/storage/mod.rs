//! SQLite persistence of per-user settings

pub mod db;
pub mod migrations;

// Re-exports for convenience
pub use db::{
    clean_exchanges, count_users, create_pool, ensure_user, get_connection, get_user_settings, list_active_users,
    save_user_settings, set_active, set_threshold, set_volume_filter, toggle_exchange, toggle_spot_filter,
    DbConnection, DbPool,
};

use crate::core::config::defaults;
use crate::market::Exchange;
use serde::{Deserialize, Serialize};

/// Alert settings of one Telegram user (the chat id doubles as user id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: i64,
    /// Minimum |funding rate| in percent
    pub threshold: f64,
    /// Minimum 24h quote volume in USDT
    pub volume_filter: f64,
    /// Selected exchanges, in the order the user enabled them
    pub exchanges: Vec<Exchange>,
    /// Whether scheduled messages are sent
    pub active: bool,
    /// Keep only coins that also trade on spot
    pub spot_filter: bool,
}

impl UserSettings {
    /// Default settings for a user without a stored row.
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            threshold: defaults::THRESHOLD,
            volume_filter: defaults::VOLUME_FILTER,
            exchanges: Exchange::all(),
            active: true,
            spot_filter: true,
        }
    }

    pub fn has_exchange(&self, exchange: Exchange) -> bool {
        self.exchanges.contains(&exchange)
    }

    /// Removes `exchange` if selected, appends it otherwise.
    pub fn toggle_exchange(&mut self, exchange: Exchange) {
        if self.has_exchange(exchange) {
            self.exchanges.retain(|e| *e != exchange);
        } else {
            self.exchanges.push(exchange);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let settings = UserSettings::new(42);
        assert_eq!(settings.threshold, 0.1);
        assert_eq!(settings.volume_filter, 0.0);
        assert_eq!(settings.exchanges.len(), 4);
        assert!(settings.active);
        assert!(settings.spot_filter);
    }

    #[test]
    fn test_toggle_exchange_appends_at_end() {
        let mut settings = UserSettings::new(1);
        settings.toggle_exchange(Exchange::Bybit);
        assert!(!settings.has_exchange(Exchange::Bybit));

        settings.toggle_exchange(Exchange::Bybit);
        assert_eq!(settings.exchanges.last(), Some(&Exchange::Bybit));
    }
}
