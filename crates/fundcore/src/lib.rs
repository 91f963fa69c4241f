//! fundcore - funding-rate monitoring engine behind the Telegram bot
//!
//! This library holds everything that does not talk to Telegram: exchange
//! clients, aggregation, report rendering, persistence and the per-user
//! job scheduler.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, metrics, retry
//! - `market`: exchange REST/WebSocket sources, spot symbol cache, aggregation
//! - `report`: ranking, alert selection and message rendering
//! - `storage`: SQLite pool, migrations and user settings
//! - `scheduler`: periodic report / threshold jobs per user

#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod market;
pub mod report;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types for convenience
pub use core::error::{AppError, AppResult};
pub use core::config;
pub use market::{Exchange, FundingSnapshot, FundingTable, MarketService, MarketView};
pub use storage::{create_pool, get_connection, DbConnection, DbPool, UserSettings};
