//! Handler types, dependencies, and pending text input

use std::sync::Arc;

use dashmap::DashMap;
use teloxide::types::Message;

use fundcore::core::utils::format_with_commas;
use fundcore::report::format_threshold;
use fundcore::scheduler::UserJobs;
use fundcore::storage::{get_connection, set_threshold, set_volume_filter};
use fundcore::{AppResult, DbPool, MarketService};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Number a user was asked to type after pressing a settings button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    Threshold,
    Volume,
}

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub market: Arc<MarketService>,
    pub jobs: Arc<UserJobs>,
    /// Users whose next text message is a settings value
    pub pending: Arc<DashMap<i64, PendingInput>>,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(db_pool: Arc<DbPool>, market: Arc<MarketService>, jobs: Arc<UserJobs>) -> Self {
        Self {
            db_pool,
            market,
            jobs,
            pending: Arc::new(DashMap::new()),
        }
    }
}

/// Telegram user id of the sender; the chat id when there is none.
pub fn user_id_of(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .and_then(|u| i64::try_from(u.id.0).ok())
        .unwrap_or(msg.chat.id.0)
}

pub const INVALID_NUMBER: &str = "올바른 숫자를 입력해주세요.";

/// Parses a typed settings value. Surrounding whitespace is ignored;
/// `NaN` and infinities are rejected.
pub fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Stores a typed value for `pending` and returns the reply text.
pub fn apply_pending_input(db_pool: &DbPool, user_id: i64, pending: PendingInput, text: &str) -> AppResult<String> {
    let Some(value) = parse_number(text) else {
        return Ok(INVALID_NUMBER.to_string());
    };

    let conn = get_connection(db_pool)?;
    match pending {
        PendingInput::Threshold => {
            set_threshold(&conn, user_id, value)?;
            log::info!("User {} threshold -> {}", user_id, value);
            Ok(format!("펀딩비 임계값이 {}%로 설정되었습니다.", format_threshold(value)))
        }
        PendingInput::Volume => {
            set_volume_filter(&conn, user_id, value)?;
            log::info!("User {} volume filter -> {}", user_id, value);
            Ok(format!("거래량 필터가 ${}로 설정되었습니다.", format_with_commas(value, 0)))
        }
    }
}
