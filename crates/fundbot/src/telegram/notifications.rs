//! Delivery of scheduler notifications

use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{LinkPreviewOptions, Message, ParseMode};
use tokio::sync::mpsc;

use fundcore::core::config;
use fundcore::core::retry::{retry, RetryConfig};
use fundcore::report::MAX_MESSAGE_LENGTH;
use fundcore::scheduler::{Notification, UserJobs};
use fundcore::storage::{get_connection, set_active};
use fundcore::DbPool;

/// Link previews off; alert messages carry several chart links.
pub fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Cuts `text` to the message limit at a line boundary.
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_MESSAGE_LENGTH - 20).collect();
    let cut = head.rfind('\n').unwrap_or(head.len());
    let mut trimmed = head[..cut].to_string();
    trimmed.push_str("\n... (truncated)");
    trimmed
}

/// Whether the Bot API refused delivery because the user is gone.
pub fn is_blocked_error(err: &teloxide::RequestError) -> bool {
    let err_str = err.to_string();
    err_str.contains("Forbidden") || err_str.contains("blocked") || err_str.contains("deactivated")
}

/// Retry policy for one notification; a `RetryAfter` answer overrides the delay.
pub fn send_retry_config() -> RetryConfig {
    RetryConfig::new()
        .max_retries(config::retry::NOTIFICATION_SEND_RETRIES)
        .initial_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(30))
}

/// Sends one HTML message, waiting out rate limits.
pub async fn send_html(bot: &Bot, chat_id: ChatId, text: &str) -> Result<Message, teloxide::RequestError> {
    let text = truncate_message(text);
    retry(&send_retry_config(), || {
        bot.send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html)
            .link_preview_options(no_link_preview())
            .send()
    })
    .await
    .into_result()
}

/// Spawns the task that sends scheduler notifications as HTML.
pub fn start_notification_dispatcher(
    bot: Bot,
    db_pool: Arc<DbPool>,
    jobs: Arc<UserJobs>,
    mut rx: mpsc::UnboundedReceiver<Notification>,
) {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match send_html(&bot, ChatId(notification.chat_id), &notification.text).await {
                Ok(_) => log::debug!(
                    "Sent {} to {}",
                    notification.kind.as_ref(),
                    notification.chat_id
                ),
                Err(e) => handle_send_error(e, notification.chat_id, &db_pool, &jobs),
            }
        }
        log::warn!("Notification dispatcher channel closed");
    });
}

/// Handle send errors: stop alerts for users who blocked the bot.
fn handle_send_error(err: teloxide::RequestError, user_id: i64, db_pool: &Arc<DbPool>, jobs: &UserJobs) {
    if is_blocked_error(&err) {
        log::warn!("Bot blocked by user {}, deactivating alerts", user_id);
        jobs.unschedule(user_id);
        match get_connection(db_pool) {
            Ok(conn) => {
                if let Err(e) = set_active(&conn, user_id, false) {
                    log::error!("Failed to deactivate user {}: {}", user_id, e);
                }
            }
            Err(e) => log::error!("Failed to deactivate user {}: {}", user_id, e),
        }
    } else {
        log::error!("Failed to send notification to {}: {}", user_id, err);
    }
}
