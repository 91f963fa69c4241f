//! Command and free-text handlers

use indoc::indoc;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use fundcore::report::{now_report, status_text, strip_html, MAX_MESSAGE_LENGTH};
use fundcore::storage::{clean_exchanges, ensure_user, get_connection, get_user_settings, set_active};
use fundcore::AppResult;

use super::types::{apply_pending_input, user_id_of, HandlerDeps, HandlerError};
use crate::telegram::menu::show_settings_menu;
use crate::telegram::notifications::{no_link_preview, truncate_message};

pub const HELP_TEXT: &str = indoc! {"
    안녕하세요! 펀딩비 알림 봇입니다.

    사용 가능한 명령어:
    /settings - 알림 설정 변경
    /status - 현재 설정 확인
    /stop - 알림 중지
    /resume - 알림 재개
    /now - 현재 펀딩비 확인"};

const LOADING_TEXT: &str = "⏳ 펀딩비 데이터를 가져오는 중...";
const NOW_FAILED_TEXT: &str = "❌ 데이터를 가져오는 중 오류가 발생했습니다.";

/// /start: stores default settings for new users and (re)schedules jobs.
pub async fn handle_start_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = user_id_of(msg);
    {
        let conn = get_connection(&deps.db_pool)?;
        ensure_user(&conn, user_id)?;
    }
    deps.jobs.schedule(user_id);

    bot.send_message(msg.chat.id, HELP_TEXT).await?;
    Ok(())
}

pub async fn handle_settings_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    show_settings_menu(bot, msg.chat.id, &deps.db_pool, user_id_of(msg)).await
}

/// /status: settings summary. Polluted exchange entries are cleaned first;
/// a rejected HTML message is resent as plain text.
pub async fn handle_status_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = user_id_of(msg);
    let settings = {
        let conn = get_connection(&deps.db_pool)?;
        clean_exchanges(&conn, user_id)?;
        get_user_settings(&conn, user_id)?
    };
    let text = status_text(&settings);

    if let Err(e) = bot.send_message(msg.chat.id, &text).parse_mode(ParseMode::Html).await {
        log::warn!("/status HTML message rejected: {}. Sending plain text.", e);
        bot.send_message(msg.chat.id, strip_html(&text)).await?;
    }
    Ok(())
}

async fn build_now_report(deps: &HandlerDeps, user_id: i64) -> AppResult<String> {
    let settings = {
        let conn = get_connection(&deps.db_pool)?;
        get_user_settings(&conn, user_id)?
    };
    let view = deps
        .market
        .get_all_funding_rates(&settings.exchanges, settings.spot_filter)
        .await;
    Ok(now_report(&view, settings.spot_filter))
}

/// /now: loading message first, then the report edited in place.
pub async fn handle_now_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = user_id_of(msg);
    let loading = bot.send_message(msg.chat.id, LOADING_TEXT).await?;

    let edited = match build_now_report(deps, user_id).await {
        Ok(report) => {
            bot.edit_message_text(msg.chat.id, loading.id, truncate_message(&report))
                .parse_mode(ParseMode::Html)
                .link_preview_options(no_link_preview())
                .await
        }
        Err(e) => {
            log::error!("/now failed for user {}: {}", user_id, e);
            bot.edit_message_text(msg.chat.id, loading.id, NOW_FAILED_TEXT).await
        }
    };

    if let Err(e) = edited {
        log::error!("/now edit failed for user {}: {}", user_id, e);
        bot.edit_message_text(msg.chat.id, loading.id, NOW_FAILED_TEXT).await?;
    }
    Ok(())
}

pub async fn handle_stop_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = user_id_of(msg);
    {
        let conn = get_connection(&deps.db_pool)?;
        set_active(&conn, user_id, false)?;
    }
    deps.jobs.unschedule(user_id);

    bot.send_message(msg.chat.id, "알림이 중지되었습니다.").await?;
    Ok(())
}

pub async fn handle_resume_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = user_id_of(msg);
    {
        let conn = get_connection(&deps.db_pool)?;
        set_active(&conn, user_id, true)?;
    }
    deps.jobs.schedule(user_id);

    bot.send_message(msg.chat.id, "알림이 재개되었습니다.").await?;
    Ok(())
}

/// Free text: a settings value when one was requested, ignored otherwise.
/// The pending state is cleared whether or not the value parses.
pub async fn handle_text_message(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let user_id = user_id_of(msg);
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some((_, pending)) = deps.pending.remove(&user_id) else {
        return Ok(());
    };

    let reply = apply_pending_input(&deps.db_pool, user_id, pending, text)?;
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
