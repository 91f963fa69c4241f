//! Inline settings menu: keyboards and callback routing

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use fundcore::core::metrics;
use fundcore::storage::{clean_exchanges, get_connection, get_user_settings, toggle_exchange, toggle_spot_filter};
use fundcore::{AppResult, DbPool, Exchange, UserSettings};

use super::handlers::{HandlerDeps, HandlerError, PendingInput};

/// Parsed `callback_data` of the settings menus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    SetThreshold,
    SetVolume,
    SetExchanges,
    ToggleExchange(Exchange),
    ToggleSpotFilter,
    DoneExchanges,
    Back,
}

impl MenuAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "set_threshold" => Some(Self::SetThreshold),
            "set_volume" => Some(Self::SetVolume),
            "set_exchanges" => Some(Self::SetExchanges),
            "toggle_spot_filter" => Some(Self::ToggleSpotFilter),
            "done_exchanges" => Some(Self::DoneExchanges),
            "back" => Some(Self::Back),
            _ => data
                .strip_prefix("toggle_")
                .and_then(Exchange::parse)
                .map(Self::ToggleExchange),
        }
    }

    /// Label for the commands counter.
    fn name(self) -> &'static str {
        match self {
            Self::SetThreshold => "set_threshold",
            Self::SetVolume => "set_volume",
            Self::SetExchanges => "set_exchanges",
            Self::ToggleExchange(_) => "toggle_exchange",
            Self::ToggleSpotFilter => "toggle_spot_filter",
            Self::DoneExchanges => "done_exchanges",
            Self::Back => "back",
        }
    }
}

pub const SETTINGS_PROMPT: &str = "설정을 선택하세요:";
pub const EXCHANGES_PROMPT: &str = "거래소를 선택하세요:";

const THRESHOLD_PROMPT: &str = "펀딩비 임계값을 입력하세요 (예: 0.1):\n현재 설정값 이상의 펀딩비만 알림을 받습니다.";
const VOLUME_PROMPT: &str = "거래량 필터를 입력하세요 (예: 1000000):\n설정값 이상의 거래량을 가진 코인만 알림을 받습니다.";

fn cb(label: impl Into<String>, data: impl Into<String>) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(label.into(), data.into())
}

/// Main `/settings` keyboard; the spot filter button shows its state.
pub fn settings_keyboard(settings: &UserSettings) -> InlineKeyboardMarkup {
    let filter_status = if settings.spot_filter { "✅ 활성" } else { "❌ 비활성" };

    InlineKeyboardMarkup::new(vec![
        vec![cb("펀딩비 임계값 설정", "set_threshold")],
        vec![cb("거래량 필터 설정", "set_volume")],
        vec![cb("거래소 선택", "set_exchanges")],
        vec![cb(format!("현물+선물 필터 ({})", filter_status), "toggle_spot_filter")],
        vec![cb("뒤로", "back")],
    ])
}

/// One toggle per exchange in canonical order, then "완료".
pub fn exchanges_keyboard(settings: &UserSettings) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Exchange::all()
        .into_iter()
        .map(|exchange| {
            let mark = if settings.has_exchange(exchange) { "✅" } else { "❌" };
            vec![cb(
                format!("{} {}", mark, exchange.display_name()),
                format!("toggle_{}", exchange.as_ref()),
            )]
        })
        .collect();
    rows.push(vec![cb("완료", "done_exchanges")]);

    InlineKeyboardMarkup::new(rows)
}

/// Flips the spot filter and drops polluted exchange entries. Returns the
/// confirmation text.
pub fn apply_spot_filter_toggle(db_pool: &DbPool, user_id: i64) -> AppResult<String> {
    let conn = get_connection(db_pool)?;
    let enabled = toggle_spot_filter(&conn, user_id)?;
    clean_exchanges(&conn, user_id)?;

    let status = if enabled { "활성화" } else { "비활성화" };
    Ok(format!("현물+선물 필터가 {} 되었습니다.", status))
}

fn load_settings(db_pool: &DbPool, user_id: i64) -> AppResult<UserSettings> {
    let conn = get_connection(db_pool)?;
    get_user_settings(&conn, user_id)
}

/// Handles every callback query of the settings menus.
///
/// The query is answered before anything else so the client stops its
/// spinner even when the action fails.
pub async fn handle_menu_callback(bot: Bot, q: CallbackQuery, deps: HandlerDeps) -> Result<(), HandlerError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        log::warn!("Failed to answer callback query from user {}: {}", q.from.id, e);
    }

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(action) = MenuAction::parse(data) else {
        log::warn!("Unknown callback data {:?} from user {}", data, q.from.id);
        return Ok(());
    };
    let Some((chat_id, message_id)) = q.message.as_ref().map(|m| (m.chat().id, m.id())) else {
        return Ok(());
    };
    let user_id = i64::try_from(q.from.id.0).unwrap_or(chat_id.0);

    metrics::COMMANDS_TOTAL.with_label_values(&[action.name()]).inc();
    log::debug!("Callback {:?} from user {}", action, user_id);

    match action {
        MenuAction::SetThreshold => {
            deps.pending.insert(user_id, PendingInput::Threshold);
            bot.edit_message_text(chat_id, message_id, THRESHOLD_PROMPT).await?;
        }
        MenuAction::SetVolume => {
            deps.pending.insert(user_id, PendingInput::Volume);
            bot.edit_message_text(chat_id, message_id, VOLUME_PROMPT).await?;
        }
        MenuAction::SetExchanges => {
            let settings = load_settings(&deps.db_pool, user_id)?;
            bot.edit_message_text(chat_id, message_id, EXCHANGES_PROMPT)
                .reply_markup(exchanges_keyboard(&settings))
                .await?;
        }
        MenuAction::ToggleExchange(exchange) => {
            let settings = {
                let conn = get_connection(&deps.db_pool)?;
                toggle_exchange(&conn, user_id, exchange)?
            };
            log::info!("User {} toggled {} -> {:?}", user_id, exchange, settings.exchanges);
            bot.edit_message_text(chat_id, message_id, EXCHANGES_PROMPT)
                .reply_markup(exchanges_keyboard(&settings))
                .await?;
        }
        MenuAction::ToggleSpotFilter => {
            let text = apply_spot_filter_toggle(&deps.db_pool, user_id)?;
            bot.edit_message_text(chat_id, message_id, text).await?;
        }
        MenuAction::DoneExchanges => {
            bot.edit_message_text(chat_id, message_id, "거래소 설정이 완료되었습니다.")
                .await?;
        }
        MenuAction::Back => {
            bot.edit_message_text(chat_id, message_id, "설정이 취소되었습니다.").await?;
        }
    }

    Ok(())
}

/// Sends the `/settings` menu.
pub async fn show_settings_menu(bot: &Bot, chat_id: ChatId, db_pool: &Arc<DbPool>, user_id: i64) -> Result<(), HandlerError> {
    let settings = load_settings(db_pool, user_id)?;
    bot.send_message(chat_id, SETTINGS_PROMPT)
        .reply_markup(settings_keyboard(&settings))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fundcore::storage::{create_pool, ensure_user};
    use pretty_assertions::assert_eq;
    use teloxide::types::InlineKeyboardButtonKind;

    fn labels_and_data(markup: &InlineKeyboardMarkup) -> Vec<(String, String)> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .map(|button| {
                let data = match &button.kind {
                    InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                    other => panic!("unexpected button kind {:?}", other),
                };
                (button.text.clone(), data)
            })
            .collect()
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(MenuAction::parse("set_threshold"), Some(MenuAction::SetThreshold));
        assert_eq!(MenuAction::parse("toggle_spot_filter"), Some(MenuAction::ToggleSpotFilter));
        assert_eq!(
            MenuAction::parse("toggle_okx"),
            Some(MenuAction::ToggleExchange(Exchange::Okx))
        );
        assert_eq!(MenuAction::parse("toggle_kraken"), None);
        assert_eq!(MenuAction::parse("history:repeat"), None);
    }

    #[test]
    fn test_settings_keyboard_shows_spot_filter_state() {
        let mut settings = UserSettings::new(1);
        let buttons = labels_and_data(&settings_keyboard(&settings));
        assert_eq!(buttons.len(), 5);
        assert_eq!(
            buttons[3],
            ("현물+선물 필터 (✅ 활성)".to_string(), "toggle_spot_filter".to_string())
        );

        settings.spot_filter = false;
        let buttons = labels_and_data(&settings_keyboard(&settings));
        assert_eq!(buttons[3].0, "현물+선물 필터 (❌ 비활성)");
    }

    #[test]
    fn test_exchanges_keyboard_marks_selection() {
        let mut settings = UserSettings::new(1);
        settings.toggle_exchange(Exchange::Binance);

        let buttons = labels_and_data(&exchanges_keyboard(&settings));
        assert_eq!(
            buttons,
            vec![
                ("✅ Bybit".to_string(), "toggle_bybit".to_string()),
                ("❌ Binance".to_string(), "toggle_binance".to_string()),
                ("✅ Bitget".to_string(), "toggle_bitget".to_string()),
                ("✅ OKX".to_string(), "toggle_okx".to_string()),
                ("완료".to_string(), "done_exchanges".to_string()),
            ]
        );
    }

    #[test]
    fn test_spot_filter_toggle_cleans_exchanges() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(dir.path().join("bot.db").to_str().unwrap()).unwrap();
        {
            let conn = get_connection(&pool).unwrap();
            ensure_user(&conn, 8).unwrap();
            conn.execute(
                r#"UPDATE user_settings SET exchanges = '["bybit","spot_filter"]' WHERE user_id = 8"#,
                [],
            )
            .unwrap();
        }

        assert_eq!(
            apply_spot_filter_toggle(&pool, 8).unwrap(),
            "현물+선물 필터가 비활성화 되었습니다."
        );
        assert_eq!(
            apply_spot_filter_toggle(&pool, 8).unwrap(),
            "현물+선물 필터가 활성화 되었습니다."
        );

        let conn = get_connection(&pool).unwrap();
        let raw: String = conn
            .query_row("SELECT exchanges FROM user_settings WHERE user_id = 8", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, r#"["bybit"]"#);
    }
}
