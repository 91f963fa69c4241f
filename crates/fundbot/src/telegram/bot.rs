//! Bot initialization
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Command menu registration

use anyhow::Context;
use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use fundcore::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "사용 가능한 명령어:")]
pub enum Command {
    #[command(description = "봇 시작 / 도움말")]
    Start,
    #[command(description = "알림 설정 변경")]
    Settings,
    #[command(description = "현재 설정 확인")]
    Status,
    #[command(description = "현재 펀딩비 확인")]
    Now,
    #[command(description = "알림 중지")]
    Stop,
    #[command(description = "알림 재개")]
    Resume,
}

impl Command {
    /// Label used for the commands counter.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Settings => "settings",
            Command::Status => "status",
            Command::Now => "now",
            Command::Stop => "stop",
            Command::Resume => "resume",
        }
    }
}

/// Creates a Bot instance from `TELEGRAM_BOT_TOKEN`
///
/// `BOT_API_URL` points the bot at a self-hosted Bot API server.
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Token missing or client could not be built
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN
        .as_ref()
        .with_context(|| format!("{} is not set", config::TELEGRAM_BOT_TOKEN_VAR))?;
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    let bot = Bot::with_client(token.expose_secret(), client);

    if let Ok(bot_api_url) = std::env::var("BOT_API_URL") {
        log::info!("Using custom Bot API URL: {}", bot_api_url);
        let url = url::Url::parse(&bot_api_url).context("Invalid BOT_API_URL")?;
        return Ok(bot.set_api_url(url));
    }

    Ok(bot)
}

/// Registers the command menu shown by Telegram clients
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "봇 시작 / 도움말"),
        BotCommand::new("settings", "알림 설정 변경"),
        BotCommand::new("status", "현재 설정 확인"),
        BotCommand::new("now", "현재 펀딩비 확인"),
        BotCommand::new("stop", "알림 중지"),
        BotCommand::new("resume", "알림 재개"),
    ])
    .await?;

    Ok(())
}
