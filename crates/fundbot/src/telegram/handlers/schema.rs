//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use fundcore::core::metrics;

use super::commands::{
    handle_now_command, handle_resume_command, handle_settings_command, handle_start_command, handle_status_command,
    handle_stop_command, handle_text_message,
};
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::bot::Command;
use crate::telegram::menu::handle_menu_callback;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Commands first, then free text (settings input), then callback queries.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);
                metrics::COMMANDS_TOTAL.with_label_values(&[cmd.name()]).inc();

                let result = match cmd {
                    Command::Start => handle_start_command(&bot, &msg, &deps).await,
                    Command::Settings => handle_settings_command(&bot, &msg, &deps).await,
                    Command::Status => handle_status_command(&bot, &msg, &deps).await,
                    Command::Now => handle_now_command(&bot, &msg, &deps).await,
                    Command::Stop => handle_stop_command(&bot, &msg, &deps).await,
                    Command::Resume => handle_resume_command(&bot, &msg, &deps).await,
                };

                if let Err(e) = result {
                    log::error!("Command {:?} failed for chat {}: {}", cmd, msg.chat.id, e);
                }
                Ok(())
            }
        },
    ))
}

/// Plain text that is not a command.
fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|text| !text.starts_with('/')).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_text_message(&bot, &msg, &deps).await {
                    log::error!("Text input failed for chat {}: {}", msg.chat.id, e);
                }
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let user_id = q.from.id;
            if let Err(e) = handle_menu_callback(bot, q, deps).await {
                log::error!("Callback failed for user {}: {}", user_id, e);
            }
            Ok(())
        }
    })
}
