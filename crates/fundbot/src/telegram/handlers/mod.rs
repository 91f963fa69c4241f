//! Telegram bot handler tree configuration
//!
//! The same schema is used by the production dispatcher and can be reused
//! by tests.

mod commands;
mod schema;
mod types;

pub use commands::HELP_TEXT;
pub use schema::schema;
pub use types::{apply_pending_input, parse_number, user_id_of, HandlerDeps, HandlerError, PendingInput};
