//! fundbot - Telegram front end of the funding-rate monitor
//!
//! Market data, reports, storage and scheduling live in `fundcore`; this
//! crate wires them to the Bot API.
//!
//! # Module Structure
//!
//! - `cli`: command line interface
//! - `telegram`: bot setup, command and callback handlers, notification delivery

pub mod cli;
pub mod telegram;
