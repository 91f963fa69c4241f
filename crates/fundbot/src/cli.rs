use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fundbot")]
#[command(author, version, about = "Telegram bot that reports and alerts on perpetual-futures funding rates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the bot (long polling)
    Run,

    /// Check TELEGRAM_BOT_TOKEN and DATA_DIR; exits non-zero when a required variable is missing
    CheckEnv,

    /// Print the current TOP 5 funding rates without Telegram
    Snapshot {
        /// Exchange to include (bybit, binance, bitget, okx); repeatable, all when omitted
        #[arg(short, long = "exchange")]
        exchanges: Vec<String>,

        /// Include perpetuals that have no spot market
        #[arg(long)]
        no_spot_filter: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
