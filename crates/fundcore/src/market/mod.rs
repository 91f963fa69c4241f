//! Exchange market data: funding rates for USDT perpetuals on Bybit,
//! Binance, Bitget and OKX, plus the spot symbol sets used to keep only
//! coins that also trade on spot.
//!
//! Every table is keyed by the unified symbol `"{BASE}/USDT:USDT"`.

pub mod binance;
pub mod bitget;
pub mod bybit;
mod de;
pub mod endpoints;
pub mod http;
pub mod okx;
pub mod service;
pub mod source;
pub mod spot;
pub mod stream;

pub use endpoints::Endpoints;
pub use service::MarketService;
pub use source::{FundingSource, SourceMode, SourceRegistry};
pub use spot::SpotSymbolCache;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Supported exchanges, in canonical order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Exchange {
    Bybit,
    Binance,
    Bitget,
    Okx,
}

impl Exchange {
    /// All exchanges in canonical order.
    pub fn all() -> Vec<Exchange> {
        Exchange::iter().collect()
    }

    /// Name shown on buttons ("Bybit", "OKX").
    pub fn display_name(self) -> &'static str {
        match self {
            Exchange::Bybit => "Bybit",
            Exchange::Binance => "Binance",
            Exchange::Bitget => "Bitget",
            Exchange::Okx => "OKX",
        }
    }

    /// Name used in report headers ("BYBIT").
    pub fn label(self) -> String {
        self.as_ref().to_uppercase()
    }

    /// Parses a stored/wire name; unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Exchange> {
        name.trim().to_lowercase().parse().ok()
    }
}

/// One USDT perpetual on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    /// Unified symbol, e.g. `BTC/USDT:USDT`
    pub symbol: String,
    /// Funding rate in percent (raw rate × 100)
    pub rate: f64,
    /// 24h quote volume in USDT
    pub volume: f64,
    /// Last or mark price
    pub price: f64,
    /// Next funding time in epoch milliseconds, 0 when unknown
    pub next_funding: i64,
}

/// Funding snapshots of one exchange keyed by unified symbol.
pub type FundingTable = HashMap<String, FundingSnapshot>;

/// Per-exchange tables in request order.
pub type MarketView = Vec<(Exchange, FundingTable)>;

/// Builds the unified symbol for a base asset.
pub fn unified_symbol(base: &str) -> String {
    format!("{}/USDT:USDT", base)
}

/// Extracts the base asset from a unified symbol (`IOST/USDT:USDT` → `IOST`).
pub fn base_of(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}

/// Strips a `USDT` suffix from an exchange-native pair (`BTCUSDT` → `BTC`).
pub(crate) fn usdt_base(pair: &str) -> Option<&str> {
    pair.strip_suffix("USDT").filter(|base| !base.is_empty())
}
