//! Binance USDⓈ-M futures REST client and spot symbol list.

use crate::core::error::AppResult;
use crate::market::de;
use crate::market::http::HttpClient;
use crate::market::source::FundingSource;
use crate::market::{unified_symbol, usdt_base, Endpoints, Exchange, FundingSnapshot, FundingTable};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PremiumIndex {
    pub symbol: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub last_funding_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub mark_price: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub next_funding_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ticker24h {
    pub symbol: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub quote_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeInfo {
    #[serde(default)]
    pub symbols: Vec<SpotSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpotSymbol {
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
}

/// Joins premium index rows with 24h tickers into a funding table.
pub(crate) fn parse_funding(premium: Vec<PremiumIndex>, tickers: Vec<Ticker24h>) -> FundingTable {
    let volumes: HashMap<String, f64> = tickers
        .into_iter()
        .filter_map(|t| t.quote_volume.map(|v| (t.symbol, v)))
        .collect();

    let mut table = FundingTable::new();
    for item in premium {
        let Some(base) = usdt_base(&item.symbol) else {
            continue;
        };
        let (Some(rate), Some(price)) = (item.last_funding_rate, item.mark_price) else {
            log::debug!("Binance: skipping {} with incomplete premium index", item.symbol);
            continue;
        };

        let symbol = unified_symbol(base);
        table.insert(
            symbol.clone(),
            FundingSnapshot {
                symbol,
                rate: rate * 100.0,
                volume: volumes.get(&item.symbol).copied().unwrap_or(0.0),
                price,
                next_funding: item.next_funding_time.unwrap_or(0),
            },
        );
    }
    table
}

pub(crate) fn parse_spot_symbols(info: ExchangeInfo) -> HashSet<String> {
    info.symbols
        .into_iter()
        .filter(|s| s.quote_asset == "USDT" && s.status == "TRADING")
        .map(|s| unified_symbol(&s.base_asset))
        .collect()
}

/// Tradable USDT spot pairs as unified symbols.
pub async fn fetch_spot_symbols(http: &HttpClient, endpoints: &Endpoints) -> AppResult<HashSet<String>> {
    let url = format!("{}/api/v3/exchangeInfo", endpoints.binance_spot);
    let info: ExchangeInfo = http.get_json(&url, &[]).await?;
    Ok(parse_spot_symbols(info))
}

/// Funding rates from `/fapi/v1/premiumIndex` plus volumes from `/fapi/v1/ticker/24hr`.
pub struct BinanceRest {
    http: HttpClient,
    base: String,
}

impl BinanceRest {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            base: endpoints.binance_futures.clone(),
        }
    }
}

#[async_trait]
impl FundingSource for BinanceRest {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        let premium_url = format!("{}/fapi/v1/premiumIndex", self.base);
        let ticker_url = format!("{}/fapi/v1/ticker/24hr", self.base);

        let premium: Vec<PremiumIndex> = self.http.get_json(&premium_url, &[]).await?;
        // Volumes are optional: a failed ticker call leaves them at 0
        let tickers: Vec<Ticker24h> = match self.http.get_json(&ticker_url, &[]).await {
            Ok(tickers) => tickers,
            Err(e) => {
                log::warn!("Binance 24h ticker unavailable, volumes set to 0: {}", e);
                Vec::new()
            }
        };

        Ok(parse_funding(premium, tickers))
    }
}
