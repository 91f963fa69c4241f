//! Bybit v5 linear tickers and spot instruments.

use crate::core::error::{AppError, AppResult};
use crate::market::de;
use crate::market::http::HttpClient;
use crate::market::source::FundingSource;
use crate::market::{unified_symbol, usdt_base, Endpoints, Exchange, FundingSnapshot, FundingTable};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<ListResult<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

impl<T> Envelope<T> {
    /// Rows of a `retCode == 0` response, or the API error.
    fn into_list(self) -> AppResult<Vec<T>> {
        if self.ret_code != 0 {
            log::warn!("Bybit API error {}: {}", self.ret_code, self.ret_msg);
            return Err(AppError::exchange_api("bybit", self.ret_code.to_string()));
        }
        Ok(self.result.map(|r| r.list).unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LinearTicker {
    pub symbol: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub funding_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub turnover24h: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub last_price: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub next_funding_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpotInstrument {
    pub base_coin: String,
    pub quote_coin: String,
}

pub(crate) fn parse_funding(rows: Vec<LinearTicker>) -> FundingTable {
    let mut table = FundingTable::new();
    for row in rows {
        let Some(base) = usdt_base(&row.symbol) else {
            continue;
        };
        let (Some(rate), Some(price)) = (row.funding_rate, row.last_price) else {
            log::debug!("Bybit: skipping {} without funding rate or price", row.symbol);
            continue;
        };

        let symbol = unified_symbol(base);
        table.insert(
            symbol.clone(),
            FundingSnapshot {
                symbol,
                rate: rate * 100.0,
                volume: row.turnover24h.unwrap_or(0.0),
                price,
                next_funding: row.next_funding_time.unwrap_or(0),
            },
        );
    }
    table
}

pub(crate) fn parse_spot_symbols(envelope: Envelope<SpotInstrument>) -> HashSet<String> {
    // A non-zero retCode yields an empty set
    envelope
        .into_list()
        .unwrap_or_default()
        .into_iter()
        .filter(|s| s.quote_coin == "USDT")
        .map(|s| unified_symbol(&s.base_coin))
        .collect()
}

pub async fn fetch_spot_symbols(http: &HttpClient, endpoints: &Endpoints) -> AppResult<HashSet<String>> {
    let url = format!("{}/v5/market/instruments-info", endpoints.bybit);
    let envelope: Envelope<SpotInstrument> = http.get_json(&url, &[("category", "spot")]).await?;
    Ok(parse_spot_symbols(envelope))
}

/// Funding rates from `/v5/market/tickers?category=linear`.
pub struct BybitRest {
    http: HttpClient,
    base: String,
}

impl BybitRest {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            base: endpoints.bybit.clone(),
        }
    }
}

#[async_trait]
impl FundingSource for BybitRest {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        let url = format!("{}/v5/market/tickers", self.base);
        let envelope: Envelope<LinearTicker> = self.http.get_json(&url, &[("category", "linear")]).await?;
        Ok(parse_funding(envelope.into_list()?))
    }
}
