//! Bitget USDT-M mix tickers and spot symbols.

use crate::core::error::{AppError, AppResult};
use crate::market::de;
use crate::market::http::HttpClient;
use crate::market::source::FundingSource;
use crate::market::{unified_symbol, usdt_base, Endpoints, Exchange, FundingSnapshot, FundingTable};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;

const SUCCESS_CODE: &str = "00000";
const PERPETUAL_SUFFIX: &str = "_UMCBL";

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    pub data: Option<Vec<T>>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> AppResult<Vec<T>> {
        if self.code != SUCCESS_CODE {
            log::warn!("Bitget API error {}: {}", self.code, self.msg);
            return Err(AppError::exchange_api("bitget", self.code));
        }
        Ok(self.data.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MixTicker {
    pub symbol: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub funding_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub quote_volume: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub last: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpotSymbol {
    pub base_coin: String,
    pub quote_coin: String,
    pub status: String,
}

/// Builds the table from `XXXUSDT_UMCBL` tickers. Next funding time is not
/// part of this endpoint and stays 0.
pub(crate) fn parse_funding(rows: Vec<MixTicker>) -> FundingTable {
    let mut table = FundingTable::new();
    for row in rows {
        let Some(pair) = row.symbol.strip_suffix(PERPETUAL_SUFFIX) else {
            continue;
        };
        let Some(base) = usdt_base(pair) else {
            continue;
        };
        let Some(price) = row.last else {
            log::debug!("Bitget: skipping {} without last price", row.symbol);
            continue;
        };

        let symbol = unified_symbol(base);
        table.insert(
            symbol.clone(),
            FundingSnapshot {
                symbol,
                rate: row.funding_rate.unwrap_or(0.0) * 100.0,
                volume: row.quote_volume.unwrap_or(0.0),
                price,
                next_funding: 0,
            },
        );
    }
    table
}

pub(crate) fn parse_spot_symbols(envelope: Envelope<SpotSymbol>) -> HashSet<String> {
    envelope
        .into_data()
        .unwrap_or_default()
        .into_iter()
        .filter(|s| s.quote_coin == "USDT" && s.status == "online")
        .map(|s| unified_symbol(&s.base_coin))
        .collect()
}

pub async fn fetch_spot_symbols(http: &HttpClient, endpoints: &Endpoints) -> AppResult<HashSet<String>> {
    let url = format!("{}/api/v2/spot/public/symbols", endpoints.bitget);
    let envelope: Envelope<SpotSymbol> = http.get_json(&url, &[]).await?;
    Ok(parse_spot_symbols(envelope))
}

/// Funding rates from `/api/mix/v1/market/tickers?productType=umcbl`.
pub struct BitgetRest {
    http: HttpClient,
    base: String,
}

impl BitgetRest {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            base: endpoints.bitget.clone(),
        }
    }
}

#[async_trait]
impl FundingSource for BitgetRest {
    fn exchange(&self) -> Exchange {
        Exchange::Bitget
    }

    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        let url = format!("{}/api/mix/v1/market/tickers", self.base);
        let envelope: Envelope<MixTicker> = self.http.get_json(&url, &[("productType", "umcbl")]).await?;
        Ok(parse_funding(envelope.into_data()?))
    }
}
