//! OKX v5 public REST: swap instruments, per-instrument funding and tickers.

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::market::de;
use crate::market::http::HttpClient;
use crate::market::source::FundingSource;
use crate::market::{unified_symbol, Endpoints, Exchange, FundingSnapshot, FundingTable};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;

const SUCCESS_CODE: &str = "0";
const SWAP_SUFFIX: &str = "-USDT-SWAP";

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Envelope<T> {
    pub(crate) fn into_data(self) -> AppResult<Vec<T>> {
        if self.code != SUCCESS_CODE {
            log::warn!("OKX API error {}: {}", self.code, self.msg);
            return Err(AppError::exchange_api("okx", self.code));
        }
        Ok(self.data)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Instrument {
    pub inst_id: String,
    #[serde(default)]
    pub settle_ccy: String,
    #[serde(default)]
    pub base_ccy: String,
    #[serde(default)]
    pub quote_ccy: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FundingRateRow {
    pub inst_id: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub funding_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    pub next_funding_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TickerRow {
    pub inst_id: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub last: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    pub vol_ccy24h: Option<f64>,
}

/// `BTC-USDT-SWAP` → `BTC/USDT:USDT`
pub(crate) fn symbol_for_inst(inst_id: &str) -> String {
    unified_symbol(inst_id.split('-').next().unwrap_or(inst_id))
}

/// USDT-settled perpetual ids among SWAP instruments.
pub(crate) fn usdt_swap_ids(instruments: Vec<Instrument>) -> Vec<String> {
    instruments
        .into_iter()
        .filter(|i| i.settle_ccy == "USDT" && i.inst_id.ends_with(SWAP_SUFFIX))
        .map(|i| i.inst_id)
        .collect()
}

pub(crate) fn parse_spot_symbols(envelope: Envelope<Instrument>) -> HashSet<String> {
    envelope
        .into_data()
        .unwrap_or_default()
        .into_iter()
        .filter(|i| i.quote_ccy == "USDT" && i.state == "live")
        .map(|i| unified_symbol(&i.base_ccy))
        .collect()
}

/// Combines one funding row and one ticker row. Missing volume becomes 0.
pub(crate) fn snapshot_from(funding: &FundingRateRow, ticker: &TickerRow) -> Option<FundingSnapshot> {
    let rate = funding.funding_rate?;
    let price = ticker.last?;
    Some(FundingSnapshot {
        symbol: symbol_for_inst(&funding.inst_id),
        rate: rate * 100.0,
        volume: ticker.vol_ccy24h.unwrap_or(0.0),
        price,
        next_funding: funding.next_funding_time.unwrap_or(0),
    })
}

/// Lists the USDT perpetual instrument ids.
pub async fn fetch_swap_ids(http: &HttpClient, endpoints: &Endpoints) -> AppResult<Vec<String>> {
    let url = format!("{}/api/v5/public/instruments", endpoints.okx);
    let envelope: Envelope<Instrument> = http.get_json(&url, &[("instType", "SWAP")]).await?;
    Ok(usdt_swap_ids(envelope.into_data()?))
}

pub async fn fetch_spot_symbols(http: &HttpClient, endpoints: &Endpoints) -> AppResult<HashSet<String>> {
    let url = format!("{}/api/v5/public/instruments", endpoints.okx);
    let envelope: Envelope<Instrument> = http.get_json(&url, &[("instType", "SPOT")]).await?;
    Ok(parse_spot_symbols(envelope))
}

/// Funding rates via one funding-rate and one ticker request per instrument,
/// batched to stay under the public rate limit.
pub struct OkxRest {
    http: HttpClient,
    endpoints: Endpoints,
}

impl OkxRest {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            endpoints: endpoints.clone(),
        }
    }

    async fn fetch_one(&self, inst_id: &str) -> AppResult<Option<FundingSnapshot>> {
        let funding_url = format!("{}/api/v5/public/funding-rate", self.endpoints.okx);
        let ticker_url = format!("{}/api/v5/market/ticker", self.endpoints.okx);
        let query = [("instId", inst_id)];

        let (funding, ticker) = tokio::join!(
            self.http.get_json::<Envelope<FundingRateRow>>(&funding_url, &query),
            self.http.get_json::<Envelope<TickerRow>>(&ticker_url, &query),
        );
        let funding = funding?.into_data()?;
        let ticker = ticker?.into_data()?;

        Ok(match (funding.first(), ticker.first()) {
            (Some(f), Some(t)) => snapshot_from(f, t),
            _ => None,
        })
    }
}

#[async_trait]
impl FundingSource for OkxRest {
    fn exchange(&self) -> Exchange {
        Exchange::Okx
    }

    fn kind(&self) -> &'static str {
        "rest"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        let ids = fetch_swap_ids(&self.http, &self.endpoints).await?;
        let mut table = FundingTable::new();

        for batch in ids.chunks(config::market::OKX_REST_BATCH) {
            let results = join_all(batch.iter().map(|id| self.fetch_one(id))).await;

            for (inst_id, result) in batch.iter().zip(results) {
                match result {
                    Ok(Some(snapshot)) => {
                        table.insert(snapshot.symbol.clone(), snapshot);
                    }
                    Ok(None) => log::debug!("OKX: no data for {}", inst_id),
                    Err(e) => log::warn!("OKX: skipping {}: {}", inst_id, e),
                }
            }

            tokio::time::sleep(config::market::okx_batch_pause()).await;
        }

        Ok(table)
    }
}
