//! Aggregation across exchanges.

use crate::core::error::AppResult;
use crate::core::metrics;
use crate::market::http::HttpClient;
use crate::market::source::{SourceMode, SourceRegistry};
use crate::market::spot::SpotSymbolCache;
use crate::market::{Endpoints, Exchange, FundingTable, MarketView};
use futures_util::future::join_all;
use std::collections::HashSet;

/// Fetches funding tables from the registered sources and applies the
/// spot filter.
pub struct MarketService {
    registry: SourceRegistry,
    spot: SpotSymbolCache,
}

impl MarketService {
    pub fn new(registry: SourceRegistry, spot: SpotSymbolCache) -> Self {
        Self { registry, spot }
    }

    /// Production service: real endpoints, source mode from `FUNDING_SOURCE_MODE`.
    pub fn from_env() -> AppResult<Self> {
        Self::with_mode(SourceMode::from_env())
    }

    /// Production service with an explicit source mode.
    pub fn with_mode(mode: SourceMode) -> AppResult<Self> {
        let http = HttpClient::new()?;
        let endpoints = Endpoints::default();
        let registry = SourceRegistry::build(mode, &http, &endpoints);
        let spot = SpotSymbolCache::new(http, endpoints);
        Ok(Self::new(registry, spot))
    }

    /// Funding tables for `exchanges`, queried concurrently.
    ///
    /// Results follow the canonical exchange order; duplicates are queried
    /// once. With `use_spot_filter` only symbols that also trade on the
    /// exchange's USDT spot market are kept. A failing exchange yields an
    /// empty table.
    pub async fn get_all_funding_rates(&self, exchanges: &[Exchange], use_spot_filter: bool) -> MarketView {
        let requested: Vec<Exchange> = Exchange::all().into_iter().filter(|e| exchanges.contains(e)).collect();
        log::info!(
            "Fetching funding rates for {:?} (spot filter: {})",
            requested,
            use_spot_filter
        );

        let tables = join_all(requested.iter().map(|&exchange| self.fetch_exchange(exchange, use_spot_filter))).await;

        let view: MarketView = requested.into_iter().zip(tables).collect();
        for (exchange, table) in &view {
            log::info!("{} result: {} coins", exchange, table.len());
        }
        view
    }

    async fn fetch_exchange(&self, exchange: Exchange, use_spot_filter: bool) -> FundingTable {
        let Some(source) = self.registry.get(exchange) else {
            log::warn!("No funding source registered for {}", exchange);
            return FundingTable::new();
        };

        let timer = metrics::FETCH_DURATION_SECONDS
            .with_label_values(&[exchange.as_ref(), source.kind()])
            .start_timer();

        let (fetched, spot) = if use_spot_filter {
            let (fetched, spot) = tokio::join!(source.fetch(), self.spot.symbols(exchange));
            (fetched, Some(spot))
        } else {
            (source.fetch().await, None)
        };
        timer.observe_duration();

        let table = match fetched {
            Ok(table) => table,
            Err(e) => {
                log::error!("{} funding fetch failed: {}", exchange, e);
                metrics::FETCH_FAILURE_TOTAL
                    .with_label_values(&[exchange.as_ref(), "funding"])
                    .inc();
                return FundingTable::new();
            }
        };

        let total = table.len();
        let table = match spot {
            Some(spot) => keep_spot_listed(table, &spot),
            None => table,
        };
        log::info!(
            "{} ({}) - futures: {}, filtered out: {}, final: {}",
            exchange,
            source.kind(),
            total,
            total - table.len(),
            table.len()
        );

        metrics::COINS_PER_EXCHANGE
            .with_label_values(&[exchange.as_ref()])
            .set(table.len() as f64);
        table
    }
}

/// Futures ∩ spot: drops symbols absent from `spot`.
pub fn keep_spot_listed(table: FundingTable, spot: &HashSet<String>) -> FundingTable {
    table.into_iter().filter(|(symbol, _)| spot.contains(symbol)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FundingSnapshot;

    fn snapshot(symbol: &str) -> FundingSnapshot {
        FundingSnapshot {
            symbol: symbol.to_string(),
            rate: 0.01,
            volume: 1.0,
            price: 1.0,
            next_funding: 0,
        }
    }

    #[test]
    fn test_keep_spot_listed() {
        let table: FundingTable = ["BTC/USDT:USDT", "1000PEPE/USDT:USDT"]
            .into_iter()
            .map(|s| (s.to_string(), snapshot(s)))
            .collect();
        let spot = HashSet::from(["BTC/USDT:USDT".to_string(), "ETH/USDT:USDT".to_string()]);

        let kept = keep_spot_listed(table, &spot);

        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("BTC/USDT:USDT"));
    }

    #[test]
    fn test_empty_spot_set_filters_everything() {
        let table: FundingTable = [("BTC/USDT:USDT".to_string(), snapshot("BTC/USDT:USDT"))].into();
        assert!(keep_spot_listed(table, &HashSet::new()).is_empty());
    }
}
