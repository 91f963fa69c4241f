//! Common test utilities
//!
//! Shared across the fundcore integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fundcore::core::retry::RetryConfig;
use fundcore::market::http::HttpClient;
use fundcore::market::{Endpoints, FundingSource, SourceRegistry, SpotSymbolCache};
use fundcore::{create_pool, AppError, AppResult, DbPool, Exchange, FundingSnapshot, FundingTable, MarketService};
use std::sync::Arc;
use tempfile::TempDir;

/// A pool on a fresh database file. Keep the `TempDir` alive for the test.
pub fn temp_pool() -> (TempDir, Arc<DbPool>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("funding_bot.db");
    let pool = create_pool(path.to_str().unwrap()).unwrap();
    (dir, Arc::new(pool))
}

/// HTTP client without retries, for mock servers.
pub fn http() -> HttpClient {
    HttpClient::new().unwrap().with_retry(RetryConfig::none())
}

pub fn snapshot(symbol: &str, rate: f64, volume: f64) -> FundingSnapshot {
    FundingSnapshot {
        symbol: symbol.to_string(),
        rate,
        volume,
        price: 100.0,
        next_funding: 0,
    }
}

/// Source returning a fixed table, or failing.
pub struct StaticSource {
    pub exchange: Exchange,
    pub table: Option<FundingTable>,
}

impl StaticSource {
    pub fn with(exchange: Exchange, rows: &[(&str, f64, f64)]) -> Arc<Self> {
        let table = rows
            .iter()
            .map(|(symbol, rate, volume)| (symbol.to_string(), snapshot(symbol, *rate, *volume)))
            .collect();
        Arc::new(Self {
            exchange,
            table: Some(table),
        })
    }

    pub fn failing(exchange: Exchange) -> Arc<Self> {
        Arc::new(Self { exchange, table: None })
    }
}

#[async_trait]
impl FundingSource for StaticSource {
    fn exchange(&self) -> Exchange {
        self.exchange
    }

    fn kind(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        self.table
            .clone()
            .ok_or_else(|| AppError::exchange_api(self.exchange.as_ref(), "test"))
    }
}

/// Market service over the given sources; spot lookups go to `spot_base`.
pub fn market_with(sources: Vec<Arc<StaticSource>>, spot_base: &str) -> MarketService {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry.register(source);
    }
    let spot = SpotSymbolCache::new(http(), Endpoints::with_rest_base(spot_base));
    MarketService::new(registry, spot)
}
