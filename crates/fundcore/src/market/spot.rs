//! Spot symbol cache.
//!
//! Holds, per exchange, the unified symbols that trade on that exchange's
//! USDT spot market. Sets are refreshed at most once per TTL; a failed
//! refresh keeps serving the previous set.

use crate::core::config;
use crate::core::error::AppResult;
use crate::core::metrics;
use crate::market::http::HttpClient;
use crate::market::{binance, bitget, bybit, okx, Endpoints, Exchange};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry {
    symbols: Arc<HashSet<String>>,
    fetched_at: Instant,
}

pub struct SpotSymbolCache {
    http: HttpClient,
    endpoints: Endpoints,
    ttl: Duration,
    entries: DashMap<Exchange, Entry>,
}

impl SpotSymbolCache {
    pub fn new(http: HttpClient, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            ttl: config::market::spot_symbol_ttl(),
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Spot symbols for `exchange`, fetching when the cached set is empty or stale.
    pub async fn symbols(&self, exchange: Exchange) -> Arc<HashSet<String>> {
        // Clone out of the map so no shard lock is held across the fetch
        let cached = self.entries.get(&exchange).map(|e| e.clone());

        if let Some(entry) = &cached {
            if !entry.symbols.is_empty() && entry.fetched_at.elapsed() < self.ttl {
                log::debug!("{} spot symbols from cache: {}", exchange, entry.symbols.len());
                return Arc::clone(&entry.symbols);
            }
        }

        match self.fetch(exchange).await {
            Ok(symbols) => {
                log::info!("{} spot symbols loaded: {}", exchange, symbols.len());
                let symbols = Arc::new(symbols);
                self.entries.insert(
                    exchange,
                    Entry {
                        symbols: Arc::clone(&symbols),
                        fetched_at: Instant::now(),
                    },
                );
                symbols
            }
            Err(e) => {
                log::error!("{} spot symbol fetch failed: {}", exchange, e);
                metrics::FETCH_FAILURE_TOTAL
                    .with_label_values(&[exchange.as_ref(), "spot"])
                    .inc();
                cached.map(|entry| entry.symbols).unwrap_or_default()
            }
        }
    }

    /// Number of cached symbols, without fetching.
    pub fn cached_len(&self, exchange: Exchange) -> usize {
        self.entries.get(&exchange).map(|e| e.symbols.len()).unwrap_or(0)
    }

    async fn fetch(&self, exchange: Exchange) -> AppResult<HashSet<String>> {
        match exchange {
            Exchange::Binance => binance::fetch_spot_symbols(&self.http, &self.endpoints).await,
            Exchange::Bybit => bybit::fetch_spot_symbols(&self.http, &self.endpoints).await,
            Exchange::Bitget => bitget::fetch_spot_symbols(&self.http, &self.endpoints).await,
            Exchange::Okx => okx::fetch_spot_symbols(&self.http, &self.endpoints).await,
        }
    }
}
