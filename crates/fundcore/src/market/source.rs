//! Pluggable funding-rate backends.
//!
//! Each exchange is served by one `FundingSource`: a REST client, or a
//! WebSocket monitor that keeps the latest values in memory. The
//! `SourceRegistry` picks the backend per exchange from the source mode.

use crate::core::error::AppResult;
use crate::market::http::HttpClient;
use crate::market::{binance, bitget, bybit, okx, stream, Endpoints, Exchange, FundingTable};
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// A backend producing the full table of USDT perpetuals for one exchange.
///
/// Tables are returned before spot filtering.
#[async_trait]
pub trait FundingSource: Send + Sync {
    /// Exchange served by this source.
    fn exchange(&self) -> Exchange;

    /// Short backend name used in logs and metric labels.
    fn kind(&self) -> &'static str;

    /// Fetches (or snapshots) the current funding table.
    async fn fetch(&self) -> AppResult<FundingTable>;
}

/// Where Binance and OKX data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// Binance and OKX via WebSocket monitors, Bybit and Bitget via REST
    #[default]
    Stream,
    /// Every exchange via REST
    Rest,
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stream" | "ws" | "websocket" => Ok(SourceMode::Stream),
            "rest" | "http" => Ok(SourceMode::Rest),
            other => Err(format!("unknown funding source mode: {}", other)),
        }
    }
}

impl SourceMode {
    /// Reads `FUNDING_SOURCE_MODE`, falling back to `stream` on bad values.
    pub fn from_env() -> Self {
        let raw = crate::core::config::market::SOURCE_MODE.as_str();
        raw.parse().unwrap_or_else(|e| {
            log::warn!("{}; using stream", e);
            SourceMode::Stream
        })
    }
}

/// One source per exchange.
pub struct SourceRegistry {
    sources: HashMap<Exchange, Arc<dyn FundingSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Registers a source, replacing any previous one for the same exchange.
    pub fn register(&mut self, source: Arc<dyn FundingSource>) {
        self.sources.insert(source.exchange(), source);
    }

    pub fn get(&self, exchange: Exchange) -> Option<Arc<dyn FundingSource>> {
        self.sources.get(&exchange).cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Builds the production registry for `mode`.
    pub fn build(mode: SourceMode, http: &HttpClient, endpoints: &Endpoints) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(bybit::BybitRest::new(http.clone(), endpoints)));
        registry.register(Arc::new(bitget::BitgetRest::new(http.clone(), endpoints)));

        match mode {
            SourceMode::Stream => {
                registry.register(Arc::new(stream::binance::BinanceMonitor::new(endpoints)));
                registry.register(Arc::new(stream::okx::OkxMonitor::new(http.clone(), endpoints)));
            }
            SourceMode::Rest => {
                registry.register(Arc::new(binance::BinanceRest::new(http.clone(), endpoints)));
                registry.register(Arc::new(okx::OkxRest::new(http.clone(), endpoints)));
            }
        }

        log::info!("Funding sources ready ({:?} mode, {} exchanges)", mode, registry.len());
        registry
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
