//! Base URLs of the exchange APIs.
//!
//! Production code uses [`Endpoints::default`]; tests point every REST base
//! at a local mock server with [`Endpoints::with_rest_base`].

/// REST and WebSocket base URLs (no trailing slash).
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub binance_futures: String,
    pub binance_spot: String,
    pub bybit: String,
    pub bitget: String,
    pub okx: String,
    pub binance_ws: String,
    pub okx_ws: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            binance_futures: "https://fapi.binance.com".to_string(),
            binance_spot: "https://api.binance.com".to_string(),
            bybit: "https://api.bybit.com".to_string(),
            bitget: "https://api.bitget.com".to_string(),
            okx: "https://www.okx.com".to_string(),
            binance_ws: "wss://fstream.binance.com/stream".to_string(),
            okx_ws: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
        }
    }
}

impl Endpoints {
    /// Points every REST base at one server. WebSocket URLs keep their defaults.
    pub fn with_rest_base(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            binance_futures: base.clone(),
            binance_spot: base.clone(),
            bybit: base.clone(),
            bitget: base.clone(),
            okx: base,
            ..Self::default()
        }
    }
}
