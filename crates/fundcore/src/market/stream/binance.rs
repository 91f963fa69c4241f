//! Binance futures combined stream: `!markPrice@arr@1s` and `!ticker@arr`.

use super::{drive, reconnect_forever, LazyStart, StreamHandler};
use crate::core::config;
use crate::core::error::AppResult;
use crate::market::de;
use crate::market::source::FundingSource;
use crate::market::{unified_symbol, usdt_base, Endpoints, Exchange, FundingSnapshot, FundingTable};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const MARK_STREAM: &str = "!markPrice@arr@1s";
const TICKER_STREAM: &str = "!ticker@arr";

#[derive(Debug, Deserialize)]
struct Combined {
    #[serde(default)]
    stream: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MarkItem {
    s: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    r: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    p: Option<f64>,
    #[serde(rename = "T", default, deserialize_with = "de::opt_i64")]
    next_funding: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TickerItem {
    s: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    q: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Mark {
    pub rate: f64,
    pub price: f64,
    pub next_funding: i64,
}

/// Parsed content of one combined-stream frame, keyed by unified symbol.
#[derive(Debug, PartialEq)]
pub(crate) enum Update {
    Marks(Vec<(String, Mark)>),
    Volumes(Vec<(String, f64)>),
    Ignored,
}

pub(crate) fn parse_message(text: &str) -> AppResult<Update> {
    let combined: Combined = serde_json::from_str(text)?;

    if combined.stream.starts_with("!markPrice") && combined.data.is_array() {
        let items: Vec<MarkItem> = serde_json::from_value(combined.data)?;
        let marks = items
            .into_iter()
            .filter_map(|item| {
                let base = usdt_base(&item.s)?;
                Some((
                    unified_symbol(base),
                    Mark {
                        rate: item.r.unwrap_or(0.0) * 100.0,
                        price: item.p.unwrap_or(0.0),
                        next_funding: item.next_funding.unwrap_or(0),
                    },
                ))
            })
            .collect();
        return Ok(Update::Marks(marks));
    }

    if combined.stream.starts_with("!ticker") && combined.data.is_array() {
        let items: Vec<TickerItem> = serde_json::from_value(combined.data)?;
        let volumes = items
            .into_iter()
            .filter_map(|item| {
                let base = usdt_base(&item.s)?;
                Some((unified_symbol(base), item.q.unwrap_or(0.0)))
            })
            .collect();
        return Ok(Update::Volumes(volumes));
    }

    Ok(Update::Ignored)
}

#[derive(Debug, Default)]
pub(crate) struct State {
    marks: HashMap<String, Mark>,
    volumes: HashMap<String, f64>,
}

impl State {
    pub(crate) fn apply(&mut self, update: Update) {
        match update {
            Update::Marks(marks) => self.marks.extend(marks),
            Update::Volumes(volumes) => self.volumes.extend(volumes),
            Update::Ignored => {}
        }
    }

    /// Every marked symbol; volume is 0 until a ticker for it arrived.
    pub(crate) fn snapshot(&self) -> FundingTable {
        self.marks
            .iter()
            .map(|(symbol, mark)| {
                (
                    symbol.clone(),
                    FundingSnapshot {
                        symbol: symbol.clone(),
                        rate: mark.rate,
                        volume: self.volumes.get(symbol).copied().unwrap_or(0.0),
                        price: mark.price,
                        next_funding: mark.next_funding,
                    },
                )
            })
            .collect()
    }
}

struct Feed {
    state: RwLock<State>,
}

#[async_trait]
impl StreamHandler for Feed {
    async fn on_text(&self, text: &str) -> Option<String> {
        match parse_message(text) {
            Ok(update) => self.state.write().await.apply(update),
            Err(e) => log::error!("Binance stream parse error: {}", e),
        }
        None
    }
}

/// Binance funding rates, mark prices and 24h volumes from the futures stream.
pub struct BinanceMonitor {
    url: String,
    feed: Arc<Feed>,
    lazy: LazyStart,
}

impl BinanceMonitor {
    pub fn new(endpoints: &Endpoints) -> Self {
        Self {
            url: format!("{}?streams={}/{}", endpoints.binance_ws, MARK_STREAM, TICKER_STREAM),
            feed: Arc::new(Feed {
                state: RwLock::new(State::default()),
            }),
            lazy: LazyStart::new(),
        }
    }

    /// Starts the connection task if it is not running yet.
    pub fn start(&self) {
        let url = self.url.clone();
        let feed = Arc::clone(&self.feed);
        self.lazy.start(Exchange::Binance, async move {
            reconnect_forever(Exchange::Binance, config::market::ws_reconnect_delay(), || {
                session(url.clone(), Arc::clone(&feed))
            })
            .await;
        });
    }

    pub async fn snapshot(&self) -> FundingTable {
        self.start();
        self.feed.state.read().await.snapshot()
    }
}

async fn session(url: String, feed: Arc<Feed>) -> AppResult<()> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    log::info!("Binance WebSocket connected");
    drive(&mut ws, Exchange::Binance, feed.as_ref(), config::market::ws_heartbeat()).await
}

#[async_trait]
impl FundingSource for BinanceMonitor {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn kind(&self) -> &'static str {
        "stream"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        Ok(self.snapshot().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_mark_price_frame() {
        let text = r#"{"stream":"!markPrice@arr@1s","data":[
            {"e":"markPriceUpdate","E":1,"s":"BTCUSDT","p":"65000.5","r":"0.00010000","T":1700000000000},
            {"e":"markPriceUpdate","E":1,"s":"ETHBUSD","p":"3500","r":"0.0001","T":1700000000000}
        ]}"#;

        let update = parse_message(text).unwrap();

        assert_eq!(
            update,
            Update::Marks(vec![(
                "BTC/USDT:USDT".to_string(),
                Mark {
                    rate: 0.0001 * 100.0,
                    price: 65000.5,
                    next_funding: 1_700_000_000_000,
                }
            )])
        );
    }

    #[test]
    fn test_parse_ticker_frame() {
        let text = r#"{"stream":"!ticker@arr","data":[{"e":"24hrTicker","s":"SOLUSDT","q":"1234.5"}]}"#;
        assert_eq!(
            parse_message(text).unwrap(),
            Update::Volumes(vec![("SOL/USDT:USDT".to_string(), 1234.5)])
        );
    }

    #[test]
    fn test_unknown_stream_and_garbage() {
        assert_eq!(parse_message(r#"{"stream":"other","data":{}}"#).unwrap(), Update::Ignored);
        assert!(parse_message("not json").is_err());
    }

    #[test]
    fn test_snapshot_defaults_volume_to_zero() {
        let mut state = State::default();
        state.apply(
            parse_message(r#"{"stream":"!markPrice@arr@1s","data":[{"s":"BTCUSDT","p":"1","r":"0.001","T":5},{"s":"ETHUSDT","p":"2","r":"-0.001","T":5}]}"#)
                .unwrap(),
        );
        state.apply(parse_message(r#"{"stream":"!ticker@arr","data":[{"s":"BTCUSDT","q":"99"}]}"#).unwrap());

        let table = state.snapshot();

        assert_eq!(table.len(), 2);
        assert_eq!(table["BTC/USDT:USDT"].volume, 99.0);
        assert_eq!(table["ETH/USDT:USDT"].volume, 0.0);
        assert!((table["ETH/USDT:USDT"].rate + 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_monitor_url() {
        let monitor = BinanceMonitor::new(&Endpoints::default());
        assert_eq!(
            monitor.url,
            "wss://fstream.binance.com/stream?streams=!markPrice@arr@1s/!ticker@arr"
        );
    }

    #[tokio::test]
    async fn test_monitor_reads_pushes_from_stream() {
        use futures_util::SinkExt;
        use std::time::Duration;
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::Message;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoints = Endpoints {
            binance_ws: format!("ws://{}/stream", listener.local_addr().unwrap()),
            ..Endpoints::default()
        };
        let monitor = BinanceMonitor::new(&endpoints);
        assert!(monitor.snapshot().await.is_empty());

        let (tcp, _) = listener.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(tcp).await.unwrap();
        server
            .send(Message::Text(
                r#"{"stream":"!markPrice@arr@1s","data":[{"s":"BTCUSDT","p":"65000","r":"0.0001","T":1700000000000}]}"#
                    .to_string(),
            ))
            .await
            .unwrap();
        server
            .send(Message::Text(r#"{"stream":"!ticker@arr","data":[{"s":"BTCUSDT","q":"5000000"}]}"#.to_string()))
            .await
            .unwrap();

        let mut table = FundingTable::new();
        for _ in 0..50 {
            table = monitor.snapshot().await;
            if table.get("BTC/USDT:USDT").is_some_and(|s| s.volume > 0.0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let btc = &table["BTC/USDT:USDT"];
        assert!((btc.rate - 0.01).abs() < 1e-12);
        assert_eq!(btc.price, 65000.0);
        assert_eq!(btc.volume, 5_000_000.0);
        assert_eq!(btc.next_funding, 1_700_000_000_000);
    }
}
