//! OKX public WebSocket: `funding-rate` and `tickers` channels for every
//! USDT perpetual.

use super::{drive, reconnect_forever, LazyStart, StreamHandler};
use crate::core::config;
use crate::core::error::AppResult;
use crate::market::de;
use crate::market::http::HttpClient;
use crate::market::okx::{fetch_swap_ids, symbol_for_inst};
use crate::market::source::FundingSource;
use crate::market::{Endpoints, Exchange, FundingSnapshot, FundingTable};
use async_trait::async_trait;
use futures_util::SinkExt;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Default, Deserialize)]
struct Arg {
    #[serde(default)]
    channel: String,
}

#[derive(Debug, Deserialize)]
struct Push {
    #[serde(default)]
    arg: Option<Arg>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundingItem {
    inst_id: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    funding_rate: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_i64")]
    next_funding_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerItem {
    inst_id: String,
    #[serde(default, deserialize_with = "de::opt_f64")]
    last: Option<f64>,
    #[serde(default, deserialize_with = "de::opt_f64")]
    vol_ccy24h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Funding {
    pub rate: f64,
    pub next_funding: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Ticker {
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Event {
    Funding(Vec<(String, Funding)>),
    Tickers(Vec<(String, Ticker)>),
    Ping,
    Ignored,
}

pub(crate) fn parse_message(text: &str) -> AppResult<Event> {
    let push: Push = serde_json::from_str(text)?;

    if push.op.as_deref() == Some("ping") {
        return Ok(Event::Ping);
    }
    if push.event.as_deref() == Some("error") {
        log::warn!("OKX WebSocket error event: {}", push.msg.unwrap_or_default());
        return Ok(Event::Ignored);
    }

    let channel = push.arg.map(|a| a.channel).unwrap_or_default();
    let Some(data) = push.data else {
        return Ok(Event::Ignored);
    };

    match channel.as_str() {
        "funding-rate" => {
            let items: Vec<FundingItem> = serde_json::from_value(data)?;
            let funding = items
                .into_iter()
                .filter_map(|item| {
                    let rate = item.funding_rate?;
                    Some((
                        symbol_for_inst(&item.inst_id),
                        Funding {
                            rate: rate * 100.0,
                            next_funding: item.next_funding_time.unwrap_or(0),
                        },
                    ))
                })
                .collect();
            Ok(Event::Funding(funding))
        }
        "tickers" => {
            let items: Vec<TickerItem> = serde_json::from_value(data)?;
            let tickers = items
                .into_iter()
                .filter_map(|item| {
                    let price = item.last?;
                    Some((
                        symbol_for_inst(&item.inst_id),
                        Ticker {
                            price,
                            volume: item.vol_ccy24h.unwrap_or(0.0),
                        },
                    ))
                })
                .collect();
            Ok(Event::Tickers(tickers))
        }
        _ => Ok(Event::Ignored),
    }
}

/// Subscribe frames for both channels of every instrument, `batch` args each.
pub(crate) fn subscribe_frames(inst_ids: &[String], batch: usize) -> Vec<String> {
    let args: Vec<serde_json::Value> = inst_ids
        .iter()
        .flat_map(|id| {
            [
                json!({"channel": "funding-rate", "instId": id}),
                json!({"channel": "tickers", "instId": id}),
            ]
        })
        .collect();

    args.chunks(batch.max(1))
        .map(|chunk| json!({"op": "subscribe", "args": chunk}).to_string())
        .collect()
}

#[derive(Debug, Default)]
pub(crate) struct State {
    funding: HashMap<String, Funding>,
    tickers: HashMap<String, Ticker>,
}

impl State {
    pub(crate) fn apply(&mut self, event: Event) {
        match event {
            Event::Funding(items) => self.funding.extend(items),
            Event::Tickers(items) => self.tickers.extend(items),
            Event::Ping | Event::Ignored => {}
        }
    }

    /// Every symbol with funding data; price and volume are 0 until a ticker arrived.
    pub(crate) fn snapshot(&self) -> FundingTable {
        self.funding
            .iter()
            .map(|(symbol, funding)| {
                let ticker = self.tickers.get(symbol);
                (
                    symbol.clone(),
                    FundingSnapshot {
                        symbol: symbol.clone(),
                        rate: funding.rate,
                        volume: ticker.map(|t| t.volume).unwrap_or(0.0),
                        price: ticker.map(|t| t.price).unwrap_or(0.0),
                        next_funding: funding.next_funding,
                    },
                )
            })
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.funding.is_empty()
    }
}

struct Feed {
    state: RwLock<State>,
}

#[async_trait]
impl StreamHandler for Feed {
    async fn on_text(&self, text: &str) -> Option<String> {
        match parse_message(text) {
            Ok(Event::Ping) => return Some(json!({"op": "pong"}).to_string()),
            Ok(event) => self.state.write().await.apply(event),
            Err(e) => log::error!("OKX stream parse error: {}", e),
        }
        None
    }
}

/// OKX funding rates, prices and volumes from the public WebSocket.
pub struct OkxMonitor {
    http: HttpClient,
    endpoints: Endpoints,
    feed: Arc<Feed>,
    lazy: LazyStart,
}

impl OkxMonitor {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            endpoints: endpoints.clone(),
            feed: Arc::new(Feed {
                state: RwLock::new(State::default()),
            }),
            lazy: LazyStart::new(),
        }
    }

    pub fn start(&self) {
        let http = self.http.clone();
        let endpoints = self.endpoints.clone();
        let feed = Arc::clone(&self.feed);
        self.lazy.start(Exchange::Okx, async move {
            reconnect_forever(Exchange::Okx, config::market::ws_reconnect_delay(), || {
                session(http.clone(), endpoints.clone(), Arc::clone(&feed))
            })
            .await;
        });
    }

    /// Current state; waits once for the first pushes when nothing arrived yet.
    pub async fn snapshot(&self) -> FundingTable {
        self.start();

        if self.feed.state.read().await.is_empty() {
            log::info!("OKX WebSocket has no data yet, waiting for first pushes");
            tokio::time::sleep(config::market::okx_warmup()).await;
        }

        self.feed.state.read().await.snapshot()
    }
}

async fn session(http: HttpClient, endpoints: Endpoints, feed: Arc<Feed>) -> AppResult<()> {
    let (mut ws, _) = tokio_tungstenite::connect_async(endpoints.okx_ws.as_str()).await?;
    log::info!("OKX WebSocket connected");

    let inst_ids = fetch_swap_ids(&http, &endpoints).await?;
    for frame in subscribe_frames(&inst_ids, config::market::OKX_WS_SUBSCRIBE_BATCH) {
        ws.send(Message::Text(frame)).await?;
        tokio::time::sleep(config::market::okx_batch_pause()).await;
    }
    log::info!("OKX WebSocket subscribed to {} instruments", inst_ids.len());

    drive(&mut ws, Exchange::Okx, feed.as_ref(), config::market::ws_heartbeat()).await
}

#[async_trait]
impl FundingSource for OkxMonitor {
    fn exchange(&self) -> Exchange {
        Exchange::Okx
    }

    fn kind(&self) -> &'static str {
        "stream"
    }

    async fn fetch(&self) -> AppResult<FundingTable> {
        Ok(self.snapshot().await)
    }
}
