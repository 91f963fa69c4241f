//! WebSocket monitors that keep the latest funding data in memory.
//!
//! A monitor starts its connection task lazily on the first snapshot
//! request and reconnects forever. Snapshots copy the current state.

pub mod binance;
pub mod okx;

use crate::core::error::{AppError, AppResult};
use crate::core::metrics;
use crate::market::Exchange;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Consumes text frames of one market stream.
#[async_trait]
pub(crate) trait StreamHandler: Send + Sync {
    /// Applies one text frame; a returned string is sent back as a text frame.
    async fn on_text(&self, text: &str) -> Option<String>;
}

/// Spawns the connection task once per monitor.
pub(crate) struct LazyStart {
    started: AtomicBool,
}

impl LazyStart {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
        }
    }

    /// Spawns `task` on the first call; later calls do nothing.
    pub(crate) fn start<F>(&self, exchange: Exchange, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            log::info!("Starting {} WebSocket monitor", exchange);
            tokio::spawn(task);
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

/// Runs `session` forever, waiting `delay` after every end.
pub(crate) async fn reconnect_forever<F, Fut>(exchange: Exchange, delay: Duration, mut session: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<()>>,
{
    loop {
        match session().await {
            Ok(()) => log::warn!("{} WebSocket closed, reconnecting", exchange),
            Err(e) => log::error!("{} WebSocket error: {}", exchange, e),
        }
        metrics::WS_RECONNECTS_TOTAL.with_label_values(&[exchange.as_ref()]).inc();
        tokio::time::sleep(delay).await;
    }
}

/// Pumps frames from `ws` into `handler` until the peer closes or goes quiet.
///
/// Sends a ping every `heartbeat` and gives up when nothing has been
/// received for two intervals.
pub(crate) async fn drive<S>(
    ws: &mut WebSocketStream<S>,
    exchange: Exchange,
    handler: &dyn StreamHandler,
    heartbeat: Duration,
) -> AppResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = ws.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                last_seen = Instant::now();

                match frame? {
                    Message::Text(text) => {
                        if let Some(reply) = handler.on_text(&text).await {
                            ws.send(Message::Text(reply)).await?;
                        }
                    }
                    Message::Ping(payload) => ws.send(Message::Pong(payload)).await?,
                    Message::Close(frame) => {
                        log::warn!("{} WebSocket close frame: {:?}", exchange, frame);
                        return Ok(());
                    }
                    _ => {}
                }
            }
            _ = ticker.tick() => {
                if last_seen.elapsed() > heartbeat * 2 {
                    return Err(AppError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("{} WebSocket silent for {:?}", exchange, last_seen.elapsed()),
                    )));
                }
                ws.send(Message::Ping(Vec::new())).await?;
            }
        }
    }
}
