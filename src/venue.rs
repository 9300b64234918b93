//! C4 — venue session.
//!
//! Two concrete, minimal implementations satisfying the session capability
//! set `{start, poll, shutdown}`: [`VenueSession::Spot`] and
//! [`VenueSession::Perp`]. Grounded on `scrapers/binance_book_ticker.rs`'s
//! zero-alloc `simd-json` scan for the wire parse and on
//! `edge/receiver.rs`'s reconnect-with-backoff shape (backoff itself lives
//! in the reader loop, C10, per the contract). Both variants are cases of
//! one tagged enum rather than boxed trait objects, per the redesign note
//! against heap-indirect dispatch on the hot path.

use crate::error::EngineError;
use crate::quote::Quote;
use crate::ring::SpscRing;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Per-call poll budget: a session must not block the reader thread for
/// more than one kernel poll.
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

pub struct VenueConfig {
    pub venue_name: &'static str,
    pub ws_url: String,
    pub symbols: Vec<String>,
}

struct Connection {
    stream: WsStream,
    sequence: u64,
}

/// Spot bookTicker session: `{symbol, bid, ask}` or mid-only frames.
pub struct SpotVenueSession {
    config: VenueConfig,
    conn: Option<Connection>,
}

/// Perpetual-futures session: as [`SpotVenueSession`] plus an optional
/// `fundingRate` field written into the funding registry (C5).
pub struct PerpVenueSession {
    config: VenueConfig,
    conn: Option<Connection>,
}

pub enum VenueSession {
    Spot(SpotVenueSession),
    Perp(PerpVenueSession),
}

impl VenueSession {
    pub fn spot(config: VenueConfig) -> Self {
        Self::Spot(SpotVenueSession { config, conn: None })
    }

    pub fn perp(config: VenueConfig) -> Self {
        Self::Perp(PerpVenueSession { config, conn: None })
    }

    fn config(&self) -> &VenueConfig {
        match self {
            Self::Spot(s) => &s.config,
            Self::Perp(s) => &s.config,
        }
    }

    /// Opens the connection and subscribes to `symbols`.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        let url = self.config().ws_url.clone();
        let (stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| EngineError::Transient(format!("{} connect failed: {e}", self.config().venue_name)))?;
        let mut conn = Connection { stream, sequence: 0 };
        for symbol in self.config().symbols.clone() {
            let sub = serde_json::json!({
                "method": "SUBSCRIBE",
                "params": [format!("{}@bookTicker", symbol.to_lowercase())],
                "id": 1,
            });
            conn.stream
                .send(Message::Text(sub.to_string()))
                .await
                .map_err(|e| EngineError::Transient(format!("subscribe failed: {e}")))?;
        }
        match self {
            Self::Spot(s) => s.conn = Some(conn),
            Self::Perp(s) => s.conn = Some(conn),
        }
        tracing::info!(venue = self.config().venue_name, "venue session connected");
        Ok(())
    }

    /// Reads at most one framed message and, on a quote update, pushes a
    /// [`Quote`] onto `out_ring`; on a funding update (perp only), writes
    /// the funding registry. Never blocks longer than one kernel poll.
    pub async fn poll(
        &mut self,
        out_ring: &Arc<SpscRing>,
        funding: &crate::funding::FundingRegistry,
        timestamp: &crate::timestamp::Timestamp,
    ) -> Result<(), EngineError> {
        let venue_name = self.config().venue_name;
        let conn = match self {
            Self::Spot(s) => s.conn.as_mut(),
            Self::Perp(s) => s.conn.as_mut(),
        }
        .ok_or_else(|| EngineError::Fatal("poll called before start".into()))?;

        let next = tokio::time::timeout(POLL_TIMEOUT, conn.stream.next()).await;
        let msg = match next {
            Ok(Some(Ok(m))) => m,
            Ok(Some(Err(e))) => return Err(EngineError::Transient(format!("{venue_name} read error: {e}"))),
            Ok(None) => return Err(EngineError::Transient(format!("{venue_name} stream closed"))),
            Err(_) => return Ok(()), // poll timeout: no frame ready, not an error.
        };

        let mut text = match msg {
            Message::Text(t) => t.into_bytes(),
            Message::Ping(_) | Message::Pong(_) => return Ok(()),
            Message::Close(_) => return Err(EngineError::Transient(format!("{venue_name} closed"))),
            _ => return Ok(()),
        };

        let ingest_cycles = timestamp.now_cycles();
        conn.sequence += 1;
        let sequence = conn.sequence;

        let parsed = parse_book_ticker(&mut text);
        let parsed = match parsed {
            Ok(p) => p,
            Err(_) => return Err(EngineError::Transient(format!("{venue_name} parse error"))),
        };

        if let Self::Perp(_) = self {
            if let Some(funding_fraction) = parsed.funding_rate_fraction {
                funding.update(&parsed.symbol, funding_fraction * 10_000.0, ingest_cycles);
            }
        }

        let mid = (parsed.bid + parsed.ask) / 2.0;
        let quote = Quote::new(&parsed.symbol, venue_name, mid, parsed.bid_qty + parsed.ask_qty, ingest_cycles, sequence);
        if !out_ring.push(quote) {
            return Err(EngineError::CapacityFull);
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let conn = match self {
            Self::Spot(s) => s.conn.take(),
            Self::Perp(s) => s.conn.take(),
        };
        if let Some(mut conn) = conn {
            let _ = conn.stream.close(None).await;
        }
        tracing::info!(venue = self.config().venue_name, "venue session shut down");
    }
}

struct ParsedTick {
    symbol: String,
    bid: f64,
    ask: f64,
    bid_qty: f64,
    ask_qty: f64,
    funding_rate_fraction: Option<f64>,
}

/// Zero-alloc `simd-json` scan of a bookTicker-style frame:
/// `{"s":"BTCUSDT","b":"50000.0","B":"1.2","a":"50001.0","A":"0.8"}`, with an
/// optional `"r"` funding-rate fraction field for perpetual streams.
fn parse_book_ticker(raw: &mut [u8]) -> Result<ParsedTick, ()> {
    use simd_json::prelude::*;
    let value = simd_json::to_borrowed_value(raw).map_err(|_| ())?;
    let obj = value.as_object().ok_or(())?;

    let symbol = obj.get("s").and_then(|v| v.as_str()).ok_or(())?.to_string();
    let bid = parse_price(obj.get("b"))?;
    let bid_qty = parse_price(obj.get("B")).unwrap_or(0.0);
    let ask = parse_price(obj.get("a"))?;
    let ask_qty = parse_price(obj.get("A")).unwrap_or(0.0);
    let funding_rate_fraction = obj.get("r").and_then(|v| v.as_str()).and_then(|s| fast_float::parse(s).ok());

    Ok(ParsedTick { symbol, bid, ask, bid_qty, ask_qty, funding_rate_fraction })
}

fn parse_price(value: Option<&simd_json::BorrowedValue>) -> Result<f64, ()> {
    use simd_json::prelude::*;
    let s = value.and_then(|v| v.as_str()).ok_or(())?;
    fast_float::parse(s).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bid_ask_and_funding() {
        let mut raw = br#"{"s":"BTCUSDT","b":"50000.10","B":"1.2","a":"50001.20","A":"0.8","r":"0.0001"}"#.to_vec();
        let parsed = parse_book_ticker(&mut raw).unwrap();
        assert_eq!(parsed.symbol, "BTCUSDT");
        assert!((parsed.bid - 50000.10).abs() < 1e-6);
        assert!((parsed.ask - 50001.20).abs() < 1e-6);
        assert!((parsed.funding_rate_fraction.unwrap() - 0.0001).abs() < 1e-9);
    }

    #[test]
    fn missing_price_field_is_an_error() {
        let mut raw = br#"{"s":"BTCUSDT","a":"50001.20"}"#.to_vec();
        assert!(parse_book_ticker(&mut raw).is_err());
    }
}
