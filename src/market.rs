// ===============================
// src/market.rs
// ===============================
//
// Market Data Gateway seam:
// - MarketDataGateway : trait yang dipakai executor/advisor
// - MockMarketData    : random-walk book around a configured mid (paper mode)
// - collect_snapshot  : fetch books for a set of symbols into one snapshot
//
use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::Side;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel { pub px: f64, pub sz: f64 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTrade { pub px: f64, pub sz: f64, pub side: Side, pub ts: DateTime<Utc> }

/// One market's book. Bids best-first (descending), asks best-first (ascending).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub recent_trades: Vec<RecentTrade>,
    pub taken_at: DateTime<Utc>,
}

impl OrderBook {
    pub fn mid(&self) -> Option<f64> {
        match (self.bids.first(), self.asks.first()) {
            (Some(b), Some(a)) => Some((b.px + a.px) / 2.0),
            _ => None,
        }
    }

    /// USD depth over the first `levels` levels of one side.
    pub fn visible_depth_usd(&self, from_asks: bool, levels: usize) -> f64 {
        let side = if from_asks { &self.asks } else { &self.bids };
        side.iter()
            .take(levels)
            .filter(|l| l.px.is_finite() && l.sz.is_finite() && l.px > 0.0 && l.sz > 0.0)
            .map(|l| l.px * l.sz)
            .sum()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration { now - self.taken_at }

    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool { self.age(now) <= max_age }
}

/// Books for every market the batch may touch.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    books: HashMap<String, OrderBook>,
}

impl MarketSnapshot {
    pub fn from_books(books: impl IntoIterator<Item = OrderBook>) -> Self {
        Self { books: books.into_iter().map(|b| (b.symbol.clone(), b)).collect() }
    }
    pub fn insert(&mut self, book: OrderBook) { self.books.insert(book.symbol.clone(), book); }
    pub fn book(&self, symbol: &str) -> Option<&OrderBook> { self.books.get(symbol) }
    pub fn is_empty(&self) -> bool { self.books.is_empty() }
    pub fn len(&self) -> usize { self.books.len() }
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("unknown market symbol {0}")]
    UnknownSymbol(String),
    #[error("market data unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    async fn get_snapshot(&self, symbol: &str) -> Result<OrderBook, MarketDataError>;
}

/// Fetch every symbol; failures are logged and left out (they later show up as unknown assets).
pub async fn collect_snapshot(gw: &dyn MarketDataGateway, symbols: &[String]) -> MarketSnapshot {
    let mut snap = MarketSnapshot::default();
    for sym in symbols {
        match gw.get_snapshot(sym).await {
            Ok(book) => snap.insert(book),
            Err(e) => warn!(symbol = %sym, ?e, "snapshot fetch failed"),
        }
    }
    debug!(books = snap.len(), "snapshot collected");
    snap
}

/// Paper book generator: random walk around a mid, fixed USD per level.
#[derive(Debug, Clone)]
pub struct MockMarketData {
    mids: HashMap<String, f64>,
    levels: usize,
    level_usd: f64,
    spread_bps: f64,
}

impl MockMarketData {
    pub fn new(mids: impl IntoIterator<Item = (String, f64)>, levels: usize, level_usd: f64) -> Self {
        Self { mids: mids.into_iter().collect(), levels: levels.max(1), level_usd, spread_bps: 2.0 }
    }
}

#[async_trait]
impl MarketDataGateway for MockMarketData {
    async fn get_snapshot(&self, symbol: &str) -> Result<OrderBook, MarketDataError> {
        let base = *self.mids.get(symbol).ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))?;
        // jangan simpan ThreadRng melewati .await
        let (mid, last_side) = {
            let mut rng = rand::thread_rng();
            let step_bps: f64 = rng.gen_range(-3.0..=3.0);
            (base * (1.0 + step_bps / 10_000.0), if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell })
        };
        let half = mid * self.spread_bps / 20_000.0;
        let tick = mid * 0.0001;

        let bids = (0..self.levels)
            .map(|i| { let px = mid - half - tick * i as f64; PriceLevel { px, sz: self.level_usd / px } })
            .collect();
        let asks = (0..self.levels)
            .map(|i| { let px = mid + half + tick * i as f64; PriceLevel { px, sz: self.level_usd / px } })
            .collect();
        let now = Utc::now();

        Ok(OrderBook {
            symbol: symbol.to_string(),
            bids,
            asks,
            recent_trades: vec![RecentTrade { px: mid, sz: self.level_usd / mid / 10.0, side: last_side, ts: now }],
            taken_at: now,
        })
    }
}
