// ===============================
// src/venue.rs (venue client seam + paper venue)
// ===============================
use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::domain::OrderSide;
use crate::metrics::VENUE_FILLS;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitRequest {
    pub client_order_id: String,
    pub asset: String,
    pub side: OrderSide,
    pub size_usd: f64,
    pub leverage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VenueOrderStatus { Filled, Resting, Rejected(String) }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueAck { pub venue_order_id: String, pub status: VenueOrderStatus }

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VenueError {
    #[error("venue request timed out")]
    Timeout,
    #[error("rate limited by venue")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("invalid market {0}")]
    InvalidMarket(String),
    #[error("venue rejected order: {0}")]
    Rejected(String),
}

impl VenueError {
    /// Worth retrying under the backoff policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Timeout | VenueError::RateLimited | VenueError::Network(_))
    }
    /// The request may have landed even though we saw no response.
    pub fn is_ambiguous(&self) -> bool { matches!(self, VenueError::Timeout | VenueError::Network(_)) }
}

#[async_trait]
pub trait VenueClient: Send + Sync {
    fn name(&self) -> &str;
    async fn submit_order(&self, req: &SubmitRequest) -> Result<VenueAck, VenueError>;
    async fn get_order_status(&self, client_order_id: &str) -> Result<Option<VenueAck>, VenueError>;
}

/// Scripted behaviour for the next submit call (paper venue only).
#[derive(Debug, Clone)]
pub enum Fault {
    /// fail fast with this error, nothing recorded
    Error(VenueError),
    /// sleep before answering (lets the caller's timeout fire)
    Stall(Duration),
    /// order lands at the venue but the response is lost
    LostResponse,
}

/// Paper venue: fills everything after `fill_delay`, dedupes by client order id.
pub struct PaperVenue {
    venue: String,
    fill_delay: Duration,
    seq: AtomicU64,
    orders: Mutex<HashMap<String, VenueAck>>,
    faults: Mutex<VecDeque<Fault>>,
    submits: AtomicU64,
    fills: AtomicU64,
}

impl PaperVenue {
    pub fn new(venue: impl Into<String>, fill_delay: Duration) -> Self {
        Self {
            venue: venue.into(),
            fill_delay,
            seq: AtomicU64::new(0),
            orders: Mutex::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            submits: AtomicU64::new(0),
            fills: AtomicU64::new(0),
        }
    }

    pub fn with_faults(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        Self { faults: Mutex::new(faults.into_iter().collect()), ..self }
    }

    pub fn submit_calls(&self) -> u64 { self.submits.load(Ordering::SeqCst) }
    pub fn fill_count(&self) -> u64 { self.fills.load(Ordering::SeqCst) }

    async fn record_fill(&self, req: &SubmitRequest) -> VenueAck {
        let mut book = self.orders.lock().await;
        if let Some(existing) = book.get(&req.client_order_id) {
            debug!(cl_id = %req.client_order_id, "duplicate client order id, returning existing order");
            return existing.clone();
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let ack = VenueAck { venue_order_id: format!("{}-{}", self.venue, n), status: VenueOrderStatus::Filled };
        book.insert(req.client_order_id.clone(), ack.clone());
        self.fills.fetch_add(1, Ordering::SeqCst);
        VENUE_FILLS.with_label_values(&[&self.venue]).inc();
        info!(cl_id = %req.client_order_id, asset = %req.asset, size_usd = req.size_usd, "FILLED");
        ack
    }
}

#[async_trait]
impl VenueClient for PaperVenue {
    fn name(&self) -> &str { &self.venue }

    async fn submit_order(&self, req: &SubmitRequest) -> Result<VenueAck, VenueError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults.lock().await.pop_front();
        match fault {
            Some(Fault::Error(e)) => return Err(e),
            Some(Fault::Stall(d)) => sleep(d).await,
            Some(Fault::LostResponse) => {
                self.record_fill(req).await;
                return Err(VenueError::Timeout);
            }
            None => {}
        }
        sleep(self.fill_delay).await;
        Ok(self.record_fill(req).await)
    }

    async fn get_order_status(&self, client_order_id: &str) -> Result<Option<VenueAck>, VenueError> {
        Ok(self.orders.lock().await.get(client_order_id).cloned())
    }
}
