// ===============================
// src/executor.rs (validate -> normalize -> submit, per order)
// ===============================
//
// Flow per candidate:
//   Proposed -> Validated -> Normalized -> Submitted -> Filled | Rejected | Failed
//
// - spot list dulu, lalu perp; urutan input dipertahankan di report
// - satu order gagal tidak pernah menghentikan batch
// - submit jalan konkuren, dibatasi Semaphore (max in-flight)
// - cancel bersifat kooperatif: dicek sebelum tiap submit
//
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::Limits;
use crate::domain::{
    ErrorKind, ExecutionError, ExecutionReport, MarketKind, Order, OrderSide, OrderStatus, RiskAppetite,
    SkippedRecommendation, SpotAction, TradingProfile,
};
use crate::market::MarketSnapshot;
use crate::metrics::{ORDERS, RECONCILE_HITS, SUBMIT_ATTEMPTS, SUBMIT_LATENCY_MS, SUBMIT_RETRIES};
use crate::recommendation::{parse_value, Candidate, DocumentError, RecommendationBatch};
use crate::risk::{self, ValidationError};
use crate::submit::{transition, SubmitEvent, SubmitOutcome, SubmitState};
use crate::venue::{SubmitRequest, VenueClient, VenueError};

/// Errors that make the whole batch impossible to process.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("market snapshot missing, batch cannot be processed")]
    MissingSnapshot,
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Per-run constraints coming from the trader's profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConstraints {
    pub risk_appetite: RiskAppetite,
}

impl Default for ExecutionConstraints {
    fn default() -> Self { Self { risk_appetite: RiskAppetite::Conservative } }
}

impl ExecutionConstraints {
    pub fn from_profile(profile: &TradingProfile) -> Self { Self { risk_appetite: profile.risk_tolerance } }
}

/// Stops submissions that have not started yet. Sticky for the executor's lifetime.
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Order that survived validation and normalization, waiting for a permit.
struct Ticket {
    order: Order,
    req: SubmitRequest,
}

enum Step {
    Submit(Ticket),
    Done(Order, Option<ExecutionError>),
}

struct Proposal {
    market: MarketKind,
    asset: String,
    side: OrderSide,
    size_usd: f64,
    leverage: Option<f64>,
}

pub struct TradeExecutor {
    venue: Arc<dyn VenueClient>,
    limits: Limits,
    gate: Arc<Semaphore>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl TradeExecutor {
    pub fn new(venue: Arc<dyn VenueClient>, limits: Limits) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            gate: Arc::new(Semaphore::new(limits.max_in_flight.max(1))),
            venue,
            limits,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle { CancelHandle(self.cancel_tx.clone()) }

    fn is_cancelled(&self) -> bool { *self.cancel_rx.borrow() }

    /// Parse an untrusted advisor document, then execute it.
    pub async fn execute_document(
        &self,
        doc: &Value,
        snapshot: Option<&MarketSnapshot>,
        constraints: &ExecutionConstraints,
    ) -> Result<ExecutionReport, BatchError> {
        let batch = parse_value(doc)?;
        self.execute(batch, snapshot, constraints).await
    }

    pub async fn execute(
        &self,
        batch: RecommendationBatch,
        snapshot: Option<&MarketSnapshot>,
        constraints: &ExecutionConstraints,
    ) -> Result<ExecutionReport, BatchError> {
        let snapshot = snapshot.ok_or(BatchError::MissingSnapshot)?;
        let started_at = Utc::now();
        let run_id = new_run_id(started_at);
        let ceiling = self.limits.appetite_ceilings.ceiling(constraints.risk_appetite);
        let invalid = batch.spot.iter().filter(|c| !c.is_valid()).count() + batch.perp.iter().filter(|c| !c.is_valid()).count();
        info!(%run_id, spot = batch.spot.len(), perp = batch.perp.len(), invalid, appetite = ?constraints.risk_appetite, ceiling, "batch start");
        if snapshot.is_empty() {
            warn!(%run_id, "market snapshot has no books, every order will be rejected as unknown asset");
        }

        let mut steps = Vec::with_capacity(batch.spot.len() + batch.perp.len());
        let mut skipped = Vec::new();

        // 1) spot
        for (i, c) in batch.spot.into_iter().enumerate() {
            let proposal = match c {
                Candidate::Valid(r) => {
                    let side = match r.action {
                        SpotAction::Buy => OrderSide::Buy,
                        SpotAction::Sell => OrderSide::Sell,
                        SpotAction::Hold => {
                            debug!(%run_id, asset = %r.asset, "hold, no order");
                            let reason = match r.reasoning.first() {
                                Some(why) => format!("hold recommendation: {why}"),
                                None => "hold recommendation".to_string(),
                            };
                            skipped.push(SkippedRecommendation { asset: r.asset, reason });
                            continue;
                        }
                    };
                    Ok(Proposal { market: MarketKind::Spot, asset: r.asset, side, size_usd: r.size_usd, leverage: None })
                }
                Candidate::Invalid { asset, errors } => Err((asset, errors)),
            };
            let cl_id_asset = match &proposal {
                Ok(p) => p.asset.clone(),
                Err((a, _)) => a.clone().unwrap_or_default(),
            };
            let cl_id = client_order_id(&run_id, "spot", i, &cl_id_asset);
            steps.push(self.prepare(cl_id, MarketKind::Spot, proposal, snapshot, ceiling, started_at));
        }

        // 2) perp
        for (i, c) in batch.perp.into_iter().enumerate() {
            let proposal = match c {
                Candidate::Valid(r) => Ok(Proposal {
                    market: MarketKind::Perp,
                    side: r.direction.into(),
                    asset: r.asset,
                    size_usd: r.size_usd,
                    leverage: Some(r.leverage),
                }),
                Candidate::Invalid { asset, errors } => Err((asset, errors)),
            };
            let cl_id_asset = match &proposal {
                Ok(p) => p.asset.clone(),
                Err((a, _)) => a.clone().unwrap_or_default(),
            };
            let cl_id = client_order_id(&run_id, "perp", i, &cl_id_asset);
            steps.push(self.prepare(cl_id, MarketKind::Perp, proposal, snapshot, ceiling, started_at));
        }

        // 3) fan-out / fan-in; join_all keeps input order
        let results = join_all(steps.into_iter().map(|step| async move {
            match step {
                Step::Done(order, err) => (order, err),
                Step::Submit(ticket) => self.submit(ticket).await,
            }
        }))
        .await;

        let mut orders = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for (order, err) in results {
            ORDERS.with_label_values(&[order.status.label()]).inc();
            orders.push(order);
            errors.extend(err);
        }

        let report = ExecutionReport {
            run_id,
            orders,
            errors,
            skipped,
            overall_strategy: batch.overall_strategy,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            run_id = %report.run_id,
            filled = report.count(OrderStatus::Filled),
            rejected = report.count(OrderStatus::Rejected),
            failed = report.count(OrderStatus::Failed),
            resting = report.orders.iter().filter(|o| !o.status.is_terminal()).count(),
            skipped = report.skipped.len(),
            "batch done"
        );
        Ok(report)
    }

    /// Validate + normalize. Anything that fails here never reaches the venue.
    fn prepare(
        &self,
        cl_id: String,
        market: MarketKind,
        proposal: Result<Proposal, (Option<String>, Vec<ValidationError>)>,
        snapshot: &MarketSnapshot,
        ceiling: f64,
        now: DateTime<Utc>,
    ) -> Step {
        let p = match proposal {
            Ok(p) => p,
            Err((asset, errors)) => {
                let mut order = blank_order(cl_id, market, asset.unwrap_or_default(), None, 0.0, None);
                let reason = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                return reject(&mut order, reason, ErrorKind::Validation);
            }
        };

        // test mode: ukuran tiket diganti sebelum validasi
        let size_usd = match self.limits.test_trade_size_usd {
            Some(test_size) => {
                debug!(cl_id = %cl_id, asset = %p.asset, from = p.size_usd, to = test_size, "test mode size override");
                test_size
            }
            None => p.size_usd,
        };

        let mut order = blank_order(cl_id, p.market, p.asset, Some(p.side), size_usd, p.leverage);
        let book = snapshot.book(&order.asset);
        let checked = risk::validate(&order.asset, size_usd, p.leverage, book, &self.limits)
            .and_then(|()| book.ok_or_else(|| ValidationError::UnknownAsset(order.asset.clone())))
            .and_then(|b| risk::normalize(p.side, size_usd, p.leverage, b, &self.limits, ceiling, now));

        match checked {
            Ok(n) => {
                if n.size_usd < size_usd {
                    debug!(cl_id = %order.client_order_id, requested = size_usd, normalized = n.size_usd, "size clamped to visible depth");
                }
                order.normalized_size_usd = Some(n.size_usd);
                order.leverage = n.leverage;
                let req = SubmitRequest {
                    client_order_id: order.client_order_id.clone(),
                    asset: order.asset.clone(),
                    side: p.side,
                    size_usd: n.size_usd,
                    leverage: n.leverage,
                };
                Step::Submit(Ticket { order, req })
            }
            Err(e) => reject(&mut order, e.to_string(), ErrorKind::Validation),
        }
    }

    async fn submit(&self, ticket: Ticket) -> (Order, Option<ExecutionError>) {
        let Ticket { mut order, req } = ticket;

        let _permit = match self.gate.acquire().await {
            Ok(p) => p,
            Err(_) => return reject(&mut order, ValidationError::Cancelled.to_string(), ErrorKind::Cancelled).into_pair(),
        };
        if self.is_cancelled() {
            return reject(&mut order, ValidationError::Cancelled.to_string(), ErrorKind::Cancelled).into_pair();
        }

        let policy = self.limits.retry_policy();
        let started = Instant::now();
        let mut last_err: Option<VenueError> = None;
        let mut state = SubmitState::start();
        order.status = OrderStatus::Submitted;

        let outcome = loop {
            let event = match &state {
                SubmitState::Done(outcome) => break outcome.clone(),
                SubmitState::Ready { attempt } => {
                    order.attempts = *attempt;
                    SUBMIT_ATTEMPTS.inc();
                    debug!(cl_id = %req.client_order_id, asset = %req.asset, attempt, size_usd = req.size_usd, "submit");
                    match timeout(self.limits.submit_timeout, self.venue.submit_order(&req)).await {
                        Ok(Ok(ack)) => SubmitEvent::Accepted(ack),
                        Ok(Err(e)) => {
                            last_err = Some(e.clone());
                            SubmitEvent::Failed(e)
                        }
                        Err(_elapsed) => {
                            last_err = Some(VenueError::Timeout);
                            SubmitEvent::Failed(VenueError::Timeout)
                        }
                    }
                }
                SubmitState::Backoff { attempt, delay, reconcile } => {
                    SUBMIT_RETRIES.inc();
                    warn!(
                        cl_id = %req.client_order_id,
                        next_attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        reconcile,
                        err = ?last_err,
                        "transient failure, backing off"
                    );
                    sleep(*delay).await;
                    SubmitEvent::BackoffElapsed
                }
                SubmitState::Reconcile { .. } | SubmitState::FinalCheck { .. } => {
                    match timeout(self.limits.submit_timeout, self.venue.get_order_status(&req.client_order_id)).await {
                        Ok(Ok(Some(ack))) => {
                            RECONCILE_HITS.inc();
                            info!(cl_id = %req.client_order_id, venue_order_id = %ack.venue_order_id, "order already at venue, adopting");
                            SubmitEvent::StatusFound(ack)
                        }
                        Ok(Ok(None)) => SubmitEvent::StatusMissing,
                        Ok(Err(e)) => SubmitEvent::StatusUnavailable(e),
                        Err(_elapsed) => SubmitEvent::StatusUnavailable(VenueError::Timeout),
                    }
                }
            };
            state = transition(state, event, &policy);
        };

        SUBMIT_LATENCY_MS.observe(started.elapsed().as_secs_f64() * 1_000.0);

        match outcome {
            SubmitOutcome::Filled { venue_order_id } => {
                info!(cl_id = %order.client_order_id, asset = %order.asset, %venue_order_id, attempts = order.attempts, "order filled");
                order.venue_order_id = Some(venue_order_id);
                order.status = OrderStatus::Filled;
                (order, None)
            }
            SubmitOutcome::Resting { venue_order_id } => {
                info!(cl_id = %order.client_order_id, asset = %order.asset, %venue_order_id, "order resting");
                order.venue_order_id = Some(venue_order_id);
                order.reason = Some("resting at venue".into());
                (order, None)
            }
            SubmitOutcome::Failed { reason, transient } => {
                warn!(cl_id = %order.client_order_id, asset = %order.asset, %reason, transient, "order failed");
                order.status = OrderStatus::Failed;
                order.reason = Some(reason.clone());
                let kind = if transient { ErrorKind::Transient } else { ErrorKind::Fatal };
                let err = ExecutionError { client_order_id: order.client_order_id.clone(), asset: order.asset.clone(), kind, message: reason };
                (order, Some(err))
            }
        }
    }
}

impl Step {
    fn into_pair(self) -> (Order, Option<ExecutionError>) {
        match self {
            Step::Done(order, err) => (order, err),
            Step::Submit(t) => (t.order, None),
        }
    }
}

fn blank_order(
    client_order_id: String,
    market: MarketKind,
    asset: String,
    side: Option<OrderSide>,
    requested_size_usd: f64,
    leverage: Option<f64>,
) -> Order {
    Order {
        client_order_id,
        market,
        asset,
        side,
        requested_size_usd,
        normalized_size_usd: None,
        leverage,
        venue_order_id: None,
        status: OrderStatus::Pending,
        reason: None,
        attempts: 0,
    }
}

fn reject(order: &mut Order, reason: String, kind: ErrorKind) -> Step {
    warn!(cl_id = %order.client_order_id, asset = %order.asset, %reason, "order rejected");
    order.status = OrderStatus::Rejected;
    order.reason = Some(reason.clone());
    let err = ExecutionError { client_order_id: order.client_order_id.clone(), asset: order.asset.clone(), kind, message: reason };
    Step::Done(order.clone(), Some(err))
}

fn new_run_id(now: DateTime<Utc>) -> String {
    format!("{}-{:08x}", now.timestamp_millis(), rand::random::<u32>())
}

/// Stable per logical order, so every retry carries the same id.
pub fn client_order_id(run_id: &str, list: &str, index: usize, asset: &str) -> String {
    let digest = Sha256::digest(format!("{run_id}|{list}|{index}|{asset}").as_bytes());
    format!("0x{}", hex::encode(&digest[..16]))
}
