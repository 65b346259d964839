// ===============================
// src/submit.rs
// ===============================
//
// Submission state machine for one logical order. Pure: the executor feeds
// events (venue answers, timer expiry, status lookups) and performs whatever
// I/O the returned state asks for.
//
//   Ready{n} --Accepted--------------------> Done
//   Ready{n} --Failed(fatal)---------------> Done(Failed)
//   Ready{n} --Failed(transient), n<max----> Backoff{n+1, reconcile=ambiguous}
//   Ready{n} --Failed(rate limit), n==max--> Done(Failed)
//   Ready{n} --Failed(ambiguous), n==max---> FinalCheck{n}
//   Backoff  --BackoffElapsed--------------> Reconcile{n} | Ready{n}
//   Reconcile --StatusFound----------------> Done (adopt, no resend)
//   Reconcile --StatusMissing/Unavailable--> Ready{n} (same client id)
//   FinalCheck --StatusFound---------------> Done (adopt)
//   FinalCheck --StatusMissing/Unavailable-> Done(Failed)
//
use tokio::time::Duration;

use crate::venue::{VenueAck, VenueError, VenueOrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Filled { venue_order_id: String },
    Resting { venue_order_id: String },
    Failed { reason: String, transient: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitState {
    Ready { attempt: u32 },
    Backoff { attempt: u32, delay: Duration, reconcile: bool },
    Reconcile { attempt: u32 },
    /// Budget spent on an ambiguous failure; one last status lookup decides.
    FinalCheck { attempts: u32, reason: String },
    Done(SubmitOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitEvent {
    Accepted(VenueAck),
    Failed(VenueError),
    BackoffElapsed,
    StatusFound(VenueAck),
    StatusMissing,
    StatusUnavailable(VenueError),
}

impl SubmitState {
    pub fn start() -> Self { SubmitState::Ready { attempt: 1 } }
}

fn outcome_of(ack: VenueAck) -> SubmitOutcome {
    match ack.status {
        VenueOrderStatus::Filled => SubmitOutcome::Filled { venue_order_id: ack.venue_order_id },
        VenueOrderStatus::Resting => SubmitOutcome::Resting { venue_order_id: ack.venue_order_id },
        VenueOrderStatus::Rejected(r) => SubmitOutcome::Failed { reason: format!("venue rejected order: {r}"), transient: false },
    }
}

pub fn transition(state: SubmitState, event: SubmitEvent, policy: &RetryPolicy) -> SubmitState {
    match (state, event) {
        (SubmitState::Ready { .. }, SubmitEvent::Accepted(ack)) => SubmitState::Done(outcome_of(ack)),
        (SubmitState::Ready { attempt }, SubmitEvent::Failed(e)) => {
            if !e.is_transient() {
                SubmitState::Done(SubmitOutcome::Failed { reason: e.to_string(), transient: false })
            } else if attempt >= policy.max_attempts {
                let reason = format!("gave up after {attempt} attempts: {e}");
                if e.is_ambiguous() {
                    // order bisa saja sudah masuk venue, cek dulu
                    SubmitState::FinalCheck { attempts: attempt, reason }
                } else {
                    SubmitState::Done(SubmitOutcome::Failed { reason, transient: true })
                }
            } else {
                SubmitState::Backoff { attempt: attempt + 1, delay: policy.delay_for(attempt), reconcile: e.is_ambiguous() }
            }
        }
        (SubmitState::Backoff { attempt, reconcile, .. }, SubmitEvent::BackoffElapsed) => {
            if reconcile { SubmitState::Reconcile { attempt } } else { SubmitState::Ready { attempt } }
        }
        (SubmitState::Reconcile { .. }, SubmitEvent::StatusFound(ack)) => SubmitState::Done(outcome_of(ack)),
        (SubmitState::Reconcile { attempt }, SubmitEvent::StatusMissing)
        | (SubmitState::Reconcile { attempt }, SubmitEvent::StatusUnavailable(_)) => SubmitState::Ready { attempt },
        (SubmitState::FinalCheck { .. }, SubmitEvent::StatusFound(ack)) => SubmitState::Done(outcome_of(ack)),
        (SubmitState::FinalCheck { reason, .. }, SubmitEvent::StatusMissing) => {
            SubmitState::Done(SubmitOutcome::Failed { reason, transient: true })
        }
        (SubmitState::FinalCheck { reason, .. }, SubmitEvent::StatusUnavailable(e)) => SubmitState::Done(SubmitOutcome::Failed {
            reason: format!("{reason}; order status unknown: {e}"),
            transient: true,
        }),
        // event tidak relevan untuk state ini -> abaikan
        (state, _) => state,
    }
}
