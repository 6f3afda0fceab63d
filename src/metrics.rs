//! Prometheus counters exposed at `GET /metrics`.
//!
//! - `banksampah_side_effect_failures_total{effect}` - best-effort writes that failed after the main operation succeeded
//! - `banksampah_tickets_issued_total{outcome}` - `created` or `restamped`
//! - `banksampah_ticket_verifications_total{outcome}` - `valid`, `not_found`, `expired`, `closed`, `bind_conflict`
//! - `banksampah_transaction_transitions_total{to}` - successful status transitions by target status

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

use crate::domain::{TicketState, TransactionStatus};

lazy_static! {
    pub static ref SIDE_EFFECT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "banksampah_side_effect_failures_total",
        "Best-effort side effects that failed without failing the request",
        &["effect"]
    )
    .expect("Failed to create SIDE_EFFECT_FAILURES metric");

    pub static ref TICKETS_ISSUED: IntCounterVec = register_int_counter_vec!(
        "banksampah_tickets_issued_total",
        "QR tickets issued, by whether a new shell was created or an existing one re-stamped",
        &["outcome"]
    )
    .expect("Failed to create TICKETS_ISSUED metric");

    pub static ref TICKET_VERIFICATIONS: IntCounterVec = register_int_counter_vec!(
        "banksampah_ticket_verifications_total",
        "QR ticket scans, by outcome",
        &["outcome"]
    )
    .expect("Failed to create TICKET_VERIFICATIONS metric");

    pub static ref TRANSACTION_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "banksampah_transaction_transitions_total",
        "Transaction status transitions, by target status",
        &["to"]
    )
    .expect("Failed to create TRANSACTION_TRANSITIONS metric");
}

pub fn record_side_effect_failure(effect: &str) {
    SIDE_EFFECT_FAILURES.with_label_values(&[effect]).inc();
}

pub fn record_ticket_issued(created: bool) {
    let outcome = if created { "created" } else { "restamped" };
    TICKETS_ISSUED.with_label_values(&[outcome]).inc();
}

pub fn record_verification(outcome: &str) {
    TICKET_VERIFICATIONS.with_label_values(&[outcome]).inc();
}

/// Verification outcome label for a ticket state.
pub fn verification_outcome(state: &TicketState) -> &'static str {
    match state {
        TicketState::Active { .. } | TicketState::Unstamped => "valid",
        TicketState::NoTicket => "not_found",
        TicketState::Expired { .. } => "expired",
        TicketState::Closed { .. } => "closed",
    }
}

pub fn record_transition(to: TransactionStatus) {
    TRANSACTION_TRANSITIONS.with_label_values(&[to.as_str()]).inc();
}

/// Renders the default registry in the text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
