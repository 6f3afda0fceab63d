//! QR ticket rules.
//!
//! A ticket is not a separate record: it is the `qr_*` columns of a pending
//! transaction. Its state is computed lazily from the token, the owning
//! transaction's status and the issuance/expiry timestamps, so there is no
//! expiry sweep.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::transaction::TransactionStatus;
use crate::validation::ValidationError;

pub const TOKEN_PREFIX: &str = "GCB";
pub const DEFAULT_TTL_MINUTES: i64 = 30;
const NONCE_LEN: usize = 12;

/// `GCB-<depositor>-<unix millis>-<random>`. The depositor id is rendered
/// without hyphens so the token splits cleanly on '-'.
pub fn generate_token(depositor_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}-{}",
        TOKEN_PREFIX,
        depositor_id.simple(),
        issued_at.timestamp_millis(),
        &nonce[..NONCE_LEN]
    )
}

/// Picks the expiry for a freshly issued ticket. An override can shorten the
/// validity window but never extend it past `issued_at + ttl`.
pub fn resolve_expiry(
    requested: Option<DateTime<Utc>>,
    issued_at: DateTime<Utc>,
    ttl: Duration,
) -> Result<DateTime<Utc>, ValidationError> {
    let latest = issued_at + ttl;
    match requested {
        Some(expires_at) if expires_at <= issued_at => Err(ValidationError::new(
            "expires_at",
            "must be in the future",
        )),
        Some(expires_at) => Ok(expires_at.min(latest)),
        None => Ok(latest),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    /// The transaction carries no token.
    NoTicket,
    Active { expires_at: DateTime<Utc> },
    Expired { expired_at: DateTime<Utc> },
    /// The owning transaction has left `pending`.
    Closed { status: TransactionStatus },
    /// Legacy row with a token but no issuance time.
    Unstamped,
}

impl TicketState {
    pub fn is_active(&self) -> bool {
        matches!(self, TicketState::Active { .. })
    }

    /// Human-readable reason a scan is refused, `None` if the scan may proceed.
    pub fn rejection_reason(&self) -> Option<String> {
        match self {
            TicketState::NoTicket => Some("QR ticket not found".to_string()),
            TicketState::Expired { .. } => Some("QR ticket has expired".to_string()),
            TicketState::Closed { status } => Some(format!(
                "QR ticket is no longer active (transaction is {})",
                status
            )),
            TicketState::Active { .. } | TicketState::Unstamped => None,
        }
    }
}

/// The ticket-relevant columns of a transaction.
#[derive(Debug, Clone, Copy)]
pub struct TicketFields<'a> {
    pub token: Option<&'a str>,
    pub status: TransactionStatus,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Expiry is checked before status: a stale ticket reports expiry whatever
/// happened to its transaction.
pub fn evaluate(fields: TicketFields<'_>, now: DateTime<Utc>, ttl: Duration) -> TicketState {
    if fields.token.is_none() {
        return TicketState::NoTicket;
    }

    let ttl_limit = fields.issued_at.map(|issued| issued + ttl);
    let expires_at = match (fields.expires_at, ttl_limit) {
        (Some(stored), Some(limit)) => Some(stored.min(limit)),
        (stored, limit) => stored.or(limit),
    };

    if let Some(expires_at) = expires_at {
        if now > expires_at {
            return TicketState::Expired {
                expired_at: expires_at,
            };
        }
    }

    if fields.status != TransactionStatus::Pending {
        return TicketState::Closed {
            status: fields.status,
        };
    }

    match (fields.issued_at, expires_at) {
        (Some(_), Some(expires_at)) => TicketState::Active { expires_at },
        _ => TicketState::Unstamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ttl() -> Duration {
        Duration::minutes(DEFAULT_TTL_MINUTES)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn fields(status: TransactionStatus, issued_at: Option<DateTime<Utc>>) -> TicketFields<'static> {
        TicketFields {
            token: Some("GCB-x-1-abc"),
            status,
            issued_at,
            expires_at: issued_at.map(|at| at + ttl()),
        }
    }

    #[test]
    fn token_embeds_depositor_and_timestamp() {
        let depositor = Uuid::new_v4();
        let token = generate_token(depositor, t0());

        let parts: Vec<&str> = token.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], TOKEN_PREFIX);
        assert_eq!(parts[1], depositor.simple().to_string());
        assert_eq!(parts[2], t0().timestamp_millis().to_string());
        assert_eq!(parts[3].len(), NONCE_LEN);
    }

    #[test]
    fn tokens_are_unique_for_same_depositor_and_instant() {
        let depositor = Uuid::new_v4();
        assert_ne!(generate_token(depositor, t0()), generate_token(depositor, t0()));
    }

    #[test]
    fn default_expiry_is_issue_time_plus_ttl() {
        let expiry = resolve_expiry(None, t0(), ttl()).unwrap();
        assert_eq!(expiry, t0() + Duration::minutes(30));
    }

    #[test]
    fn expiry_override_must_be_in_the_future() {
        let custom = t0() + Duration::minutes(5);
        assert_eq!(resolve_expiry(Some(custom), t0(), ttl()).unwrap(), custom);
        assert!(resolve_expiry(Some(t0()), t0(), ttl()).is_err());
    }

    #[test]
    fn expiry_override_cannot_outlive_ttl() {
        let requested = t0() + Duration::hours(2);
        assert_eq!(resolve_expiry(Some(requested), t0(), ttl()).unwrap(), t0() + ttl());
    }

    #[test]
    fn stored_expiry_past_ttl_still_expires_after_thirty_minutes() {
        let mut f = fields(TransactionStatus::Pending, Some(t0()));
        f.expires_at = Some(t0() + Duration::hours(2));

        assert!(evaluate(f, t0() + Duration::minutes(29), ttl()).is_active());
        assert_eq!(
            evaluate(f, t0() + Duration::minutes(31), ttl()),
            TicketState::Expired {
                expired_at: t0() + ttl()
            }
        );
    }

    #[test]
    fn fresh_pending_ticket_is_active() {
        let state = evaluate(
            fields(TransactionStatus::Pending, Some(t0())),
            t0() + Duration::minutes(10),
            ttl(),
        );
        assert!(state.is_active());
        assert_eq!(state.rejection_reason(), None);
    }

    #[test]
    fn ticket_is_valid_up_to_the_boundary() {
        let state = evaluate(
            fields(TransactionStatus::Pending, Some(t0())),
            t0() + Duration::minutes(30),
            ttl(),
        );
        assert!(state.is_active());
    }

    #[test]
    fn ticket_expires_after_thirty_minutes() {
        let state = evaluate(
            fields(TransactionStatus::Pending, Some(t0())),
            t0() + Duration::minutes(31),
            ttl(),
        );
        assert_eq!(
            state,
            TicketState::Expired {
                expired_at: t0() + ttl()
            }
        );
        assert_eq!(state.rejection_reason().unwrap(), "QR ticket has expired");
    }

    #[test]
    fn expiry_wins_over_status() {
        let state = evaluate(
            fields(TransactionStatus::Completed, Some(t0())),
            t0() + Duration::minutes(45),
            ttl(),
        );
        assert!(matches!(state, TicketState::Expired { .. }));
    }

    #[test]
    fn closed_transaction_rejects_scan() {
        let state = evaluate(
            fields(TransactionStatus::Completed, Some(t0())),
            t0() + Duration::minutes(1),
            ttl(),
        );
        assert_eq!(
            state,
            TicketState::Closed {
                status: TransactionStatus::Completed
            }
        );
        assert!(state.rejection_reason().unwrap().contains("completed"));
    }

    #[test]
    fn missing_token_is_no_ticket() {
        let mut f = fields(TransactionStatus::Pending, Some(t0()));
        f.token = None;
        assert_eq!(evaluate(f, t0(), ttl()), TicketState::NoTicket);
    }

    #[test]
    fn missing_issue_time_is_unstamped_not_rejected() {
        let state = evaluate(fields(TransactionStatus::Pending, None), t0(), ttl());
        assert_eq!(state, TicketState::Unstamped);
        assert_eq!(state.rejection_reason(), None);
    }

    #[test]
    fn custom_expiry_is_honoured() {
        let mut f = fields(TransactionStatus::Pending, Some(t0()));
        f.expires_at = Some(t0() + Duration::minutes(5));

        assert!(evaluate(f, t0() + Duration::minutes(4), ttl()).is_active());
        assert!(matches!(
            evaluate(f, t0() + Duration::minutes(6), ttl()),
            TicketState::Expired { .. }
        ));
    }
}
