//! Issues depositor tickets and turns a waste-bank scan into a bound
//! pending transaction.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{DepositorProfile, Transaction};
use crate::db::queries;
use crate::domain::ticket::{self, TicketState};
use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::metrics;
use crate::validation::validate_token;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTicket {
    pub token: String,
    pub depositor_id: Uuid,
    pub transaction_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `false` when the depositor's existing ticket was re-stamped.
    #[serde(skip)]
    pub created: bool,
}

/// What the scanning operator sees about the depositor.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DepositorDisplayInfo {
    pub first_name: String,
    pub last_name: String,
    pub profile_photo: Option<String>,
}

impl From<DepositorProfile> for DepositorDisplayInfo {
    fn from(profile: DepositorProfile) -> Self {
        Self {
            first_name: profile.first_name,
            last_name: profile.last_name,
            profile_photo: profile.profile_photo,
        }
    }
}

/// Outcome of a scan, shaped for the operator's confirmation screen.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketResolution {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depositor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depositor_display_info: Option<DepositorDisplayInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TicketResolution {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
            transaction_id: None,
            depositor_id: None,
            depositor_display_info: None,
            expires_at: None,
        }
    }

    fn accepted(tx: &Transaction, profile: Option<DepositorProfile>) -> Self {
        Self {
            is_valid: true,
            message: None,
            transaction_id: Some(tx.id),
            depositor_id: Some(tx.depositor_id),
            depositor_display_info: profile.map(DepositorDisplayInfo::from),
            expires_at: tx.qr_expires_at,
        }
    }
}

#[derive(Clone)]
pub struct QrTicketManager {
    pool: PgPool,
    ttl: Duration,
}

impl QrTicketManager {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Creates the depositor's pending ticket shell, or re-stamps the one they
    /// already hold with a fresh token and expiry.
    pub async fn issue_ticket(
        &self,
        depositor_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedTicket, AppError> {
        let issued_at = Utc::now();
        let expires_at = ticket::resolve_expiry(expires_at, issued_at, self.ttl)?;

        if !queries::depositor_exists(&self.pool, depositor_id).await? {
            return Err(AppError::NotFound(format!(
                "depositor {} not found",
                depositor_id
            )));
        }

        let token = ticket::generate_token(depositor_id, issued_at);
        let upsert = queries::upsert_ticket(
            &self.pool,
            Uuid::new_v4(),
            depositor_id,
            &token,
            issued_at,
            expires_at,
        )
        .await?;

        metrics::record_ticket_issued(upsert.inserted);
        tracing::info!(
            depositor_id = %depositor_id,
            transaction_id = %upsert.transaction.id,
            created = upsert.inserted,
            expires_at = %expires_at,
            "QR ticket issued"
        );

        Ok(IssuedTicket {
            token,
            depositor_id,
            transaction_id: upsert.transaction.id,
            issued_at,
            expires_at,
            created: upsert.inserted,
        })
    }

    /// Checks a scanned token. Rejections carry a reason and mutate nothing;
    /// the only write is stamping a legacy ticket that lacks an issue time.
    pub async fn resolve_ticket(&self, token: &str) -> Result<TicketResolution, AppError> {
        let (resolution, _) = self.resolve(token).await?;
        Ok(resolution)
    }

    async fn resolve(&self, token: &str) -> Result<(TicketResolution, TicketState), AppError> {
        let token = token.trim();
        if let Err(e) = validate_token(token) {
            tracing::debug!(error = %e, "Malformed QR token scanned");
            let state = TicketState::NoTicket;
            return Ok((rejection(&state), state));
        }

        let Some(tx) = queries::find_by_token(&self.pool, token).await? else {
            let state = TicketState::NoTicket;
            return Ok((rejection(&state), state));
        };

        let now = Utc::now();
        let state = ticket::evaluate(tx.ticket_fields(), now, self.ttl);

        let tx = match state {
            TicketState::Active { .. } => tx,
            TicketState::Unstamped => {
                tracing::warn!(
                    transaction_id = %tx.id,
                    "QR ticket has no issue time; stamping it as issued now"
                );
                queries::stamp_ticket(&self.pool, tx.id, now, now + self.ttl).await?
            }
            rejected => {
                tracing::info!(
                    transaction_id = %tx.id,
                    state = ?rejected,
                    "QR ticket rejected"
                );
                return Ok((rejection(&rejected), rejected));
            }
        };

        let profile = queries::get_depositor_profile(&self.pool, tx.depositor_id).await?;

        Ok((TicketResolution::accepted(&tx, profile), state))
    }

    /// Binds the scanning waste bank to a pending transaction. Re-binding the
    /// same bank is a no-op; anything else after the first bind is a conflict.
    pub async fn bind_scanner(
        &self,
        transaction_id: Uuid,
        waste_bank_id: Uuid,
    ) -> Result<Transaction, AppError> {
        if !queries::waste_bank_exists(&self.pool, waste_bank_id).await? {
            return Err(AppError::NotFound(format!(
                "waste bank {} not found",
                waste_bank_id
            )));
        }

        if let Some(tx) =
            queries::bind_waste_bank(&self.pool, transaction_id, waste_bank_id, Utc::now()).await?
        {
            tracing::info!(
                transaction_id = %transaction_id,
                waste_bank_id = %waste_bank_id,
                "Waste bank bound to transaction"
            );
            return Ok(tx);
        }

        match queries::get_transaction(&self.pool, transaction_id).await? {
            None => Err(AppError::NotFound(format!(
                "transaction {} not found",
                transaction_id
            ))),
            Some(tx) => Err(AppError::Conflict(bind_conflict_message(&tx))),
        }
    }

    /// Resolves a scan and binds the scanner in one call. A conflicting bind
    /// turns the scan into a rejection; a failed bind write leaves the scan
    /// accepted so the caller can retry the bind on its own.
    pub async fn verify(
        &self,
        token: &str,
        waste_bank_id: Uuid,
    ) -> Result<TicketResolution, AppError> {
        let (resolution, state) = self.resolve(token).await?;

        let Some(transaction_id) = resolution.transaction_id.filter(|_| resolution.is_valid) else {
            metrics::record_verification(metrics::verification_outcome(&state));
            return Ok(resolution);
        };

        match self.bind_scanner(transaction_id, waste_bank_id).await {
            Ok(_) => {
                metrics::record_verification("valid");
                Ok(resolution)
            }
            Err(AppError::Conflict(message)) => {
                metrics::record_verification("bind_conflict");
                Ok(TicketResolution::rejected(message))
            }
            Err(e @ (AppError::Database(_) | AppError::Internal(_))) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    waste_bank_id = %waste_bank_id,
                    error = ?e,
                    "Ticket accepted but binding the waste bank failed"
                );
                metrics::record_side_effect_failure("ticket_bind");
                metrics::record_verification("valid");
                Ok(resolution)
            }
            Err(e) => Err(e),
        }
    }

    /// Read-only view of a ticket for operators; never stamps.
    pub async fn inspect(&self, token: &str) -> Result<(Transaction, TicketState), AppError> {
        let tx = queries::find_by_token(&self.pool, token.trim())
            .await?
            .ok_or_else(|| AppError::NotFound("QR ticket not found".to_string()))?;
        let state = ticket::evaluate(tx.ticket_fields(), Utc::now(), self.ttl);

        Ok((tx, state))
    }
}

fn rejection(state: &TicketState) -> TicketResolution {
    TicketResolution::rejected(state.rejection_reason().unwrap_or_default())
}

fn bind_conflict_message(tx: &Transaction) -> String {
    if tx.status != TransactionStatus::Pending {
        format!(
            "transaction {} is {} and can no longer be bound",
            tx.id, tx.status
        )
    } else {
        format!(
            "transaction {} is already bound to another waste bank",
            tx.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentMethod, Totals};
    use bigdecimal::BigDecimal;

    fn shell() -> Transaction {
        Transaction::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Totals {
                amount: BigDecimal::from(0),
                weight: BigDecimal::from(0),
            },
            PaymentMethod::Cash,
            BigDecimal::from(0),
            None,
        )
    }

    #[test]
    fn rejection_serializes_without_identity() {
        let json = serde_json::to_value(TicketResolution::rejected("QR ticket has expired")).unwrap();

        assert_eq!(json["isValid"], false);
        assert_eq!(json["message"], "QR ticket has expired");
        assert!(json.get("transactionId").is_none());
        assert!(json.get("depositorDisplayInfo").is_none());
    }

    #[test]
    fn acceptance_carries_display_info() {
        let tx = shell();
        let profile = DepositorProfile {
            id: tx.depositor_id,
            first_name: "Siti".to_string(),
            last_name: "Aminah".to_string(),
            profile_photo: None,
        };

        let json = serde_json::to_value(TicketResolution::accepted(&tx, Some(profile))).unwrap();
        assert_eq!(json["isValid"], true);
        assert_eq!(json["transactionId"], tx.id.to_string());
        assert_eq!(json["depositorId"], tx.depositor_id.to_string());
        assert_eq!(json["depositorDisplayInfo"]["firstName"], "Siti");
        assert_eq!(json["depositorDisplayInfo"]["lastName"], "Aminah");
        assert!(json["depositorDisplayInfo"].get("first_name").is_none());
    }

    #[tokio::test]
    async fn malformed_tokens_resolve_as_not_found() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let tickets = QrTicketManager::new(pool, Duration::minutes(30));

        for token in ["GCB bad token!", &"A".repeat(200), "   "] {
            let resolution = tickets.resolve_ticket(token).await.unwrap();
            assert!(!resolution.is_valid);
            assert_eq!(resolution.message.as_deref(), Some("QR ticket not found"));
        }
    }

    #[test]
    fn rejection_uses_ticket_reason() {
        let resolution = rejection(&TicketState::Expired {
            expired_at: Utc::now(),
        });
        assert!(!resolution.is_valid);
        assert_eq!(resolution.message.as_deref(), Some("QR ticket has expired"));
    }

    #[test]
    fn bind_conflicts_explain_why() {
        let mut tx = shell();
        assert!(bind_conflict_message(&tx).contains("already bound"));

        tx.status = TransactionStatus::Completed;
        assert!(bind_conflict_message(&tx).contains("is completed"));
    }
}
