use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    PaymentMethod, PaymentStatus, TicketFields, Totals, TransactionStatus, WalletEntryType,
};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub depositor_id: Uuid,
    /// `None` until a waste bank scans the depositor's ticket.
    pub waste_bank_id: Option<Uuid>,
    pub total_amount: BigDecimal,
    pub total_weight: BigDecimal,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_details: Option<String>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
    pub points_earned: BigDecimal,
    pub points_credited: bool,
    pub customer_confirmation: bool,
    pub customer_confirmed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(skip_serializing, default)]
    pub qr_token: Option<String>,
    pub qr_issued_at: Option<DateTime<Utc>>,
    pub qr_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A directly submitted transaction; its ticket columns stay empty.
    pub fn new_pending(
        depositor_id: Uuid,
        waste_bank_id: Uuid,
        totals: Totals,
        payment_method: PaymentMethod,
        points_earned: BigDecimal,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            depositor_id,
            waste_bank_id: Some(waste_bank_id),
            total_amount: totals.amount,
            total_weight: totals.weight,
            status: TransactionStatus::Pending,
            payment_method,
            payment_status: PaymentStatus::Pending,
            payment_details: None,
            payment_confirmed_at: None,
            points_earned,
            points_credited: false,
            customer_confirmation: false,
            customer_confirmed_at: None,
            notes,
            qr_token: None,
            qr_issued_at: None,
            qr_expires_at: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            completed_at: None,
        }
    }

    pub fn ticket_fields(&self) -> TicketFields<'_> {
        TicketFields {
            token: self.qr_token.as_deref(),
            status: self.status,
            issued_at: self.qr_issued_at,
            expires_at: self.qr_expires_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub waste_category_id: Uuid,
    pub weight: BigDecimal,
    pub price_per_unit: BigDecimal,
    pub subtotal: BigDecimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WasteCategory {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a scanning operator is shown to confirm the depositor's identity.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepositorProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub profile_photo: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub depositor_id: Uuid,
    pub balance: BigDecimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount: BigDecimal,
    pub entry_type: WalletEntryType,
    pub status: TransactionStatus,
    pub reference_id: Option<Uuid>,
    pub waste_bank_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TicketState;
    use std::str::FromStr;

    fn sample() -> Transaction {
        Transaction::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Totals {
                amount: BigDecimal::from_str("10250").unwrap(),
                weight: BigDecimal::from_str("4.5").unwrap(),
            },
            PaymentMethod::Cash,
            BigDecimal::from(10),
            None,
        )
    }

    #[test]
    fn new_transactions_start_pending_and_unpaid() {
        let tx = sample();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.payment_status, PaymentStatus::Pending);
        assert!(!tx.points_credited);
        assert!(!tx.customer_confirmation);
    }

    #[test]
    fn direct_transactions_carry_no_ticket() {
        let tx = sample();
        assert_eq!(
            crate::domain::ticket::evaluate(
                tx.ticket_fields(),
                Utc::now(),
                chrono::Duration::minutes(30)
            ),
            TicketState::NoTicket
        );
    }

    #[test]
    fn token_is_not_serialized() {
        let mut tx = sample();
        tx.qr_token = Some("GCB-secret".to_string());

        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("qr_token").is_none());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["payment_method"], "cash");
    }
}
