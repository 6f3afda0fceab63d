use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::models::{Transaction, Wallet, WalletEntry};
use crate::db::queries;
use crate::domain::{TransactionStatus, WalletEntryType};
use crate::error::AppError;

/// A balance change to append to a depositor's wallet. The sign of `amount`
/// is the caller's responsibility; it is never inferred from `entry_type`.
#[derive(Debug, Clone)]
pub struct Credit {
    pub depositor_id: Uuid,
    pub amount: BigDecimal,
    pub entry_type: WalletEntryType,
    pub reference_id: Option<Uuid>,
    pub waste_bank_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl Credit {
    /// Proceeds of a completed waste sale.
    pub fn waste_sale(tx: &Transaction) -> Self {
        Self {
            depositor_id: tx.depositor_id,
            amount: tx.total_amount.clone(),
            entry_type: WalletEntryType::WasteSale,
            reference_id: Some(tx.id),
            waste_bank_id: tx.waste_bank_id,
            notes: Some(format!("Waste sale {}", tx.id)),
        }
    }
}

#[derive(Clone)]
pub struct WalletAccessor {
    pool: PgPool,
}

impl WalletAccessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_or_create(&self, depositor_id: Uuid) -> Result<Wallet, AppError> {
        if let Some(wallet) = queries::get_wallet_by_depositor(&self.pool, depositor_id).await? {
            return Ok(wallet);
        }

        if !queries::depositor_exists(&self.pool, depositor_id).await? {
            return Err(AppError::NotFound(format!(
                "depositor {} not found",
                depositor_id
            )));
        }

        let wallet = queries::ensure_wallet(&self.pool, depositor_id).await?;
        tracing::info!(depositor_id = %depositor_id, wallet_id = %wallet.id, "Wallet created");

        Ok(wallet)
    }

    /// Applies a credit in its own database transaction.
    pub async fn credit(&self, credit: &Credit) -> Result<WalletEntry, AppError> {
        let mut db = self.pool.begin().await?;
        let entry = Self::credit_with(&mut db, credit).await?;
        db.commit().await?;

        Ok(entry)
    }

    /// Applies a credit on an existing connection so it commits or rolls back
    /// with the caller's unit of work.
    pub(crate) async fn credit_with(
        conn: &mut PgConnection,
        credit: &Credit,
    ) -> Result<WalletEntry, AppError> {
        let wallet = queries::ensure_wallet(&mut *conn, credit.depositor_id).await?;

        let entry = WalletEntry {
            id: Uuid::new_v4(),
            wallet_id: wallet.id,
            amount: credit.amount.clone(),
            entry_type: credit.entry_type,
            status: TransactionStatus::Completed,
            reference_id: credit.reference_id,
            waste_bank_id: credit.waste_bank_id,
            notes: credit.notes.clone(),
            created_at: Utc::now(),
        };
        let entry = queries::insert_wallet_entry(&mut *conn, &entry).await?;
        let wallet = queries::adjust_wallet_balance(&mut *conn, wallet.id, &credit.amount).await?;

        tracing::info!(
            depositor_id = %credit.depositor_id,
            wallet_id = %wallet.id,
            entry_type = %credit.entry_type,
            amount = %credit.amount,
            balance = %wallet.balance,
            "Wallet credited"
        );

        Ok(entry)
    }

    pub async fn list_entries(
        &self,
        depositor_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WalletEntry>, AppError> {
        match queries::get_wallet_by_depositor(&self.pool, depositor_id).await? {
            Some(wallet) => Ok(queries::list_wallet_entries(&self.pool, wallet.id, limit, offset).await?),
            None => {
                // No wallet yet means no entries, as long as the depositor exists.
                if queries::depositor_exists(&self.pool, depositor_id).await? {
                    Ok(Vec::new())
                } else {
                    Err(AppError::NotFound(format!(
                        "depositor {} not found",
                        depositor_id
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentMethod, Totals};
    use std::str::FromStr;

    #[test]
    fn waste_sale_credit_references_the_transaction() {
        let tx = Transaction::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Totals {
                amount: BigDecimal::from_str("10250").unwrap(),
                weight: BigDecimal::from_str("4.5").unwrap(),
            },
            PaymentMethod::Cash,
            BigDecimal::from(0),
            None,
        );

        let credit = Credit::waste_sale(&tx);
        assert_eq!(credit.depositor_id, tx.depositor_id);
        assert_eq!(credit.amount, BigDecimal::from(10250));
        assert_eq!(credit.entry_type, WalletEntryType::WasteSale);
        assert_eq!(credit.reference_id, Some(tx.id));
        assert_eq!(credit.waste_bank_id, tx.waste_bank_id);
    }
}
