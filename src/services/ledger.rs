//! Transaction Ledger: creation, reads, status transitions and line-item
//! edits of the transaction aggregate.
//!
//! Every mutating operation runs in one database transaction that starts by
//! row-locking the header (`SELECT ... FOR UPDATE`), so concurrent transitions
//! on the same transaction serialize. Totals are always recomputed from the
//! stored line items; completion settles points and the wallet in the same
//! unit of work as the status change.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db::models::{DepositorProfile, LineItem, Transaction};
use crate::db::queries;
use crate::domain::line_item::{price_line_item, price_line_items};
use crate::domain::{
    implied_payment_status, LineItemInput, PaymentMethod, PaymentStatus, Totals,
    TransactionStatus, TransitionPolicy,
};
use crate::error::AppError;
use crate::metrics;
use crate::services::catalog::ensure_active_categories;
use crate::services::wallet::{Credit, WalletAccessor};
use crate::validation::{
    sanitize_optional, validate_non_negative, validate_optional_max_len, ValidationError,
    NOTES_MAX_LEN, PAYMENT_DETAILS_MAX_LEN,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub depositor_id: Uuid,
    pub waste_bank_id: Uuid,
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub points_earned: Option<BigDecimal>,
    pub notes: Option<String>,
    /// Accepted only as `pending`; new transactions always start there.
    pub status: Option<TransactionStatus>,
    pub total_amount: Option<BigDecimal>,
    pub total_weight: Option<BigDecimal>,
}

/// Edit of an existing line item, matched by id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineItemUpdate {
    pub id: Option<Uuid>,
    pub weight: Option<BigDecimal>,
    pub price_per_unit: Option<BigDecimal>,
    pub subtotal: Option<BigDecimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    pub notes: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_details: Option<String>,
    pub points_earned: Option<BigDecimal>,
    pub customer_confirmation: Option<bool>,
    pub items: Option<Vec<LineItemUpdate>>,
}

/// A transaction header with its line items and, for detail reads, the
/// depositor's display profile.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionDetails {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub line_items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depositor: Option<DepositorProfile>,
}

#[derive(Clone)]
pub struct TransactionLedger {
    pool: PgPool,
    policy: TransitionPolicy,
}

impl TransactionLedger {
    pub fn new(pool: PgPool, policy: TransitionPolicy) -> Self {
        Self { pool, policy }
    }

    /// Inserts the header and its line items and credits the depositor's
    /// points, all or nothing.
    pub async fn create(&self, input: NewTransaction) -> Result<TransactionDetails, AppError> {
        if let Some(status) = input.status {
            if status != TransactionStatus::Pending {
                return Err(ValidationError::new(
                    "status",
                    format!("new transactions start as pending, not {}", status),
                )
                .into());
            }
        }

        let points_earned = input.points_earned.unwrap_or_else(|| BigDecimal::from(0));
        validate_non_negative("points_earned", &points_earned)?;
        let notes = sanitize_optional(input.notes);
        validate_optional_max_len("notes", notes.as_deref(), NOTES_MAX_LEN)?;

        let items = price_line_items(input.items)?;
        let totals = Totals::of(&items);
        totals.verify_declared(input.total_amount.as_ref(), input.total_weight.as_ref())?;

        let mut db = self.pool.begin().await?;

        if !queries::depositor_exists(&mut *db, input.depositor_id).await? {
            return Err(AppError::NotFound(format!(
                "depositor {} not found",
                input.depositor_id
            )));
        }
        if !queries::waste_bank_exists(&mut *db, input.waste_bank_id).await? {
            return Err(AppError::NotFound(format!(
                "waste bank {} not found",
                input.waste_bank_id
            )));
        }
        let category_ids: Vec<Uuid> = items.iter().map(|item| item.waste_category_id).collect();
        ensure_active_categories(&mut *db, &category_ids).await?;

        let mut record = Transaction::new_pending(
            input.depositor_id,
            input.waste_bank_id,
            totals,
            input.payment_method,
            points_earned,
            notes,
        );
        record.points_credited = true;

        let transaction = queries::insert_transaction(&mut *db, &record).await?;
        let mut line_items = Vec::with_capacity(items.len());
        for item in &items {
            line_items.push(queries::insert_line_item(&mut *db, transaction.id, item).await?);
        }
        queries::add_depositor_points(&mut *db, transaction.depositor_id, &transaction.points_earned)
            .await?;

        db.commit().await?;

        tracing::info!(
            transaction_id = %transaction.id,
            depositor_id = %transaction.depositor_id,
            total_amount = %transaction.total_amount,
            items = line_items.len(),
            "Transaction created"
        );

        Ok(TransactionDetails {
            transaction,
            line_items,
            depositor: None,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Transaction, AppError> {
        queries::get_transaction(&self.pool, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn details(&self, id: Uuid) -> Result<TransactionDetails, AppError> {
        let transaction = self.get(id).await?;
        let line_items = queries::list_line_items(&self.pool, id).await?;
        let depositor = queries::get_depositor_profile(&self.pool, transaction.depositor_id).await?;

        Ok(TransactionDetails {
            transaction,
            line_items,
            depositor,
        })
    }

    pub async fn list_by_depositor(
        &self,
        depositor_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(queries::list_by_depositor(&self.pool, depositor_id, limit, offset).await?)
    }

    pub async fn list_by_waste_bank(
        &self,
        waste_bank_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(queries::list_by_waste_bank(&self.pool, waste_bank_id, limit, offset).await?)
    }

    pub async fn transition(
        &self,
        id: Uuid,
        target: TransactionStatus,
    ) -> Result<Transaction, AppError> {
        let mut db = self.pool.begin().await?;
        let tx = lock(&mut db, id).await?;
        let tx = self.enter_status(&mut db, tx, target, Utc::now()).await?;
        db.commit().await?;

        metrics::record_transition(target);
        Ok(tx)
    }

    /// `pending -> confirmed`; confirming also marks the payment completed.
    pub async fn confirm(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.transition(id, TransactionStatus::Confirmed).await
    }

    pub async fn complete(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.transition(id, TransactionStatus::Completed).await
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.transition(id, TransactionStatus::Cancelled).await
    }

    /// Sets the depositor's confirmation flag; re-confirming keeps the first timestamp.
    pub async fn customer_confirm(&self, id: Uuid) -> Result<Transaction, AppError> {
        let mut db = self.pool.begin().await?;
        let mut tx = lock(&mut db, id).await?;

        let now = Utc::now();
        set_customer_confirmation(&mut tx, true, now);
        tx.updated_at = now;
        let tx = queries::save_transaction(&mut *db, &tx).await?;

        db.commit().await?;
        Ok(tx)
    }

    pub async fn update(
        &self,
        id: Uuid,
        update: TransactionUpdate,
    ) -> Result<TransactionDetails, AppError> {
        let mut db = self.pool.begin().await?;
        let mut tx = lock(&mut db, id).await?;
        let now = Utc::now();

        if let Some(items) = update.items {
            ensure_items_editable(&tx)?;
            apply_item_updates(&mut db, id, items).await?;
            tx = queries::refresh_totals(&mut *db, id).await?;
        }

        apply_header_update(
            &mut tx,
            HeaderUpdate {
                notes: update.notes,
                payment_method: update.payment_method,
                payment_status: update.payment_status,
                payment_details: update.payment_details,
                points_earned: update.points_earned,
                customer_confirmation: update.customer_confirmation,
            },
            now,
        )?;
        tx.updated_at = now;

        let transitioned = update.status.filter(|status| *status != tx.status);
        let tx = match transitioned {
            Some(target) => self.enter_status(&mut db, tx, target, now).await?,
            None => queries::save_transaction(&mut *db, &tx).await?,
        };
        let line_items = queries::list_line_items(&mut *db, id).await?;

        db.commit().await?;

        if let Some(target) = transitioned {
            metrics::record_transition(target);
        }

        Ok(TransactionDetails {
            transaction: tx,
            line_items,
            depositor: None,
        })
    }

    /// Edits existing line items by id. Items without an id are rejected;
    /// new items go through [`TransactionLedger::add_line_items`].
    pub async fn attach_or_update_line_items(
        &self,
        id: Uuid,
        items: Vec<LineItemUpdate>,
    ) -> Result<TransactionDetails, AppError> {
        let mut db = self.pool.begin().await?;
        let tx = lock(&mut db, id).await?;
        ensure_items_editable(&tx)?;

        apply_item_updates(&mut db, id, items).await?;
        let transaction = queries::refresh_totals(&mut *db, id).await?;
        let line_items = queries::list_line_items(&mut *db, id).await?;

        db.commit().await?;

        Ok(TransactionDetails {
            transaction,
            line_items,
            depositor: None,
        })
    }

    /// Appends weighed items to a scanned ticket's pending transaction.
    pub async fn add_line_items(
        &self,
        id: Uuid,
        items: Vec<LineItemInput>,
    ) -> Result<TransactionDetails, AppError> {
        let items = price_line_items(items)?;

        let mut db = self.pool.begin().await?;
        let tx = lock(&mut db, id).await?;

        if tx.status != TransactionStatus::Pending {
            return Err(AppError::Conflict(format!(
                "transaction {} is {}; items can only be added while pending",
                id, tx.status
            )));
        }
        if tx.waste_bank_id.is_none() {
            return Err(AppError::Conflict(format!(
                "transaction {} has no waste bank bound yet",
                id
            )));
        }

        let category_ids: Vec<Uuid> = items.iter().map(|item| item.waste_category_id).collect();
        ensure_active_categories(&mut *db, &category_ids).await?;

        for item in &items {
            queries::insert_line_item(&mut *db, id, item).await?;
        }
        let transaction = queries::refresh_totals(&mut *db, id).await?;
        let line_items = queries::list_line_items(&mut *db, id).await?;

        db.commit().await?;

        tracing::info!(
            transaction_id = %id,
            added = items.len(),
            total_amount = %transaction.total_amount,
            total_weight = %transaction.total_weight,
            "Line items added"
        );

        Ok(TransactionDetails {
            transaction,
            line_items,
            depositor: None,
        })
    }

    /// Moves a locked transaction to `target`, saves it and, on completion,
    /// settles points and the wallet on the same connection.
    async fn enter_status(
        &self,
        conn: &mut PgConnection,
        mut tx: Transaction,
        target: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<Transaction, AppError> {
        let from = tx.status;
        self.policy
            .check(from, target)
            .map_err(|e| AppError::Conflict(e.to_string()))?;

        let credit_points = apply_transition(&mut tx, target, now);
        let tx = queries::save_transaction(&mut *conn, &tx).await?;

        if credit_points {
            queries::add_depositor_points(&mut *conn, tx.depositor_id, &tx.points_earned).await?;
        }
        if target == TransactionStatus::Completed {
            WalletAccessor::credit_with(&mut *conn, &Credit::waste_sale(&tx)).await?;
        }

        tracing::info!(
            transaction_id = %tx.id,
            from = %from,
            to = %target,
            "Transaction status changed"
        );

        Ok(tx)
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("transaction {} not found", id))
}

async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Transaction, AppError> {
    queries::lock_transaction(&mut *conn, id)
        .await?
        .ok_or_else(|| not_found(id))
}

fn ensure_items_editable(tx: &Transaction) -> Result<(), AppError> {
    if tx.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "transaction {} is {}; its line items can no longer change",
            tx.id, tx.status
        )));
    }
    Ok(())
}

async fn apply_item_updates(
    conn: &mut PgConnection,
    transaction_id: Uuid,
    updates: Vec<LineItemUpdate>,
) -> Result<(), AppError> {
    if updates.is_empty() {
        return Err(ValidationError::new("items", "at least one line item is required").into());
    }

    let mut ids = Vec::with_capacity(updates.len());
    for update in &updates {
        let id = update.id.ok_or_else(|| {
            ValidationError::new("items", "line items can only be updated by id")
        })?;
        ids.push(id);
    }

    let existing = queries::lock_line_items(&mut *conn, transaction_id, &ids).await?;

    for (id, update) in ids.into_iter().zip(updates) {
        let current = existing.iter().find(|item| item.id == id).ok_or_else(|| {
            AppError::NotFound(format!(
                "line item {} not found on transaction {}",
                id, transaction_id
            ))
        })?;

        let merged = merge_line_item(current, update)?;
        queries::update_line_item(&mut *conn, &merged).await?;
    }

    Ok(())
}

/// Applies an update on top of the stored item and re-prices it.
fn merge_line_item(current: &LineItem, update: LineItemUpdate) -> Result<LineItem, ValidationError> {
    let priced = price_line_item(LineItemInput {
        waste_category_id: current.waste_category_id,
        weight: update.weight.unwrap_or_else(|| current.weight.clone()),
        price_per_unit: update
            .price_per_unit
            .unwrap_or_else(|| current.price_per_unit.clone()),
        subtotal: update.subtotal,
        notes: update.notes.or_else(|| current.notes.clone()),
    })?;

    Ok(LineItem {
        weight: priced.weight,
        price_per_unit: priced.price_per_unit,
        subtotal: priced.subtotal,
        notes: priced.notes,
        ..current.clone()
    })
}

/// Stamps the timestamps and payment state implied by entering `target`.
/// Returns whether the depositor's points still need crediting.
fn apply_transition(tx: &mut Transaction, target: TransactionStatus, now: DateTime<Utc>) -> bool {
    tx.status = target;
    tx.updated_at = now;

    match target {
        TransactionStatus::Confirmed => {
            tx.confirmed_at = Some(now);
            mark_paid(tx, now);
        }
        TransactionStatus::Completed => {
            tx.completed_at = Some(now);
        }
        TransactionStatus::Cancelled | TransactionStatus::Pending => {}
    }

    if let Some(payment_status) = implied_payment_status(target) {
        tx.payment_status = payment_status;
    }

    if target == TransactionStatus::Completed && !tx.points_credited {
        tx.points_credited = true;
        return true;
    }
    false
}

fn mark_paid(tx: &mut Transaction, now: DateTime<Utc>) {
    tx.payment_status = PaymentStatus::Completed;
    tx.payment_confirmed_at.get_or_insert(now);
}

fn set_customer_confirmation(tx: &mut Transaction, confirmed: bool, now: DateTime<Utc>) {
    tx.customer_confirmation = confirmed;
    if confirmed {
        tx.customer_confirmed_at.get_or_insert(now);
    } else {
        tx.customer_confirmed_at = None;
    }
}

struct HeaderUpdate {
    notes: Option<String>,
    payment_method: Option<PaymentMethod>,
    payment_status: Option<PaymentStatus>,
    payment_details: Option<String>,
    points_earned: Option<BigDecimal>,
    customer_confirmation: Option<bool>,
}

fn apply_header_update(
    tx: &mut Transaction,
    update: HeaderUpdate,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if let Some(notes) = update.notes {
        let notes = sanitize_optional(Some(notes));
        validate_optional_max_len("notes", notes.as_deref(), NOTES_MAX_LEN)?;
        tx.notes = notes;
    }

    if let Some(details) = update.payment_details {
        let details = sanitize_optional(Some(details));
        validate_optional_max_len("payment_details", details.as_deref(), PAYMENT_DETAILS_MAX_LEN)?;
        tx.payment_details = details;
    }

    if let Some(method) = update.payment_method {
        tx.payment_method = method;
    }

    match update.payment_status {
        Some(PaymentStatus::Completed) => mark_paid(tx, now),
        Some(status) => tx.payment_status = status,
        None => {}
    }

    if let Some(points) = update.points_earned {
        validate_non_negative("points_earned", &points)?;
        if tx.points_credited && points != tx.points_earned {
            return Err(AppError::Conflict(format!(
                "points for transaction {} were already credited",
                tx.id
            )));
        }
        tx.points_earned = points;
    }

    if let Some(confirmed) = update.customer_confirmation {
        set_customer_confirmation(tx, confirmed, now);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn pending() -> Transaction {
        Transaction::new_pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Totals {
                amount: dec("10250"),
                weight: dec("4.5"),
            },
            PaymentMethod::Cash,
            dec("10"),
            None,
        )
    }

    fn line_item() -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            waste_category_id: Uuid::new_v4(),
            weight: dec("3.5"),
            price_per_unit: dec("2500"),
            subtotal: dec("8750"),
            notes: Some("PET".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn confirming_marks_payment_completed() {
        let mut tx = pending();
        let now = Utc::now();

        let credit = apply_transition(&mut tx, TransactionStatus::Confirmed, now);

        assert!(!credit);
        assert_eq!(tx.status, TransactionStatus::Confirmed);
        assert_eq!(tx.confirmed_at, Some(now));
        assert_eq!(tx.payment_status, PaymentStatus::Completed);
        assert_eq!(tx.payment_confirmed_at, Some(now));
    }

    #[test]
    fn cancelling_fails_payment() {
        let mut tx = pending();
        apply_transition(&mut tx, TransactionStatus::Cancelled, Utc::now());

        assert_eq!(tx.status, TransactionStatus::Cancelled);
        assert_eq!(tx.payment_status, PaymentStatus::Failed);
        assert_eq!(tx.completed_at, None);
    }

    #[test]
    fn completion_credits_points_once() {
        let mut tx = pending();
        tx.points_credited = false;

        assert!(apply_transition(&mut tx, TransactionStatus::Completed, Utc::now()));
        assert!(tx.points_credited);
        assert!(tx.completed_at.is_some());

        assert!(!apply_transition(&mut tx, TransactionStatus::Completed, Utc::now()));
    }

    #[test]
    fn points_from_create_are_not_credited_again() {
        let mut tx = pending();
        tx.points_credited = true;

        assert!(!apply_transition(&mut tx, TransactionStatus::Completed, Utc::now()));
    }

    #[test]
    fn merge_reprices_item() {
        let current = line_item();
        let merged = merge_line_item(
            &current,
            LineItemUpdate {
                id: Some(current.id),
                weight: Some(dec("4")),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(merged.id, current.id);
        assert_eq!(merged.weight, dec("4"));
        assert_eq!(merged.price_per_unit, dec("2500"));
        assert_eq!(merged.subtotal, dec("10000"));
        assert_eq!(merged.notes.as_deref(), Some("PET"));
    }

    #[test]
    fn merge_rejects_mismatched_subtotal() {
        let current = line_item();
        let err = merge_line_item(
            &current,
            LineItemUpdate {
                id: Some(current.id),
                price_per_unit: Some(dec("3000")),
                subtotal: Some(dec("8750")),
                ..Default::default()
            },
        )
        .unwrap_err();

        assert_eq!(err.field, "subtotal");
    }

    #[test]
    fn customer_confirmation_keeps_first_timestamp() {
        let mut tx = pending();
        let first = Utc::now();

        set_customer_confirmation(&mut tx, true, first);
        set_customer_confirmation(&mut tx, true, first + Duration::minutes(5));

        assert!(tx.customer_confirmation);
        assert_eq!(tx.customer_confirmed_at, Some(first));
    }

    #[test]
    fn header_update_stamps_payment_confirmation() {
        let mut tx = pending();
        let now = Utc::now();

        apply_header_update(
            &mut tx,
            HeaderUpdate {
                notes: Some("  paid   in cash ".to_string()),
                payment_method: Some(PaymentMethod::DigitalWallet),
                payment_status: Some(PaymentStatus::Completed),
                payment_details: None,
                points_earned: None,
                customer_confirmation: None,
            },
            now,
        )
        .unwrap();

        assert_eq!(tx.notes.as_deref(), Some("paid in cash"));
        assert_eq!(tx.payment_method, PaymentMethod::DigitalWallet);
        assert_eq!(tx.payment_status, PaymentStatus::Completed);
        assert_eq!(tx.payment_confirmed_at, Some(now));
    }

    #[test]
    fn credited_points_cannot_change() {
        let mut tx = pending();
        tx.points_credited = true;

        let update = |points: &str| HeaderUpdate {
            notes: None,
            payment_method: None,
            payment_status: None,
            payment_details: None,
            points_earned: Some(dec(points)),
            customer_confirmation: None,
        };

        assert!(apply_header_update(&mut tx, update("10"), Utc::now()).is_ok());
        assert!(matches!(
            apply_header_update(&mut tx, update("25"), Utc::now()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn new_transaction_rejects_unknown_status_values() {
        let body = serde_json::json!({
            "depositor_id": Uuid::new_v4(),
            "waste_bank_id": Uuid::new_v4(),
            "items": [],
            "status": "archived"
        });

        assert!(serde_json::from_value::<NewTransaction>(body).is_err());
    }

    #[test]
    fn details_flatten_the_header() {
        let tx = pending();
        let details = TransactionDetails {
            transaction: tx.clone(),
            line_items: vec![line_item()],
            depositor: None,
        };

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["id"], tx.id.to_string());
        assert_eq!(json["line_items"].as_array().unwrap().len(), 1);
        assert!(json.get("depositor").is_none());
    }
}
