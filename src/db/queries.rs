use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, Result};
use uuid::Uuid;

use crate::db::models::{
    DepositorProfile, LineItem, Transaction, Wallet, WalletEntry, WasteCategory,
};
use crate::domain::PricedLineItem;

// --- Catalog Queries ---

pub async fn list_active_categories<'e, E>(executor: E) -> Result<Vec<WasteCategory>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WasteCategory>(
        "SELECT * FROM waste_categories WHERE is_active ORDER BY name ASC",
    )
    .fetch_all(executor)
    .await
}

pub async fn get_active_category<'e, E>(executor: E, id: Uuid) -> Result<Option<WasteCategory>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WasteCategory>(
        "SELECT * FROM waste_categories WHERE id = $1 AND is_active",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Returns the subset of `ids` that name active categories.
pub async fn active_category_ids<'e, E>(executor: E, ids: &[Uuid]) -> Result<Vec<Uuid>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM waste_categories WHERE id = ANY($1) AND is_active",
    )
    .bind(ids)
    .fetch_all(executor)
    .await
}

// --- Party Queries ---

pub async fn get_depositor_profile<'e, E>(
    executor: E,
    id: Uuid,
) -> Result<Option<DepositorProfile>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, DepositorProfile>(
        "SELECT id, first_name, last_name, profile_photo FROM depositors WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub async fn depositor_exists<'e, E>(executor: E, id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM depositors WHERE id = $1)")
        .bind(id)
        .fetch_one(executor)
        .await
}

pub async fn waste_bank_exists<'e, E>(executor: E, id: Uuid) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM waste_banks WHERE id = $1)")
        .bind(id)
        .fetch_one(executor)
        .await
}

/// Adds loyalty points; returns the number of depositor rows touched.
pub async fn add_depositor_points<'e, E>(
    executor: E,
    depositor_id: Uuid,
    points: &BigDecimal,
) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE depositors SET points = points + $2 WHERE id = $1")
        .bind(depositor_id)
        .bind(points)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

// --- Transaction Queries ---

pub async fn insert_transaction<'e, E>(executor: E, tx: &Transaction) -> Result<Transaction>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, depositor_id, waste_bank_id, total_amount, total_weight, status,
            payment_method, payment_status, points_earned, points_credited, notes,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.depositor_id)
    .bind(tx.waste_bank_id)
    .bind(&tx.total_amount)
    .bind(&tx.total_weight)
    .bind(tx.status)
    .bind(tx.payment_method)
    .bind(tx.payment_status)
    .bind(&tx.points_earned)
    .bind(tx.points_credited)
    .bind(&tx.notes)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(executor)
    .await
}

pub async fn get_transaction<'e, E>(executor: E, id: Uuid) -> Result<Option<Transaction>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks the transaction for the rest of the enclosing database transaction.
pub async fn lock_transaction<'e, E>(executor: E, id: Uuid) -> Result<Option<Transaction>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Writes back every mutable header column except totals and ticket fields.
pub async fn save_transaction<'e, E>(executor: E, tx: &Transaction) -> Result<Transaction>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions SET
            waste_bank_id = $2,
            status = $3,
            payment_method = $4,
            payment_status = $5,
            payment_details = $6,
            payment_confirmed_at = $7,
            points_earned = $8,
            points_credited = $9,
            customer_confirmation = $10,
            customer_confirmed_at = $11,
            notes = $12,
            updated_at = $13,
            confirmed_at = $14,
            completed_at = $15
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.waste_bank_id)
    .bind(tx.status)
    .bind(tx.payment_method)
    .bind(tx.payment_status)
    .bind(&tx.payment_details)
    .bind(tx.payment_confirmed_at)
    .bind(&tx.points_earned)
    .bind(tx.points_credited)
    .bind(tx.customer_confirmation)
    .bind(tx.customer_confirmed_at)
    .bind(&tx.notes)
    .bind(tx.updated_at)
    .bind(tx.confirmed_at)
    .bind(tx.completed_at)
    .fetch_one(executor)
    .await
}

/// Recomputes header totals from the stored line items.
pub async fn refresh_totals<'e, E>(executor: E, id: Uuid) -> Result<Transaction>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions t SET
            total_amount = s.amount,
            total_weight = s.weight,
            updated_at = NOW()
        FROM (
            SELECT COALESCE(SUM(subtotal), 0) AS amount, COALESCE(SUM(weight), 0) AS weight
            FROM transaction_line_items
            WHERE transaction_id = $1
        ) s
        WHERE t.id = $1
        RETURNING t.*
        "#,
    )
    .bind(id)
    .fetch_one(executor)
    .await
}

pub async fn list_by_depositor<'e, E>(
    executor: E,
    depositor_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE depositor_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(depositor_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

pub async fn list_by_waste_bank<'e, E>(
    executor: E,
    waste_bank_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE waste_bank_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(waste_bank_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

// --- Ticket Queries ---

#[derive(Debug, FromRow)]
pub struct TicketUpsert {
    #[sqlx(flatten)]
    pub transaction: Transaction,
    /// `false` when an existing active ticket was re-stamped.
    pub inserted: bool,
}

/// Creates the depositor's pending ticket shell, or re-stamps the one they
/// already hold, in a single statement against the one-active-ticket index.
pub async fn upsert_ticket<'e, E>(
    executor: E,
    shell_id: Uuid,
    depositor_id: Uuid,
    token: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<TicketUpsert>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, TicketUpsert>(
        r#"
        INSERT INTO transactions (
            id, depositor_id, waste_bank_id, total_amount, total_weight, status,
            qr_token, qr_issued_at, qr_expires_at, created_at, updated_at
        ) VALUES ($1, $2, NULL, 0, 0, 'pending', $3, $4, $5, $4, $4)
        ON CONFLICT (depositor_id) WHERE status = 'pending' AND qr_token IS NOT NULL
        DO UPDATE SET
            qr_token = EXCLUDED.qr_token,
            qr_issued_at = EXCLUDED.qr_issued_at,
            qr_expires_at = EXCLUDED.qr_expires_at,
            updated_at = EXCLUDED.updated_at
        RETURNING *, (xmax = 0) AS inserted
        "#,
    )
    .bind(shell_id)
    .bind(depositor_id)
    .bind(token)
    .bind(issued_at)
    .bind(expires_at)
    .fetch_one(executor)
    .await
}

pub async fn find_by_token<'e, E>(executor: E, token: &str) -> Result<Option<Transaction>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE qr_token = $1")
        .bind(token)
        .fetch_optional(executor)
        .await
}

pub async fn stamp_ticket<'e, E>(
    executor: E,
    id: Uuid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Transaction>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET qr_issued_at = $2, qr_expires_at = $3, updated_at = $2
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(issued_at)
    .bind(expires_at)
    .fetch_one(executor)
    .await
}

/// Binds the scanning waste bank. Matches nothing once the transaction has
/// left `pending` or is bound to a different bank.
pub async fn bind_waste_bank<'e, E>(
    executor: E,
    id: Uuid,
    waste_bank_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Transaction>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET waste_bank_id = $2, updated_at = $3
        WHERE id = $1
          AND status = 'pending'
          AND (waste_bank_id IS NULL OR waste_bank_id = $2)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(waste_bank_id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

// --- Line Item Queries ---

pub async fn insert_line_item<'e, E>(
    executor: E,
    transaction_id: Uuid,
    item: &PricedLineItem,
) -> Result<LineItem>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, LineItem>(
        r#"
        INSERT INTO transaction_line_items (
            id, transaction_id, waste_category_id, weight, price_per_unit, subtotal, notes
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(transaction_id)
    .bind(item.waste_category_id)
    .bind(&item.weight)
    .bind(&item.price_per_unit)
    .bind(&item.subtotal)
    .bind(&item.notes)
    .fetch_one(executor)
    .await
}

pub async fn list_line_items<'e, E>(executor: E, transaction_id: Uuid) -> Result<Vec<LineItem>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, LineItem>(
        r#"
        SELECT * FROM transaction_line_items
        WHERE transaction_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(transaction_id)
    .fetch_all(executor)
    .await
}

/// Locks the listed items that belong to `transaction_id`; foreign ids are simply absent.
pub async fn lock_line_items<'e, E>(
    executor: E,
    transaction_id: Uuid,
    ids: &[Uuid],
) -> Result<Vec<LineItem>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, LineItem>(
        r#"
        SELECT * FROM transaction_line_items
        WHERE transaction_id = $1 AND id = ANY($2)
        FOR UPDATE
        "#,
    )
    .bind(transaction_id)
    .bind(ids)
    .fetch_all(executor)
    .await
}

pub async fn update_line_item<'e, E>(executor: E, item: &LineItem) -> Result<LineItem>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, LineItem>(
        r#"
        UPDATE transaction_line_items
        SET weight = $2, price_per_unit = $3, subtotal = $4, notes = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(item.id)
    .bind(&item.weight)
    .bind(&item.price_per_unit)
    .bind(&item.subtotal)
    .bind(&item.notes)
    .fetch_one(executor)
    .await
}

// --- Wallet Queries ---

pub async fn get_wallet_by_depositor<'e, E>(
    executor: E,
    depositor_id: Uuid,
) -> Result<Option<Wallet>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE depositor_id = $1")
        .bind(depositor_id)
        .fetch_optional(executor)
        .await
}

/// Inserts a zero-balance wallet unless one exists; returns the depositor's wallet either way.
pub async fn ensure_wallet<'e, E>(executor: E, depositor_id: Uuid) -> Result<Wallet>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (id, depositor_id, balance, is_active)
        VALUES ($1, $2, 0, TRUE)
        ON CONFLICT (depositor_id) DO UPDATE SET depositor_id = EXCLUDED.depositor_id
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(depositor_id)
    .fetch_one(executor)
    .await
}

pub async fn adjust_wallet_balance<'e, E>(
    executor: E,
    wallet_id: Uuid,
    delta: &BigDecimal,
) -> Result<Wallet>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET balance = balance + $2, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(wallet_id)
    .bind(delta)
    .fetch_one(executor)
    .await
}

pub async fn insert_wallet_entry<'e, E>(executor: E, entry: &WalletEntry) -> Result<WalletEntry>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WalletEntry>(
        r#"
        INSERT INTO wallet_entries (
            id, wallet_id, amount, entry_type, status, reference_id, waste_bank_id, notes, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(entry.id)
    .bind(entry.wallet_id)
    .bind(&entry.amount)
    .bind(entry.entry_type)
    .bind(entry.status)
    .bind(entry.reference_id)
    .bind(entry.waste_bank_id)
    .bind(&entry.notes)
    .bind(entry.created_at)
    .fetch_one(executor)
    .await
}

pub async fn list_wallet_entries<'e, E>(
    executor: E,
    wallet_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<WalletEntry>>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, WalletEntry>(
        r#"
        SELECT * FROM wallet_entries
        WHERE wallet_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(wallet_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}
