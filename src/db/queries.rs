use crate::db::models::{Card, CardReconciliation, PricingConfig, Transaction, Wallet};
use bigdecimal::BigDecimal;
use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use uuid::Uuid;

// --- Transaction Queries ---

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, user_id, card_id, transaction_type, payment_method,
            amount, amount_native, amount_credited, fee_native, currency, status,
            transaction_number, reference_number, rate_snapshot, metadata, response_data,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.card_id)
    .bind(&tx.transaction_type)
    .bind(&tx.payment_method)
    .bind(&tx.amount)
    .bind(&tx.amount_native)
    .bind(&tx.amount_credited)
    .bind(&tx.fee_native)
    .bind(&tx.currency)
    .bind(&tx.status)
    .bind(&tx.transaction_number)
    .bind(&tx.reference_number)
    .bind(&tx.rate_snapshot)
    .bind(&tx.metadata)
    .bind(&tx.response_data)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_user_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Latest pending or completed row for an external reference. Failed rows
/// are deliberately invisible here so a corrected retry can proceed.
pub async fn find_live_by_reference(
    pool: &PgPool,
    transaction_type: &str,
    transaction_number: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE transaction_type = $1
          AND transaction_number = $2
          AND status IN ('pending', 'completed')
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(transaction_type)
    .bind(transaction_number)
    .fetch_optional(pool)
    .await
}

/// Guarded pending -> completed flip. Returns None when the row is missing
/// or already terminal.
pub async fn complete_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    response_data: Option<&serde_json::Value>,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = 'completed',
            response_data = COALESCE($2, response_data),
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(response_data)
    .fetch_optional(&mut **executor)
    .await
}

pub async fn merge_transaction_metadata(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    patch: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE transactions
        SET metadata = COALESCE(metadata, '{}'::jsonb) || $2::jsonb,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(patch)
    .execute(&mut **executor)
    .await?;
    Ok(())
}

// --- Wallet Queries ---

pub async fn get_wallet(pool: &PgPool, user_id: Uuid) -> Result<Option<Wallet>> {
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Creates the wallet on first credit. Returns the new balance.
pub async fn credit_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<BigDecimal> {
    let (balance,): (BigDecimal,) = sqlx::query_as(
        r#"
        INSERT INTO wallets (user_id, balance)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET balance = wallets.balance + EXCLUDED.balance, updated_at = NOW()
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut **executor)
    .await?;
    Ok(balance)
}

/// Conditional decrement; the WHERE clause is the overdraft guard. Returns
/// None when the wallet is missing or the balance would go negative.
pub async fn debit_wallet(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<Option<BigDecimal>> {
    let row: Option<(BigDecimal,)> = sqlx::query_as(
        r#"
        UPDATE wallets
        SET balance = balance - $2, updated_at = NOW()
        WHERE user_id = $1 AND balance >= $2
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **executor)
    .await?;
    Ok(row.map(|(balance,)| balance))
}

// --- Card Queries ---

pub async fn get_card(pool: &PgPool, id: Uuid) -> Result<Option<Card>> {
    sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Cards due for a reconciliation pass, least recently synced first.
pub async fn list_cards_for_reconciliation(pool: &PgPool, limit: i64) -> Result<Vec<Card>> {
    sqlx::query_as::<_, Card>(
        r#"
        SELECT * FROM cards
        WHERE status IN ('active', 'frozen')
        ORDER BY last_synced_at ASC NULLS FIRST
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn update_card_balance(
    pool: &PgPool,
    card_id: Uuid,
    balance: &BigDecimal,
    currency: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE cards
        SET balance = $2, currency = $3, last_synced_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(card_id)
    .bind(balance)
    .bind(currency)
    .execute(pool)
    .await?;
    Ok(())
}

/// Completed card-ledger rows used by the transaction-level comparison.
pub async fn list_card_transactions(pool: &PgPool, card_id: Uuid) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions
        WHERE card_id = $1
          AND transaction_type IN ('topup', 'card')
          AND status = 'completed'
        ORDER BY created_at ASC
        "#,
    )
    .bind(card_id)
    .fetch_all(pool)
    .await
}

// --- Reconciliation Audit Queries ---

pub async fn insert_reconciliation(
    pool: &PgPool,
    row: &CardReconciliation,
) -> Result<CardReconciliation> {
    sqlx::query_as::<_, CardReconciliation>(
        r#"
        INSERT INTO card_reconciliations (
            id, card_id, user_id, local_balance, external_balance, discrepancy, metadata, checked_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(row.id)
    .bind(row.card_id)
    .bind(row.user_id)
    .bind(&row.local_balance)
    .bind(&row.external_balance)
    .bind(row.discrepancy)
    .bind(&row.metadata)
    .bind(row.checked_at)
    .fetch_one(pool)
    .await
}

pub async fn list_card_reconciliations(
    pool: &PgPool,
    card_id: Uuid,
    limit: i64,
) -> Result<Vec<CardReconciliation>> {
    sqlx::query_as::<_, CardReconciliation>(
        "SELECT * FROM card_reconciliations WHERE card_id = $1 ORDER BY checked_at DESC LIMIT $2",
    )
    .bind(card_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

// --- Pricing Queries ---

pub async fn get_pricing(pool: &PgPool) -> Result<Option<PricingConfig>> {
    sqlx::query_as::<_, PricingConfig>("SELECT * FROM pricing_config WHERE id = TRUE")
        .fetch_optional(pool)
        .await
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert_pricing(
    pool: &PgPool,
    usdt_rate: &BigDecimal,
    deposit_percent_fee: &BigDecimal,
    deposit_flat_fee: &BigDecimal,
    topup_percent_fee: &BigDecimal,
    topup_flat_fee: &BigDecimal,
    topup_min: Option<&BigDecimal>,
    topup_max: Option<&BigDecimal>,
    card_request_fee_etb: Option<&BigDecimal>,
) -> Result<PricingConfig> {
    sqlx::query_as::<_, PricingConfig>(
        r#"
        INSERT INTO pricing_config (
            id, usdt_rate, deposit_percent_fee, deposit_flat_fee,
            topup_percent_fee, topup_flat_fee, topup_min, topup_max,
            card_request_fee_etb, updated_at
        ) VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7, $8, NOW())
        ON CONFLICT (id) DO UPDATE SET
            usdt_rate = EXCLUDED.usdt_rate,
            deposit_percent_fee = EXCLUDED.deposit_percent_fee,
            deposit_flat_fee = EXCLUDED.deposit_flat_fee,
            topup_percent_fee = EXCLUDED.topup_percent_fee,
            topup_flat_fee = EXCLUDED.topup_flat_fee,
            topup_min = EXCLUDED.topup_min,
            topup_max = EXCLUDED.topup_max,
            card_request_fee_etb = EXCLUDED.card_request_fee_etb,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(usdt_rate)
    .bind(deposit_percent_fee)
    .bind(deposit_flat_fee)
    .bind(topup_percent_fee)
    .bind(topup_flat_fee)
    .bind(topup_min)
    .bind(topup_max)
    .bind(card_request_fee_etb)
    .fetch_one(pool)
    .await
}
