use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Deposit,
    Topup,
    ManualDeposit,
    Verification,
    Card,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Topup => "topup",
            TransactionType::ManualDeposit => "manual_deposit",
            TransactionType::Verification => "verification",
            TransactionType::Card => "card",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "topup" => Ok(TransactionType::Topup),
            "manual_deposit" => Ok(TransactionType::ManualDeposit),
            "verification" => Ok(TransactionType::Verification),
            "card" => Ok(TransactionType::Card),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// Pending is the only non-terminal status.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (
                TransactionStatus::Pending,
                TransactionStatus::Completed
                    | TransactionStatus::Failed
                    | TransactionStatus::Cancelled
            )
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Ledger row. `amount` is the principal in the row's `currency`;
/// `amount_native` and `fee_native` are denominated in the payment currency
/// (ETB for bank deposits), `amount_credited` in the wallet currency.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub card_id: Option<Uuid>,
    pub transaction_type: String,
    pub payment_method: String,
    pub amount: BigDecimal,
    pub amount_native: Option<BigDecimal>,
    pub amount_credited: Option<BigDecimal>,
    pub fee_native: Option<BigDecimal>,
    pub currency: String,
    pub status: String,
    /// Canonical external reference; covered by the idempotency index.
    pub transaction_number: Option<String>,
    /// Provider-side transaction id, when one exists.
    pub reference_number: Option<String>,
    pub rate_snapshot: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub response_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn status_enum(&self) -> Option<TransactionStatus> {
        self.status.parse().ok()
    }

    /// Wallet balance recorded right after this row was applied, if any.
    pub fn balance_after(&self) -> Option<BigDecimal> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("balance_after"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_card_id: String,
    pub status: String,
    /// Cached provider balance from the last reconciliation.
    pub balance: Option<BigDecimal>,
    pub currency: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CardReconciliation {
    pub id: Uuid,
    pub card_id: Uuid,
    pub user_id: Option<Uuid>,
    pub local_balance: Option<BigDecimal>,
    pub external_balance: Option<BigDecimal>,
    pub discrepancy: bool,
    pub metadata: Option<serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

/// Single-row table. Percent fees are percent points (2.5 means 2.5%).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PricingConfig {
    pub id: bool,
    pub usdt_rate: BigDecimal,
    pub deposit_percent_fee: BigDecimal,
    pub deposit_flat_fee: BigDecimal,
    pub topup_percent_fee: BigDecimal,
    pub topup_flat_fee: BigDecimal,
    pub topup_min: Option<BigDecimal>,
    pub topup_max: Option<BigDecimal>,
    /// Charged when a user requests a new card; not used by deposit or
    /// top-up quoting.
    pub card_request_fee_etb: Option<BigDecimal>,
    pub updated_at: DateTime<Utc>,
}
