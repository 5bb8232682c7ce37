//! Deposit flow: verify an ETB payment receipt, price it, and credit the
//! user's USDT wallet exactly once per external reference.
//!
//! The idempotency guard is layered. A cheap pre-check against the ledger
//! catches most duplicates before any provider traffic; the partial unique
//! index on (transaction_type, transaction_number) settles concurrent races
//! at commit time. The wallet credit and the ledger insert share one
//! database transaction so a losing insert rolls the credit back with it.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DepositPolicy;
use crate::db::models::{Transaction, TransactionStatus, TransactionType};
use crate::db::{self, queries};
use crate::pricing::{self, DepositQuote, QuoteError};
use crate::providers::{Provider, VerificationResult, VerifyError};
use crate::services::notify::Notifier;
use crate::services::verification::VerificationService;

#[derive(Debug, Error)]
pub enum DepositError {
    #[error("Payment reference is required")]
    InvalidReference,
    #[error("Amount is required when the receipt does not state one")]
    AmountRequired,
    #[error("A deposit with this reference is already being processed")]
    DuplicateInFlight,
    #[error("Reference already used by another deposit")]
    ReferenceClaimed,
    #[error("Pricing is not configured")]
    PricingNotConfigured,
    #[error("Transaction {0} not found")]
    UnknownTransaction(Uuid),
    #[error("Transaction {0} is not awaiting approval")]
    NotApprovable(Uuid),
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct DepositRequest {
    pub user_id: Uuid,
    pub provider: Provider,
    pub reference: String,
    /// Client-side amount hint in ETB. Checked against the receipt when
    /// present and used as the gross amount when the receipt omits one.
    pub amount: Option<BigDecimal>,
}

#[derive(Debug)]
pub struct DepositOutcome {
    pub transaction: Transaction,
    pub credited: Option<BigDecimal>,
    pub new_balance: Option<BigDecimal>,
    pub duplicate: bool,
    pub message: String,
}

pub struct DepositService {
    pool: PgPool,
    verification: Arc<VerificationService>,
    notifier: Arc<dyn Notifier>,
    policy: DepositPolicy,
}

impl DepositService {
    pub fn new(
        pool: PgPool,
        verification: Arc<VerificationService>,
        notifier: Arc<dyn Notifier>,
        policy: DepositPolicy,
    ) -> Self {
        DepositService {
            pool,
            verification,
            notifier,
            policy,
        }
    }

    pub async fn process(&self, req: DepositRequest) -> Result<DepositOutcome, DepositError> {
        let canonical = self
            .verification
            .canonical_reference(req.provider, &req.reference);
        if canonical.is_empty() {
            return Err(DepositError::InvalidReference);
        }

        if let Some(existing) =
            queries::find_live_by_reference(&self.pool, TransactionType::Deposit.as_str(), &canonical)
                .await?
        {
            return self.resolve_existing(req.user_id, existing).await;
        }

        let verification = match self
            .verification
            .verify(req.provider, &req.reference, req.amount.as_ref())
            .await
        {
            Ok(result) => result,
            Err(err) => {
                self.record_failed_verification(&req, &canonical, &err).await;
                return Err(err.into());
            }
        };

        let pricing = queries::get_pricing(&self.pool)
            .await?
            .ok_or(DepositError::PricingNotConfigured)?;
        let gross = verification
            .amount
            .clone()
            .or_else(|| req.amount.clone())
            .ok_or(DepositError::AmountRequired)?;
        let quote = pricing::quote_deposit(&pricing, &gross)?;

        match self.policy {
            DepositPolicy::AutoCredit => {
                self.credit_and_record(&req, &canonical, &verification, &quote)
                    .await
            }
            DepositPolicy::HoldForReview => {
                self.record_pending(&req, &canonical, &verification, &quote)
                    .await
            }
        }
    }

    /// Completes a held deposit and credits the wallet. The guarded status
    /// flip makes double approval a no-op for the second caller.
    pub async fn approve(&self, transaction_id: Uuid) -> Result<DepositOutcome, DepositError> {
        let existing = queries::get_transaction(&self.pool, transaction_id)
            .await?
            .ok_or(DepositError::UnknownTransaction(transaction_id))?;
        if existing.transaction_type != TransactionType::Deposit.as_str() {
            return Err(DepositError::NotApprovable(transaction_id));
        }
        let credited = existing
            .amount_credited
            .clone()
            .unwrap_or_else(|| existing.amount.clone());

        let mut db_tx = self.pool.begin().await?;
        let completed = match queries::complete_transaction(&mut db_tx, transaction_id, None).await?
        {
            Some(row) => row,
            None => {
                db_tx.rollback().await?;
                return Err(DepositError::NotApprovable(transaction_id));
            }
        };
        let new_balance = queries::credit_wallet(&mut db_tx, completed.user_id, &credited).await?;
        queries::merge_transaction_metadata(
            &mut db_tx,
            transaction_id,
            &json!({ "balance_after": new_balance.to_string() }),
        )
        .await?;
        db_tx.commit().await?;

        tracing::info!(
            "Approved deposit {} for user {}: credited {} USDT",
            transaction_id,
            completed.user_id,
            credited
        );
        self.notifier
            .deposit_credited(completed.user_id, &credited, &new_balance)
            .await;

        let transaction = queries::get_transaction(&self.pool, transaction_id)
            .await?
            .unwrap_or(completed);
        Ok(DepositOutcome {
            transaction,
            credited: Some(credited),
            new_balance: Some(new_balance),
            duplicate: false,
            message: "Deposit approved and credited".to_string(),
        })
    }

    async fn credit_and_record(
        &self,
        req: &DepositRequest,
        canonical: &str,
        verification: &VerificationResult,
        quote: &DepositQuote,
    ) -> Result<DepositOutcome, DepositError> {
        let mut db_tx = self.pool.begin().await?;
        let new_balance = queries::credit_wallet(&mut db_tx, req.user_id, &quote.credited).await?;
        let row = deposit_row(
            req,
            canonical,
            verification,
            quote,
            TransactionStatus::Completed,
            Some(&new_balance),
        );

        match queries::insert_transaction(&mut db_tx, &row).await {
            Ok(stored) => {
                db_tx.commit().await?;
                tracing::info!(
                    "Deposit {} credited {} USDT to user {} (reference {})",
                    stored.id,
                    quote.credited,
                    req.user_id,
                    canonical
                );
                self.notifier
                    .deposit_credited(req.user_id, &quote.credited, &new_balance)
                    .await;
                Ok(DepositOutcome {
                    transaction: stored,
                    credited: Some(quote.credited.clone()),
                    new_balance: Some(new_balance),
                    duplicate: false,
                    message: "Deposit credited".to_string(),
                })
            }
            Err(err) if db::is_unique_violation(&err) => {
                db_tx.rollback().await?;
                // Lost the insert race; surface whichever row won.
                match queries::find_live_by_reference(
                    &self.pool,
                    TransactionType::Deposit.as_str(),
                    canonical,
                )
                .await?
                {
                    Some(winner) => self.resolve_existing(req.user_id, winner).await,
                    None => Err(DepositError::DuplicateInFlight),
                }
            }
            Err(err) => {
                db_tx.rollback().await?;
                Err(err.into())
            }
        }
    }

    async fn record_pending(
        &self,
        req: &DepositRequest,
        canonical: &str,
        verification: &VerificationResult,
        quote: &DepositQuote,
    ) -> Result<DepositOutcome, DepositError> {
        let row = deposit_row(
            req,
            canonical,
            verification,
            quote,
            TransactionStatus::Pending,
            None,
        );

        let mut db_tx = self.pool.begin().await?;
        match queries::insert_transaction(&mut db_tx, &row).await {
            Ok(stored) => {
                db_tx.commit().await?;
                tracing::info!(
                    "Deposit {} held for review (user {}, reference {})",
                    stored.id,
                    req.user_id,
                    canonical
                );
                Ok(DepositOutcome {
                    transaction: stored,
                    credited: None,
                    new_balance: None,
                    duplicate: false,
                    message: "Deposit recorded and held for review".to_string(),
                })
            }
            Err(err) if db::is_unique_violation(&err) => {
                db_tx.rollback().await?;
                match queries::find_live_by_reference(
                    &self.pool,
                    TransactionType::Deposit.as_str(),
                    canonical,
                )
                .await?
                {
                    Some(winner) => self.resolve_existing(req.user_id, winner).await,
                    None => Err(DepositError::DuplicateInFlight),
                }
            }
            Err(err) => {
                db_tx.rollback().await?;
                Err(err.into())
            }
        }
    }

    /// A live row already owns this reference. The submitter gets their own
    /// prior outcome back; anyone else is refused so one receipt can never
    /// credit two wallets.
    async fn resolve_existing(
        &self,
        user_id: Uuid,
        existing: Transaction,
    ) -> Result<DepositOutcome, DepositError> {
        if existing.user_id != user_id {
            return Err(DepositError::ReferenceClaimed);
        }
        match existing.status_enum() {
            Some(TransactionStatus::Completed) => self.duplicate_outcome(existing).await,
            _ => Err(DepositError::DuplicateInFlight),
        }
    }

    async fn duplicate_outcome(
        &self,
        existing: Transaction,
    ) -> Result<DepositOutcome, DepositError> {
        let credited = existing
            .amount_credited
            .clone()
            .or_else(|| Some(existing.amount.clone()));
        let new_balance = match existing.balance_after() {
            Some(balance) => Some(balance),
            None => queries::get_wallet(&self.pool, existing.user_id)
                .await?
                .map(|wallet| wallet.balance),
        };
        Ok(DepositOutcome {
            transaction: existing,
            credited,
            new_balance,
            duplicate: true,
            message: "Deposit already processed".to_string(),
        })
    }

    /// Best-effort audit row for a rejected receipt. Transport failures are
    /// skipped: they say nothing about the receipt itself.
    async fn record_failed_verification(
        &self,
        req: &DepositRequest,
        canonical: &str,
        err: &VerifyError,
    ) {
        if matches!(err, VerifyError::Transport(_)) {
            return;
        }

        let now = Utc::now();
        let row = Transaction {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            card_id: None,
            transaction_type: TransactionType::Verification.as_str().to_string(),
            payment_method: req.provider.as_str().to_string(),
            amount: req.amount.clone().unwrap_or_default(),
            amount_native: req.amount.clone(),
            amount_credited: None,
            fee_native: None,
            currency: "ETB".to_string(),
            status: TransactionStatus::Failed.as_str().to_string(),
            transaction_number: Some(canonical.to_string()),
            reference_number: None,
            rate_snapshot: None,
            metadata: Some(json!({
                "provider": req.provider.as_str(),
                "error": err.to_string(),
            })),
            response_data: None,
            created_at: now,
            updated_at: now,
        };

        let audit = async {
            let mut db_tx = self.pool.begin().await?;
            queries::insert_transaction(&mut db_tx, &row).await?;
            db_tx.commit().await
        };
        if let Err(db_err) = audit.await {
            tracing::warn!(
                "Could not record failed verification for {}: {}",
                canonical,
                db_err
            );
        }
    }
}

fn deposit_row(
    req: &DepositRequest,
    canonical: &str,
    verification: &VerificationResult,
    quote: &DepositQuote,
    status: TransactionStatus,
    balance_after: Option<&BigDecimal>,
) -> Transaction {
    let now = Utc::now();
    let metadata = balance_after.map(|balance| json!({ "balance_after": balance.to_string() }));
    Transaction {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        card_id: None,
        transaction_type: TransactionType::Deposit.as_str().to_string(),
        payment_method: req.provider.as_str().to_string(),
        amount: quote.credited.clone(),
        amount_native: Some(quote.gross_native.clone()),
        amount_credited: Some(quote.credited.clone()),
        fee_native: Some(quote.fee_native.clone()),
        currency: "USDT".to_string(),
        status: status.as_str().to_string(),
        transaction_number: Some(canonical.to_string()),
        reference_number: verification.raw["reference"].as_str().map(str::to_string),
        rate_snapshot: Some(quote.rate_snapshot()),
        metadata,
        response_data: Some(verification.raw.clone()),
        created_at: now,
        updated_at: now,
    }
}
