//! Card top-up flow: debit the USDT wallet, then fund the card at the
//! provider inside the same database transaction. A provider failure rolls
//! the debit back, so the wallet never pays for a card that was not funded.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::cards::{CardApiError, StroWalletClient};
use crate::db::models::{Card, Transaction, TransactionStatus, TransactionType};
use crate::db::queries;
use crate::pricing::{self, QuoteError, TopupQuote};
use crate::services::notify::Notifier;

#[derive(Debug, Error)]
pub enum TopupError {
    #[error("Card {0} not found")]
    UnknownCard(Uuid),
    #[error("Card {0} is not active")]
    CardInactive(Uuid),
    #[error("Insufficient wallet balance")]
    InsufficientBalance,
    #[error("Pricing is not configured")]
    PricingNotConfigured,
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error(transparent)]
    Card(#[from] CardApiError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct TopupRequest {
    pub user_id: Uuid,
    pub card_id: Uuid,
    pub amount: BigDecimal,
}

#[derive(Debug)]
pub struct TopupOutcome {
    pub transaction: Transaction,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_charged: BigDecimal,
    /// Wallet balance after the debit. None in simulation mode where no
    /// debit happens.
    pub new_balance: Option<BigDecimal>,
    pub message: String,
}

pub struct TopupService {
    pool: PgPool,
    cards: StroWalletClient,
    notifier: Arc<dyn Notifier>,
    simulate: bool,
}

impl TopupService {
    pub fn new(
        pool: PgPool,
        cards: StroWalletClient,
        notifier: Arc<dyn Notifier>,
        simulate: bool,
    ) -> Self {
        TopupService {
            pool,
            cards,
            notifier,
            simulate,
        }
    }

    pub async fn process(&self, req: TopupRequest) -> Result<TopupOutcome, TopupError> {
        let card = queries::get_card(&self.pool, req.card_id)
            .await?
            .filter(|card| card.user_id == req.user_id)
            .ok_or(TopupError::UnknownCard(req.card_id))?;
        if card.status != "active" {
            return Err(TopupError::CardInactive(card.id));
        }

        let pricing = queries::get_pricing(&self.pool)
            .await?
            .ok_or(TopupError::PricingNotConfigured)?;
        let quote = pricing::quote_topup(&pricing, &req.amount)?;

        if self.simulate {
            return self.record_simulated(&req, &card, &quote).await;
        }

        let mut db_tx = self.pool.begin().await?;
        let new_balance = queries::debit_wallet(&mut db_tx, req.user_id, &quote.total_charged)
            .await?
            .ok_or(TopupError::InsufficientBalance)?;

        let row = topup_row(
            &req,
            &card,
            &quote,
            TransactionStatus::Pending,
            Some(&new_balance),
        );
        let pending = queries::insert_transaction(&mut db_tx, &row).await?;

        // The provider call happens inside the open transaction: a failure
        // here rolls back both the debit and the pending row.
        match self.cards.fund_card(&card.provider_card_id, &quote.amount).await {
            Ok(response) => {
                if let Some(reference) = provider_reference(&response) {
                    queries::merge_transaction_metadata(
                        &mut db_tx,
                        pending.id,
                        &json!({ "provider_reference": reference }),
                    )
                    .await?;
                }
                let completed =
                    queries::complete_transaction(&mut db_tx, pending.id, Some(&response))
                        .await?
                        .unwrap_or(pending);
                db_tx.commit().await?;

                tracing::info!(
                    "Topped up card {} with {} USD for user {} (charged {})",
                    card.id,
                    quote.amount,
                    req.user_id,
                    quote.total_charged
                );
                self.notifier
                    .card_topped_up(req.user_id, card.id, &quote.amount)
                    .await;

                let transaction = queries::get_transaction(&self.pool, completed.id)
                    .await?
                    .unwrap_or(completed);
                Ok(TopupOutcome {
                    transaction,
                    amount: quote.amount.clone(),
                    fee: quote.fee.clone(),
                    total_charged: quote.total_charged.clone(),
                    new_balance: Some(new_balance),
                    message: "Card topped up".to_string(),
                })
            }
            Err(err) => {
                db_tx.rollback().await?;
                tracing::warn!(
                    "Card top-up failed for card {} (user {}): {}",
                    card.id,
                    req.user_id,
                    err
                );
                self.record_failed_topup(&req, &card, &quote, &err).await;
                Err(err.into())
            }
        }
    }

    async fn record_simulated(
        &self,
        req: &TopupRequest,
        card: &Card,
        quote: &TopupQuote,
    ) -> Result<TopupOutcome, TopupError> {
        let mut row = topup_row(req, card, quote, TransactionStatus::Completed, None);
        row.metadata = Some(json!({ "simulated": true }));

        let mut db_tx = self.pool.begin().await?;
        let stored = queries::insert_transaction(&mut db_tx, &row).await?;
        db_tx.commit().await?;

        tracing::warn!(
            "Simulated top-up of card {} with {} USD (no debit, no provider call)",
            card.id,
            quote.amount
        );
        Ok(TopupOutcome {
            transaction: stored,
            amount: quote.amount.clone(),
            fee: quote.fee.clone(),
            total_charged: quote.total_charged.clone(),
            new_balance: None,
            message: "Simulated top-up recorded".to_string(),
        })
    }

    /// Best-effort failed audit row, written after the rollback so it
    /// survives independently of the aborted unit.
    async fn record_failed_topup(
        &self,
        req: &TopupRequest,
        card: &Card,
        quote: &TopupQuote,
        err: &CardApiError,
    ) {
        let mut row = topup_row(req, card, quote, TransactionStatus::Failed, None);
        row.metadata = Some(json!({ "error": err.to_string() }));

        let audit = async {
            let mut db_tx = self.pool.begin().await?;
            queries::insert_transaction(&mut db_tx, &row).await?;
            db_tx.commit().await
        };
        if let Err(db_err) = audit.await {
            tracing::warn!(
                "Could not record failed top-up for card {}: {}",
                card.id,
                db_err
            );
        }
    }
}

fn topup_row(
    req: &TopupRequest,
    card: &Card,
    quote: &TopupQuote,
    status: TransactionStatus,
    balance_after: Option<&BigDecimal>,
) -> Transaction {
    let now = Utc::now();
    let metadata = balance_after.map(|balance| {
        json!({
            "balance_after": balance.to_string(),
            "total_charged": quote.total_charged.to_string(),
        })
    });
    Transaction {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        card_id: Some(card.id),
        transaction_type: TransactionType::Topup.as_str().to_string(),
        payment_method: "wallet".to_string(),
        amount: quote.amount.clone(),
        amount_native: None,
        amount_credited: None,
        fee_native: Some(quote.fee.clone()),
        currency: "USDT".to_string(),
        status: status.as_str().to_string(),
        transaction_number: None,
        reference_number: None,
        rate_snapshot: None,
        metadata,
        response_data: None,
        created_at: now,
        updated_at: now,
    }
}

/// Provider transaction id from a fund response, wherever it hides.
fn provider_reference(response: &serde_json::Value) -> Option<String> {
    for key in ["reference", "transaction_id", "id", "trx_id"] {
        if let Some(value) = response.get(key) {
            match value {
                serde_json::Value::String(s) if !s.is_empty() => return Some(s.clone()),
                serde_json::Value::Number(n) => return Some(n.to_string()),
                _ => {}
            }
        }
        if let Some(inner) = response
            .get("response")
            .or_else(|| response.get("data"))
            .and_then(|v| v.get(key))
        {
            match inner {
                serde_json::Value::String(s) if !s.is_empty() => return Some(s.clone()),
                serde_json::Value::Number(n) => return Some(n.to_string()),
                _ => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quote() -> TopupQuote {
        TopupQuote {
            amount: "50.00".parse().unwrap(),
            fee: "1.50".parse().unwrap(),
            total_charged: "51.50".parse().unwrap(),
        }
    }

    fn card() -> Card {
        Card {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider_card_id: "sw-123".to_string(),
            status: "active".to_string(),
            balance: None,
            currency: Some("USD".to_string()),
            last_synced_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_topup_row_links_card_and_quote() {
        let card = card();
        let req = TopupRequest {
            user_id: card.user_id,
            card_id: card.id,
            amount: "50.00".parse().unwrap(),
        };
        let balance: BigDecimal = "100.00".parse().unwrap();
        let row = topup_row(&req, &card, &quote(), TransactionStatus::Pending, Some(&balance));

        assert_eq!(row.card_id, Some(card.id));
        assert_eq!(row.transaction_type, "topup");
        assert_eq!(row.payment_method, "wallet");
        assert_eq!(row.amount, "50.00".parse().unwrap());
        assert_eq!(row.fee_native, Some("1.50".parse().unwrap()));
        assert!(row.transaction_number.is_none());
        let metadata = row.metadata.unwrap();
        assert_eq!(metadata["total_charged"], "51.50");
        assert_eq!(metadata["balance_after"], "100.00");
    }

    #[test]
    fn test_provider_reference_top_level() {
        let response = json!({ "success": true, "reference": "TRX-9" });
        assert_eq!(provider_reference(&response), Some("TRX-9".to_string()));
    }

    #[test]
    fn test_provider_reference_nested_and_numeric() {
        let response = json!({ "success": true, "response": { "id": 4481 } });
        assert_eq!(provider_reference(&response), Some("4481".to_string()));
    }

    #[test]
    fn test_provider_reference_absent() {
        let response = json!({ "success": true, "message": "funded" });
        assert_eq!(provider_reference(&response), None);
    }
}
