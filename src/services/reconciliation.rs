//! Card reconciliation: compare the cached card balance against the
//! provider's answer, record every check in the audit table, and flag
//! discrepancies. A transaction-level comparison pairs completed local
//! ledger rows with the provider's history for a card.

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::cards::{CardApiError, ProviderTransaction, StroWalletClient};
use crate::db::models::{Card, CardReconciliation, Transaction};
use crate::db::queries;
use crate::services::notify::Notifier;

/// Cached and provider balances closer than this count as equal.
const BALANCE_EPSILON: &str = "0.0001";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Card {0} not found")]
    UnknownCard(Uuid),
    #[error(transparent)]
    Card(#[from] CardApiError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub card_id: Uuid,
    pub local_balance: Option<BigDecimal>,
    pub external_balance: BigDecimal,
    pub currency: String,
    pub discrepancy: bool,
    pub audit: CardReconciliation,
}

/// Result of pairing local card ledger rows with provider history.
#[derive(Debug, Serialize)]
pub struct TransactionAudit {
    pub card_id: Uuid,
    pub local_count: usize,
    pub external_count: usize,
    /// Provider transactions with no matching local row.
    pub missing_local: Vec<ProviderTransaction>,
    /// Local transaction ids with no matching provider entry.
    pub missing_external: Vec<Uuid>,
}

impl TransactionAudit {
    pub fn is_clean(&self) -> bool {
        self.missing_local.is_empty() && self.missing_external.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub checked: usize,
    pub discrepancies: usize,
    pub errors: Vec<(Uuid, String)>,
}

pub struct ReconciliationService {
    pool: PgPool,
    cards: StroWalletClient,
    notifier: Arc<dyn Notifier>,
}

impl ReconciliationService {
    pub fn new(pool: PgPool, cards: StroWalletClient, notifier: Arc<dyn Notifier>) -> Self {
        ReconciliationService {
            pool,
            cards,
            notifier,
        }
    }

    /// Checks one card's balance against the provider. Every check writes
    /// an audit row, discrepancy or not, and refreshes the cached balance.
    pub async fn reconcile_card(&self, card_id: Uuid) -> Result<ReconcileOutcome, ReconcileError> {
        let card = queries::get_card(&self.pool, card_id)
            .await?
            .ok_or(ReconcileError::UnknownCard(card_id))?;

        let external = self.cards.card_balance(&card.provider_card_id).await?;
        let local = card.balance.clone();
        let discrepancy = !balances_agree(local.as_ref(), &external.balance);

        queries::update_card_balance(&self.pool, card.id, &external.balance, &external.currency)
            .await?;

        let audit = queries::insert_reconciliation(
            &self.pool,
            &CardReconciliation {
                id: Uuid::new_v4(),
                card_id: card.id,
                user_id: Some(card.user_id),
                local_balance: local.clone(),
                external_balance: Some(external.balance.clone()),
                discrepancy,
                metadata: Some(json!({ "currency": external.currency })),
                checked_at: Utc::now(),
            },
        )
        .await?;

        if discrepancy {
            tracing::warn!(
                "Balance discrepancy on card {}: cached {:?}, provider {}",
                card.id,
                local,
                external.balance
            );
            self.notifier
                .balance_reconciled(card.id, local.as_ref(), &external.balance)
                .await;
        } else {
            tracing::debug!("Card {} balance agrees with provider", card.id);
        }

        Ok(ReconcileOutcome {
            card_id: card.id,
            local_balance: local,
            external_balance: external.balance,
            currency: external.currency,
            discrepancy,
            audit,
        })
    }

    /// Pairs completed local ledger rows with the provider's transaction
    /// history for the card.
    pub async fn audit_card_transactions(
        &self,
        card_id: Uuid,
    ) -> Result<TransactionAudit, ReconcileError> {
        let card = queries::get_card(&self.pool, card_id)
            .await?
            .ok_or(ReconcileError::UnknownCard(card_id))?;

        let locals = queries::list_card_transactions(&self.pool, card.id).await?;
        let externals = self.cards.card_transactions(&card.provider_card_id).await?;

        Ok(pair_transactions(card.id, &locals, externals))
    }

    /// One reconciliation pass over the cards most overdue for a check.
    /// Failures are isolated per card so one bad provider response does not
    /// stall the rest of the batch.
    pub async fn sweep(&self, limit: i64) -> Result<SweepReport, ReconcileError> {
        let cards = queries::list_cards_for_reconciliation(&self.pool, limit).await?;
        let mut report = SweepReport::default();

        for card in cards {
            match self.reconcile_card(card.id).await {
                Ok(outcome) => {
                    report.checked += 1;
                    if outcome.discrepancy {
                        report.discrepancies += 1;
                    }
                }
                Err(err) => {
                    tracing::error!("Reconciliation failed for card {}: {}", card.id, err);
                    report.errors.push((card.id, err.to_string()));
                }
            }
        }

        tracing::info!(
            "Reconciliation sweep: {} checked, {} discrepancies, {} errors",
            report.checked,
            report.discrepancies,
            report.errors.len()
        );
        Ok(report)
    }
}

/// Runs the background reconciliation loop. Sweeps run forever at a fixed
/// interval; a failed sweep is logged and the next one proceeds on schedule.
pub async fn run_sweeper(service: Arc<ReconciliationService>, limit: i64, interval_secs: u64) {
    use tokio::time::{sleep, Duration};

    tracing::info!(
        "Reconciliation sweeper started (every {}s, up to {} cards)",
        interval_secs,
        limit
    );

    loop {
        sleep(Duration::from_secs(interval_secs)).await;

        if let Err(e) = service.sweep(limit).await {
            tracing::error!("Reconciliation sweep error: {}", e);
        }
    }
}

fn balances_agree(local: Option<&BigDecimal>, external: &BigDecimal) -> bool {
    let epsilon: BigDecimal = BALANCE_EPSILON.parse().expect("static decimal");
    match local {
        Some(local) => (local - external).abs() <= epsilon,
        None => false,
    }
}

/// Matches by provider reference first, then by a composite of rounded
/// amount, currency and description. Composite matching is greedy so two
/// equal top-ups consume two provider entries, not one.
fn pair_transactions(
    card_id: Uuid,
    locals: &[Transaction],
    externals: Vec<ProviderTransaction>,
) -> TransactionAudit {
    let local_count = locals.len();
    let external_count = externals.len();

    let mut external_by_id: HashMap<String, Vec<usize>> = HashMap::new();
    let mut external_by_composite: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, ext) in externals.iter().enumerate() {
        if let Some(id) = ext.external_id.as_deref().filter(|id| !id.is_empty()) {
            external_by_id.entry(id.to_string()).or_default().push(idx);
        }
        if let Some(key) = composite_key(
            ext.amount.as_ref(),
            ext.currency.as_deref(),
            ext.description.as_deref(),
        ) {
            external_by_composite.entry(key).or_default().push(idx);
        }
    }

    let mut external_matched = vec![false; externals.len()];
    let mut missing_external = Vec::new();

    // First pass: provider references recorded at top-up time.
    let mut unmatched_locals = Vec::new();
    for local in locals {
        let matched = local_provider_reference(local).and_then(|reference| {
            external_by_id
                .get_mut(&reference)
                .and_then(|indices| take_unmatched(indices, &external_matched))
        });
        match matched {
            Some(idx) => external_matched[idx] = true,
            None => unmatched_locals.push(local),
        }
    }

    // Second pass: composites, for rows recorded before references were
    // kept and for provider entries without ids.
    for local in unmatched_locals {
        let matched = composite_key(
            Some(&local.amount),
            Some(&local.currency),
            local_description(local),
        )
        .and_then(|key| {
            external_by_composite
                .get_mut(&key)
                .and_then(|indices| take_unmatched(indices, &external_matched))
        });
        match matched {
            Some(idx) => external_matched[idx] = true,
            None => missing_external.push(local.id),
        }
    }

    let missing_local = externals
        .into_iter()
        .zip(external_matched.iter())
        .filter(|(_, matched)| !**matched)
        .map(|(ext, _)| ext)
        .collect();

    TransactionAudit {
        card_id,
        local_count,
        external_count,
        missing_local,
        missing_external,
    }
}

fn take_unmatched(indices: &mut Vec<usize>, matched: &[bool]) -> Option<usize> {
    let position = indices.iter().position(|idx| !matched[*idx])?;
    Some(indices.remove(position))
}

fn composite_key(
    amount: Option<&BigDecimal>,
    currency: Option<&str>,
    description: Option<&str>,
) -> Option<String> {
    let amount = amount?;
    // round() keeps the original scale when it is already two or less, so
    // pin the scale afterwards or "50" and "50.00" would key differently.
    Some(format!(
        "{}|{}|{}",
        amount.abs().round(2).with_scale(2),
        normalize_currency(currency),
        description.map(|d| d.trim().to_lowercase()).unwrap_or_default(),
    ))
}

/// The wallet holds USDT and funds cards dollar for dollar, so USD and
/// USDT label the same value here.
fn normalize_currency(currency: Option<&str>) -> String {
    match currency.map(|c| c.trim().to_ascii_uppercase()) {
        Some(c) if c == "USDT" => "USD".to_string(),
        Some(c) if !c.is_empty() => c,
        _ => "USD".to_string(),
    }
}

fn local_provider_reference(tx: &Transaction) -> Option<String> {
    if let Some(reference) = tx
        .metadata
        .as_ref()
        .and_then(|m| m.get("provider_reference"))
        .and_then(|v| v.as_str())
    {
        return Some(reference.to_string());
    }
    tx.reference_number.clone()
}

fn local_description(tx: &Transaction) -> Option<&str> {
    tx.metadata
        .as_ref()
        .and_then(|m| m.get("description"))
        .and_then(|v| v.as_str())
}
