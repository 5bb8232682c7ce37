use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::queries;
use crate::error::AppError;
use crate::services::TransactionAudit;
use crate::AppState;

#[derive(Deserialize)]
pub struct ReconcileParams {
    /// Also run the transaction-level comparison when true.
    pub transactions: Option<bool>,
}

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SweepParams {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub card_id: Uuid,
    pub local_balance: Option<BigDecimal>,
    pub external_balance: BigDecimal,
    pub currency: String,
    pub discrepancy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<TransactionAudit>,
}

pub async fn reconcile_card(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Query(params): Query<ReconcileParams>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.reconciliation.reconcile_card(card_id).await?;

    let transactions = if params.transactions.unwrap_or(false) {
        Some(state.reconciliation.audit_card_transactions(card_id).await?)
    } else {
        None
    };

    Ok(Json(ReconcileResponse {
        card_id: outcome.card_id,
        local_balance: outcome.local_balance,
        external_balance: outcome.external_balance,
        currency: outcome.currency,
        discrepancy: outcome.discrepancy,
        transactions,
    }))
}

pub async fn list_reconciliations(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = pagination.limit.unwrap_or(20).clamp(1, 200);

    queries::get_card(&state.db, card_id)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Card {} not found", card_id)))?;

    let rows = queries::list_card_reconciliations(&state.db, card_id, limit)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
    Ok(Json(rows))
}

#[derive(Serialize)]
pub struct SweepResponse {
    pub checked: usize,
    pub discrepancies: usize,
    pub errors: Vec<SweepError>,
}

#[derive(Serialize)]
pub struct SweepError {
    pub card_id: Uuid,
    pub error: String,
}

pub async fn run_sweep(
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params
        .limit
        .unwrap_or(state.config.reconcile_limit)
        .clamp(1, 500);
    let report = state.reconciliation.sweep(limit).await?;

    Ok(Json(SweepResponse {
        checked: report.checked,
        discrepancies: report.discrepancies,
        errors: report
            .errors
            .into_iter()
            .map(|(card_id, error)| SweepError { card_id, error })
            .collect(),
    }))
}
