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
use crate::AppState;

#[derive(Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = queries::get_transaction(&state.db, id)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

    Ok(Json(transaction))
}

pub async fn list_user_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let limit = pagination.limit.unwrap_or(20).clamp(1, 200);
    let offset = pagination.offset.unwrap_or(0).max(0);

    let transactions = queries::list_user_transactions(&state.db, user_id, limit, offset)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    Ok(Json(transactions))
}

#[derive(Serialize)]
pub struct WalletView {
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub currency: String,
}

/// Wallets are created lazily on first credit, so a missing row reads as a
/// zero balance rather than a 404.
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let wallet = queries::get_wallet(&state.db, user_id)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    let view = match wallet {
        Some(wallet) => WalletView {
            user_id: wallet.user_id,
            balance: wallet.balance,
            currency: wallet.currency,
        },
        None => WalletView {
            user_id,
            balance: BigDecimal::from(0),
            currency: "USDT".to_string(),
        },
    };
    Ok(Json(view))
}
