use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Transaction;
use crate::error::AppError;
use crate::services::TopupRequest;
use crate::AppState;

#[derive(Deserialize)]
pub struct TopupBody {
    pub user_id: Uuid,
    pub amount: BigDecimal,
}

#[derive(Serialize)]
pub struct TopupResponse {
    pub transaction: Transaction,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub total_charged: BigDecimal,
    pub new_balance: Option<BigDecimal>,
    pub message: String,
}

pub async fn create_topup(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    Json(body): Json<TopupBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.amount <= BigDecimal::from(0) {
        return Err(AppError::Validation(
            "amount must be positive".to_string(),
        ));
    }

    let outcome = state
        .topups
        .process(TopupRequest {
            user_id: body.user_id,
            card_id,
            amount: body.amount,
        })
        .await?;

    let response = TopupResponse {
        transaction: outcome.transaction,
        amount: outcome.amount,
        fee: outcome.fee,
        total_charged: outcome.total_charged,
        new_balance: outcome.new_balance,
        message: outcome.message,
    };
    Ok((StatusCode::CREATED, Json(response)))
}
