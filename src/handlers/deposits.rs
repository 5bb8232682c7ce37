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
use crate::providers::Provider;
use crate::services::{DepositOutcome, DepositRequest};
use crate::AppState;

#[derive(Deserialize)]
pub struct DepositBody {
    pub user_id: Uuid,
    pub payment_method: Provider,
    pub reference: String,
    pub amount: Option<BigDecimal>,
}

#[derive(Serialize)]
pub struct DepositResponse {
    pub transaction: Transaction,
    pub credited: Option<BigDecimal>,
    pub new_balance: Option<BigDecimal>,
    pub duplicate: bool,
    pub message: String,
}

impl From<DepositOutcome> for DepositResponse {
    fn from(outcome: DepositOutcome) -> Self {
        DepositResponse {
            transaction: outcome.transaction,
            credited: outcome.credited,
            new_balance: outcome.new_balance,
            duplicate: outcome.duplicate,
            message: outcome.message,
        }
    }
}

pub async fn create_deposit(
    State(state): State<AppState>,
    Json(body): Json<DepositBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.reference.trim().is_empty() {
        return Err(AppError::Validation(
            "reference must not be empty".to_string(),
        ));
    }
    if let Some(amount) = &body.amount {
        if amount <= &BigDecimal::from(0) {
            return Err(AppError::Validation(
                "amount must be positive".to_string(),
            ));
        }
    }

    let outcome = state
        .deposits
        .process(DepositRequest {
            user_id: body.user_id,
            provider: body.payment_method,
            reference: body.reference,
            amount: body.amount,
        })
        .await?;

    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(DepositResponse::from(outcome))))
}

pub async fn approve_deposit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.deposits.approve(id).await?;
    Ok(Json(DepositResponse::from(outcome)))
}
