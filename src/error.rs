use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::cards::CardApiError;
use crate::providers::VerifyError;
use crate::services::{DepositError, ReconcileError, TopupError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("Upstream provider error: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::NotFound => {
                AppError::NotFound("Transaction not found at provider".to_string())
            }
            VerifyError::ParseFailed(_) => AppError::UnprocessableEntity(err.to_string()),
            VerifyError::Transport(message) => AppError::BadGateway(message),
            VerifyError::IdentityMismatch { reasons } => {
                AppError::UnprocessableEntity(format!(
                    "Receipt verification failed: {}",
                    reasons.join("; ")
                ))
            }
            VerifyError::AmountMismatch { .. } => AppError::UnprocessableEntity(err.to_string()),
        }
    }
}

impl From<CardApiError> for AppError {
    fn from(err: CardApiError) -> Self {
        match err {
            CardApiError::CircuitOpen => AppError::ServiceUnavailable(err.to_string()),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<DepositError> for AppError {
    fn from(err: DepositError) -> Self {
        match err {
            DepositError::InvalidReference | DepositError::AmountRequired => {
                AppError::BadRequest(err.to_string())
            }
            DepositError::DuplicateInFlight | DepositError::ReferenceClaimed => {
                AppError::Conflict(err.to_string())
            }
            DepositError::PricingNotConfigured => AppError::Internal(err.to_string()),
            DepositError::UnknownTransaction(_) => AppError::NotFound(err.to_string()),
            DepositError::NotApprovable(_) => AppError::Conflict(err.to_string()),
            DepositError::Verify(inner) => inner.into(),
            DepositError::Quote(inner) => AppError::BadRequest(inner.to_string()),
            DepositError::Db(inner) => AppError::Database(inner),
        }
    }
}

impl From<TopupError> for AppError {
    fn from(err: TopupError) -> Self {
        match err {
            TopupError::UnknownCard(_) => AppError::NotFound(err.to_string()),
            TopupError::CardInactive(_) => AppError::Conflict(err.to_string()),
            TopupError::InsufficientBalance => AppError::BadRequest(err.to_string()),
            TopupError::PricingNotConfigured => AppError::Internal(err.to_string()),
            TopupError::Quote(inner) => AppError::BadRequest(inner.to_string()),
            TopupError::Card(inner) => inner.into(),
            TopupError::Db(inner) => AppError::Database(inner),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownCard(_) => AppError::NotFound(err.to_string()),
            ReconcileError::Card(inner) => inner.into(),
            ReconcileError::Db(inner) => AppError::Database(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation("Invalid input".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status_code() {
        let error = AppError::NotFound("Resource not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_conflict_error_status_code() {
        let error = AppError::Conflict("Already processed".to_string());
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unprocessable_entity_status_code() {
        let error = AppError::UnprocessableEntity("Amount mismatch".to_string());
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_bad_gateway_status_code() {
        let error = AppError::BadGateway("provider timeout".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_service_unavailable_status_code() {
        let error = AppError::ServiceUnavailable("circuit open".to_string());
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_internal_error_status_code() {
        let error = AppError::Internal("Something went wrong".to_string());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_verify_not_found_maps_to_404() {
        let error: AppError = VerifyError::NotFound.into();
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert!(error.to_string().contains("Transaction not found"));
    }

    #[test]
    fn test_verify_transport_maps_to_502() {
        let error: AppError = VerifyError::Transport("timeout".to_string()).into();
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_identity_mismatch_joins_reasons() {
        let error: AppError = VerifyError::IdentityMismatch {
            reasons: vec!["name differs".to_string(), "account differs".to_string()],
        }
        .into();
        assert_eq!(error.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error.to_string().contains("name differs; account differs"));
    }

    #[test]
    fn test_duplicate_in_flight_maps_to_409() {
        let error: AppError = DepositError::DuplicateInFlight.into();
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_insufficient_balance_maps_to_400() {
        let error: AppError = TopupError::InsufficientBalance.into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_claimed_reference_maps_to_409() {
        let error: AppError = DepositError::ReferenceClaimed.into();
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_missing_pricing_maps_to_500() {
        let error: AppError = TopupError::PricingNotConfigured.into();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_circuit_open_maps_to_503() {
        let error: AppError = TopupError::Card(CardApiError::CircuitOpen).into();
        assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_validation_error_response() {
        let error = AppError::Validation("Invalid reference format".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_not_found_error_response() {
        let error = AppError::NotFound("Transaction not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_database_error_response() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
