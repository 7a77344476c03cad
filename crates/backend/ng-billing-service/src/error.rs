use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ng_billing_core::{ProviderError, ProviderKind};
use ng_entitlement_db::DbError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    Validation(&'static str),

    #[error("Payment provider '{0}' is not configured")]
    ProviderNotConfigured(ProviderKind),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No credits remaining")]
    CreditsExhausted,

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            BillingError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            BillingError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            BillingError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            BillingError::ProviderNotConfigured(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            BillingError::Provider(err) if err.is_client_error() => {
                // The provider's literal message helps diagnose card failures.
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            BillingError::Provider(_) => (
                StatusCode::BAD_GATEWAY,
                "Payment provider unavailable".to_string(),
            ),
            BillingError::CreditsExhausted => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            BillingError::Db(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            BillingError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        tracing::error!(%status, error = %self, "Billing service error");

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_client_errors_pass_through() {
        let err = BillingError::Provider(ProviderError::Api {
            status: 422,
            message: "The amount is lower than the minimum".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn exhausted_credits_map_to_402() {
        let response = BillingError::CreditsExhausted.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn db_errors_do_not_leak_details() {
        let response =
            BillingError::Db(DbError::Internal("connection reset".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
