use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use alma::{NotifyError, PaymentError};
use thiserror::Error;

/// Route-level failure, rendered as `{"error": true, "message": ...}`.
///
/// Internal detail stays in the logs; the body carries a public message only.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("payment {0} not found")]
    PaymentNotFound(i64),

    #[error("payment {0} already exists")]
    PaymentExists(i64),

    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,
}

impl ApiError {
    fn public_message(&self) -> String {
        match self {
            ApiError::Notify(e) => e.public_message(),
            ApiError::Payment(PaymentError::UnsupportedCurrency(c)) => {
                format!("currency {c} is not supported")
            }
            ApiError::Payment(PaymentError::ClientUnavailable) => {
                "payment provider unavailable".to_string()
            }
            ApiError::Payment(PaymentError::CreateFailed { .. }) => {
                "payment could not be created".to_string()
            }
            ApiError::Payment(_) => "payment validation failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Notify(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Payment(PaymentError::UnsupportedCurrency(_)) => StatusCode::BAD_REQUEST,
            ApiError::Payment(PaymentError::ClientUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Payment(PaymentError::CreateFailed { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Payment(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PaymentExists(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(status).json(serde_json::json!({
            "error": true,
            "message": self.public_message(),
        }))
    }
}
