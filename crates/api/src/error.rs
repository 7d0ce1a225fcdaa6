//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ReceiptId;
use domain::DomainError;
use payments::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Purchase or payment error.
    Payment(PaymentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, receipt_id) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Domain(err) => {
                let (status, msg) = domain_error_to_response(&err);
                (status, msg, None)
            }
            ApiError::Payment(err) => payment_error_to_response(err),
        };

        let body = match receipt_id {
            Some(id) => serde_json::json!({ "error": message, "receipt_id": id }),
            None => serde_json::json!({ "error": message }),
        };
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: &DomainError) -> (StatusCode, String) {
    let status = match err {
        DomainError::NotFound { .. } | DomainError::OutOfStock(_) => StatusCode::NOT_FOUND,
        DomainError::AlreadyReturned(_) => StatusCode::CONFLICT,
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String, Option<ReceiptId>) {
    match &err {
        PaymentError::Domain(inner) => {
            let (status, msg) = domain_error_to_response(inner);
            (status, msg, None)
        }
        PaymentError::AlreadyPaid(_) => (StatusCode::CONFLICT, err.to_string(), None),
        PaymentError::PaymentNotInitiated { receipt_id, .. } => {
            tracing::warn!(error = %err, "payment gateway unavailable");
            (StatusCode::BAD_GATEWAY, err.to_string(), Some(*receipt_id))
        }
        PaymentError::AttemptNotRecorded { receipt_id, .. } => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), Some(*receipt_id))
        }
        PaymentError::Store(_) => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), None)
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(format!("Invalid path: {}", rejection.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid body: {}", rejection.body_text()))
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
