//! Payment error types.

use common::ReceiptId;
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors returned by the payment gateway client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The credential exchange was refused.
    #[error("Gateway authentication failed: {0}")]
    AuthFailure(String),

    /// The gateway answered with something other than the expected document.
    #[error("Unexpected gateway response: {0}")]
    Protocol(String),

    /// The request never got a response.
    #[error("Gateway request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport(err.to_string())
    }
}

/// Errors that can occur during purchase and payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The receipt was already settled by an earlier payment.
    #[error("Receipt {0} has already been paid")]
    AlreadyPaid(ReceiptId),

    /// The receipt is stored but the push request could not be sent.
    /// The receipt stays unpaid and can be paid later.
    #[error("Payment for receipt {receipt_id} was not initiated: {source}")]
    PaymentNotInitiated {
        receipt_id: ReceiptId,
        #[source]
        source: GatewayError,
    },

    /// The gateway accepted the push but the attempt could not be stored.
    /// The payer was prompted, so the checkout reference must be reconciled by hand.
    #[error(
        "Payment for receipt {receipt_id} was requested as {checkout_request_id} but not recorded: {source}"
    )]
    AttemptNotRecorded {
        receipt_id: ReceiptId,
        checkout_request_id: String,
        #[source]
        source: StoreError,
    },

    /// Validation, lookup or stock error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl PaymentError {
    /// The unpaid receipt left behind, when the failure happened after it was committed.
    pub fn receipt_id(&self) -> Option<ReceiptId> {
        match self {
            PaymentError::PaymentNotInitiated { receipt_id, .. }
            | PaymentError::AttemptNotRecorded { receipt_id, .. } => Some(*receipt_id),
            _ => None,
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
