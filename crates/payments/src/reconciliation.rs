//! Applies gateway callbacks to payment attempts and receipts.

use common::{PaymentStatus, ReceiptId};
use store::{LibraryStore, Settlement, StoreError};

use crate::callback::StkCallback;

/// What a callback did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The body could not be parsed and was discarded.
    Malformed,
    /// No attempt carries the checkout reference.
    UnknownReference,
    /// The attempt was settled by an earlier callback.
    AlreadyFinalized(PaymentStatus),
    /// The attempt succeeded and its receipt is paid.
    Succeeded { receipt_id: ReceiptId },
    /// The payer declined or the payment failed.
    Failed {
        receipt_id: ReceiptId,
        result_code: i64,
    },
    /// The store failed. The gateway may redeliver.
    Deferred,
}

impl CallbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackOutcome::Malformed => "malformed",
            CallbackOutcome::UnknownReference => "unknown_reference",
            CallbackOutcome::AlreadyFinalized(_) => "already_finalized",
            CallbackOutcome::Succeeded { .. } => "succeeded",
            CallbackOutcome::Failed { .. } => "failed",
            CallbackOutcome::Deferred => "deferred",
        }
    }
}

/// Reconciles asynchronous payment outcomes.
///
/// A callback settles a pending attempt at most once. Redelivered, late and
/// unknown callbacks leave the store untouched.
pub struct PaymentReconciler<S: LibraryStore> {
    store: S,
}

impl<S: LibraryStore> PaymentReconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Handles a raw callback body. Never fails.
    pub async fn handle_callback(&self, body: &[u8]) -> CallbackOutcome {
        let outcome = match StkCallback::parse(body) {
            Ok(callback) => match self.reconcile(&callback).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        checkout_request_id = %callback.checkout_request_id,
                        error = %e,
                        "failed to apply payment callback"
                    );
                    CallbackOutcome::Deferred
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed payment callback");
                CallbackOutcome::Malformed
            }
        };

        metrics::counter!("callbacks_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    /// Applies a parsed callback in one store transaction.
    #[tracing::instrument(
        skip(self, callback),
        fields(
            checkout_request_id = %callback.checkout_request_id,
            result_code = callback.result_code
        )
    )]
    pub async fn reconcile(&self, callback: &StkCallback) -> Result<CallbackOutcome, StoreError> {
        let mut tx = self.store.begin().await?;

        let Some(attempt) = tx
            .lock_payment_attempt(&callback.checkout_request_id)
            .await?
        else {
            tracing::info!("callback for unknown checkout reference ignored");
            return Ok(CallbackOutcome::UnknownReference);
        };
        if !attempt.status.can_settle() {
            tracing::info!(status = %attempt.status, "callback for settled attempt ignored");
            return Ok(CallbackOutcome::AlreadyFinalized(attempt.status));
        }

        if !callback.is_success() {
            tx.settle_payment_attempt(
                attempt.id,
                Settlement {
                    status: PaymentStatus::Failed,
                    gateway_receipt_number: None,
                    result_description: callback.result_desc.clone(),
                },
            )
            .await?;
            tx.commit().await?;

            tracing::info!(receipt_id = %attempt.receipt_id, "payment failed");
            return Ok(CallbackOutcome::Failed {
                receipt_id: attempt.receipt_id,
                result_code: callback.result_code,
            });
        }

        if let Some(paid) = callback.amount()
            && paid != attempt.amount
        {
            tracing::warn!(
                paid,
                expected = attempt.amount,
                "paid amount differs from attempt"
            );
        }

        let receipt_number = callback.receipt_number();
        tx.settle_payment_attempt(
            attempt.id,
            Settlement {
                status: PaymentStatus::Succeeded,
                gateway_receipt_number: receipt_number.clone(),
                result_description: callback.result_desc.clone(),
            },
        )
        .await?;

        match tx.lock_receipt(attempt.receipt_id).await? {
            Some(receipt) if receipt.status.can_pay() => {
                let reference =
                    receipt_number.unwrap_or_else(|| callback.checkout_request_id.clone());
                tx.mark_receipt_paid(receipt.id, &reference).await?;
            }
            Some(_) => {
                tracing::warn!(
                    receipt_id = %attempt.receipt_id,
                    "receipt already paid by another attempt"
                );
            }
            None => {
                tracing::warn!(receipt_id = %attempt.receipt_id, "attempt references a missing receipt");
            }
        }
        tx.commit().await?;

        tracing::info!(receipt_id = %attempt.receipt_id, "payment succeeded");
        Ok(CallbackOutcome::Succeeded {
            receipt_id: attempt.receipt_id,
        })
    }
}
