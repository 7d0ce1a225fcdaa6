//! Purchase, payment and receipt endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use common::{MemberId, ReceiptId};
use payments::{
    CartItem, PaymentGateway, PaymentOutcome, PurchaseOutcome, PurchaseRequest, ReceiptDetails,
};
use store::LibraryStore;

use super::AppState;
use crate::error::ApiError;

/// POST /books/purchase/{memberId}/{phone}/{totalAmount} — buys the cart in
/// the body and sends a payment prompt to `phone`.
#[tracing::instrument(skip(state, cart))]
pub async fn purchase<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    path: Result<Path<(String, String, i64)>, PathRejection>,
    cart: Result<Json<Vec<CartItem>>, JsonRejection>,
) -> Result<Json<PurchaseOutcome>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Path((member_id, phone, total_amount)) = path?;
    let Json(cart) = cart.map_err(|e| ApiError::BadRequest(format!("Invalid cart: {e}")))?;
    let outcome = state
        .orchestrator
        .purchase(PurchaseRequest {
            member_id: MemberId::new(member_id),
            phone,
            cart,
            expected_total: Some(total_amount),
        })
        .await?;
    Ok(Json(outcome))
}

/// GET /user/pay_receipt/{receiptId}/{phone} — retries payment of an unpaid receipt.
#[tracing::instrument(skip(state))]
pub async fn pay_receipt<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    path: Result<Path<(i64, String)>, PathRejection>,
) -> Result<Json<PaymentOutcome>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let Path((receipt_id, phone)) = path?;
    let outcome = state
        .orchestrator
        .pay_receipt(ReceiptId::new(receipt_id), &phone)
        .await?;
    Ok(Json(outcome))
}

/// GET /user/get_receipts/{memberId}
pub async fn for_member<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
    Path(member_id): Path<String>,
) -> Result<Json<Vec<ReceiptDetails>>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let receipts = state
        .ledger
        .receipts_for_member(&MemberId::new(member_id))
        .await?;
    Ok(Json(receipts))
}

/// GET /admin/get_receipts
pub async fn all<S, G>(
    State(state): State<Arc<AppState<S, G>>>,
) -> Result<Json<Vec<ReceiptDetails>>, ApiError>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    Ok(Json(state.ledger.all_receipts().await?))
}
