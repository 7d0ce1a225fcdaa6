//! Cart purchase and payment initiation.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use common::{BookId, MemberId, ReceiptId};
use domain::DomainError;
use serde::{Deserialize, Serialize};
use store::{LibraryStore, NewPaymentAttempt, NewReceipt, PaymentAttempt, Receipt, StoreError};

use crate::error::{GatewayError, PaymentError, Result};
use crate::gateway::{PaymentGateway, PushRequest, PushResponse};
use crate::phone::PhoneNumber;

/// Most copies of one title a single purchase may take.
pub const MAX_COPIES_PER_TITLE: u32 = 100;

/// One cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub book_id: BookId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub member_id: MemberId,
    pub phone: String,
    pub cart: Vec<CartItem>,
    /// Total the caller was shown. Must match the computed total when set.
    pub expected_total: Option<i64>,
}

/// A payment request the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub attempt: PaymentAttempt,
    pub push: PushResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseOutcome {
    pub receipt: Receipt,
    #[serde(flatten)]
    pub payment: PaymentOutcome,
}

/// Coordinates stock, receipts and the payment gateway for purchases.
pub struct PurchaseOrchestrator<S: LibraryStore, G: PaymentGateway> {
    store: S,
    gateway: G,
    account_reference: String,
}

impl<S: LibraryStore, G: PaymentGateway> PurchaseOrchestrator<S, G> {
    pub const DEFAULT_ACCOUNT_REFERENCE: &'static str = "Library";

    /// Creates a new orchestrator with the given store and gateway.
    pub fn new(store: S, gateway: G) -> Self {
        Self {
            store,
            gateway,
            account_reference: Self::DEFAULT_ACCOUNT_REFERENCE.to_string(),
        }
    }

    /// Sets the account reference shown to payers.
    pub fn with_account_reference(mut self, reference: impl Into<String>) -> Self {
        self.account_reference = reference.into();
        self
    }

    /// Buys the cart and asks the payer to pay for it.
    ///
    /// Stock and the receipt are committed before the gateway is called. If
    /// the gateway or the attempt write then fails, the receipt stays unpaid
    /// and the error carries its id so payment can be retried with
    /// [`Self::pay_receipt`].
    #[tracing::instrument(skip(self, request), fields(member_id = %request.member_id, lines = request.cart.len()))]
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseOutcome> {
        let started = Instant::now();
        metrics::counter!("purchases_total").increment(1);

        let result = self.try_purchase(&request).await;
        if result.is_err() {
            metrics::counter!("purchase_failures_total").increment(1);
        }
        metrics::histogram!("purchase_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    async fn try_purchase(&self, request: &PurchaseRequest) -> Result<PurchaseOutcome> {
        let phone = PhoneNumber::parse(&request.phone)?;
        let receipt = self.create_receipt(request).await?;
        tracing::info!(
            receipt_id = %receipt.id,
            total = receipt.total_amount,
            "receipt created"
        );

        let payment = self.initiate_payment(&receipt, &phone).await?;
        Ok(PurchaseOutcome { receipt, payment })
    }

    async fn create_receipt(&self, request: &PurchaseRequest) -> Result<Receipt> {
        let locking_order = normalize_cart(&request.cart)?;

        let mut tx = self.store.begin().await?;

        if tx.get_member(&request.member_id).await?.is_none() {
            return Err(DomainError::not_found("member", &request.member_id).into());
        }

        let mut total: i64 = 0;
        for line in &locking_order {
            match tx.decrement_stock(line.book_id, line.quantity).await {
                Ok(_) => {}
                Err(StoreError::NotFound { .. } | StoreError::InsufficientStock { .. }) => {
                    return Err(DomainError::OutOfStock(line.book_id).into());
                }
                Err(e) => return Err(e.into()),
            }
            let book = tx
                .get_book(line.book_id)
                .await?
                .ok_or(DomainError::OutOfStock(line.book_id))?;

            total = book
                .price
                .checked_mul(i64::from(line.quantity))
                .and_then(|amount| total.checked_add(amount))
                .ok_or_else(|| DomainError::validation("cart total is too large"))?;
        }

        if let Some(expected) = request.expected_total
            && expected != total
        {
            return Err(DomainError::validation(format!(
                "expected total {expected} does not match cart total {total}"
            ))
            .into());
        }

        let book_ids = request
            .cart
            .iter()
            .flat_map(|line| std::iter::repeat_n(line.book_id, line.quantity as usize))
            .collect();
        let receipt = tx
            .insert_receipt(NewReceipt {
                book_ids,
                member_id: request.member_id.clone(),
                total_amount: total,
                created_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;
        Ok(receipt)
    }

    /// Sends a new payment request for an unpaid receipt.
    #[tracing::instrument(skip(self, phone))]
    pub async fn pay_receipt(&self, receipt_id: ReceiptId, phone: &str) -> Result<PaymentOutcome> {
        let phone = PhoneNumber::parse(phone)?;
        let receipt = self
            .store
            .get_receipt(receipt_id)
            .await?
            .ok_or_else(|| DomainError::not_found("receipt", receipt_id))?;
        if !receipt.status.can_pay() {
            return Err(PaymentError::AlreadyPaid(receipt_id));
        }

        self.initiate_payment(&receipt, &phone).await
    }

    async fn initiate_payment(
        &self,
        receipt: &Receipt,
        phone: &PhoneNumber,
    ) -> Result<PaymentOutcome> {
        let push = match self.push(receipt, phone).await {
            Ok(push) => {
                metrics::counter!("gateway_push_total", "outcome" => "accepted").increment(1);
                push
            }
            Err(source) => {
                metrics::counter!("gateway_push_total", "outcome" => "failed").increment(1);
                tracing::warn!(receipt_id = %receipt.id, error = %source, "payment request not sent");
                return Err(PaymentError::PaymentNotInitiated {
                    receipt_id: receipt.id,
                    source,
                });
            }
        };

        let attempt = match self.record_attempt(receipt, phone, &push).await {
            Ok(attempt) => attempt,
            Err(source) => {
                tracing::error!(
                    receipt_id = %receipt.id,
                    checkout_request_id = %push.checkout_request_id,
                    error = %source,
                    "payment requested but attempt not recorded"
                );
                return Err(PaymentError::AttemptNotRecorded {
                    receipt_id: receipt.id,
                    checkout_request_id: push.checkout_request_id,
                    source,
                });
            }
        };

        tracing::info!(
            receipt_id = %receipt.id,
            checkout_request_id = %attempt.checkout_request_id,
            "payment requested"
        );
        Ok(PaymentOutcome { attempt, push })
    }

    async fn record_attempt(
        &self,
        receipt: &Receipt,
        phone: &PhoneNumber,
        push: &PushResponse,
    ) -> std::result::Result<PaymentAttempt, StoreError> {
        let mut tx = self.store.begin().await?;
        let attempt = tx
            .insert_payment_attempt(NewPaymentAttempt {
                checkout_request_id: push.checkout_request_id.clone(),
                receipt_id: receipt.id,
                member_id: receipt.member_id.clone(),
                amount: receipt.total_amount,
                phone: phone.to_string(),
                created_at: Utc::now(),
            })
            .await?;
        tx.commit().await?;
        Ok(attempt)
    }

    async fn push(
        &self,
        receipt: &Receipt,
        phone: &PhoneNumber,
    ) -> std::result::Result<PushResponse, GatewayError> {
        let token = self.gateway.authenticate().await?;
        let request = PushRequest {
            amount: receipt.total_amount,
            phone: phone.clone(),
            account_reference: self.account_reference.clone(),
            narrative: format!("Payment for receipt {}", receipt.id),
        };
        self.gateway.request_push(&token, &request).await
    }
}

/// Validates the cart and returns one line per title, ordered by book id.
///
/// Stock rows are decremented in this order, so concurrent carts naming the
/// same titles always lock them in the same sequence and cannot deadlock.
fn normalize_cart(cart: &[CartItem]) -> Result<Vec<CartItem>> {
    if cart.is_empty() {
        return Err(DomainError::validation("cart is empty").into());
    }

    let mut quantities: BTreeMap<BookId, u32> = BTreeMap::new();
    for line in cart {
        if line.quantity == 0 {
            return Err(DomainError::validation(format!(
                "quantity for book {} must be at least 1",
                line.book_id
            ))
            .into());
        }
        let quantity = quantities.entry(line.book_id).or_default();
        *quantity = quantity
            .checked_add(line.quantity)
            .filter(|q| *q <= MAX_COPIES_PER_TITLE)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "at most {MAX_COPIES_PER_TITLE} copies of book {} per purchase",
                    line.book_id
                ))
            })?;
    }

    Ok(quantities
        .into_iter()
        .map(|(book_id, quantity)| CartItem { book_id, quantity })
        .collect())
}
