//! Purchases and mobile-money payments.
//!
//! A purchase runs in two phases:
//! 1. Stock is decremented and an unpaid receipt created in one store transaction
//! 2. After commit, a push request is sent through the payment gateway and
//!    recorded as a pending payment attempt
//!
//! The gateway reports the outcome later through a callback, which
//! [`PaymentReconciler`] applies to the attempt and its receipt exactly once.

pub mod callback;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod phone;
pub mod reconciliation;

pub use callback::{CallbackItem, StkCallback};
pub use error::{GatewayError, PaymentError, Result};
pub use gateway::{
    AccessToken, GatewayConfig, InMemoryPaymentGateway, MpesaGateway, PaymentGateway, PushRequest,
    PushResponse, basic_credentials, password, timestamp,
};
pub use ledger::{ReceiptDetails, ReceiptItem, ReceiptLedger};
pub use orchestrator::{
    CartItem, MAX_COPIES_PER_TITLE, PaymentOutcome, PurchaseOrchestrator, PurchaseOutcome,
    PurchaseRequest,
};
pub use phone::PhoneNumber;
pub use reconciliation::{CallbackOutcome, PaymentReconciler};
