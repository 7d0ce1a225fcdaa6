//! HTTP handlers grouped by resource.

pub mod books;
pub mod callback;
pub mod health;
pub mod lending;
pub mod members;
pub mod metrics;
pub mod purchases;

use domain::{CatalogService, LendingService};
use payments::{PaymentGateway, PaymentReconciler, PurchaseOrchestrator, ReceiptLedger};
use serde::Serialize;
use store::LibraryStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LibraryStore, G: PaymentGateway> {
    pub catalog: CatalogService<S>,
    pub lending: LendingService<S>,
    pub orchestrator: PurchaseOrchestrator<S, G>,
    pub reconciler: PaymentReconciler<S>,
    pub ledger: ReceiptLedger<S>,
}

impl<S: LibraryStore + Clone, G: PaymentGateway> AppState<S, G> {
    /// Wires every service to the same store.
    pub fn new(store: S, gateway: G) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            lending: LendingService::new(store.clone()),
            orchestrator: PurchaseOrchestrator::new(store.clone(), gateway),
            reconciler: PaymentReconciler::new(store.clone()),
            ledger: ReceiptLedger::new(store),
        }
    }
}

/// Plain acknowledgement body.
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
