//! HTTP API server with observability for the lending library backend.
//!
//! Provides REST endpoints for the catalog, loans, purchases and the payment
//! gateway webhook, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use payments::{InMemoryPaymentGateway, PaymentGateway};
use store::{InMemoryLibraryStore, LibraryStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G>(state: Arc<AppState<S, G>>, metrics_handle: PrometheusHandle) -> Router
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/register", post(routes::members::register::<S, G>))
        .route("/admin/add_book", post(routes::books::add::<S, G>))
        .route("/books/get_all", get(routes::books::list::<S, G>))
        .route("/books/delete/{book_id}", get(routes::books::delete::<S, G>))
        .route(
            "/books/borrow/{member_id}/{book_id}",
            get(routes::lending::borrow::<S, G>),
        )
        .route(
            "/book/mark_returned/{loan_id}",
            get(routes::lending::mark_returned::<S, G>),
        )
        .route(
            "/user/get_borrowed_books/{member_id}",
            get(routes::lending::for_member::<S, G>),
        )
        .route("/admin/get_borrowed_books", get(routes::lending::all::<S, G>))
        .route(
            "/books/purchase/{member_id}/{phone}/{total_amount}",
            post(routes::purchases::purchase::<S, G>),
        )
        .route(
            "/user/pay_receipt/{receipt_id}/{phone}",
            get(routes::purchases::pay_receipt::<S, G>),
        )
        .route(
            "/user/get_receipts/{member_id}",
            get(routes::purchases::for_member::<S, G>),
        )
        .route("/admin/get_receipts", get(routes::purchases::all::<S, G>))
        .route(
            "/transaction_call_back",
            post(routes::callback::receive::<S, G>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state backed by the in-memory store and gateway.
///
/// The store and gateway handles are returned for inspection in tests.
pub fn create_default_state() -> (
    Arc<AppState<InMemoryLibraryStore, InMemoryPaymentGateway>>,
    InMemoryLibraryStore,
    InMemoryPaymentGateway,
) {
    let store = InMemoryLibraryStore::new();
    let gateway = InMemoryPaymentGateway::new();
    let state = Arc::new(AppState::new(store.clone(), gateway.clone()));
    (state, store, gateway)
}
