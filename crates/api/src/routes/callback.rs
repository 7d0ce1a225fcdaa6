//! Payment gateway webhook.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use payments::PaymentGateway;
use serde::Serialize;
use store::LibraryStore;

use super::AppState;

#[derive(Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: &'static str,
}

/// POST /transaction_call_back — applies a payment outcome.
///
/// Always acknowledges so the gateway stops redelivering; what happened is
/// only visible in logs and the `callbacks_total` metric.
pub async fn receive<S, G>(State(state): State<Arc<AppState<S, G>>>, body: Bytes) -> Json<CallbackAck>
where
    S: LibraryStore + 'static,
    G: PaymentGateway + 'static,
{
    let outcome = state.reconciler.handle_callback(&body).await;
    tracing::debug!(outcome = outcome.as_str(), "payment callback handled");
    Json(CallbackAck {
        result_code: 0,
        result_desc: "Accepted",
    })
}
