use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::{AccessToken, PaymentGateway, PushRequest, PushResponse};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    pushes: Vec<PushRequest>,
    next_id: u32,
    fail_on_authenticate: bool,
    fail_on_push: bool,
}

/// In-memory payment gateway for tests and local runs without credentials.
///
/// Accepts every push and hands out sequential checkout references
/// (`ws_CO_0001`, `ws_CO_0002`, ...). No callback is ever sent.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    prefix: String,
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::with_prefix("ws_CO_")
    }
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway whose checkout references start with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: Arc::default(),
        }
    }

    /// Configures the gateway to refuse the credential exchange.
    pub fn set_fail_on_authenticate(&self, fail: bool) {
        self.write().fail_on_authenticate = fail;
    }

    /// Configures the gateway to reject push requests.
    pub fn set_fail_on_push(&self, fail: bool) {
        self.write().fail_on_push = fail;
    }

    /// Returns the number of accepted pushes.
    pub fn push_count(&self) -> usize {
        self.read().pushes.len()
    }

    /// Returns every accepted push in order.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.read().pushes.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryGatewayState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryGatewayState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authenticate(&self) -> Result<AccessToken, GatewayError> {
        if self.read().fail_on_authenticate {
            return Err(GatewayError::AuthFailure("invalid credentials".to_string()));
        }
        Ok(AccessToken::new("in-memory-token"))
    }

    async fn request_push(
        &self,
        _token: &AccessToken,
        request: &PushRequest,
    ) -> Result<PushResponse, GatewayError> {
        let mut state = self.write();
        if state.fail_on_push {
            return Err(GatewayError::Protocol("push rejected".to_string()));
        }

        state.next_id += 1;
        let checkout_request_id = format!("{}{:04}", self.prefix, state.next_id);
        state.pushes.push(request.clone());

        Ok(PushResponse {
            merchant_request_id: Some(format!("MR-{:04}", state.next_id)),
            checkout_request_id,
            response_code: Some("0".to_string()),
            response_description: Some("Success. Request accepted for processing".to_string()),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }
}
