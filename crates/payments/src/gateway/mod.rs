//! Payment gateway client.
//!
//! [`PaymentGateway`] is the seam between purchase orchestration and the
//! mobile-money provider. [`MpesaGateway`] talks to the real Daraja API;
//! [`InMemoryPaymentGateway`] records push requests for tests and local runs.

mod config;
mod memory;
mod mpesa;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::phone::PhoneNumber;

pub use config::GatewayConfig;
pub use memory::InMemoryPaymentGateway;
pub use mpesa::{MpesaGateway, basic_credentials, password, timestamp};

/// Short-lived bearer token returned by the credential exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// A request for the payer's handset to prompt for payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub amount: i64,
    pub phone: PhoneNumber,
    pub account_reference: String,
    /// Shown to the payer as the transaction description.
    pub narrative: String,
}

/// Acknowledgement of an accepted push request.
///
/// Acceptance only means the prompt was sent. The payment outcome arrives
/// later through the callback, keyed by `checkout_request_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: Option<String>,
}

/// Trait for mobile-money push payments.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Exchanges the client credentials for an access token.
    async fn authenticate(&self) -> Result<AccessToken, GatewayError>;

    /// Asks the gateway to prompt the payer for `request.amount`.
    async fn request_push(
        &self,
        token: &AccessToken,
        request: &PushRequest,
    ) -> Result<PushResponse, GatewayError>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for std::sync::Arc<G> {
    async fn authenticate(&self) -> Result<AccessToken, GatewayError> {
        (**self).authenticate().await
    }

    async fn request_push(
        &self,
        token: &AccessToken,
        request: &PushRequest,
    ) -> Result<PushResponse, GatewayError> {
        (**self).request_push(token, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("super-secret");
        assert_eq!(format!("{token:?}"), "AccessToken(..)");
        assert_eq!(token.as_str(), "super-secret");
    }

    #[test]
    fn test_push_response_uses_gateway_field_names() {
        let response: PushResponse = serde_json::from_str(
            r#"{
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            }"#,
        )
        .unwrap();
        assert_eq!(response.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(response.response_code.as_deref(), Some("0"));
    }
}
