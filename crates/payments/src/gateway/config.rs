use std::time::Duration;

/// Connection settings for the Daraja API.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Business short code credited by the payment.
    pub shortcode: String,
    pub passkey: String,
    pub client_key: String,
    pub client_secret: String,
    /// Public URL the gateway posts the payment outcome to.
    pub callback_url: String,
    /// Applies to every outbound request.
    pub timeout: Duration,
}

impl GatewayConfig {
    pub const SANDBOX_URL: &'static str = "https://sandbox.safaricom.co.ke";
    pub const SANDBOX_SHORTCODE: &'static str = "174379";

    /// Returns true when every secret needed to talk to the gateway is set.
    pub fn has_credentials(&self) -> bool {
        !self.passkey.is_empty() && !self.client_key.is_empty() && !self.client_secret.is_empty()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: Self::SANDBOX_URL.to_string(),
            shortcode: Self::SANDBOX_SHORTCODE.to_string(),
            passkey: String::new(),
            client_key: String::new(),
            client_secret: String::new(),
            callback_url: "http://localhost:3000/transaction_call_back".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(secret: &str) -> &'static str {
            if secret.is_empty() {
                "<unset>"
            } else {
                "<redacted>"
            }
        }

        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("shortcode", &self.shortcode)
            .field("passkey", &redact(&self.passkey))
            .field("client_key", &redact(&self.client_key))
            .field("client_secret", &redact(&self.client_secret))
            .field("callback_url", &self.callback_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
