//! Daraja (M-Pesa) STK push client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use super::{AccessToken, GatewayConfig, PaymentGateway, PushRequest, PushResponse};
use crate::error::GatewayError;

const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Daraja timestamps are expressed in East Africa Time.
const GATEWAY_UTC_OFFSET_SECS: i32 = 3 * 3600;

/// Formats a push timestamp as `YYYYMMDDHHmmss`.
pub fn timestamp<Tz: TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d%H%M%S").to_string()
}

/// Derives the push password: base64 of shortcode, passkey and timestamp.
pub fn password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Encodes the client credentials for the basic-auth token exchange.
pub fn basic_credentials(client_key: &str, client_secret: &str) -> String {
    BASE64.encode(format!("{client_key}:{client_secret}"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

/// HTTP client for the Daraja API.
#[derive(Debug, Clone)]
pub struct MpesaGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl MpesaGateway {
    /// Builds a client whose requests all time out after `config.timeout`.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn now() -> DateTime<FixedOffset> {
        let now = Utc::now();
        match FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS) {
            Some(offset) => now.with_timezone(&offset),
            None => now.fixed_offset(),
        }
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    #[tracing::instrument(skip(self))]
    async fn authenticate(&self) -> Result<AccessToken, GatewayError> {
        let credentials = basic_credentials(&self.config.client_key, &self.config.client_secret);
        let response = self
            .client
            .get(self.url("/oauth/v1/generate?grant_type=client_credentials"))
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::AuthFailure(format!(
                "token endpoint returned {status}"
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::AuthFailure(format!("unreadable token response: {e}")))?;
        match body.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(GatewayError::AuthFailure(
                "token response carried no access_token".to_string(),
            )),
        }
    }

    #[tracing::instrument(skip(self, token, request), fields(amount = request.amount))]
    async fn request_push(
        &self,
        token: &AccessToken,
        request: &PushRequest,
    ) -> Result<PushResponse, GatewayError> {
        let timestamp = timestamp(Self::now());
        let body = StkPushBody {
            business_short_code: &self.config.shortcode,
            password: password(&self.config.shortcode, &self.config.passkey, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE,
            amount: request.amount,
            party_a: request.phone.as_str(),
            party_b: &self.config.shortcode,
            phone_number: request.phone.as_str(),
            call_back_url: &self.config.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.narrative,
        };

        let response = self
            .client
            .post(self.url("/mpesa/stkpush/v1/processrequest"))
            .bearer_auth(token.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Protocol(format!(
                "push endpoint returned {status}: {text}"
            )));
        }

        let push: PushResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::Protocol(format!("unreadable push response: {e}")))?;
        if push.checkout_request_id.is_empty() {
            return Err(GatewayError::Protocol(
                "push response carried an empty CheckoutRequestID".to_string(),
            ));
        }
        if let Some(code) = push.response_code.as_deref()
            && code != "0"
        {
            return Err(GatewayError::Protocol(format!(
                "push rejected with ResponseCode {code}"
            )));
        }

        tracing::debug!(checkout_request_id = %push.checkout_request_id, "push accepted");
        Ok(push)
    }
}
