//! Payment callback document posted by the gateway.
//!
//! ```json
//! {"Body": {"stkCallback": {
//!     "MerchantRequestID": "29115-34620561-1",
//!     "CheckoutRequestID": "ws_CO_191220191020363925",
//!     "ResultCode": 0,
//!     "ResultDesc": "The service request is processed successfully.",
//!     "CallbackMetadata": {"Item": [
//!         {"Name": "Amount", "Value": 1.00},
//!         {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"}
//!     ]}
//! }}}
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Default, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<CallbackItem>,
}

/// One `{Name, Value}` pair of callback metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

/// The outcome of one push request as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    /// Zero means the payer completed the payment.
    #[serde(rename = "ResultCode", deserialize_with = "result_code")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
    #[serde(
        rename = "CallbackMetadata",
        default,
        deserialize_with = "metadata_items"
    )]
    pub items: Vec<CallbackItem>,
}

impl StkCallback {
    /// Parses a raw callback body.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: CallbackEnvelope = serde_json::from_slice(body)?;
        Ok(envelope.body.stk_callback)
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Returns the value of the named metadata item.
    pub fn item(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }

    /// Gateway-issued receipt number of a completed payment.
    pub fn receipt_number(&self) -> Option<String> {
        match self.item("MpesaReceiptNumber")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Amount paid, in whole currency units.
    pub fn amount(&self) -> Option<i64> {
        let value = self.item("Amount")?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|f| f.round() as i64))
    }
}

// Sandbox callbacks occasionally carry the result code as a string.
fn result_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Number(i64),
        Text(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Number(n) => Ok(n),
        Code::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn metadata_items<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<CallbackItem>, D::Error> {
    let metadata: Option<CallbackMetadata> = Option::deserialize(deserializer)?;
    Ok(metadata.map(|m| m.items).unwrap_or_default())
}
