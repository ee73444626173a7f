//! STK push result callbacks.
//!
//! Safaricom posts the final result of a push to the callback URL:
//!
//! ```json
//! {"Body": {"stkCallback": {
//!     "MerchantRequestID": "29115-34620561-1",
//!     "CheckoutRequestID": "ws_CO_191220191020363925",
//!     "ResultCode": 0,
//!     "ResultDesc": "The service request is processed successfully.",
//!     "CallbackMetadata": {"Item": [
//!         {"Name": "Amount", "Value": 1.00},
//!         {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
//!         {"Name": "TransactionDate", "Value": 20191219102115},
//!         {"Name": "PhoneNumber", "Value": 254708374149}
//!     ]}
//! }}}
//! ```
//!
//! Failed pushes carry a non-zero `ResultCode` and no metadata.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::{NumberOrString, PaymentResult};

/// Why a callback body could not be turned into a payment result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid ResultCode: {0}")]
    InvalidResultCode(String),
}

/// Top-level callback document.
#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode")]
    result_code: Option<NumberOrString>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<Value>,
}

/// Named values from the metadata item list. Every field is optional on the
/// wire; which ones are required depends on the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackMetadataFields {
    pub amount: Option<Decimal>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<String>,
    pub phone_number: Option<String>,
}

/// A validated callback, ready to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackReceipt {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub result_code: i64,
    pub result_description: String,
    pub metadata: CallbackMetadataFields,
    pub result: PaymentResult,
}

impl StkCallbackEnvelope {
    /// Validate the callback and extract its payment result.
    ///
    /// # Errors
    ///
    /// Returns `CallbackError` if the checkout request id or result code is
    /// missing, or a successful result has no receipt number.
    pub fn into_receipt(self) -> Result<CallbackReceipt, CallbackError> {
        let cb = self.body.stk_callback;

        let checkout_request_id = cb
            .checkout_request_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(CallbackError::MissingField("CheckoutRequestID"))?;

        let raw_code = cb
            .result_code
            .ok_or(CallbackError::MissingField("ResultCode"))?;
        let result_code = raw_code
            .as_i64()
            .ok_or_else(|| CallbackError::InvalidResultCode(raw_code.to_string()))?;

        let metadata = cb
            .metadata
            .map(|m| walk_metadata(&m.items))
            .unwrap_or_default();

        let result = if result_code == 0 {
            let receipt_number = metadata
                .receipt_number
                .clone()
                .ok_or(CallbackError::MissingField("MpesaReceiptNumber"))?;
            PaymentResult::Succeeded {
                receipt_number: Some(receipt_number),
            }
        } else {
            PaymentResult::Failed {
                reason: failure_reason(result_code, &cb.result_desc),
            }
        };

        Ok(CallbackReceipt {
            checkout_request_id,
            merchant_request_id: cb.merchant_request_id,
            result_code,
            result_description: cb.result_desc,
            metadata,
            result,
        })
    }
}

/// Reason stored on an order whose payment failed.
#[must_use]
pub fn failure_reason(result_code: i64, description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        format!("M-Pesa result code {result_code}")
    } else {
        description.to_string()
    }
}

fn walk_metadata(items: &[MetadataItem]) -> CallbackMetadataFields {
    let mut fields = CallbackMetadataFields::default();
    for item in items {
        let Some(value) = item.value.as_ref().and_then(scalar_text) else {
            continue;
        };
        match item.name.as_str() {
            "Amount" => fields.amount = Decimal::from_str(&value).ok(),
            "MpesaReceiptNumber" => fields.receipt_number = Some(value),
            "TransactionDate" => fields.transaction_date = Some(value),
            "PhoneNumber" => fields.phone_number = Some(value),
            _ => {}
        }
    }
    fields
}

/// Strings and numbers as text; anything else is ignored.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
