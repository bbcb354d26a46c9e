//! STK push result callbacks
//!
//! Daraja posts the outcome of every push to the configured `CallBackURL`:
//!
//! ```text
//! {"Body": {"stkCallback": {
//!     "MerchantRequestID": "...", "CheckoutRequestID": "ws_CO_...",
//!     "ResultCode": 0, "ResultDesc": "...",
//!     "CallbackMetadata": {"Item": [{"Name": "MpesaReceiptNumber", "Value": "..."}, ...]}
//! }}}
//! ```

use crate::error::{MpesaError, MpesaResult};
use crate::stk::{outcome_for_result, RESULT_SUCCESS};
use sadaka_types::{CorrelationRef, StatusOutcome, StatusUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level callback document
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<Value>,
}

impl CallbackMetadata {
    fn get(&self, name: &str) -> Option<String> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

/// Acknowledgment Daraja expects back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

impl CallbackEnvelope {
    /// Parse a raw callback body
    pub fn parse(body: &[u8]) -> MpesaResult<Self> {
        serde_json::from_slice(body).map_err(|e| MpesaError::InvalidCallback {
            message: e.to_string(),
        })
    }

    /// Status update for the ledger
    pub fn into_status_update(self) -> MpesaResult<StatusUpdate> {
        let callback = self.body.stk_callback;
        if callback.checkout_request_id.trim().is_empty() {
            return Err(MpesaError::InvalidCallback {
                message: "missing CheckoutRequestID".to_string(),
            });
        }

        let correlation_ref = CorrelationRef::new(callback.checkout_request_id);
        let outcome = if callback.result_code == RESULT_SUCCESS {
            let metadata = callback.metadata.unwrap_or_default();
            let receipt = metadata.get("MpesaReceiptNumber");
            let message = confirmation_message(
                receipt.as_deref(),
                metadata.get("Amount").as_deref(),
                metadata.get("PhoneNumber").as_deref(),
            )
            .or(Some(callback.result_desc));

            StatusOutcome::Completed {
                receipt_number: receipt,
                message,
            }
        } else {
            outcome_for_result(callback.result_code, Some(callback.result_desc))
        };

        Ok(StatusUpdate::new(correlation_ref, outcome))
    }
}

fn confirmation_message(receipt: Option<&str>, amount: Option<&str>, phone: Option<&str>) -> Option<String> {
    let receipt = receipt?;
    let amount = amount?;
    let mut message = format!("{receipt} Confirmed. Ksh {amount} received");
    if let Some(phone) = phone {
        message.push_str(&format!(" from {phone}"));
    }
    message.push('.');
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sadaka_types::FailureReason;

    const SUCCESS: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        {"Name": "Amount", "Value": 200},
                        {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                        {"Name": "Balance"},
                        {"Name": "TransactionDate", "Value": 20191219102115},
                        {"Name": "PhoneNumber", "Value": 254712345678}
                    ]
                }
            }
        }
    }"#;

    const CANCELLED: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    }"#;

    #[test]
    fn test_success_callback() {
        let update = CallbackEnvelope::parse(SUCCESS.as_bytes())
            .unwrap()
            .into_status_update()
            .unwrap();

        assert_eq!(update.correlation_ref.as_str(), "ws_CO_191220191020363925");
        match update.outcome {
            StatusOutcome::Completed {
                receipt_number,
                message,
            } => {
                assert_eq!(receipt_number.as_deref(), Some("NLJ7RT61SV"));
                assert_eq!(
                    message.as_deref(),
                    Some("NLJ7RT61SV Confirmed. Ksh 200 received from 254712345678.")
                );
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_callback() {
        let update = CallbackEnvelope::parse(CANCELLED.as_bytes())
            .unwrap()
            .into_status_update()
            .unwrap();
        assert_eq!(
            update.outcome,
            StatusOutcome::Failed {
                reason: FailureReason::Cancelled,
                message: Some("Request cancelled by user".to_string()),
            }
        );
    }

    #[test]
    fn test_malformed_callback() {
        assert!(matches!(
            CallbackEnvelope::parse(br#"{"Body": {}}"#),
            Err(MpesaError::InvalidCallback { .. })
        ));
    }
}
