//! STK push wire format
//!
//! Request and response bodies for Lipa na M-Pesa Online (STK push) and its
//! status query, plus the helpers that derive the password and timestamp.

use crate::error::{MpesaError, MpesaResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sadaka_types::{FailureReason, PaymentMethod, PaymentRequest, StatusOutcome};
use serde::{Deserialize, Serialize};

pub const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
pub const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

/// Longest `AccountReference` Daraja accepts
pub const MAX_ACCOUNT_REFERENCE: usize = 12;
/// Longest `TransactionDesc` Daraja accepts
pub const MAX_TRANSACTION_DESC: usize = 13;

/// Result code for a successful payment
pub const RESULT_SUCCESS: i64 = 0;
/// Result code when the payer dismissed the prompt
pub const RESULT_CANCELLED: i64 = 1032;
/// Error code the query endpoint returns while the payer has not responded
pub const QUERY_STILL_PROCESSING: &str = "500.001.1001";

/// Daraja timestamps are East Africa Time
const EAT_OFFSET_SECS: i64 = 3 * 60 * 60;

/// `YYYYMMDDHHMMSS` in East Africa Time
pub fn timestamp(now: DateTime<Utc>) -> String {
    let local = now.naive_utc() + chrono::Duration::seconds(EAT_OFFSET_SECS);
    local.format("%Y%m%d%H%M%S").to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn password(short_code: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{short_code}{passkey}{timestamp}"))
}

/// Daraja transaction type for a method
pub fn transaction_type(method: PaymentMethod) -> MpesaResult<&'static str> {
    match method {
        PaymentMethod::Paybill | PaymentMethod::SendMoney => Ok("CustomerPayBillOnline"),
        PaymentMethod::LipaNaMpesa => Ok("CustomerBuyGoodsOnline"),
        PaymentMethod::BankAccount => Err(MpesaError::UnsupportedMethod {
            method: method.to_string(),
        }),
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}

/// Body of an STK push request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: String,
    pub amount: u64,
    pub party_a: String,
    pub party_b: String,
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
}

impl StkPushRequest {
    /// Build the push for a validated payment request
    pub fn build(
        request: &PaymentRequest,
        short_code: &str,
        passkey: &str,
        callback_url: &str,
        now: DateTime<Utc>,
    ) -> MpesaResult<Self> {
        let transaction_type = transaction_type(request.method)?;
        let sender = request
            .sender
            .as_ref()
            .ok_or_else(|| MpesaError::UnsupportedMethod {
                method: format!("{} without a sender number", request.method),
            })?;

        let timestamp = timestamp(now);
        let reference = request
            .recipient
            .account_reference()
            .unwrap_or(request.destination.as_str());

        Ok(Self {
            business_short_code: short_code.to_string(),
            password: password(short_code, passkey, &timestamp),
            timestamp,
            transaction_type: transaction_type.to_string(),
            amount: request.amount.shillings(),
            party_a: sender.as_str().to_string(),
            party_b: request.recipient.recipient().to_string(),
            phone_number: sender.as_str().to_string(),
            callback_url: callback_url.to_string(),
            account_reference: truncate(reference, MAX_ACCOUNT_REFERENCE),
            transaction_desc: truncate(&request.description, MAX_TRANSACTION_DESC),
        })
    }
}

/// Synchronous acknowledgment of an STK push
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
}

/// Body of an STK status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryRequest {
    pub business_short_code: String,
    pub password: String,
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

impl StkQueryRequest {
    pub fn build(short_code: &str, passkey: &str, checkout_request_id: &str, now: DateTime<Utc>) -> Self {
        let timestamp = timestamp(now);
        Self {
            business_short_code: short_code.to_string(),
            password: password(short_code, passkey, &timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        }
    }
}

/// Result of an STK status query
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode", default)]
    pub response_code: String,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<String>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}

impl StkQueryResponse {
    /// Terminal outcome, if the payer has acted
    pub fn outcome(&self) -> MpesaResult<Option<StatusOutcome>> {
        let Some(code) = self.result_code.as_deref() else {
            return Ok(None);
        };
        let code: i64 = code.trim().parse().map_err(|_| MpesaError::InvalidResponse {
            message: format!("non-numeric ResultCode {code:?}"),
        })?;
        Ok(Some(outcome_for_result(code, self.result_desc.clone())))
    }
}

/// Error body Daraja returns with 4xx/5xx responses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DarajaErrorBody {
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: String,
    #[serde(rename = "errorMessage", default)]
    pub error_message: String,
}

/// Map a Daraja `ResultCode` to a terminal outcome
///
/// Receipt details only arrive in callbacks, so a completed outcome built
/// here carries just the description.
pub fn outcome_for_result(code: i64, description: Option<String>) -> StatusOutcome {
    match code {
        RESULT_SUCCESS => StatusOutcome::Completed {
            receipt_number: None,
            message: description,
        },
        RESULT_CANCELLED => StatusOutcome::Failed {
            reason: FailureReason::Cancelled,
            message: description,
        },
        other => StatusOutcome::Failed {
            reason: FailureReason::Rejected {
                code: other.to_string(),
            },
            message: description,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sadaka_types::{AccountDetails, Amount, PayerId, PhoneNumber};

    fn paybill_request() -> PaymentRequest {
        PaymentRequest {
            payer_id: PayerId::from("member-1"),
            destination: "Youth Monthly Contributions".to_string(),
            method: PaymentMethod::Paybill,
            amount: Amount::from_shillings(500),
            description: "Monthly youth contribution".to_string(),
            sender: Some(PhoneNumber::normalize("0712345678").unwrap()),
            recipient: AccountDetails::Paybill {
                business_code: "123456".to_string(),
                account_number: "YOUTH_MONTHLY001".to_string(),
            },
            client_reference: None,
        }
    }

    #[test]
    fn test_timestamp_is_east_africa_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 21, 5, 9).unwrap();
        assert_eq!(timestamp(now), "20240302000509");
    }

    #[test]
    fn test_password_matches_daraja_formula() {
        let encoded = password("174379", "passkey", "20240302000509");
        assert_eq!(
            STANDARD.decode(encoded).unwrap(),
            b"174379passkey20240302000509".to_vec()
        );
    }

    #[test]
    fn test_push_body() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let body = StkPushRequest::build(
            &paybill_request(),
            "174379",
            "pk",
            "https://example.org/cb",
            now,
        )
        .unwrap();

        assert_eq!(body.transaction_type, "CustomerPayBillOnline");
        assert_eq!(body.party_a, "254712345678");
        assert_eq!(body.party_b, "123456");
        assert_eq!(body.account_reference, "YOUTH_MONTHL");
        assert_eq!(body.account_reference.len(), MAX_ACCOUNT_REFERENCE);
        assert_eq!(body.transaction_desc, "Monthly youth");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["CallBackURL"], "https://example.org/cb");
        assert_eq!(json["BusinessShortCode"], "174379");
        assert_eq!(json["Amount"], 500);
        assert_eq!(json["Timestamp"], "20240301120000");
    }

    #[test]
    fn test_till_uses_buy_goods_and_bank_is_refused() {
        assert_eq!(transaction_type(PaymentMethod::LipaNaMpesa).unwrap(), "CustomerBuyGoodsOnline");

        let mut request = paybill_request();
        request.method = PaymentMethod::BankAccount;
        assert!(matches!(
            StkPushRequest::build(&request, "174379", "pk", "https://example.org/cb", Utc::now()),
            Err(MpesaError::UnsupportedMethod { .. })
        ));
    }

    #[test]
    fn test_query_outcomes() {
        let pending: StkQueryResponse = serde_json::from_str(r#"{"ResponseCode":"0"}"#).unwrap();
        assert_eq!(pending.outcome().unwrap(), None);

        let cancelled: StkQueryResponse = serde_json::from_str(
            r#"{"ResponseCode":"0","ResultCode":"1032","ResultDesc":"Request cancelled by user"}"#,
        )
        .unwrap();
        assert!(matches!(
            cancelled.outcome().unwrap(),
            Some(StatusOutcome::Failed {
                reason: FailureReason::Cancelled,
                ..
            })
        ));

        let insufficient: StkQueryResponse =
            serde_json::from_str(r#"{"ResponseCode":"0","ResultCode":"1","ResultDesc":"Insufficient balance"}"#)
                .unwrap();
        assert!(matches!(
            insufficient.outcome().unwrap(),
            Some(StatusOutcome::Failed {
                reason: FailureReason::Rejected { ref code },
                ..
            }) if code == "1"
        ));
    }
}
