//! Payment destination and method types
//!
//! A destination is a fund or membership category (Tithe, Offering, ...). Each
//! destination allows an ordered set of methods and carries the recipient
//! account for every allowed method.

use crate::PhoneNumber;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How the payer moves money to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Transfer to the organization's bank account
    BankAccount,
    /// M-Pesa PayBill (business number + account number)
    Paybill,
    /// Lipa na M-Pesa till (buy goods)
    LipaNaMpesa,
    /// Send money straight to a mobile wallet
    SendMoney,
}

impl PaymentMethod {
    /// All methods in display order
    pub const ALL: [PaymentMethod; 4] = [
        Self::BankAccount,
        Self::Paybill,
        Self::LipaNaMpesa,
        Self::SendMoney,
    ];

    /// Stable wire identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankAccount => "bank_account",
            Self::Paybill => "paybill",
            Self::LipaNaMpesa => "lipa_na_mpesa",
            Self::SendMoney => "send_money",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::BankAccount => "Bank Transfer",
            Self::Paybill => "PayBill",
            Self::LipaNaMpesa => "Lipa na M-Pesa",
            Self::SendMoney => "Send Money",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::BankAccount => "Transfer to church bank account",
            Self::Paybill => "Pay via M-Pesa PayBill",
            Self::LipaNaMpesa => "Pay via M-Pesa Till Number",
            Self::SendMoney => "Send directly via M-Pesa",
        }
    }

    /// Account fields shown to the payer for this method
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::BankAccount => &["bankName", "accountNumber", "branch"],
            Self::Paybill => &["businessCode", "accountNumber"],
            Self::LipaNaMpesa => &["tillNumber"],
            Self::SendMoney => &["phoneNumber"],
        }
    }

    /// Whether the gateway prompts the sender's handset (STK push)
    pub fn is_push_payment(&self) -> bool {
        !matches!(self, Self::BankAccount)
    }

    /// Push payments cannot be initiated without a sender number
    pub fn requires_sender_number(&self) -> bool {
        self.is_push_payment()
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recipient account metadata for one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountDetails {
    #[serde(rename_all = "camelCase")]
    Paybill {
        business_code: String,
        account_number: String,
    },
    #[serde(rename_all = "camelCase")]
    Bank {
        bank_name: String,
        account_number: String,
        branch: String,
    },
    #[serde(rename_all = "camelCase")]
    Till { till_number: String },
    #[serde(rename_all = "camelCase")]
    SendMoney { phone_number: PhoneNumber },
}

impl AccountDetails {
    /// The method this account shape serves
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Paybill { .. } => PaymentMethod::Paybill,
            Self::Bank { .. } => PaymentMethod::BankAccount,
            Self::Till { .. } => PaymentMethod::LipaNaMpesa,
            Self::SendMoney { .. } => PaymentMethod::SendMoney,
        }
    }

    /// Identifier of the party credited by the gateway
    pub fn recipient(&self) -> &str {
        match self {
            Self::Paybill { business_code, .. } => business_code,
            Self::Bank { account_number, .. } => account_number,
            Self::Till { till_number } => till_number,
            Self::SendMoney { phone_number } => phone_number.as_str(),
        }
    }

    /// Account reference the payer's statement shows, if the method has one
    pub fn account_reference(&self) -> Option<&str> {
        match self {
            Self::Paybill { account_number, .. } => Some(account_number),
            _ => None,
        }
    }
}

/// A semantic target for funds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDestination {
    /// Unique display name (the lookup key)
    pub name: String,
    /// Allowed methods in priority order
    pub methods: Vec<PaymentMethod>,
    /// Method preselected for the payer
    pub default_method: PaymentMethod,
    /// Recipient account per method
    pub accounts: BTreeMap<PaymentMethod, AccountDetails>,
}

impl PaymentDestination {
    /// Check if a method is allowed
    pub fn allows(&self, method: PaymentMethod) -> bool {
        self.methods.contains(&method)
    }
}

/// Presentation metadata for a method offered by a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub method: PaymentMethod,
    pub name: String,
    pub description: String,
    pub fields: Vec<String>,
    pub is_default: bool,
}

impl MethodInfo {
    pub fn describe(method: PaymentMethod, is_default: bool) -> Self {
        Self {
            method,
            name: method.display_name().to_string(),
            description: method.description().to_string(),
            fields: method.fields().iter().map(|f| f.to_string()).collect(),
            is_default,
        }
    }
}
