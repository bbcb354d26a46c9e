//! Canonical mobile numbers
//!
//! Numbers are stored as bare digits in international form (`254712345678`).
//! Local forms (`0712 345 678`), bare subscriber numbers (`712345678`) and
//! `+254` forms all normalize to the same value, and normalizing a canonical
//! number returns it unchanged.

use crate::{Result, SadakaError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kenyan country calling code
pub const COUNTRY_CODE: &str = "254";

/// Digits in a subscriber number after the country code
pub const SUBSCRIBER_DIGITS: usize = 9;

/// A validated mobile-money capable phone number
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize raw user input into canonical form
    ///
    /// Non-digits are stripped. A leading trunk `0` is replaced by the country
    /// code, and a number starting with a mobile prefix (`7` or `1`) gets the
    /// country code prepended.
    pub fn normalize(raw: &str) -> Result<Self> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let canonical = if let Some(rest) = digits.strip_prefix('0') {
            format!("{COUNTRY_CODE}{rest}")
        } else if digits.starts_with('7') || digits.starts_with('1') {
            format!("{COUNTRY_CODE}{digits}")
        } else {
            digits
        };

        if Self::is_plausible(&canonical) {
            Ok(Self(canonical))
        } else {
            Err(SadakaError::InvalidPhoneFormat {
                input: raw.to_string(),
            })
        }
    }

    fn is_plausible(canonical: &str) -> bool {
        canonical.len() == COUNTRY_CODE.len() + SUBSCRIBER_DIGITS
            && canonical.starts_with(COUNTRY_CODE)
            && matches!(canonical.as_bytes()[COUNTRY_CODE.len()], b'7' | b'1')
    }

    /// Canonical digits, as sent to the gateway
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `+254…` form for display
    pub fn to_e164(&self) -> String {
        format!("+{}", self.0)
    }

    /// Number with the middle digits hidden, for logs
    pub fn masked(&self) -> String {
        let (head, tail) = (&self.0[..4], &self.0[self.0.len() - 3..]);
        format!("{head}*****{tail}")
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = SadakaError;

    fn try_from(value: String) -> Result<Self> {
        Self::normalize(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}
