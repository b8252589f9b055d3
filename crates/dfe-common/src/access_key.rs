//! Fiscal document access keys
//!
//! An access key is the 44-digit natural identifier printed on every
//! authorized transport document. Digit 44 is a mod-11 check digit computed
//! over the first 43 digits with weights 2..=9 cycling from the right.
//!
//! Layout of the 43 data digits:
//!
//! | digits | meaning                      |
//! |--------|------------------------------|
//! | 1-2    | issuer state (IBGE code)     |
//! | 3-6    | year and month of issue      |
//! | 7-20   | issuer CNPJ                  |
//! | 21-22  | model (`57` CT-e, `58` MDF-e)|
//! | 23-25  | series                       |
//! | 26-34  | document number              |
//! | 35     | emission type                |
//! | 36-43  | numeric code                 |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DfeError, Result};

/// Number of characters in an access key.
pub const ACCESS_KEY_LEN: usize = 44;

/// A structurally valid access key: 44 ASCII digits.
///
/// The check digit is not enforced by [`AccessKey::from_decoded`], only by
/// [`AccessKey::parse`]; callers that accept decoded keys must call
/// [`AccessKey::has_valid_check_digit`] before committing anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    /// Parse a key and verify its check digit.
    pub fn parse(raw: &str) -> Result<Self> {
        let key = Self::from_decoded(raw)?;
        let expected = key.expected_check_digit();
        let actual = key.check_digit();
        if expected != actual {
            return Err(DfeError::CheckDigitMismatch { expected, actual });
        }
        Ok(key)
    }

    /// Accept any 44-digit key without checking digit 44.
    pub fn from_decoded(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let len = raw.chars().count();
        if len != ACCESS_KEY_LEN {
            return Err(DfeError::AccessKeyLength(len));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DfeError::AccessKeyNotNumeric(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final digit as written in the key.
    pub fn check_digit(&self) -> u8 {
        self.0.as_bytes()[ACCESS_KEY_LEN - 1] - b'0'
    }

    /// The check digit the first 43 digits call for.
    pub fn expected_check_digit(&self) -> u8 {
        weighted_digit(&self.0.as_bytes()[..ACCESS_KEY_LEN - 1])
    }

    pub fn has_valid_check_digit(&self) -> bool {
        self.check_digit() == self.expected_check_digit()
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccessKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccessKey {
    type Error = DfeError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_decoded(&value)
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

/// Compute the check digit for a 43-digit prefix.
pub fn compute_check_digit(prefix: &str) -> Result<u8> {
    let len = prefix.chars().count();
    if len != ACCESS_KEY_LEN - 1 {
        return Err(DfeError::AccessKeyLength(len + 1));
    }
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DfeError::AccessKeyNotNumeric(prefix.to_string()));
    }
    Ok(weighted_digit(prefix.as_bytes()))
}

/// Append the check digit to a 43-digit prefix.
pub fn complete_key(prefix: &str) -> Result<AccessKey> {
    let digit = compute_check_digit(prefix)?;
    Ok(AccessKey(format!("{}{}", prefix, digit)))
}

// Digits are assumed to be ASCII '0'..='9'.
fn weighted_digit(digits: &[u8]) -> u8 {
    let mut weight = 2u32;
    let mut sum = 0u32;
    for b in digits.iter().rev() {
        sum += u32::from(b - b'0') * weight;
        weight = if weight == 9 { 2 } else { weight + 1 };
    }
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        (11 - remainder) as u8
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VALID: &str = "35240112345678000191570010000001231000001239";

    #[test]
    fn test_parse_valid_key() {
        let key = AccessKey::parse(VALID).unwrap();
        assert_eq!(key.as_str(), VALID);
        assert!(key.has_valid_check_digit());
    }

    #[test]
    fn test_parse_rejects_wrong_check_digit() {
        let wrong = "35240112345678000191570010000001231000001238";
        let err = AccessKey::parse(wrong).unwrap_err();
        assert_eq!(err, DfeError::CheckDigitMismatch { expected: 9, actual: 8 });
    }

    #[test]
    fn test_from_decoded_skips_check_digit() {
        let key = AccessKey::from_decoded("31234567890123456789012345678901234567890123").unwrap();
        assert!(!key.has_valid_check_digit());
        assert_eq!(key.expected_check_digit(), 4);
    }

    #[test]
    fn test_length_and_charset() {
        assert_eq!(AccessKey::from_decoded("123"), Err(DfeError::AccessKeyLength(3)));
        assert!(matches!(
            AccessKey::from_decoded("3524011234567800019157001000000123100000123X"),
            Err(DfeError::AccessKeyNotNumeric(_))
        ));
    }

    #[test]
    fn test_remainder_below_two_yields_zero() {
        assert_eq!(
            compute_check_digit("3524011234567800019157001000000125100000125").unwrap(),
            0
        );
        let key = complete_key("3524011234567800019157001000000125100000125").unwrap();
        assert!(key.as_str().ends_with('0'));
        assert!(key.has_valid_check_digit());
    }

    #[test]
    fn test_serde_roundtrip_as_string() {
        let key = AccessKey::parse(VALID).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", VALID));
        let bad: std::result::Result<AccessKey, _> = serde_json::from_str("\"12\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_completed_keys_validate(prefix in "[0-9]{43}") {
            let key = complete_key(&prefix).unwrap();
            prop_assert!(key.has_valid_check_digit());
            prop_assert!(key.check_digit() <= 9);
            prop_assert!(AccessKey::parse(key.as_str()).is_ok());
        }

        #[test]
        fn prop_changed_check_digit_is_rejected(prefix in "[0-9]{43}", bump in 1u8..10) {
            let key = complete_key(&prefix).unwrap();
            let altered = (key.check_digit() + bump) % 10;
            let raw = format!("{}{}", prefix, altered);
            prop_assert!(AccessKey::parse(&raw).is_err());
        }
    }
}
