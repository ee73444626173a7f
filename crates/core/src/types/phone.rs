//! Kenyan mobile number type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    /// The input contained no digits.
    #[error("phone number cannot be empty")]
    Empty,
    /// The digits do not match any accepted layout.
    #[error("invalid phone number format: {0}")]
    InvalidFormat(String),
}

/// A mobile number in the `254XXXXXXXXX` international format M-Pesa expects.
///
/// ## Accepted input
///
/// Separators (spaces, dashes, brackets) are ignored. After that:
///
/// - `07XXXXXXXX` / `01XXXXXXXX` (local, 10 digits)
/// - `+254XXXXXXXXX`
/// - `254XXXXXXXXX` (already normalized, 12 digits)
/// - `7XXXXXXXX` / `1XXXXXXXX` (subscriber number, 9 digits)
///
/// ```
/// use campus_eats_core::PhoneNumber;
///
/// assert_eq!(PhoneNumber::parse("0712 345 678").unwrap().as_str(), "254712345678");
/// assert_eq!(PhoneNumber::parse("+254712345678").unwrap().as_str(), "254712345678");
/// assert!(PhoneNumber::parse("12345").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const COUNTRY_CODE: &'static str = "254";

    /// Parse and normalize a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or does not match one of the
    /// accepted layouts.
    pub fn parse(s: &str) -> Result<Self, PhoneNumberError> {
        let trimmed = s.trim();
        let has_plus = trimmed.starts_with('+');
        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

        if digits.is_empty() {
            return Err(PhoneNumberError::Empty);
        }

        let subscriber = match (has_plus, digits.len()) {
            (false, 10) => digits.strip_prefix('0'),
            (_, 12) => digits.strip_prefix(Self::COUNTRY_CODE),
            (false, 9) => Some(digits.as_str()),
            _ => None,
        }
        .filter(|rest| rest.starts_with('7') || rest.starts_with('1'))
        .ok_or_else(|| PhoneNumberError::InvalidFormat(s.to_owned()))?;

        Ok(Self(format!("{}{subscriber}", Self::COUNTRY_CODE)))
    }

    /// The normalized `254XXXXXXXXX` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local display form, e.g. `0712345678`.
    #[must_use]
    pub fn local_format(&self) -> String {
        let subscriber = self.0.strip_prefix(Self::COUNTRY_CODE).unwrap_or(&self.0);
        format!("0{subscriber}")
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_local_ten_digit_format() {
        assert_eq!(PhoneNumber::parse("0712345678").unwrap().as_str(), "254712345678");
        assert_eq!(PhoneNumber::parse("0112345678").unwrap().as_str(), "254112345678");
    }

    #[test]
    fn test_plus_country_code_format() {
        assert_eq!(
            PhoneNumber::parse("+254 712 345 678").unwrap().as_str(),
            "254712345678"
        );
    }

    #[test]
    fn test_already_normalized() {
        assert_eq!(PhoneNumber::parse("254712345678").unwrap().as_str(), "254712345678");
    }

    #[test]
    fn test_subscriber_number() {
        assert_eq!(PhoneNumber::parse("712345678").unwrap().as_str(), "254712345678");
        assert_eq!(PhoneNumber::parse("112345678").unwrap().as_str(), "254112345678");
    }

    #[test]
    fn test_separators_are_ignored() {
        assert_eq!(PhoneNumber::parse("07-12-345-678").unwrap().as_str(), "254712345678");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(PhoneNumber::parse("  "), Err(PhoneNumberError::Empty));
    }

    #[test]
    fn test_rejects_unknown_layouts() {
        for input in ["12345", "0812345678", "255712345678", "+0712345678", "812345678"] {
            assert!(
                matches!(PhoneNumber::parse(input), Err(PhoneNumberError::InvalidFormat(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_local_format() {
        let phone = PhoneNumber::parse("+254712345678").unwrap();
        assert_eq!(phone.local_format(), "0712345678");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: PhoneNumber = serde_json::from_str("\"0712345678\"").unwrap();
        assert_eq!(ok.as_str(), "254712345678");
        assert!(serde_json::from_str::<PhoneNumber>("\"abc\"").is_err());
    }
}
