//! Currency exchange rates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// ISO-4217 style currency code, normalized to upper case.
///
/// Deserialization goes through [`CurrencyCode::new`], so codes read from
/// JSON are normalized the same way as codes built in code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a currency code, trimming and upper-casing the input.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CurrencyCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exchange rate of one currency against the reference currency (USD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRate {
    /// Currency code, e.g. "EUR"
    pub code: CurrencyCode,

    /// Units of this currency per one unit of the reference currency
    pub rate: f64,
}

impl CurrencyRate {
    /// Creates a new currency rate.
    pub fn new(code: impl AsRef<str>, rate: f64) -> Self {
        Self {
            code: CurrencyCode::new(code),
            rate,
        }
    }

    /// Checks that the record is usable.
    ///
    /// The code must be non-empty and the rate a positive finite number.
    pub fn validate(&self) -> DomainResult<()> {
        if self.code.as_str().trim().is_empty() {
            return Err(DomainError::EmptyField {
                field: "code".to_string(),
            });
        }
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(DomainError::InvalidFieldValue {
                field: "rate".to_string(),
                value: self.rate.to_string(),
                expected: "a positive finite number".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for CurrencyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.code, self.rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_normalized() {
        assert_eq!(CurrencyCode::new(" usd ").as_str(), "USD");
    }

    #[test]
    fn test_validate_rejects_non_positive_rate() {
        assert!(CurrencyRate::new("EUR", 0.0).validate().is_err());
        assert!(CurrencyRate::new("EUR", -1.0).validate().is_err());
        assert!(CurrencyRate::new("EUR", f64::INFINITY).validate().is_err());
        assert!(CurrencyRate::new("EUR", 0.92).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_code() {
        let err = CurrencyRate::new("   ", 1.0).validate().unwrap_err();
        assert!(err.to_string().contains("code"));
    }

    #[test]
    fn test_deserialized_code_is_normalized() {
        let rate: CurrencyRate = serde_json::from_str(r#"{"code":" usd ","rate":1.0}"#).unwrap();
        assert_eq!(rate.code.as_str(), "USD");
        assert_eq!(rate, CurrencyRate::new("USD", 1.0));
        assert!(rate.validate().is_ok());
    }

    #[test]
    fn test_deserialized_blank_code_fails_validation() {
        let rate: CurrencyRate = serde_json::from_str(r#"{"code":"   ","rate":1.0}"#).unwrap();
        assert_eq!(rate.code.as_str(), "");
        let err = rate.validate().unwrap_err();
        assert!(matches!(err, DomainError::EmptyField { ref field } if field == "code"));
    }

    #[test]
    fn test_code_serializes_as_plain_string() {
        let json = serde_json::to_string(&CurrencyRate::new("usd", 1.0)).unwrap();
        assert_eq!(json, r#"{"code":"USD","rate":1.0}"#);
    }
}
