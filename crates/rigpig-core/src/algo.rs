//! Mining algorithm statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Latest profitability figures for one mining algorithm.
///
/// Produced by the algorithm-stats collaborator and passed through the
/// supervisor untouched. Ordering within a snapshot is meaningful (the
/// collaborator ranks them) and is preserved end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoStat {
    /// Algorithm name, e.g. "ethash"
    pub algorithm: String,

    /// Most profitable coin for this algorithm, e.g. "ETC"
    pub coin: String,

    /// Estimated revenue per unit of hashrate per day, in USD
    pub profitability: f64,
}

impl AlgoStat {
    /// Creates a new algorithm stat.
    pub fn new(algorithm: impl Into<String>, coin: impl Into<String>, profitability: f64) -> Self {
        Self {
            algorithm: algorithm.into(),
            coin: coin.into(),
            profitability,
        }
    }

    /// Checks that the record is usable.
    ///
    /// Names must be non-empty and profitability must be a finite number.
    pub fn validate(&self) -> DomainResult<()> {
        if self.algorithm.trim().is_empty() {
            return Err(DomainError::EmptyField {
                field: "algorithm".to_string(),
            });
        }
        if self.coin.trim().is_empty() {
            return Err(DomainError::EmptyField {
                field: "coin".to_string(),
            });
        }
        if !self.profitability.is_finite() {
            return Err(DomainError::InvalidFieldValue {
                field: "profitability".to_string(),
                value: self.profitability.to_string(),
                expected: "a finite number".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for AlgoStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({:.4})", self.algorithm, self.coin, self.profitability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_well_formed() {
        let stat = AlgoStat::new("ethash", "ETC", 0.42);
        assert!(stat.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_algorithm() {
        let stat = AlgoStat::new("  ", "ETC", 0.42);
        assert_eq!(
            stat.validate(),
            Err(DomainError::EmptyField {
                field: "algorithm".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_nan() {
        let stat = AlgoStat::new("kawpow", "RVN", f64::NAN);
        assert!(matches!(
            stat.validate(),
            Err(DomainError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{"algorithm":"randomx","coin":"XMR","profitability":1.25}"#;
        let stat: AlgoStat = serde_json::from_str(json).unwrap();
        assert_eq!(stat, AlgoStat::new("randomx", "XMR", 1.25));
    }

    #[test]
    fn test_display() {
        let stat = AlgoStat::new("ethash", "ETC", 0.5);
        assert_eq!(stat.to_string(), "ethash/ETC (0.5000)");
    }
}
