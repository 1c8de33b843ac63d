//! Stock-level classification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::Quantity;

/// How comfortable the stock on hand is relative to the part's minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockLevel {
    Low,
    Medium,
    Good,
    /// The part has no minimum, so thresholds are not tracked.
    None,
}

impl StockLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockLevel::Low => "low",
            StockLevel::Medium => "medium",
            StockLevel::Good => "good",
            StockLevel::None => "none",
        }
    }
}

/// Headroom above the minimum that still counts as `medium`.
const MEDIUM_FACTOR: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

/// Classify `current` against an optional `minimum`.
///
/// A missing or zero minimum means the part is not threshold-tracked.
pub fn classify(current: Quantity, minimum: Option<Quantity>) -> StockLevel {
    let minimum = match minimum {
        Some(m) if m.is_positive() => m.as_decimal(),
        _ => return StockLevel::None,
    };
    let current = current.as_decimal();

    if current <= minimum {
        StockLevel::Low
    } else if current <= minimum * MEDIUM_FACTOR {
        StockLevel::Medium
    } else {
        StockLevel::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(units: u32) -> Quantity {
        Quantity::from_units(units)
    }

    #[test]
    fn at_minimum_is_low() {
        assert_eq!(classify(q(5), Some(q(5))), StockLevel::Low);
        assert_eq!(classify(q(0), Some(q(5))), StockLevel::Low);
    }

    #[test]
    fn within_half_again_is_medium() {
        assert_eq!(classify(q(7), Some(q(5))), StockLevel::Medium);
        assert_eq!(classify("7.5".parse().unwrap(), Some(q(5))), StockLevel::Medium);
    }

    #[test]
    fn above_half_again_is_good() {
        assert_eq!(classify(q(8), Some(q(5))), StockLevel::Good);
    }

    #[test]
    fn missing_or_zero_minimum_is_untracked() {
        assert_eq!(classify(q(100), None), StockLevel::None);
        assert_eq!(classify(q(0), Some(Quantity::ZERO)), StockLevel::None);
    }

    #[test]
    fn fractional_minimums_are_respected() {
        let min: Quantity = "0.4".parse().unwrap();
        assert_eq!(classify("0.4".parse().unwrap(), Some(min)), StockLevel::Low);
        assert_eq!(classify("0.6".parse().unwrap(), Some(min)), StockLevel::Medium);
        assert_eq!(classify("0.61".parse().unwrap(), Some(min)), StockLevel::Good);
    }
}
