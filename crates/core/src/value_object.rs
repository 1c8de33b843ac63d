//! Value objects: equality by value, not identity.
//!
//! Value objects are domain objects that have **no identity** - they are defined entirely
//! by their attribute values. Two value objects with the same values are considered equal.

use core::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A non-negative amount of stock.
///
/// Parts are counted in arbitrary units (pieces, metres, litres), so the
/// amount is decimal rather than integral. A `Quantity` can never be negative;
/// signed deltas are expressed as `Decimal`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::validation(
                "quantity",
                format!("must not be negative (got {value})"),
            ));
        }
        Ok(Self(value.normalize()))
    }

    /// Convert a floating-point amount, rejecting NaN and infinities.
    pub fn from_f64(value: f64) -> DomainResult<Self> {
        if !value.is_finite() {
            return Err(DomainError::validation(
                "quantity",
                format!("must be a finite number (got {value})"),
            ));
        }
        let decimal = Decimal::from_f64(value).ok_or_else(|| {
            DomainError::validation("quantity", format!("out of range (got {value})"))
        })?;
        Self::new(decimal)
    }

    /// Whole-unit convenience constructor.
    pub fn from_units(units: u32) -> Self {
        Self(Decimal::from(units))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.0.is_zero()
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(|v| Quantity(v.normalize()))
    }

    /// Subtract, returning `None` if the result would be negative.
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        if other.0 > self.0 {
            return None;
        }
        self.0.checked_sub(other.0).map(|v| Quantity(v.normalize()))
    }

    /// Subtract, clamping at zero.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        self.checked_sub(other).unwrap_or(Quantity::ZERO)
    }

    pub fn min(self, other: Quantity) -> Quantity {
        if self <= other { self } else { other }
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim()).map_err(|e| {
            DomainError::validation("quantity", format!("malformed number {s:?}: {e}"))
        })?;
        Self::new(decimal)
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn negative_values_are_rejected() {
        assert!(Quantity::new(Decimal::new(-1, 0)).is_err());
        assert!(Quantity::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(Quantity::from_f64(f64::NAN).is_err());
        assert!(Quantity::from_f64(f64::INFINITY).is_err());
        assert_eq!(Quantity::from_f64(2.5).unwrap(), "2.5".parse().unwrap());
    }

    #[test]
    fn malformed_text_is_a_validation_error() {
        match "12abc".parse::<Quantity>().unwrap_err() {
            DomainError::Validation { field: "quantity", .. } => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn checked_sub_refuses_to_go_negative() {
        let three = Quantity::from_units(3);
        let five = Quantity::from_units(5);
        assert_eq!(three.checked_sub(five), None);
        assert_eq!(five.checked_sub(three), Some(Quantity::from_units(2)));
        assert_eq!(three.saturating_sub(five), Quantity::ZERO);
    }

    #[test]
    fn trailing_zeros_do_not_affect_equality() {
        let a: Quantity = "2.50".parse().unwrap();
        let b: Quantity = "2.5".parse().unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn add_then_sub_is_identity(a in 0u32..1_000_000, b in 0u32..1_000_000) {
            let qa = Quantity::from_units(a);
            let qb = Quantity::from_units(b);
            let sum = qa.checked_add(qb).unwrap();
            prop_assert_eq!(sum.checked_sub(qb), Some(qa));
        }
    }
}
