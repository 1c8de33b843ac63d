use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, PartId, Quantity};

use crate::part::normalize;

/// Whether stock is coming in or going out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityDirection {
    Add,
    Remove,
}

impl QuantityDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityDirection::Add => "add",
            QuantityDirection::Remove => "remove",
        }
    }

    /// Signed delta for `amount` in this direction.
    pub fn signed(&self, amount: Quantity) -> Decimal {
        match self {
            QuantityDirection::Add => amount.as_decimal(),
            QuantityDirection::Remove => -amount.as_decimal(),
        }
    }
}

impl core::fmt::Display for QuantityDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantityDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(QuantityDirection::Add),
            "remove" => Ok(QuantityDirection::Remove),
            other => Err(DomainError::validation(
                "direction",
                format!("expected `add` or `remove`, got {other:?}"),
            )),
        }
    }
}

/// Typed payload for a stock add/remove.
///
/// Supplier details only make sense for incoming stock; [`Self::validate`]
/// drops them from removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityChangeRequest {
    pub part_id: PartId,
    pub amount: Quantity,
    pub direction: QuantityDirection,
    pub reason: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_url: Option<String>,
}

impl QuantityChangeRequest {
    pub fn add(part_id: PartId, amount: Quantity) -> Self {
        Self::new(part_id, amount, QuantityDirection::Add)
    }

    pub fn remove(part_id: PartId, amount: Quantity) -> Self {
        Self::new(part_id, amount, QuantityDirection::Remove)
    }

    pub fn new(part_id: PartId, amount: Quantity, direction: QuantityDirection) -> Self {
        Self {
            part_id,
            amount,
            direction,
            reason: None,
            supplier_name: None,
            supplier_url: None,
        }
    }

    /// Build from a raw floating-point amount, as submitted by a form.
    pub fn from_f64(part_id: PartId, amount: f64, direction: QuantityDirection) -> DomainResult<Self> {
        let amount = Quantity::from_f64(amount).map_err(|_| {
            DomainError::validation("amount", format!("must be a finite positive number (got {amount})"))
        })?;
        Ok(Self::new(part_id, amount, direction))
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_supplier(mut self, name: impl Into<String>, url: Option<String>) -> Self {
        self.supplier_name = Some(name.into());
        self.supplier_url = url;
        self
    }

    /// Check the amount and normalize free text.
    pub fn validate(mut self) -> DomainResult<Self> {
        if !self.amount.is_positive() {
            return Err(DomainError::validation("amount", "must be greater than zero"));
        }
        self.reason = normalize(self.reason);
        match self.direction {
            QuantityDirection::Add => {
                self.supplier_name = normalize(self.supplier_name);
                self.supplier_url = normalize(self.supplier_url);
            }
            QuantityDirection::Remove => {
                self.supplier_name = None;
                self.supplier_url = None;
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_and_signs() {
        assert_eq!("add".parse::<QuantityDirection>().unwrap(), QuantityDirection::Add);
        assert!("subtract".parse::<QuantityDirection>().is_err());
        assert_eq!(
            QuantityDirection::Remove.signed(Quantity::from_units(3)),
            Decimal::from(-3)
        );
    }

    #[test]
    fn non_finite_amounts_are_rejected() {
        let err = QuantityChangeRequest::from_f64(PartId::new(), f64::NAN, QuantityDirection::Add)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "amount", .. }));
        assert!(
            QuantityChangeRequest::from_f64(PartId::new(), -2.0, QuantityDirection::Add).is_err()
        );
    }

    #[test]
    fn zero_amount_fails_validation() {
        let err = QuantityChangeRequest::add(PartId::new(), Quantity::ZERO)
            .validate()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "amount", .. }));
    }

    #[test]
    fn removal_drops_supplier_details() {
        let req = QuantityChangeRequest::remove(PartId::new(), Quantity::from_units(1))
            .with_supplier("Acme", Some("https://acme.test".into()))
            .with_reason("  ")
            .validate()
            .unwrap();
        assert_eq!(req.supplier_name, None);
        assert_eq!(req.supplier_url, None);
        assert_eq!(req.reason, None);
    }

    #[test]
    fn addition_keeps_supplier_details() {
        let req = QuantityChangeRequest::add(PartId::new(), Quantity::from_units(1))
            .with_supplier(" Acme ", None)
            .validate()
            .unwrap();
        assert_eq!(req.supplier_name.as_deref(), Some("Acme"));
    }
}
