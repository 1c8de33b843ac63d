use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, PartId, Quantity};

use crate::level::{StockLevel, classify};
use crate::quantity::QuantityDirection;

/// Where a part lives in the facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Coarse area (room, wall, cabinet). Required.
    pub vicinity: String,
    /// Finer position inside the vicinity (shelf, bin).
    pub sublocation: Option<String>,
}

/// A stock item with a quantity on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub description: Option<String>,
    pub current_quantity: Quantity,
    /// `None` (or zero) disables threshold tracking.
    pub minimum_quantity: Option<Quantity>,
    pub unit: String,
    pub cost_per_unit: Option<Decimal>,
    pub location: StorageLocation,
    pub supplier: Option<String>,
    pub supplier_url: Option<String>,
    /// Opaque reference owned by the image store.
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed payload for creating a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartInput {
    pub name: String,
    pub description: Option<String>,
    pub initial_quantity: Quantity,
    pub minimum_quantity: Option<Quantity>,
    pub unit: String,
    pub cost_per_unit: Option<Decimal>,
    pub storage_vicinity: String,
    pub storage_sublocation: Option<String>,
    pub supplier: Option<String>,
    pub supplier_url: Option<String>,
    pub image_ref: Option<String>,
}

impl PartInput {
    /// Minimal valid input; everything optional left empty.
    pub fn new(
        name: impl Into<String>,
        storage_vicinity: impl Into<String>,
        initial_quantity: Quantity,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            initial_quantity,
            minimum_quantity: None,
            unit: DEFAULT_UNIT.to_string(),
            cost_per_unit: None,
            storage_vicinity: storage_vicinity.into(),
            storage_sublocation: None,
            supplier: None,
            supplier_url: None,
            image_ref: None,
        }
    }

    pub fn with_minimum(mut self, minimum: Quantity) -> Self {
        self.minimum_quantity = Some(minimum);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_text("name", &self.name)?;
        require_text("storage_vicinity", &self.storage_vicinity)?;
        validate_cost(self.cost_per_unit)?;
        Ok(())
    }
}

pub const DEFAULT_UNIT: &str = "units";

/// Partial update of a part's descriptive fields.
///
/// Outer `None` leaves a field alone; `Some(None)` clears a nullable field.
/// `current_quantity` is an administrative override, recorded as a manual
/// correction in history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFields {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub current_quantity: Option<Quantity>,
    pub minimum_quantity: Option<Option<Quantity>>,
    pub unit: Option<String>,
    pub cost_per_unit: Option<Option<Decimal>>,
    pub storage_vicinity: Option<String>,
    pub storage_sublocation: Option<Option<String>>,
    pub supplier: Option<Option<String>>,
    pub supplier_url: Option<Option<String>>,
    pub image_ref: Option<Option<String>>,
}

impl PartFields {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(vicinity) = &self.storage_vicinity {
            require_text("storage_vicinity", vicinity)?;
        }
        if let Some(unit) = &self.unit {
            require_text("unit", unit)?;
        }
        if let Some(cost) = self.cost_per_unit {
            validate_cost(cost)?;
        }
        Ok(())
    }
}

/// What an applied [`PartFields`] actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    /// Names of the fields whose value differs from before.
    pub changed: Vec<&'static str>,
    /// `(old, new)` when the override moved the quantity.
    pub quantity: Option<(Quantity, Quantity)>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Quantity movement produced by [`Part::apply_quantity_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityDelta {
    pub old_quantity: Quantity,
    pub new_quantity: Quantity,
    /// Signed: positive for add, negative for remove.
    pub change: Decimal,
}

impl Part {
    pub fn from_input(id: PartId, input: PartInput, now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;
        let unit = normalize(Some(input.unit)).unwrap_or_else(|| DEFAULT_UNIT.to_string());
        Ok(Self {
            id,
            name: input.name.trim().to_string(),
            description: normalize(input.description),
            current_quantity: input.initial_quantity,
            minimum_quantity: input.minimum_quantity,
            unit,
            cost_per_unit: input.cost_per_unit,
            location: StorageLocation {
                vicinity: input.storage_vicinity.trim().to_string(),
                sublocation: normalize(input.storage_sublocation),
            },
            supplier: normalize(input.supplier),
            supplier_url: normalize(input.supplier_url),
            image_ref: normalize(input.image_ref),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn stock_level(&self) -> StockLevel {
        classify(self.current_quantity, self.minimum_quantity)
    }

    /// Apply descriptive edits (and an optional quantity override).
    pub fn apply_fields(&mut self, fields: PartFields, now: DateTime<Utc>) -> DomainResult<FieldChanges> {
        fields.validate()?;
        let mut changes = FieldChanges::default();

        if let Some(name) = fields.name {
            set_if_changed(&mut self.name, name.trim().to_string(), "name", &mut changes);
        }
        if let Some(description) = fields.description {
            set_if_changed(&mut self.description, normalize(description), "description", &mut changes);
        }
        if let Some(minimum) = fields.minimum_quantity {
            set_if_changed(&mut self.minimum_quantity, minimum, "minimum_quantity", &mut changes);
        }
        if let Some(unit) = fields.unit {
            set_if_changed(&mut self.unit, unit.trim().to_string(), "unit", &mut changes);
        }
        if let Some(cost) = fields.cost_per_unit {
            set_if_changed(&mut self.cost_per_unit, cost, "cost_per_unit", &mut changes);
        }
        if let Some(vicinity) = fields.storage_vicinity {
            set_if_changed(&mut self.location.vicinity, vicinity.trim().to_string(), "storage_vicinity", &mut changes);
        }
        if let Some(sublocation) = fields.storage_sublocation {
            set_if_changed(&mut self.location.sublocation, normalize(sublocation), "storage_sublocation", &mut changes);
        }
        if let Some(supplier) = fields.supplier {
            set_if_changed(&mut self.supplier, normalize(supplier), "supplier", &mut changes);
        }
        if let Some(url) = fields.supplier_url {
            set_if_changed(&mut self.supplier_url, normalize(url), "supplier_url", &mut changes);
        }
        if let Some(image_ref) = fields.image_ref {
            set_if_changed(&mut self.image_ref, normalize(image_ref), "image_ref", &mut changes);
        }
        if let Some(quantity) = fields.current_quantity {
            let old = self.current_quantity;
            if set_if_changed(&mut self.current_quantity, quantity, "current_quantity", &mut changes) {
                changes.quantity = Some((old, quantity));
            }
        }

        // An explicit save counts as an edit even when nothing differs.
        self.updated_at = now;
        Ok(changes)
    }

    /// Add or remove stock. Fails without mutating if removal would go negative.
    pub fn apply_quantity_change(
        &mut self,
        direction: QuantityDirection,
        amount: Quantity,
        now: DateTime<Utc>,
    ) -> DomainResult<QuantityDelta> {
        if !amount.is_positive() {
            return Err(DomainError::validation("amount", "must be greater than zero"));
        }

        let old_quantity = self.current_quantity;
        let new_quantity = match direction {
            QuantityDirection::Add => old_quantity
                .checked_add(amount)
                .ok_or_else(|| DomainError::validation("amount", "quantity overflow"))?,
            QuantityDirection::Remove => old_quantity.checked_sub(amount).ok_or(
                DomainError::InsufficientQuantity {
                    available: old_quantity,
                    requested: amount,
                },
            )?,
        };

        self.current_quantity = new_quantity;
        self.updated_at = now;

        Ok(QuantityDelta {
            old_quantity,
            new_quantity,
            change: direction.signed(amount),
        })
    }
}

fn set_if_changed<T: PartialEq>(
    slot: &mut T,
    value: T,
    field: &'static str,
    changes: &mut FieldChanges,
) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    changes.changed.push(field);
    true
}

fn require_text(field: &'static str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "cannot be empty"));
    }
    Ok(())
}

fn validate_cost(cost: Option<Decimal>) -> DomainResult<()> {
    match cost {
        Some(c) if c.is_sign_negative() && !c.is_zero() => {
            Err(DomainError::validation("cost_per_unit", "must not be negative"))
        }
        _ => Ok(()),
    }
}

/// Trim optional free text; blank becomes `None`.
pub(crate) fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
