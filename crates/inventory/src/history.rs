//! Append-only audit records.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, DomainError, HistoryEntryId, OrderId, PartId, Quantity};

use crate::part::{FieldChanges, Part, QuantityDelta};
use crate::quantity::{QuantityChangeRequest, QuantityDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    QuantityAdd,
    QuantityRemove,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::QuantityAdd => "quantity_add",
            ChangeType::QuantityRemove => "quantity_remove",
        }
    }
}

impl From<QuantityDirection> for ChangeType {
    fn from(value: QuantityDirection) -> Self {
        match value {
            QuantityDirection::Add => ChangeType::QuantityAdd,
            QuantityDirection::Remove => ChangeType::QuantityRemove,
        }
    }
}

impl FromStr for ChangeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "quantity_add" => Ok(ChangeType::QuantityAdd),
            "quantity_remove" => Ok(ChangeType::QuantityRemove),
            other => Err(DomainError::invariant(format!("unknown change type {other:?}"))),
        }
    }
}

/// One immutable audit record.
///
/// Whenever `quantity_change` is set it equals `new_quantity - old_quantity`
/// (with a missing `old_quantity` read as zero).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub part_id: PartId,
    pub change_type: ChangeType,
    pub old_quantity: Option<Quantity>,
    pub new_quantity: Option<Quantity>,
    pub quantity_change: Option<Decimal>,
    pub changed_by: ActorId,
    pub change_reason: Option<String>,
    /// Last purchase order credited by a `quantity_add`.
    pub order_id: Option<OrderId>,
    pub supplier_name: Option<String>,
    pub supplier_url: Option<String>,
    pub changed_at: DateTime<Utc>,
}

pub const MANUAL_CORRECTION_REASON: &str = "Manual quantity correction";

impl HistoryEntry {
    pub fn created(part: &Part, actor: &ActorId) -> Self {
        Self {
            id: HistoryEntryId::new(),
            part_id: part.id,
            change_type: ChangeType::Create,
            old_quantity: None,
            new_quantity: Some(part.current_quantity),
            quantity_change: Some(part.current_quantity.as_decimal()),
            changed_by: actor.clone(),
            change_reason: Some("Part created".to_string()),
            order_id: None,
            supplier_name: None,
            supplier_url: None,
            changed_at: part.created_at,
        }
    }

    /// Record a field edit. A quantity override is described as a manual
    /// correction and carries old/new quantities.
    pub fn updated(part: &Part, changes: &FieldChanges, actor: &ActorId) -> Self {
        let (old_quantity, new_quantity, quantity_change, reason) = match changes.quantity {
            Some((old, new)) => (
                Some(old),
                Some(new),
                Some(new.as_decimal() - old.as_decimal()),
                format!("{MANUAL_CORRECTION_REASON} ({old} -> {new} {})", part.unit),
            ),
            None if changes.is_empty() => (None, None, None, "Saved without changes".to_string()),
            None => (None, None, None, format!("Updated {}", changes.changed.join(", "))),
        };

        Self {
            id: HistoryEntryId::new(),
            part_id: part.id,
            change_type: ChangeType::Update,
            old_quantity,
            new_quantity,
            quantity_change,
            changed_by: actor.clone(),
            change_reason: Some(reason),
            order_id: None,
            supplier_name: None,
            supplier_url: None,
            changed_at: part.updated_at,
        }
    }

    pub fn quantity_changed(
        part: &Part,
        request: &QuantityChangeRequest,
        delta: &QuantityDelta,
        order_id: Option<OrderId>,
        actor: &ActorId,
    ) -> Self {
        Self {
            id: HistoryEntryId::new(),
            part_id: part.id,
            change_type: request.direction.into(),
            old_quantity: Some(delta.old_quantity),
            new_quantity: Some(delta.new_quantity),
            quantity_change: Some(delta.change),
            changed_by: actor.clone(),
            change_reason: request.reason.clone(),
            order_id,
            supplier_name: request.supplier_name.clone(),
            supplier_url: request.supplier_url.clone(),
            changed_at: part.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::PartInput;

    fn actor() -> ActorId {
        ActorId::new("user-1").unwrap()
    }

    fn part(quantity: u32) -> Part {
        Part::from_input(
            PartId::new(),
            PartInput::new("Tape", "Cabinet 3", Quantity::from_units(quantity)),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn change_type_round_trips_through_text() {
        for ct in [
            ChangeType::Create,
            ChangeType::Update,
            ChangeType::QuantityAdd,
            ChangeType::QuantityRemove,
        ] {
            assert_eq!(ct.as_str().parse::<ChangeType>().unwrap(), ct);
        }
    }

    #[test]
    fn created_entry_has_no_old_quantity() {
        let p = part(12);
        let entry = HistoryEntry::created(&p, &actor());
        assert_eq!(entry.change_type, ChangeType::Create);
        assert_eq!(entry.old_quantity, None);
        assert_eq!(entry.new_quantity, Some(Quantity::from_units(12)));
        assert_eq!(entry.changed_by, actor());
    }

    #[test]
    fn manual_correction_records_both_quantities() {
        let p = part(4);
        let changes = FieldChanges {
            changed: vec!["current_quantity"],
            quantity: Some((Quantity::from_units(9), Quantity::from_units(4))),
        };
        let entry = HistoryEntry::updated(&p, &changes, &actor());

        assert_eq!(entry.change_type, ChangeType::Update);
        assert_eq!(entry.old_quantity, Some(Quantity::from_units(9)));
        assert_eq!(entry.quantity_change, Some(Decimal::from(-5)));
        assert!(entry.change_reason.unwrap().starts_with(MANUAL_CORRECTION_REASON));
    }

    #[test]
    fn removal_entry_is_signed_negative() {
        let mut p = part(10);
        let request = QuantityChangeRequest::remove(p.id, Quantity::from_units(3))
            .with_reason("used on project")
            .validate()
            .unwrap();
        let delta = p
            .apply_quantity_change(request.direction, request.amount, Utc::now())
            .unwrap();
        let entry = HistoryEntry::quantity_changed(&p, &request, &delta, None, &actor());

        assert_eq!(entry.change_type, ChangeType::QuantityRemove);
        assert_eq!(entry.quantity_change, Some(Decimal::from(-3)));
        assert_eq!(entry.change_reason.as_deref(), Some("used on project"));
    }
}
