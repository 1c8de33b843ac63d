use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, OrderId, PartId, Quantity};

/// Purchase order status lifecycle.
///
/// Never stored independently of the quantities: it is always
/// [`OrderStatus::derive`]d from `quantity_received` and `quantity_ordered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PartiallyReceived,
    Completed,
}

impl OrderStatus {
    pub fn derive(received: Quantity, ordered: Quantity) -> Self {
        if received >= ordered {
            OrderStatus::Completed
        } else if received.is_zero() {
            OrderStatus::Pending
        } else {
            OrderStatus::PartiallyReceived
        }
    }

    /// Orders in these states still expect stock.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PartiallyReceived)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PartiallyReceived => "partially_received",
            OrderStatus::Completed => "completed",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "partially_received" => Ok(OrderStatus::PartiallyReceived),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(DomainError::invariant(format!("unknown order status {other:?}"))),
        }
    }
}

/// Stock requested from a supplier but not yet (fully) received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: OrderId,
    part_id: PartId,
    quantity_ordered: Quantity,
    quantity_received: Quantity,
    status: OrderStatus,
    /// Allocation order: earliest first.
    ordered_at: DateTime<Utc>,
    pub supplier_name: Option<String>,
    pub supplier_details: Option<String>,
    pub expected_delivery: Option<NaiveDate>,
    pub estimated_cost: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

/// Typed payload for placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub part_id: PartId,
    pub quantity_ordered: Quantity,
    pub ordered_at: DateTime<Utc>,
    pub supplier_name: Option<String>,
    pub supplier_details: Option<String>,
    pub expected_delivery: Option<NaiveDate>,
    pub estimated_cost: Option<Decimal>,
}

impl NewPurchaseOrder {
    pub fn new(part_id: PartId, quantity_ordered: Quantity, ordered_at: DateTime<Utc>) -> Self {
        Self {
            part_id,
            quantity_ordered,
            ordered_at,
            supplier_name: None,
            supplier_details: None,
            expected_delivery: None,
            estimated_cost: None,
        }
    }
}

impl PurchaseOrder {
    /// Place a new order (nothing received yet).
    pub fn place(id: OrderId, input: NewPurchaseOrder) -> DomainResult<Self> {
        if !input.quantity_ordered.is_positive() {
            return Err(DomainError::validation(
                "quantity_ordered",
                "must be greater than zero",
            ));
        }
        if let Some(cost) = input.estimated_cost {
            if cost.is_sign_negative() && !cost.is_zero() {
                return Err(DomainError::validation("estimated_cost", "must not be negative"));
            }
        }
        Ok(Self {
            id,
            part_id: input.part_id,
            quantity_ordered: input.quantity_ordered,
            quantity_received: Quantity::ZERO,
            status: OrderStatus::Pending,
            ordered_at: input.ordered_at,
            supplier_name: input.supplier_name,
            supplier_details: input.supplier_details,
            expected_delivery: input.expected_delivery,
            estimated_cost: input.estimated_cost,
            updated_at: input.ordered_at,
        })
    }

    /// Rebuild an order loaded from storage, re-checking its invariants.
    ///
    /// A stored status that disagrees with the quantities is an invariant
    /// violation rather than something to silently repair.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId,
        part_id: PartId,
        quantity_ordered: Quantity,
        quantity_received: Quantity,
        status: OrderStatus,
        ordered_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        details: OrderDetails,
    ) -> DomainResult<Self> {
        if !quantity_ordered.is_positive() {
            return Err(DomainError::invariant(format!(
                "order {id} has non-positive quantity_ordered"
            )));
        }
        if quantity_received > quantity_ordered {
            return Err(DomainError::invariant(format!(
                "order {id} received {quantity_received} of {quantity_ordered}"
            )));
        }
        let expected = OrderStatus::derive(quantity_received, quantity_ordered);
        if expected != status {
            return Err(DomainError::invariant(format!(
                "order {id} has status {} but quantities imply {}",
                status.as_str(),
                expected.as_str()
            )));
        }
        Ok(Self {
            id,
            part_id,
            quantity_ordered,
            quantity_received,
            status,
            ordered_at,
            supplier_name: details.supplier_name,
            supplier_details: details.supplier_details,
            expected_delivery: details.expected_delivery,
            estimated_cost: details.estimated_cost,
            updated_at,
        })
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn part_id(&self) -> PartId {
        self.part_id
    }

    pub fn quantity_ordered(&self) -> Quantity {
        self.quantity_ordered
    }

    pub fn quantity_received(&self) -> Quantity {
        self.quantity_received
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn ordered_at(&self) -> DateTime<Utc> {
        self.ordered_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Quantity still expected from the supplier.
    pub fn outstanding(&self) -> Quantity {
        self.quantity_ordered.saturating_sub(self.quantity_received)
    }

    pub fn details(&self) -> OrderDetails {
        OrderDetails {
            supplier_name: self.supplier_name.clone(),
            supplier_details: self.supplier_details.clone(),
            expected_delivery: self.expected_delivery,
            estimated_cost: self.estimated_cost,
        }
    }

    /// Credit up to `available` toward this order and return how much was taken.
    ///
    /// Never over-fills: the credit is capped at [`Self::outstanding`].
    pub fn receive(&mut self, available: Quantity, now: DateTime<Utc>) -> Quantity {
        let allocated = available.min(self.outstanding());
        if allocated.is_zero() {
            return Quantity::ZERO;
        }
        // Both operands are non-negative and allocated <= outstanding.
        self.quantity_received = self
            .quantity_received
            .checked_add(allocated)
            .unwrap_or(self.quantity_ordered)
            .min(self.quantity_ordered);
        self.status = OrderStatus::derive(self.quantity_received, self.quantity_ordered);
        self.updated_at = now;
        allocated
    }
}

/// Descriptive order fields that play no part in allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub supplier_name: Option<String>,
    pub supplier_details: Option<String>,
    pub expected_delivery: Option<NaiveDate>,
    pub estimated_cost: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn q(units: u32) -> Quantity {
        Quantity::from_units(units)
    }

    fn order(ordered: u32) -> PurchaseOrder {
        PurchaseOrder::place(OrderId::new(), NewPurchaseOrder::new(PartId::new(), q(ordered), Utc::now()))
            .unwrap()
    }

    #[test]
    fn status_is_derived_from_quantities() {
        assert_eq!(OrderStatus::derive(q(0), q(10)), OrderStatus::Pending);
        assert_eq!(OrderStatus::derive(q(4), q(10)), OrderStatus::PartiallyReceived);
        assert_eq!(OrderStatus::derive(q(10), q(10)), OrderStatus::Completed);
    }

    #[test]
    fn zero_quantity_orders_are_rejected() {
        let err = PurchaseOrder::place(
            OrderId::new(),
            NewPurchaseOrder::new(PartId::new(), Quantity::ZERO, Utc::now()),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: "quantity_ordered", .. }));
    }

    #[test]
    fn receive_caps_at_outstanding() {
        let mut o = order(10);
        assert_eq!(o.receive(q(4), Utc::now()), q(4));
        assert_eq!(o.status(), OrderStatus::PartiallyReceived);
        assert_eq!(o.receive(q(50), Utc::now()), q(6));
        assert_eq!(o.status(), OrderStatus::Completed);
        assert_eq!(o.quantity_received(), q(10));
        assert_eq!(o.receive(q(1), Utc::now()), Quantity::ZERO);
    }

    #[test]
    fn restore_rejects_inconsistent_status() {
        let err = PurchaseOrder::restore(
            OrderId::new(),
            PartId::new(),
            q(10),
            q(10),
            OrderStatus::Pending,
            Utc::now(),
            Utc::now(),
            OrderDetails::default(),
        )
        .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("quantities imply completed") => {}
            other => panic!("expected invariant violation, got {other:?}"),
        }
    }

    #[test]
    fn restore_rejects_over_receipt() {
        assert!(
            PurchaseOrder::restore(
                OrderId::new(),
                PartId::new(),
                q(5),
                q(6),
                OrderStatus::Completed,
                Utc::now(),
                Utc::now(),
                OrderDetails::default(),
            )
            .is_err()
        );
    }

    proptest! {
        /// Property: repeated receipts never exceed the ordered amount and
        /// the status always matches the quantities.
        #[test]
        fn receipts_never_overfill(
            ordered in 1u32..1_000,
            receipts in prop::collection::vec(0u32..400, 0..20)
        ) {
            let mut o = order(ordered);
            for r in receipts {
                o.receive(q(r), Utc::now());
                prop_assert!(o.quantity_received() <= o.quantity_ordered());
                prop_assert_eq!(
                    o.status(),
                    OrderStatus::derive(o.quantity_received(), o.quantity_ordered())
                );
            }
        }
    }
}
