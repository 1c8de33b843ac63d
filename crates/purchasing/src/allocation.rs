//! First-come-first-served crediting of incoming stock to open orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{OrderId, PartId, Quantity};

use crate::order::{OrderStatus, PurchaseOrder};

/// One order's share of an incoming amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub order_id: OrderId,
    pub allocated: Quantity,
    pub quantity_received: Quantity,
    pub resulting_status: OrderStatus,
}

/// Result of spreading an amount over a part's open orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// In the order the orders were served (oldest first).
    pub allocations: Vec<Allocation>,
    /// Amount left after every eligible order was satisfied.
    pub leftover: Quantity,
}

impl AllocationPlan {
    /// Id of the last order that received stock.
    pub fn last_order_id(&self) -> Option<OrderId> {
        self.allocations.last().map(|a| a.order_id)
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Eligible orders for `part_id`, oldest first (ties broken by id).
fn serving_order(orders: &[PurchaseOrder], part_id: PartId) -> Vec<usize> {
    let mut idx: Vec<usize> = orders
        .iter()
        .enumerate()
        .filter(|(_, o)| o.part_id() == part_id && o.is_open())
        .map(|(i, _)| i)
        .collect();
    idx.sort_by(|&a, &b| {
        orders[a]
            .ordered_at()
            .cmp(&orders[b].ordered_at())
            .then_with(|| orders[a].id_typed().cmp(&orders[b].id_typed()))
    });
    idx
}

/// Work out the allocation without touching the orders.
pub fn plan(orders: &[PurchaseOrder], part_id: PartId, available: Quantity) -> AllocationPlan {
    let mut scratch: Vec<PurchaseOrder> = orders.to_vec();
    allocate(&mut scratch, part_id, available, Utc::now())
}

/// Credit `available` to the open orders of `part_id`, oldest first,
/// mutating them in place.
///
/// Orders for other parts and closed orders are skipped. Stops as soon as the
/// amount is used up; whatever remains is reported as `leftover`.
pub fn allocate(
    orders: &mut [PurchaseOrder],
    part_id: PartId,
    available: Quantity,
    now: DateTime<Utc>,
) -> AllocationPlan {
    let mut remaining = available;
    let mut allocations = Vec::new();

    for i in serving_order(orders, part_id) {
        if remaining.is_zero() {
            break;
        }
        let order = &mut orders[i];
        let allocated = order.receive(remaining, now);
        if allocated.is_zero() {
            continue;
        }
        remaining = remaining.saturating_sub(allocated);
        allocations.push(Allocation {
            order_id: order.id_typed(),
            allocated,
            quantity_received: order.quantity_received(),
            resulting_status: order.status(),
        });
    }

    AllocationPlan {
        allocations,
        leftover: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::NewPurchaseOrder;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn q(units: u32) -> Quantity {
        Quantity::from_units(units)
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::days(n)
    }

    fn order(part_id: PartId, ordered: u32, at: DateTime<Utc>) -> PurchaseOrder {
        PurchaseOrder::place(OrderId::new(), NewPurchaseOrder::new(part_id, q(ordered), at)).unwrap()
    }

    #[test]
    fn oldest_order_is_served_first() {
        let part = PartId::new();
        // Stored newest-first to prove sorting happens.
        let mut orders = vec![order(part, 5, day(2)), order(part, 10, day(1))];
        let o1 = orders[1].id_typed();
        let o2 = orders[0].id_typed();

        let plan = allocate(&mut orders, part, q(12), day(3));

        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].order_id, o1);
        assert_eq!(plan.allocations[0].allocated, q(10));
        assert_eq!(plan.allocations[0].resulting_status, OrderStatus::Completed);
        assert_eq!(plan.allocations[1].order_id, o2);
        assert_eq!(plan.allocations[1].allocated, q(2));
        assert_eq!(plan.allocations[1].resulting_status, OrderStatus::PartiallyReceived);
        assert_eq!(plan.leftover, Quantity::ZERO);
        assert_eq!(plan.last_order_id(), Some(o2));
    }

    #[test]
    fn surplus_is_leftover() {
        let part = PartId::new();
        let mut orders = vec![order(part, 3, day(1))];
        let plan = allocate(&mut orders, part, q(8), day(2));
        assert_eq!(plan.leftover, q(5));
        assert_eq!(orders[0].status(), OrderStatus::Completed);
    }

    #[test]
    fn zero_available_changes_nothing() {
        let part = PartId::new();
        let mut orders = vec![order(part, 3, day(1)), order(part, 4, day(2))];
        let before = orders.clone();

        let plan = allocate(&mut orders, part, Quantity::ZERO, day(3));

        assert!(plan.is_empty());
        assert_eq!(orders, before);
    }

    #[test]
    fn other_parts_and_closed_orders_are_skipped() {
        let part = PartId::new();
        let mut closed = order(part, 2, day(0));
        closed.receive(q(2), day(0));
        let mut orders = vec![closed, order(PartId::new(), 9, day(1)), order(part, 4, day(2))];
        let target = orders[2].id_typed();

        let plan = allocate(&mut orders, part, q(3), day(3));

        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].order_id, target);
        assert_eq!(orders[1].quantity_received(), Quantity::ZERO);
    }

    #[test]
    fn plan_is_a_dry_run() {
        let part = PartId::new();
        let orders = vec![order(part, 3, day(1))];
        let p = plan(&orders, part, q(2));
        assert_eq!(p.allocations[0].allocated, q(2));
        assert_eq!(orders[0].quantity_received(), Quantity::ZERO);
    }

    proptest! {
        /// Property: allocated amounts plus leftover always equal the input,
        /// and no order is ever over-filled.
        #[test]
        fn allocation_conserves_amount(
            sizes in prop::collection::vec(1u32..50, 0..8),
            available in 0u32..300
        ) {
            let part = PartId::new();
            let mut orders: Vec<PurchaseOrder> = sizes
                .iter()
                .enumerate()
                .map(|(i, s)| order(part, *s, day(i as i64)))
                .collect();

            let result = allocate(&mut orders, part, q(available), day(100));

            let mut total = result.leftover;
            for a in &result.allocations {
                total = total.checked_add(a.allocated).unwrap();
            }
            prop_assert_eq!(total, q(available));
            for o in &orders {
                prop_assert!(o.quantity_received() <= o.quantity_ordered());
            }
        }
    }
}
