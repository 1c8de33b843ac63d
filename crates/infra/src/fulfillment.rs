//! Crediting received stock to a part's outstanding purchase orders.

use chrono::{DateTime, Utc};
use tracing::debug;

use stockledger_core::{PartId, Quantity};
use stockledger_purchasing::{AllocationPlan, allocate, plan};

use crate::store::{LedgerStore, OrderRepository, StoreError};

/// Spreads an incoming amount over open orders, oldest first.
///
/// Runs inside the caller's transaction: the orders it reads are locked and
/// the orders it changes are written back through the same repository, so a
/// later failure in that transaction undoes the allocation too.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderFulfillmentEngine;

impl OrderFulfillmentEngine {
    pub fn new() -> Self {
        Self
    }

    /// Allocate `available` to the open orders of `part_id` and persist every
    /// order that received stock.
    ///
    /// Zero `available` is a no-op that does not touch storage.
    pub async fn fulfill<R>(
        &self,
        repo: &mut R,
        part_id: PartId,
        available: Quantity,
        now: DateTime<Utc>,
    ) -> Result<AllocationPlan, StoreError>
    where
        R: OrderRepository + ?Sized,
    {
        if available.is_zero() {
            return Ok(AllocationPlan::default());
        }

        let mut orders = repo.lock_open_orders(part_id).await?;
        let result = allocate(&mut orders, part_id, available, now);

        for allocation in &result.allocations {
            let order = orders
                .iter()
                .find(|o| o.id_typed() == allocation.order_id)
                .ok_or_else(|| StoreError::NotFound(format!("order {}", allocation.order_id)))?;
            repo.update_order(order).await?;
            debug!(
                part_id = %part_id,
                order_id = %allocation.order_id,
                allocated = %allocation.allocated,
                quantity_received = %allocation.quantity_received,
                status = allocation.resulting_status.as_str(),
                "allocated stock to purchase order"
            );
        }

        if !result.leftover.is_zero() {
            debug!(part_id = %part_id, leftover = %result.leftover, "stock left after open orders");
        }

        Ok(result)
    }

    /// What [`Self::fulfill`] would do with `available`, from committed state.
    pub async fn plan<S>(
        &self,
        store: &S,
        part_id: PartId,
        available: Quantity,
    ) -> Result<AllocationPlan, StoreError>
    where
        S: LedgerStore + ?Sized,
    {
        if available.is_zero() {
            return Ok(AllocationPlan::default());
        }
        let orders = store.orders_for_part(part_id).await?;
        Ok(plan(&orders, part_id, available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use stockledger_core::OrderId;
    use stockledger_purchasing::{NewPurchaseOrder, OrderStatus, PurchaseOrder};

    /// Records every call so tests can assert on storage traffic.
    #[derive(Default)]
    struct RecordingOrders {
        orders: Vec<PurchaseOrder>,
        locks: usize,
        updates: Vec<PurchaseOrder>,
    }

    #[async_trait]
    impl OrderRepository for RecordingOrders {
        async fn lock_open_orders(&mut self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError> {
            self.locks += 1;
            let mut open: Vec<PurchaseOrder> = self
                .orders
                .iter()
                .filter(|o| o.part_id() == part_id && o.is_open())
                .cloned()
                .collect();
            open.sort_by_key(|o| (o.ordered_at(), o.id_typed()));
            Ok(open)
        }

        async fn update_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError> {
            self.updates.push(order.clone());
            Ok(())
        }
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::days(n)
    }

    fn order(part_id: PartId, units: u32, at: DateTime<Utc>) -> PurchaseOrder {
        PurchaseOrder::place(
            OrderId::new(),
            NewPurchaseOrder::new(part_id, Quantity::from_units(units), at),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fills_oldest_order_then_next() {
        let part = PartId::new();
        let o1 = order(part, 10, day(1));
        let o2 = order(part, 5, day(2));
        let mut repo = RecordingOrders {
            orders: vec![o2.clone(), o1.clone()],
            ..Default::default()
        };

        let result = OrderFulfillmentEngine::new()
            .fulfill(&mut repo, part, Quantity::from_units(12), day(3))
            .await
            .unwrap();

        assert_eq!(repo.updates.len(), 2);
        assert_eq!(repo.updates[0].id_typed(), o1.id_typed());
        assert_eq!(repo.updates[0].status(), OrderStatus::Completed);
        assert_eq!(repo.updates[1].id_typed(), o2.id_typed());
        assert_eq!(repo.updates[1].quantity_received(), Quantity::from_units(2));
        assert_eq!(repo.updates[1].status(), OrderStatus::PartiallyReceived);
        assert_eq!(result.last_order_id(), Some(o2.id_typed()));
    }

    #[tokio::test]
    async fn zero_available_never_reads_orders() {
        let part = PartId::new();
        let mut repo = RecordingOrders {
            orders: vec![order(part, 3, day(1))],
            ..Default::default()
        };

        let result = OrderFulfillmentEngine::new()
            .fulfill(&mut repo, part, Quantity::ZERO, day(2))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(repo.locks, 0);
        assert!(repo.updates.is_empty());
    }

    #[tokio::test]
    async fn no_open_orders_leaves_everything_over() {
        let part = PartId::new();
        let mut repo = RecordingOrders::default();

        let result = OrderFulfillmentEngine::new()
            .fulfill(&mut repo, part, Quantity::from_units(4), day(0))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.leftover, Quantity::from_units(4));
    }
}
