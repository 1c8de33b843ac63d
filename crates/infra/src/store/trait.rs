use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use stockledger_core::{OrderId, PartId};
use stockledger_inventory::{HistoryEntry, Part};
use stockledger_purchasing::PurchaseOrder;

/// Storage operation error.
///
/// These are **infrastructure errors** (transport, locking, integrity) as
/// opposed to domain errors (validation, invariants).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Lock timeout, deadlock, serialization failure or duplicate key.
    /// The whole operation may be retried.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    /// A row the transaction expected to exist is missing.
    #[error("row not found: {0}")]
    NotFound(String),

    /// A check or foreign-key constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Connection, pool or other transport failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Part rows, as seen from inside a transaction.
#[async_trait]
pub trait PartRepository: Send {
    /// Read a part and hold its row lock until commit/rollback.
    async fn lock_part(&mut self, part_id: PartId) -> Result<Option<Part>, StoreError>;

    async fn insert_part(&mut self, part: &Part) -> Result<(), StoreError>;

    async fn update_part(&mut self, part: &Part) -> Result<(), StoreError>;
}

/// Purchase order rows, as seen from inside a transaction.
#[async_trait]
pub trait OrderRepository: Send {
    /// Open (pending / partially received) orders of `part_id`, locked,
    /// oldest `ordered_at` first with ties broken by id.
    async fn lock_open_orders(&mut self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError>;

    async fn update_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError>;
}

/// Audit history, as seen from inside a transaction.
///
/// Append-only: there is deliberately no way to change or remove an entry.
#[async_trait]
pub trait HistoryRepository: Send {
    async fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), StoreError>;
}

/// One atomic unit of work across parts, orders and history.
///
/// Dropping a transaction without calling [`LedgerTransaction::commit`] rolls
/// it back.
#[async_trait]
pub trait LedgerTransaction: PartRepository + OrderRepository + HistoryRepository {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transactional storage for the stock ledger.
///
/// ## Ownership
///
/// The ledger is the only writer of parts, orders and history. The read
/// methods here are for everyone else (screens, reports) and only ever see
/// committed state. `insert_order` exists for administrative order entry;
/// the ledger itself never creates orders.
///
/// ## Locking
///
/// Implementations must make [`PartRepository::lock_part`] and
/// [`OrderRepository::lock_open_orders`] exclusive for the life of the
/// transaction, so two concurrent quantity changes on one part serialize
/// instead of losing an update.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;

    async fn get_part(&self, part_id: PartId) -> Result<Option<Part>, StoreError>;

    /// All parts, ordered by name.
    async fn list_parts(&self) -> Result<Vec<Part>, StoreError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, StoreError>;

    /// Every order of a part regardless of status, oldest first.
    async fn orders_for_part(&self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError>;

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError>;

    /// History of a part, newest first.
    async fn history_for_part(&self, part_id: PartId) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn get_part(&self, part_id: PartId) -> Result<Option<Part>, StoreError> {
        (**self).get_part(part_id).await
    }

    async fn list_parts(&self) -> Result<Vec<Part>, StoreError> {
        (**self).list_parts().await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        (**self).get_order(order_id).await
    }

    async fn orders_for_part(&self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError> {
        (**self).orders_for_part(part_id).await
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        (**self).insert_order(order).await
    }

    async fn history_for_part(&self, part_id: PartId) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history_for_part(part_id).await
    }
}
