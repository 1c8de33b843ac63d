use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockledger_core::{HistoryEntryId, OrderId, PartId};
use stockledger_inventory::{HistoryEntry, Part};
use stockledger_purchasing::PurchaseOrder;

use super::r#trait::{
    HistoryRepository, LedgerStore, LedgerTransaction, OrderRepository, PartRepository, StoreError,
};

#[derive(Debug, Default)]
struct LedgerState {
    parts: HashMap<PartId, Part>,
    orders: HashMap<OrderId, PurchaseOrder>,
    history: Vec<HistoryEntry>,
    history_ids: HashSet<HistoryEntryId>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. A transaction takes an exclusive lock on the whole
/// store and stages only the rows it writes, so locking is coarser than
/// Postgres row locks but gives the same guarantees: no lost updates, and
/// readers only see committed state.
///
/// Commit cost is proportional to the rows a transaction touched.
/// `history_for_part` scans every entry, which is fine at test scale.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of history entries across all parts.
    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }
}

fn sort_oldest_first(orders: &mut [PurchaseOrder]) {
    orders.sort_by(|a, b| {
        a.ordered_at()
            .cmp(&b.ordered_at())
            .then_with(|| a.id_typed().cmp(&b.id_typed()))
    });
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            guard,
            parts: HashMap::new(),
            orders: HashMap::new(),
            history: Vec::new(),
        }))
    }

    async fn get_part(&self, part_id: PartId) -> Result<Option<Part>, StoreError> {
        Ok(self.state.lock().await.parts.get(&part_id).cloned())
    }

    async fn list_parts(&self) -> Result<Vec<Part>, StoreError> {
        let state = self.state.lock().await;
        let mut parts: Vec<Part> = state.parts.values().cloned().collect();
        parts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(parts)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn orders_for_part(&self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<PurchaseOrder> = state
            .orders
            .values()
            .filter(|o| o.part_id() == part_id)
            .cloned()
            .collect();
        sort_oldest_first(&mut orders);
        Ok(orders)
    }

    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.parts.contains_key(&order.part_id()) {
            return Err(StoreError::Constraint(format!(
                "order {} references unknown part {}",
                order.id_typed(),
                order.part_id()
            )));
        }
        if state.orders.contains_key(&order.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id_typed()
            )));
        }
        state.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }

    async fn history_for_part(&self, part_id: PartId) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.lock().await;
        // Appended in commit order; newest first means walking backwards.
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|e| e.part_id == part_id)
            .cloned()
            .collect())
    }
}

/// Staged writes over an exclusively held store.
///
/// Reads see staged rows first, then committed ones.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    parts: HashMap<PartId, Part>,
    orders: HashMap<OrderId, PurchaseOrder>,
    history: Vec<HistoryEntry>,
}

impl InMemoryTransaction {
    fn part(&self, part_id: PartId) -> Option<&Part> {
        self.parts.get(&part_id).or_else(|| self.guard.parts.get(&part_id))
    }

    fn order(&self, order_id: OrderId) -> Option<&PurchaseOrder> {
        self.orders.get(&order_id).or_else(|| self.guard.orders.get(&order_id))
    }
}

#[async_trait]
impl PartRepository for InMemoryTransaction {
    async fn lock_part(&mut self, part_id: PartId) -> Result<Option<Part>, StoreError> {
        Ok(self.part(part_id).cloned())
    }

    async fn insert_part(&mut self, part: &Part) -> Result<(), StoreError> {
        if self.part(part.id).is_some() {
            return Err(StoreError::Conflict(format!("part {} already exists", part.id)));
        }
        self.parts.insert(part.id, part.clone());
        Ok(())
    }

    async fn update_part(&mut self, part: &Part) -> Result<(), StoreError> {
        if self.part(part.id).is_none() {
            return Err(StoreError::NotFound(format!("part {}", part.id)));
        }
        self.parts.insert(part.id, part.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryTransaction {
    async fn lock_open_orders(&mut self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError> {
        // Orders are only inserted outside transactions, so every staged id is
        // also a committed one.
        let mut orders: Vec<PurchaseOrder> = self
            .guard
            .orders
            .keys()
            .filter_map(|id| self.order(*id))
            .filter(|o| o.part_id() == part_id && o.is_open())
            .cloned()
            .collect();
        sort_oldest_first(&mut orders);
        Ok(orders)
    }

    async fn update_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError> {
        if self.order(order.id_typed()).is_none() {
            return Err(StoreError::NotFound(format!("order {}", order.id_typed())));
        }
        self.orders.insert(order.id_typed(), order.clone());
        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for InMemoryTransaction {
    async fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), StoreError> {
        if self.part(entry.part_id).is_none() {
            return Err(StoreError::Constraint(format!(
                "history entry references unknown part {}",
                entry.part_id
            )));
        }
        if self.guard.history_ids.contains(&entry.id) || self.history.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Conflict(format!(
                "history entry {} already exists",
                entry.id
            )));
        }
        self.history.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction {
            mut guard,
            parts,
            orders,
            history,
        } = *self;
        guard.parts.extend(parts);
        guard.orders.extend(orders);
        for entry in history {
            guard.history_ids.insert(entry.id);
            guard.history.push(entry);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Dropping the guard discards the staged rows.
        Ok(())
    }
}
