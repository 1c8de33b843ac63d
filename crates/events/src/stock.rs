use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{HistoryEntryId, OrderId, PartId, Quantity};

use crate::event::Event;

/// Committed change to stock data, keyed by part.
///
/// Subscribers treat every variant as "the cached copy of `part_id` is stale".
/// The extra fields let a subscriber patch its view instead of re-reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    PartCreated {
        part_id: PartId,
        history_entry_id: HistoryEntryId,
        quantity: Quantity,
        occurred_at: DateTime<Utc>,
    },
    PartUpdated {
        part_id: PartId,
        history_entry_id: HistoryEntryId,
        occurred_at: DateTime<Utc>,
    },
    QuantityChanged {
        part_id: PartId,
        history_entry_id: HistoryEntryId,
        old_quantity: Quantity,
        new_quantity: Quantity,
        occurred_at: DateTime<Utc>,
    },
    OrderAllocated {
        part_id: PartId,
        order_id: OrderId,
        allocated: Quantity,
        occurred_at: DateTime<Utc>,
    },
}

impl StockEvent {
    /// Cache key this event invalidates.
    pub fn part_id(&self) -> PartId {
        match self {
            StockEvent::PartCreated { part_id, .. }
            | StockEvent::PartUpdated { part_id, .. }
            | StockEvent::QuantityChanged { part_id, .. }
            | StockEvent::OrderAllocated { part_id, .. } => *part_id,
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::PartCreated { .. } => "stock.part.created",
            StockEvent::PartUpdated { .. } => "stock.part.updated",
            StockEvent::QuantityChanged { .. } => "stock.part.quantity_changed",
            StockEvent::OrderAllocated { .. } => "stock.order.allocated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::PartCreated { occurred_at, .. }
            | StockEvent::PartUpdated { occurred_at, .. }
            | StockEvent::QuantityChanged { occurred_at, .. }
            | StockEvent::OrderAllocated { occurred_at, .. } => *occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_names_its_part() {
        let part_id = PartId::new();
        let now = Utc::now();
        let events = [
            StockEvent::PartCreated {
                part_id,
                history_entry_id: HistoryEntryId::new(),
                quantity: Quantity::from_units(3),
                occurred_at: now,
            },
            StockEvent::OrderAllocated {
                part_id,
                order_id: OrderId::new(),
                allocated: Quantity::from_units(1),
                occurred_at: now,
            },
        ];
        assert!(events.iter().all(|e| e.part_id() == part_id));
        assert!(events.iter().all(|e| e.occurred_at() == now));
        assert_eq!(events[1].event_type(), "stock.order.allocated");
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = StockEvent::PartUpdated {
            part_id: PartId::new(),
            history_entry_id: HistoryEntryId::new(),
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "part_updated");
    }
}
