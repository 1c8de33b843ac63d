//! Stock change notifications.
//!
//! The ledger is the only writer of parts, orders and history. Readers that
//! cache those rows (screens, reports) subscribe here and drop their cached
//! copy of a part when a [`StockEvent`] naming it arrives.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod stock;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use stock::StockEvent;
