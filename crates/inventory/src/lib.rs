//! Inventory domain module: parts, their audit history and stock levels.
//!
//! This crate contains business rules for stock items, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod history;
pub mod level;
pub mod part;
pub mod quantity;

pub use history::{ChangeType, HistoryEntry, MANUAL_CORRECTION_REASON};
pub use level::{StockLevel, classify};
pub use part::{
    DEFAULT_UNIT, FieldChanges, Part, PartFields, PartInput, QuantityDelta, StorageLocation,
};
pub use quantity::{QuantityChangeRequest, QuantityDirection};
