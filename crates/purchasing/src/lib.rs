//! Purchasing domain module: purchase orders and how incoming stock is
//! credited against them.
//!
//! Pure domain logic; persisting orders is the infra crate's job.

pub mod allocation;
pub mod order;

pub use allocation::{Allocation, AllocationPlan, allocate, plan};
pub use order::{NewPurchaseOrder, OrderDetails, OrderStatus, PurchaseOrder};
