//! Infrastructure layer: storage adapters, the stock ledger, collaborators, config.

pub mod actor;
pub mod config;
pub mod fulfillment;
pub mod ledger;
pub mod store;
pub mod usage_log;


pub use actor::{ActorProvider, StaticActorProvider, require_actor};
pub use config::{ConfigError, LedgerConfig};
pub use fulfillment::OrderFulfillmentEngine;
pub use ledger::{ActingLedger, LedgerError, StockChangeReceipt, StockLedger, StockReport};
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};
pub use usage_log::{InMemoryUsageLog, TracingUsageLog, UsageLog, UsageLogError, UsageRecord};
