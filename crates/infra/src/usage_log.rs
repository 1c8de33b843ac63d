//! Best-effort usage records for activity reporting.
//!
//! The ledger sends one record after every committed removal. A sink failure
//! is logged and dropped; it never fails or rolls back the removal.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ActorId, PartId, Quantity};

/// One consumption of stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub part_id: PartId,
    pub part_name: String,
    pub quantity: Quantity,
    pub unit: String,
    pub actor: ActorId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UsageLogError {
    #[error("usage log unavailable: {0}")]
    Unavailable(String),

    #[error("usage sink rejected record: {0}")]
    Sink(String),
}

#[async_trait]
pub trait UsageLog: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageLogError>;
}

#[async_trait]
impl<L> UsageLog for Arc<L>
where
    L: UsageLog + ?Sized,
{
    async fn record(&self, record: UsageRecord) -> Result<(), UsageLogError> {
        (**self).record(record).await
    }
}

/// Keeps records in memory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryUsageLog {
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UsageLog for InMemoryUsageLog {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageLogError> {
        self.records
            .lock()
            .map_err(|_| UsageLogError::Unavailable("usage log lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}

/// Emits each record as a structured `info` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageLog;

#[async_trait]
impl UsageLog for TracingUsageLog {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageLogError> {
        tracing::info!(
            target: "stockledger::usage",
            part_id = %record.part_id,
            part_name = %record.part_name,
            quantity = %record.quantity,
            unit = %record.unit,
            actor = %record.actor,
            reason = record.reason.as_deref().unwrap_or(""),
            occurred_at = %record.occurred_at,
            "part used"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> UsageRecord {
        UsageRecord {
            part_id: PartId::new(),
            part_name: "Epoxy".to_string(),
            quantity: Quantity::from_units(2),
            unit: "tubes".to_string(),
            actor: ActorId::new("maker").unwrap(),
            reason: Some("Chair repair".to_string()),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn in_memory_log_keeps_records_in_order() {
        let log = InMemoryUsageLog::new();
        let first = record();
        let second = record();
        log.record(first.clone()).await.unwrap();
        log.record(second.clone()).await.unwrap();
        assert_eq!(log.records(), vec![first, second]);
    }

    #[tokio::test]
    async fn tracing_log_accepts_records() {
        assert!(TracingUsageLog.record(record()).await.is_ok());
    }
}
