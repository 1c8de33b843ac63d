//! Stock ledger: the single writer of parts, purchase orders and history.
//!
//! ## Execution Flow
//!
//! ```text
//! request
//!   ↓
//! 1. Validate input (no IO yet)
//!   ↓
//! 2. Begin transaction, lock the part row
//!   ↓
//! 3. Apply the change to the part (may fail: not found / insufficient)
//!   ↓
//! 4. On quantity add: credit open purchase orders (same transaction)
//!   ↓
//! 5. Append exactly one history entry
//!   ↓
//! 6. Commit (any failure above rolls everything back)
//!   ↓
//! 7. Publish StockEvents, record usage on removal (best-effort)
//! ```
//!
//! A lock conflict anywhere in 2–6 re-runs the whole operation from step 2,
//! up to `max_conflict_retries` times.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stockledger_core::{ActorId, DomainError, PartId, Quantity};
use stockledger_events::{Event, EventBus, StockEvent};
use stockledger_inventory::{
    HistoryEntry, Part, PartFields, PartInput, QuantityChangeRequest, QuantityDirection, StockLevel,
};
use stockledger_purchasing::{Allocation, AllocationPlan};

use crate::actor::{ActorProvider, require_actor};
use crate::config::{DEFAULT_MAX_CONFLICT_RETRIES, LedgerConfig};
use crate::fulfillment::OrderFulfillmentEngine;
use crate::store::{
    HistoryRepository, LedgerStore, LedgerTransaction, PartRepository, StoreError,
};
use crate::usage_log::{UsageLog, UsageRecord};

/// Errors returned by ledger operations.
///
/// Every variant except `Persistence` and `Conflict` is detected before
/// anything is written.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `part_id` is `None` only for a part that does not exist yet.
    #[error("validation failed on `{field}`{}: {message}", part_context(.part_id))]
    Validation {
        part_id: Option<PartId>,
        field: &'static str,
        message: String,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("insufficient quantity for part {part_id}: {available} on hand, {requested} requested")]
    InsufficientQuantity {
        part_id: PartId,
        available: Quantity,
        requested: Quantity,
    },

    #[error("no authenticated actor; mutations require one")]
    MissingActor,

    #[error("{operation} still conflicting after {attempts} attempts: {reason}")]
    Conflict {
        operation: &'static str,
        attempts: u32,
        reason: String,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl LedgerError {
    fn part_not_found(part_id: PartId) -> Self {
        LedgerError::NotFound {
            entity: "part",
            id: part_id.to_string(),
        }
    }

    /// Attach part context to a domain error.
    pub fn from_domain(err: DomainError, part_id: PartId) -> Self {
        match err {
            DomainError::NotFound => LedgerError::part_not_found(part_id),
            DomainError::InsufficientQuantity {
                available,
                requested,
            } => LedgerError::InsufficientQuantity {
                part_id,
                available,
                requested,
            },
            other => LedgerError::from_input(other, Some(part_id)),
        }
    }

    /// Map a domain error raised while checking input.
    pub fn from_input(err: DomainError, part_id: Option<PartId>) -> Self {
        match err {
            DomainError::Validation { field, message } => LedgerError::Validation {
                part_id,
                field,
                message,
            },
            DomainError::InvalidId(message) => LedgerError::Validation {
                part_id,
                field: "id",
                message,
            },
            DomainError::InvariantViolation(msg) => LedgerError::Invariant(msg),
            DomainError::Conflict(msg) => LedgerError::Persistence(StoreError::Conflict(msg)),
            other @ (DomainError::NotFound | DomainError::InsufficientQuantity { .. }) => {
                LedgerError::Invariant(other.to_string())
            }
        }
    }

    pub fn part_id(&self) -> Option<PartId> {
        match self {
            LedgerError::Validation { part_id, .. } => *part_id,
            LedgerError::InsufficientQuantity { part_id, .. } => Some(*part_id),
            _ => None,
        }
    }

    /// Input problems, as opposed to state or storage problems.
    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation { .. })
    }
}

/// Outcome of a quantity change, including every order it credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChangeReceipt {
    pub part: Part,
    pub history_entry: HistoryEntry,
    /// Oldest order first; empty for removals.
    pub allocations: Vec<Allocation>,
}

/// A part with its derived stock level and open purchase orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReport {
    pub part: Part,
    pub level: StockLevel,
    /// Quantity still expected from suppliers.
    pub on_order: Quantity,
    pub open_orders: usize,
}

pub struct StockLedger<S, B, U> {
    store: S,
    bus: B,
    usage_log: U,
    engine: OrderFulfillmentEngine,
    max_conflict_retries: u32,
}

impl<S, B, U> StockLedger<S, B, U>
where
    S: LedgerStore,
    B: EventBus<StockEvent>,
    U: UsageLog,
{
    pub fn new(store: S, bus: B, usage_log: U) -> Self {
        Self {
            store,
            bus,
            usage_log,
            engine: OrderFulfillmentEngine::new(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_config(mut self, config: &LedgerConfig) -> Self {
        self.max_conflict_retries = config.max_conflict_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Bind the ledger to whoever `provider` says is signed in.
    pub fn acting_as(&self, provider: &dyn ActorProvider) -> Result<ActingLedger<'_, S, B, U>, LedgerError> {
        let actor = require_actor(provider)?;
        Ok(ActingLedger { ledger: self, actor })
    }

    /// Create a part and its `create` history entry atomically.
    #[instrument(skip(self, input, actor), fields(actor = %actor, name = %input.name), err)]
    pub async fn create(&self, input: PartInput, actor: &ActorId) -> Result<Part, LedgerError> {
        input
            .validate()
            .map_err(|e| LedgerError::from_input(e, None))?;

        let (part, entry) = self
            .with_conflict_retry("create", || self.try_create(input.clone(), actor))
            .await?;

        info!(part_id = %part.id, quantity = %part.current_quantity, "part created");
        self.publish(StockEvent::PartCreated {
            part_id: part.id,
            history_entry_id: entry.id,
            quantity: part.current_quantity,
            occurred_at: entry.changed_at,
        });
        Ok(part)
    }

    async fn try_create(&self, input: PartInput, actor: &ActorId) -> Result<(Part, HistoryEntry), LedgerError> {
        let part_id = PartId::new();
        let part = Part::from_input(part_id, input, Utc::now())
            .map_err(|e| LedgerError::from_input(e, None))?;
        let entry = HistoryEntry::created(&part, actor);

        let mut tx = self.store.begin().await?;
        let outcome = async {
            tx.insert_part(&part).await?;
            tx.append_history(&entry).await?;
            Ok::<_, LedgerError>(())
        }
        .await;
        finish(tx, outcome).await?;
        Ok((part, entry))
    }

    /// Edit descriptive fields, optionally overriding the quantity.
    ///
    /// Always writes one `update` history entry, even if nothing differed.
    #[instrument(skip(self, edits, actor), fields(part_id = %part_id, actor = %actor), err)]
    pub async fn update(&self, part_id: PartId, edits: PartFields, actor: &ActorId) -> Result<Part, LedgerError> {
        edits
            .validate()
            .map_err(|e| LedgerError::from_domain(e, part_id))?;

        let (part, entry) = self
            .with_conflict_retry("update", || self.try_update(part_id, edits.clone(), actor))
            .await?;

        info!(part_id = %part.id, change_reason = ?entry.change_reason, "part updated");
        self.publish(StockEvent::PartUpdated {
            part_id: part.id,
            history_entry_id: entry.id,
            occurred_at: entry.changed_at,
        });
        Ok(part)
    }

    async fn try_update(
        &self,
        part_id: PartId,
        edits: PartFields,
        actor: &ActorId,
    ) -> Result<(Part, HistoryEntry), LedgerError> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut part = tx
                .lock_part(part_id)
                .await?
                .ok_or_else(|| LedgerError::part_not_found(part_id))?;
            let changes = part
                .apply_fields(edits, Utc::now())
                .map_err(|e| LedgerError::from_domain(e, part_id))?;
            tx.update_part(&part).await?;
            let entry = HistoryEntry::updated(&part, &changes, actor);
            tx.append_history(&entry).await?;
            Ok::<_, LedgerError>((part, entry))
        }
        .await;
        finish(tx, outcome).await
    }

    /// Add or remove stock. See [`Self::change_quantity_with_receipt`].
    pub async fn change_quantity(
        &self,
        request: QuantityChangeRequest,
        actor: &ActorId,
    ) -> Result<Part, LedgerError> {
        Ok(self.change_quantity_with_receipt(request, actor).await?.part)
    }

    /// Add or remove stock, crediting open purchase orders on add.
    ///
    /// The part write, order writes and history entry commit together or not
    /// at all. A removal that would go below zero fails with
    /// [`LedgerError::InsufficientQuantity`] and writes nothing.
    #[instrument(
        skip(self, request, actor),
        fields(
            part_id = %request.part_id,
            direction = %request.direction,
            amount = %request.amount,
            actor = %actor
        ),
        err
    )]
    pub async fn change_quantity_with_receipt(
        &self,
        request: QuantityChangeRequest,
        actor: &ActorId,
    ) -> Result<StockChangeReceipt, LedgerError> {
        let part_id = request.part_id;
        let request = request
            .validate()
            .map_err(|e| LedgerError::from_domain(e, part_id))?;

        let receipt = self
            .with_conflict_retry("change_quantity", || self.try_change_quantity(&request, actor))
            .await?;

        let entry = &receipt.history_entry;
        info!(
            part_id = %part_id,
            old_quantity = ?entry.old_quantity,
            new_quantity = ?entry.new_quantity,
            orders_credited = receipt.allocations.len(),
            "quantity changed"
        );

        if let (Some(old_quantity), Some(new_quantity)) = (entry.old_quantity, entry.new_quantity) {
            self.publish(StockEvent::QuantityChanged {
                part_id,
                history_entry_id: entry.id,
                old_quantity,
                new_quantity,
                occurred_at: entry.changed_at,
            });
        }
        for allocation in &receipt.allocations {
            self.publish(StockEvent::OrderAllocated {
                part_id,
                order_id: allocation.order_id,
                allocated: allocation.allocated,
                occurred_at: entry.changed_at,
            });
        }

        if request.direction == QuantityDirection::Remove {
            self.record_usage(&receipt.part, &request, actor, entry.changed_at).await;
        }

        Ok(receipt)
    }

    async fn try_change_quantity(
        &self,
        request: &QuantityChangeRequest,
        actor: &ActorId,
    ) -> Result<StockChangeReceipt, LedgerError> {
        let part_id = request.part_id;
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut part = tx
                .lock_part(part_id)
                .await?
                .ok_or_else(|| LedgerError::part_not_found(part_id))?;
            let delta = part
                .apply_quantity_change(request.direction, request.amount, now)
                .map_err(|e| LedgerError::from_domain(e, part_id))?;
            tx.update_part(&part).await?;

            let plan = match request.direction {
                QuantityDirection::Add => {
                    self.engine
                        .fulfill(tx.as_mut(), part_id, request.amount, now)
                        .await?
                }
                QuantityDirection::Remove => AllocationPlan::default(),
            };

            // One entry per mutation; only the last credited order is referenced.
            let entry = HistoryEntry::quantity_changed(&part, request, &delta, plan.last_order_id(), actor);
            tx.append_history(&entry).await?;

            Ok::<_, LedgerError>(StockChangeReceipt {
                part,
                history_entry: entry,
                allocations: plan.allocations,
            })
        }
        .await;
        finish(tx, outcome).await
    }

    pub async fn part(&self, part_id: PartId) -> Result<Part, LedgerError> {
        self.store
            .get_part(part_id)
            .await?
            .ok_or_else(|| LedgerError::part_not_found(part_id))
    }

    /// History of a part, newest first.
    pub async fn history(&self, part_id: PartId) -> Result<Vec<HistoryEntry>, LedgerError> {
        self.part(part_id).await?;
        Ok(self.store.history_for_part(part_id).await?)
    }

    #[instrument(skip(self), fields(part_id = %part_id), err)]
    pub async fn stock_report(&self, part_id: PartId) -> Result<StockReport, LedgerError> {
        let part = self.part(part_id).await?;
        let orders = self.store.orders_for_part(part_id).await?;

        let mut on_order = Quantity::ZERO;
        let mut open_orders = 0;
        for order in orders.iter().filter(|o| o.is_open()) {
            open_orders += 1;
            on_order = on_order.checked_add(order.outstanding()).ok_or_else(|| {
                LedgerError::Invariant(format!("outstanding quantity overflow for part {part_id}"))
            })?;
        }

        Ok(StockReport {
            level: part.stock_level(),
            part,
            on_order,
            open_orders,
        })
    }

    /// Parts at or below their minimum, by name.
    pub async fn low_stock(&self) -> Result<Vec<Part>, LedgerError> {
        Ok(self
            .store
            .list_parts()
            .await?
            .into_iter()
            .filter(|p| p.stock_level() == StockLevel::Low)
            .collect())
    }

    /// How `amount` of incoming stock would be spread, without writing.
    pub async fn plan_fulfillment(&self, part_id: PartId, amount: Quantity) -> Result<AllocationPlan, LedgerError> {
        self.part(part_id).await?;
        Ok(self.engine.plan(&self.store, part_id, amount).await?)
    }

    async fn with_conflict_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match attempt().await {
                Err(LedgerError::Persistence(StoreError::Conflict(reason))) => {
                    if attempts > self.max_conflict_retries {
                        return Err(LedgerError::Conflict {
                            operation,
                            attempts,
                            reason,
                        });
                    }
                    warn!(operation, attempts, %reason, "write conflict, retrying");
                    tokio::time::sleep(backoff(attempts)).await;
                }
                other => return other,
            }
        }
    }

    fn publish(&self, event: StockEvent) {
        let part_id = event.part_id();
        let event_type = event.event_type();
        let occurred_at = event.occurred_at();
        match self.bus.publish(event) {
            Ok(()) => debug!(part_id = %part_id, event_type, %occurred_at, "stock event published"),
            Err(err) => {
                warn!(part_id = %part_id, event_type, %occurred_at, error = ?err, "failed to publish stock event")
            }
        }
    }

    async fn record_usage(
        &self,
        part: &Part,
        request: &QuantityChangeRequest,
        actor: &ActorId,
        occurred_at: DateTime<Utc>,
    ) {
        let record = UsageRecord {
            part_id: part.id,
            part_name: part.name.clone(),
            quantity: request.amount,
            unit: part.unit.clone(),
            actor: actor.clone(),
            reason: request.reason.clone(),
            occurred_at,
        };
        if let Err(err) = self.usage_log.record(record).await {
            warn!(part_id = %part.id, error = %err, "usage log write failed; quantity change kept");
        }
    }
}

/// A ledger bound to one actor.
pub struct ActingLedger<'a, S, B, U> {
    ledger: &'a StockLedger<S, B, U>,
    actor: ActorId,
}

impl<S, B, U> ActingLedger<'_, S, B, U>
where
    S: LedgerStore,
    B: EventBus<StockEvent>,
    U: UsageLog,
{
    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub async fn create(&self, input: PartInput) -> Result<Part, LedgerError> {
        self.ledger.create(input, &self.actor).await
    }

    pub async fn update(&self, part_id: PartId, edits: PartFields) -> Result<Part, LedgerError> {
        self.ledger.update(part_id, edits, &self.actor).await
    }

    pub async fn change_quantity(&self, request: QuantityChangeRequest) -> Result<Part, LedgerError> {
        self.ledger.change_quantity(request, &self.actor).await
    }
}

fn part_context(part_id: &Option<PartId>) -> String {
    part_id.map(|id| format!(" for part {id}")).unwrap_or_default()
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Box<dyn LedgerTransaction>, outcome: Result<T, LedgerError>) -> Result<T, LedgerError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed; transaction dropped");
            }
            Err(err)
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(5u64 << attempt.min(6))
}
