//! Postgres-backed ledger store.
//!
//! ## Locking
//!
//! Every transaction starts with `SET LOCAL lock_timeout`, then takes row locks
//! with `SELECT ... FOR UPDATE` on the part it mutates and on that part's open
//! purchase orders. Two concurrent quantity changes on one part therefore
//! serialize; a waiter that exceeds the timeout gets `StoreError::Conflict`
//! and the ledger retries the whole operation.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (lock not available) | `55P03` | `Conflict` |
//! | Database (foreign key / check violation) | `23503` / `23514` | `Constraint` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |
//! | Other (pool closed, io, tls) | N/A | `Backend` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{ActorId, HistoryEntryId, OrderId, PartId, Quantity};
use stockledger_inventory::{ChangeType, HistoryEntry, Part, StorageLocation};
use stockledger_purchasing::{OrderDetails, OrderStatus, PurchaseOrder};

use super::r#trait::{
    HistoryRepository, LedgerStore, LedgerTransaction, OrderRepository, PartRepository, StoreError,
};
use crate::config::LedgerConfig;
use crate::usage_log::{UsageLog, UsageLogError, UsageRecord};

const SCHEMA: &str = include_str!("../../migrations/0001_stock_ledger.sql");

const PART_COLUMNS: &str = "id, name, description, current_quantity, minimum_quantity, unit, \
     cost_per_unit, storage_vicinity, storage_sublocation, supplier, supplier_url, image_ref, \
     created_at, updated_at";

const ORDER_COLUMNS: &str = "id, part_id, quantity_ordered, quantity_received, status, ordered_at, \
     supplier_name, supplier_details, expected_delivery, estimated_cost, updated_at";

const HISTORY_COLUMNS: &str = "id, part_id, change_type, old_quantity, new_quantity, quantity_change, \
     changed_by, change_reason, order_id, supplier_name, supplier_url, changed_at";

/// Postgres ledger store over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a pool from configuration. Fails if no database URL is configured.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Backend("DATABASE_URL is not set".to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, config.lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        // SET does not take bind parameters.
        let timeout_ms = self.lock_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL lock_timeout = '{timeout_ms}ms'"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn get_part(&self, part_id: PartId) -> Result<Option<Part>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PART_COLUMNS} FROM parts WHERE id = $1"))
            .bind(part_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    async fn list_parts(&self) -> Result<Vec<Part>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PART_COLUMNS} FROM parts ORDER BY name ASC, id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_parts", e))?;
        rows.iter().map(part_from_row).collect()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders WHERE id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn orders_for_part(&self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders WHERE part_id = $1 \
             ORDER BY ordered_at ASC, id ASC"
        ))
        .bind(part_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders_for_part", e))?;
        rows.iter().map(order_from_row).collect()
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed(), part_id = %order.part_id()), err)]
    async fn insert_order(&self, order: &PurchaseOrder) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, part_id, quantity_ordered, quantity_received, status, ordered_at,
                supplier_name, supplier_details, expected_delivery, estimated_cost, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.part_id().as_uuid())
        .bind(order.quantity_ordered().as_decimal())
        .bind(order.quantity_received().as_decimal())
        .bind(order.status().as_str())
        .bind(order.ordered_at())
        .bind(&order.supplier_name)
        .bind(&order.supplier_details)
        .bind(order.expected_delivery)
        .bind(order.estimated_cost)
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn history_for_part(&self, part_id: PartId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM part_history WHERE part_id = $1 \
             ORDER BY changed_at DESC, id DESC"
        ))
        .bind(part_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("history_for_part", e))?;
        rows.iter().map(history_from_row).collect()
    }
}

/// One Postgres transaction. Dropping it without commit rolls back.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PartRepository for PostgresTransaction {
    async fn lock_part(&mut self, part_id: PartId) -> Result<Option<Part>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PART_COLUMNS} FROM parts WHERE id = $1 FOR UPDATE"
        ))
        .bind(part_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    async fn insert_part(&mut self, part: &Part) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO parts (
                id, name, description, current_quantity, minimum_quantity, unit,
                cost_per_unit, storage_vicinity, storage_sublocation, supplier,
                supplier_url, image_ref, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(part.id.as_uuid())
        .bind(&part.name)
        .bind(&part.description)
        .bind(part.current_quantity.as_decimal())
        .bind(part.minimum_quantity.map(|q| q.as_decimal()))
        .bind(&part.unit)
        .bind(part.cost_per_unit)
        .bind(&part.location.vicinity)
        .bind(&part.location.sublocation)
        .bind(&part.supplier)
        .bind(&part.supplier_url)
        .bind(&part.image_ref)
        .bind(part.created_at)
        .bind(part.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_part", e))?;
        Ok(())
    }

    async fn update_part(&mut self, part: &Part) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE parts SET
                name = $2,
                description = $3,
                current_quantity = $4,
                minimum_quantity = $5,
                unit = $6,
                cost_per_unit = $7,
                storage_vicinity = $8,
                storage_sublocation = $9,
                supplier = $10,
                supplier_url = $11,
                image_ref = $12,
                updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(part.id.as_uuid())
        .bind(&part.name)
        .bind(&part.description)
        .bind(part.current_quantity.as_decimal())
        .bind(part.minimum_quantity.map(|q| q.as_decimal()))
        .bind(&part.unit)
        .bind(part.cost_per_unit)
        .bind(&part.location.vicinity)
        .bind(&part.location.sublocation)
        .bind(&part.supplier)
        .bind(&part.supplier_url)
        .bind(&part.image_ref)
        .bind(part.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_part", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("part {}", part.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresTransaction {
    async fn lock_open_orders(&mut self, part_id: PartId) -> Result<Vec<PurchaseOrder>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM purchase_orders \
             WHERE part_id = $1 AND status IN ('pending', 'partially_received') \
             ORDER BY ordered_at ASC, id ASC \
             FOR UPDATE"
        ))
        .bind(part_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_open_orders", e))?;
        rows.iter().map(order_from_row).collect()
    }

    async fn update_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE purchase_orders SET
                quantity_received = $2,
                status = $3,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.quantity_received().as_decimal())
        .bind(order.status().as_str())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {}", order.id_typed())));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for PostgresTransaction {
    async fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO part_history (
                id, part_id, change_type, old_quantity, new_quantity, quantity_change,
                changed_by, change_reason, order_id, supplier_name, supplier_url, changed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.part_id.as_uuid())
        .bind(entry.change_type.as_str())
        .bind(entry.old_quantity.map(|q| q.as_decimal()))
        .bind(entry.new_quantity.map(|q| q.as_decimal()))
        .bind(entry.quantity_change)
        .bind(entry.changed_by.as_str())
        .bind(&entry.change_reason)
        .bind(entry.order_id.map(Uuid::from))
        .bind(&entry.supplier_name)
        .bind(&entry.supplier_url)
        .bind(entry.changed_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_history", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerTransaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Usage records written to the `part_usage` table.
#[derive(Debug, Clone)]
pub struct PostgresUsageLog {
    pool: PgPool,
}

impl PostgresUsageLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLog for PostgresUsageLog {
    async fn record(&self, record: UsageRecord) -> Result<(), UsageLogError> {
        sqlx::query(
            r#"
            INSERT INTO part_usage (part_id, part_name, quantity, unit, actor, reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.part_id.as_uuid())
        .bind(&record.part_name)
        .bind(record.quantity.as_decimal())
        .bind(&record.unit)
        .bind(record.actor.as_str())
        .bind(&record.reason)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| UsageLogError::Sink(map_sqlx_error("record_usage", e).to_string()))?;
        Ok(())
    }
}

fn decode<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn quantity(row: &PgRow, column: &str) -> Result<Quantity, StoreError> {
    let value: Decimal = decode(row, column)?;
    Quantity::new(value).map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn optional_quantity(row: &PgRow, column: &str) -> Result<Option<Quantity>, StoreError> {
    let value: Option<Decimal> = decode(row, column)?;
    value
        .map(Quantity::new)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn part_from_row(row: &PgRow) -> Result<Part, StoreError> {
    let id: Uuid = decode(row, "id")?;
    Ok(Part {
        id: PartId::from_uuid(id),
        name: decode(row, "name")?,
        description: decode(row, "description")?,
        current_quantity: quantity(row, "current_quantity")?,
        minimum_quantity: optional_quantity(row, "minimum_quantity")?,
        unit: decode(row, "unit")?,
        cost_per_unit: decode(row, "cost_per_unit")?,
        location: StorageLocation {
            vicinity: decode(row, "storage_vicinity")?,
            sublocation: decode(row, "storage_sublocation")?,
        },
        supplier: decode(row, "supplier")?,
        supplier_url: decode(row, "supplier_url")?,
        image_ref: decode(row, "image_ref")?,
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<PurchaseOrder, StoreError> {
    let id: Uuid = decode(row, "id")?;
    let part_id: Uuid = decode(row, "part_id")?;
    let status: String = decode(row, "status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("order {id}: {e}")))?;
    let ordered_at: DateTime<Utc> = decode(row, "ordered_at")?;
    let updated_at: DateTime<Utc> = decode(row, "updated_at")?;
    let expected_delivery: Option<NaiveDate> = decode(row, "expected_delivery")?;

    PurchaseOrder::restore(
        OrderId::from_uuid(id),
        PartId::from_uuid(part_id),
        quantity(row, "quantity_ordered")?,
        quantity(row, "quantity_received")?,
        status,
        ordered_at,
        updated_at,
        OrderDetails {
            supplier_name: decode(row, "supplier_name")?,
            supplier_details: decode(row, "supplier_details")?,
            expected_delivery,
            estimated_cost: decode(row, "estimated_cost")?,
        },
    )
    .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn history_from_row(row: &PgRow) -> Result<HistoryEntry, StoreError> {
    let id: Uuid = decode(row, "id")?;
    let part_id: Uuid = decode(row, "part_id")?;
    let change_type: String = decode(row, "change_type")?;
    let change_type: ChangeType = change_type
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("history {id}: {e}")))?;
    let changed_by: String = decode(row, "changed_by")?;
    let changed_by =
        ActorId::new(changed_by).map_err(|e| StoreError::Corrupt(format!("history {id}: {e}")))?;
    let order_id: Option<Uuid> = decode(row, "order_id")?;

    Ok(HistoryEntry {
        id: HistoryEntryId::from_uuid(id),
        part_id: PartId::from_uuid(part_id),
        change_type,
        old_quantity: optional_quantity(row, "old_quantity")?,
        new_quantity: optional_quantity(row, "new_quantity")?,
        quantity_change: decode(row, "quantity_change")?,
        changed_by,
        change_reason: decode(row, "change_reason")?,
        order_id: order_id.map(OrderId::from_uuid),
        supplier_name: decode(row, "supplier_name")?,
        supplier_url: decode(row, "supplier_url")?,
        changed_at: decode(row, "changed_at")?,
    })
}

/// Map sqlx errors to `StoreError` by SQLSTATE.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") | Some("55P03") => {
                    StoreError::Conflict(msg)
                }
                Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {operation}")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode failure in {operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
