//! Postgres-backed ledger store.
//!
//! Every transaction sets a local `lock_timeout`, so a caller stuck behind a row
//! lock fails with [`StoreError::Timeout`] instead of waiting forever. Rows read
//! through a [`LedgerTx`] are taken with `FOR UPDATE`.
//!
//! The first `enqueue` of a transaction takes a transaction-scoped advisory
//! lock before drawing an outbox sequence number. Writers of the outbox commit
//! one at a time, so sequence order is commit order and the relay never sees
//! a gap that a slower transaction fills later.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (deadlock detected) | `40P01` | `Conflict` |
//! | Database (lock not available) | `55P03` | `Timeout` |
//! | Database (unique / check violation) | `23505`, `23514` | `Conflict` |
//! | Database (other) | any | `Unavailable` |
//! | PoolTimedOut | n/a | `Timeout` |
//! | Decode / ColumnDecode / ColumnNotFound | n/a | `Corrupt` |
//! | Anything else (IO, TLS, pool closed) | n/a | `Unavailable` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockroom_core::{
    ActorId, BatchId, BuildingId, ChargeOutId, CostCenterId, DeliveryId, OutboxId, PartId,
    StaffId,
};
use stockroom_inventory::{ChargeOutRecord, DeliveryRecord, ItemRef, LedgerLine, Part};

use super::{ChargeOutFilter, DeliveryFilter, LedgerStore, LedgerTx, StoreError};
use crate::outbox::{OutboxMessage, StoredOutboxMessage};

/// Schema applied by [`PostgresLedgerStore::ensure_schema`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

/// Advisory lock key serializing outbox writers ("stockrm!" as big-endian bytes).
const OUTBOX_LOCK_KEY: i64 = i64::from_be_bytes(*b"stockrm!");

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

macro_rules! part_columns {
    () => {
        "id, code, name, quantity, reorder_level, unit_cost, created_at, updated_at"
    };
}

macro_rules! line_columns {
    () => {
        "part_id, item_code, item_name, item_description, quantity, unit_cost, \
         staff_member_id, building_id, cost_center_id, notes"
    };
}

macro_rules! delivery_columns {
    () => {
        concat!(
            line_columns!(),
            ", id, batch_id, status, delivered_at, confirmed_at, cancelled_at, signature, \
             created_by, updated_by, created_at, updated_at"
        )
    };
}

macro_rules! charge_out_columns {
    () => {
        concat!(
            line_columns!(),
            ", id, issued_at, created_by, updated_by, created_at, updated_at"
        )
    };
}

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(lock_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(level = "debug", skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(Box::new(PgLedgerTx {
            tx,
            outbox_locked: false,
        }))
    }

    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError> {
        let row = sqlx::query(concat!("SELECT ", part_columns!(), " FROM parts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    async fn parts(&self) -> Result<Vec<Part>, StoreError> {
        let rows = sqlx::query(concat!("SELECT ", part_columns!(), " FROM parts ORDER BY code"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("parts", e))?;
        rows.iter().map(part_from_row).collect()
    }

    async fn low_stock_parts(&self) -> Result<Vec<Part>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            part_columns!(),
            " FROM parts WHERE quantity <= reorder_level ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("low_stock_parts", e))?;
        rows.iter().map(part_from_row).collect()
    }

    async fn delivery(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            delivery_columns!(),
            " FROM deliveries WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("delivery", e))?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            delivery_columns!(),
            " FROM deliveries
              WHERE ($1::uuid IS NULL OR staff_member_id = $1)
                AND ($2::text IS NULL OR status = $2)
                AND ($3::uuid IS NULL OR batch_id = $3)
                AND ($4::timestamptz IS NULL OR delivered_at >= $4)
                AND ($5::timestamptz IS NULL OR delivered_at < $5)
              ORDER BY delivered_at DESC, id"
        ))
        .bind(filter.staff_member_id.map(|s| *s.as_uuid()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.batch_id.map(|b| *b.as_uuid()))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("deliveries", e))?;
        rows.iter().map(delivery_from_row).collect()
    }

    async fn charge_out(&self, id: ChargeOutId) -> Result<Option<ChargeOutRecord>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            charge_out_columns!(),
            " FROM charge_outs WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("charge_out", e))?;
        row.as_ref().map(charge_out_from_row).transpose()
    }

    #[instrument(level = "debug", skip(self), err)]
    async fn charge_outs(
        &self,
        filter: &ChargeOutFilter,
    ) -> Result<Vec<ChargeOutRecord>, StoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            charge_out_columns!(),
            " FROM charge_outs
              WHERE ($1::uuid IS NULL OR staff_member_id = $1)
                AND ($2::timestamptz IS NULL OR issued_at >= $2)
                AND ($3::timestamptz IS NULL OR issued_at < $3)
              ORDER BY issued_at DESC, id"
        ))
        .bind(filter.staff_member_id.map(|s| *s.as_uuid()))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("charge_outs", e))?;
        rows.iter().map(charge_out_from_row).collect()
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<StoredOutboxMessage>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, event_type, event_version, subject_id, recipient, payload, occurred_at
            FROM ledger_outbox
            WHERE dispatched_at IS NULL
            ORDER BY sequence ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_outbox", e))?;
        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_dispatched(
        &self,
        sequences: &[u64],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sequences: Vec<i64> = sequences.iter().map(|s| *s as i64).collect();
        sqlx::query(
            "UPDATE ledger_outbox SET dispatched_at = $2 \
             WHERE sequence = ANY($1) AND dispatched_at IS NULL",
        )
        .bind(sequences)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_dispatched", e))?;
        Ok(())
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
    /// Whether this transaction already holds the outbox advisory lock.
    outbox_locked: bool,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    #[instrument(level = "debug", skip(self), fields(part_id = %id), err)]
    async fn lock_part(&mut self, id: PartId) -> Result<Option<Part>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            part_columns!(),
            " FROM parts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    async fn find_part_by_code(&mut self, code: &str) -> Result<Option<Part>, StoreError> {
        let row = sqlx::query(concat!("SELECT ", part_columns!(), " FROM parts WHERE code = $1"))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_part_by_code", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    async fn insert_part(&mut self, part: &Part) -> Result<(), StoreError> {
        sqlx::query(concat!(
            "INSERT INTO parts (",
            part_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(part.id.as_uuid())
        .bind(&part.code)
        .bind(&part.name)
        .bind(part.quantity)
        .bind(part.reorder_level)
        .bind(part.unit_cost)
        .bind(part.created_at)
        .bind(part.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_part", e))?;
        Ok(())
    }

    async fn update_part(&mut self, part: &Part) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE parts SET name = $2, unit_cost = $3, reorder_level = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(part.id.as_uuid())
        .bind(&part.name)
        .bind(part.unit_cost)
        .bind(part.reorder_level)
        .bind(part.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_part", e))?;
        expect_one_row("update_part", result.rows_affected())
    }

    #[instrument(level = "debug", skip(self), fields(part_id = %id), err)]
    async fn set_part_quantity(
        &mut self,
        id: PartId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE parts SET quantity = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(quantity)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_part_quantity", e))?;
        expect_one_row("set_part_quantity", result.rows_affected())
    }

    async fn lock_delivery(
        &mut self,
        id: DeliveryId,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            delivery_columns!(),
            " FROM deliveries WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_delivery", e))?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn insert_delivery(&mut self, record: &DeliveryRecord) -> Result<(), StoreError> {
        let query = sqlx::query(concat!(
            "INSERT INTO deliveries (",
            delivery_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                       $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
        ));
        bind_line(query, &record.line)
            .bind(record.id.as_uuid())
            .bind(record.batch_id.map(|b| *b.as_uuid()))
            .bind(record.status.as_str())
            .bind(record.delivered_at)
            .bind(record.confirmed_at)
            .bind(record.cancelled_at)
            .bind(record.signature.clone())
            .bind(*record.created_by.as_uuid())
            .bind(*record.updated_by.as_uuid())
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_delivery", e))?;
        Ok(())
    }

    async fn update_delivery(&mut self, record: &DeliveryRecord) -> Result<(), StoreError> {
        let query = sqlx::query(
            "UPDATE deliveries SET \
                part_id = $1, item_code = $2, item_name = $3, item_description = $4, \
                quantity = $5, unit_cost = $6, staff_member_id = $7, building_id = $8, \
                cost_center_id = $9, notes = $10, status = $11, delivered_at = $12, \
                confirmed_at = $13, cancelled_at = $14, signature = $15, updated_by = $16, \
                updated_at = $17 \
             WHERE id = $18",
        );
        let result = bind_line(query, &record.line)
            .bind(record.status.as_str())
            .bind(record.delivered_at)
            .bind(record.confirmed_at)
            .bind(record.cancelled_at)
            .bind(record.signature.clone())
            .bind(*record.updated_by.as_uuid())
            .bind(record.updated_at)
            .bind(record.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_delivery", e))?;
        expect_one_row("update_delivery", result.rows_affected())
    }

    async fn delete_delivery(&mut self, id: DeliveryId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM deliveries WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_delivery", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_charge_out(
        &mut self,
        id: ChargeOutId,
    ) -> Result<Option<ChargeOutRecord>, StoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            charge_out_columns!(),
            " FROM charge_outs WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_charge_out", e))?;
        row.as_ref().map(charge_out_from_row).transpose()
    }

    async fn insert_charge_out(&mut self, record: &ChargeOutRecord) -> Result<(), StoreError> {
        let query = sqlx::query(concat!(
            "INSERT INTO charge_outs (",
            charge_out_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                       $11, $12, $13, $14, $15, $16)"
        ));
        bind_line(query, &record.line)
            .bind(record.id.as_uuid())
            .bind(record.issued_at)
            .bind(*record.created_by.as_uuid())
            .bind(*record.updated_by.as_uuid())
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_charge_out", e))?;
        Ok(())
    }

    async fn update_charge_out(&mut self, record: &ChargeOutRecord) -> Result<(), StoreError> {
        let query = sqlx::query(
            "UPDATE charge_outs SET \
                part_id = $1, item_code = $2, item_name = $3, item_description = $4, \
                quantity = $5, unit_cost = $6, staff_member_id = $7, building_id = $8, \
                cost_center_id = $9, notes = $10, issued_at = $11, updated_by = $12, \
                updated_at = $13 \
             WHERE id = $14",
        );
        let result = bind_line(query, &record.line)
            .bind(record.issued_at)
            .bind(*record.updated_by.as_uuid())
            .bind(record.updated_at)
            .bind(record.id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_charge_out", e))?;
        expect_one_row("update_charge_out", result.rows_affected())
    }

    async fn delete_charge_out(&mut self, id: ChargeOutId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM charge_outs WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_charge_out", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn enqueue(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        if !self.outbox_locked {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(OUTBOX_LOCK_KEY)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("enqueue", e))?;
            self.outbox_locked = true;
        }

        sqlx::query(
            r#"
            INSERT INTO ledger_outbox
                (id, event_type, event_version, subject_id, recipient, payload, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(&message.event_type)
        .bind(message.event_version as i32)
        .bind(message.subject_id)
        .bind(message.recipient.clone())
        .bind(&message.payload)
        .bind(message.occurred_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("enqueue", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgLedgerTx { tx, .. } = *self;
        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgLedgerTx { tx, .. } = *self;
        tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Binds the ten `line_columns!()` in order.
fn bind_line<'q>(query: PgQuery<'q>, line: &LedgerLine) -> PgQuery<'q> {
    let (part_id, name, description) = match &line.item {
        ItemRef::Catalog { part_id, .. } => (Some(*part_id.as_uuid()), None, None),
        ItemRef::AdHoc {
            name, description, ..
        } => (None, Some(name.clone()), description.clone()),
    };
    query
        .bind(part_id)
        .bind(line.item.code().to_string())
        .bind(name)
        .bind(description)
        .bind(line.quantity)
        .bind(line.unit_cost)
        .bind(*line.staff_member_id.as_uuid())
        .bind(line.building_id.map(|b| *b.as_uuid()))
        .bind(line.cost_center_id.map(|c| *c.as_uuid()))
        .bind(line.notes.clone())
}

fn expect_one_row(operation: &str, rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 1 {
        Ok(())
    } else {
        Err(StoreError::Corrupt(format!(
            "{operation} affected {rows_affected} rows, expected 1"
        )))
    }
}

// Row decoding

fn decode<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn part_from_row(row: &PgRow) -> Result<Part, StoreError> {
    Ok(Part {
        id: PartId::from_uuid(decode(row, "id")?),
        code: decode(row, "code")?,
        name: decode(row, "name")?,
        quantity: decode(row, "quantity")?,
        reorder_level: decode(row, "reorder_level")?,
        unit_cost: decode(row, "unit_cost")?,
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
    })
}

fn line_from_row(row: &PgRow) -> Result<LedgerLine, StoreError> {
    let code: String = decode(row, "item_code")?;
    let part_id: Option<Uuid> = decode(row, "part_id")?;
    let item = match part_id {
        Some(part_id) => ItemRef::Catalog {
            part_id: PartId::from_uuid(part_id),
            code,
        },
        None => {
            let name: Option<String> = decode(row, "item_name")?;
            ItemRef::AdHoc {
                name: name.ok_or_else(|| {
                    StoreError::Corrupt(format!("ad-hoc item {code} has no name"))
                })?,
                code,
                description: decode(row, "item_description")?,
            }
        }
    };

    Ok(LedgerLine {
        item,
        quantity: decode(row, "quantity")?,
        unit_cost: decode(row, "unit_cost")?,
        staff_member_id: StaffId::from_uuid(decode(row, "staff_member_id")?),
        building_id: decode::<Option<Uuid>>(row, "building_id")?.map(BuildingId::from_uuid),
        cost_center_id: decode::<Option<Uuid>>(row, "cost_center_id")?
            .map(CostCenterId::from_uuid),
        notes: decode(row, "notes")?,
    })
}

fn delivery_from_row(row: &PgRow) -> Result<DeliveryRecord, StoreError> {
    let status: String = decode(row, "status")?;
    Ok(DeliveryRecord {
        id: DeliveryId::from_uuid(decode(row, "id")?),
        batch_id: decode::<Option<Uuid>>(row, "batch_id")?.map(BatchId::from_uuid),
        line: line_from_row(row)?,
        status: status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("delivery status: {e}")))?,
        delivered_at: decode(row, "delivered_at")?,
        confirmed_at: decode(row, "confirmed_at")?,
        cancelled_at: decode(row, "cancelled_at")?,
        signature: decode(row, "signature")?,
        created_by: ActorId::from_uuid(decode(row, "created_by")?),
        updated_by: ActorId::from_uuid(decode(row, "updated_by")?),
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
    })
}

fn charge_out_from_row(row: &PgRow) -> Result<ChargeOutRecord, StoreError> {
    Ok(ChargeOutRecord {
        id: ChargeOutId::from_uuid(decode(row, "id")?),
        line: line_from_row(row)?,
        issued_at: decode(row, "issued_at")?,
        created_by: ActorId::from_uuid(decode(row, "created_by")?),
        updated_by: ActorId::from_uuid(decode(row, "updated_by")?),
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<StoredOutboxMessage, StoreError> {
    let sequence: i64 = decode(row, "sequence")?;
    let event_version: i32 = decode(row, "event_version")?;
    Ok(StoredOutboxMessage {
        sequence: sequence as u64,
        message: OutboxMessage {
            id: OutboxId::from_uuid(decode(row, "id")?),
            event_type: decode(row, "event_type")?,
            event_version: event_version as u32,
            subject_id: decode(row, "subject_id")?,
            recipient: decode(row, "recipient")?,
            occurred_at: decode(row, "occurred_at")?,
            payload: decode(row, "payload")?,
        },
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                Some("55P03") => StoreError::Timeout(msg),
                Some("23505") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Timeout(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}
