//! PostgreSQL adapter for the `StockCore` inventory engine
//!
//! Implements the `StockStore` trait on top of sqlx. The concurrency
//! contract is carried by ordinary row locks: `execute_locked` opens a
//! transaction, sets a bounded `lock_timeout`, takes the target record's
//! row with `SELECT ... FOR UPDATE`, validates and applies the mutation
//! against the freshly read balances, writes the ledger entry and any
//! reservation change, and commits. Lock waits that exceed the bound
//! surface as `StoreError::LockTimeout` (SQLSTATE `55P03`), which the
//! engine reports as a retryable conflict.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nutype::nutype;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{query, Pool, Postgres, QueryBuilder, Row, Transaction};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use stockcore::errors::{StoreError, StoreResult};
use stockcore::movement::{MovementEntry, MovementRef, MovementType};
use stockcore::record::{NewStockRecord, StockRecord};
use stockcore::reservation::{Reservation, ReservationState};
use stockcore::store::{
    InventoryFilter, LockedUpdate, Page, PageRequest, RecordKey, ReservationChange, StockStore,
    UpdateOutcome,
};
use stockcore::types::{
    Actor, InventoryId, Location, MovementId, ProductId, Quantity, ReservationId,
};

/// Errors raised while setting up the adapter, before any store operation
/// runs.
#[derive(Debug, Error)]
pub enum PostgresStockStoreError {
    /// The connection pool could not be created.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),
    /// Schema migrations failed to apply.
    #[error("failed to run postgres migrations")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// Must be at least 1, enforced by using `NonZeroU32` as the underlying
/// type.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(std::num::NonZeroU32);

/// Configuration for the `PostgresStockStore` connection pool and lock
/// behavior.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10).
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds).
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes).
    pub idle_timeout: Duration,
    /// Bound on how long a writer waits for a row lock (default: 5 seconds).
    pub lock_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: std::num::NonZeroU32 = match std::num::NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600), // 10 minutes
            lock_timeout: Duration::from_secs(5),
        }
    }
}

const RECORD_COLUMNS: &str = "id, product_id, location, physical_stock, reserved_stock, \
     minimum_stock, maximum_stock, reorder_point, unit_price, unit_cost, updated_at";

const RESERVATION_COLUMNS: &str = "reservation_id, inventory_id, product_id, location, quantity, \
     order_id, reason, state, created_at, expires_at, state_changed_at";

const MOVEMENT_COLUMNS: &str = "id, inventory_id, movement_type, quantity, stock_before, \
     stock_after, reference_kind, reference_id, reason, performed_by, recorded_at";

/// PostgreSQL-backed stock store.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PostgresStockStore {
    /// Create a new store with default configuration.
    pub async fn new<S: Into<String>>(
        connection_string: S,
    ) -> Result<Self, PostgresStockStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Create a new store with custom configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStockStoreError> {
        let connection_string = connection_string.into();
        let max_connections: std::num::NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresStockStoreError::ConnectionFailed)?;
        Ok(Self {
            pool,
            lock_timeout: config.lock_timeout,
        })
    }

    /// Create a store from an existing connection pool.
    ///
    /// Use this when you need full control over pool configuration or want
    /// to share a pool across multiple components.
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            lock_timeout: PostgresConfig::default().lock_timeout,
        }
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), PostgresStockStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresStockStoreError::MigrationFailed)
    }

    /// Verify the database is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|error| self.map_sqlx_error(error))
    }

    fn map_sqlx_error(&self, error: sqlx::Error) -> StoreError {
        map_sqlx_error(error, self.lock_timeout)
    }

    /// Locks the target record's row and returns its fresh state.
    async fn lock_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        key: &RecordKey,
    ) -> StoreResult<StockRecord> {
        let sql_by_id =
            format!("SELECT {RECORD_COLUMNS} FROM stock_records WHERE id = $1 FOR UPDATE");
        let sql_by_product = format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records \
             WHERE product_id = $1 AND location = $2 FOR UPDATE"
        );
        let row = match key {
            RecordKey::ById(id) => {
                query(&sql_by_id)
                    .bind(id.into_inner())
                    .fetch_optional(&mut **tx)
                    .await
            }
            RecordKey::ByProductLocation {
                product_id,
                location,
            } => {
                query(&sql_by_product)
                    .bind(product_id.as_ref())
                    .bind(location.as_ref())
                    .fetch_optional(&mut **tx)
                    .await
            }
        }
        .map_err(|error| self.map_sqlx_error(error))?;

        row.map_or_else(
            || Err(StoreError::RecordNotFound(key.clone())),
            |row| record_from_row(&row),
        )
    }

    /// Applies the reservation side effect inside the locked transaction.
    async fn apply_reservation_change(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        change: &ReservationChange,
        inventory_id: InventoryId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        match change {
            ReservationChange::Create(new) => {
                let reservation = Reservation::activate(new.clone(), inventory_id, now);
                let result = query(
                    "INSERT INTO stock_reservations \
                     (reservation_id, inventory_id, product_id, location, quantity, \
                      order_id, reason, state, created_at, expires_at, state_changed_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                )
                .bind(reservation.reservation_id.as_ref())
                .bind(reservation.inventory_id.into_inner())
                .bind(reservation.product_id.as_ref())
                .bind(reservation.location.as_ref())
                .bind(reservation.quantity.get())
                .bind(reservation.order_id.as_deref())
                .bind(reservation.reason.as_deref())
                .bind(reservation.state.as_str())
                .bind(reservation.created_at)
                .bind(reservation.expires_at)
                .bind(reservation.state_changed_at)
                .execute(&mut **tx)
                .await;
                match result {
                    Ok(_) => Ok(Some(reservation)),
                    Err(error) if is_unique_violation(&error) => Err(
                        StoreError::DuplicateReservation(reservation.reservation_id.clone()),
                    ),
                    Err(error) => Err(self.map_sqlx_error(error)),
                }
            }
            ReservationChange::Transition {
                id,
                outcome,
                quantity,
            } => {
                let sql = format!(
                    "SELECT {RESERVATION_COLUMNS} FROM stock_reservations \
                     WHERE reservation_id = $1 FOR UPDATE"
                );
                let row = query(&sql)
                    .bind(id.as_ref())
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(|error| self.map_sqlx_error(error))?;
                // Missing reservation: the quantity-driven balance mutation
                // still applies (callers may track identity externally).
                let Some(row) = row else {
                    return Ok(None);
                };
                let mut reservation = reservation_from_row(&row)?;
                // The row lock held is the record's; a reservation against
                // another record cannot be settled through it.
                if reservation.inventory_id != inventory_id {
                    return Err(StoreError::ReservationMismatch { id: id.clone() });
                }
                reservation.settle(*outcome, *quantity, now)?;
                query(
                    "UPDATE stock_reservations \
                     SET quantity = $1, state = $2, state_changed_at = $3 \
                     WHERE reservation_id = $4",
                )
                .bind(reservation.quantity.get())
                .bind(reservation.state.as_str())
                .bind(reservation.state_changed_at)
                .bind(id.as_ref())
                .execute(&mut **tx)
                .await
                .map_err(|error| self.map_sqlx_error(error))?;
                Ok(Some(reservation))
            }
        }
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    #[instrument(name = "postgres.create_record", skip(self, new), fields(product = %new.product_id))]
    async fn create_record(&self, new: NewStockRecord) -> StoreResult<StockRecord> {
        let record = StockRecord::create(new)?;
        let result = query(
            "INSERT INTO stock_records \
             (id, product_id, location, physical_stock, reserved_stock, minimum_stock, \
              maximum_stock, reorder_point, unit_price, unit_cost, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id.into_inner())
        .bind(record.product_id.as_ref())
        .bind(record.location.as_ref())
        .bind(record.physical_stock())
        .bind(record.reserved_stock())
        .bind(record.minimum_stock)
        .bind(record.maximum_stock)
        .bind(record.reorder_point)
        .bind(record.unit_price)
        .bind(record.unit_cost)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(inventory_id = %record.id, "created stock record");
                Ok(record)
            }
            Err(error) if is_unique_violation(&error) => Err(StoreError::DuplicateRecord {
                product_id: record.product_id,
                location: record.location,
            }),
            Err(error) => Err(self.map_sqlx_error(error)),
        }
    }

    #[instrument(name = "postgres.fetch_record", skip(self))]
    async fn fetch_record(&self, key: &RecordKey) -> StoreResult<Option<StockRecord>> {
        let sql_by_id = format!("SELECT {RECORD_COLUMNS} FROM stock_records WHERE id = $1");
        let sql_by_product = format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE product_id = $1 AND location = $2"
        );
        let row = match key {
            RecordKey::ById(id) => {
                query(&sql_by_id)
                    .bind(id.into_inner())
                    .fetch_optional(&self.pool)
                    .await
            }
            RecordKey::ByProductLocation {
                product_id,
                location,
            } => {
                query(&sql_by_product)
                    .bind(product_id.as_ref())
                    .bind(location.as_ref())
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(|error| self.map_sqlx_error(error))?;
        row.map(|row| record_from_row(&row)).transpose()
    }

    #[instrument(name = "postgres.execute_locked", skip(self, update), fields(key = %key))]
    async fn execute_locked(
        &self,
        key: RecordKey,
        update: LockedUpdate,
    ) -> StoreResult<UpdateOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| self.map_sqlx_error(error))?;

        // Bound the row-lock wait for this transaction only. lock_timeout
        // cannot be a bind parameter, and the value is server-validated.
        let set_timeout = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        query(&set_timeout)
            .execute(&mut *tx)
            .await
            .map_err(|error| self.map_sqlx_error(error))?;

        let mut record = self.lock_record(&mut tx, &key).await?;
        let now = Utc::now();
        let stock_before = record.physical_stock();

        let staged = match &update.reservation {
            Some(change) => {
                self.apply_reservation_change(&mut tx, change, record.id, now)
                    .await?
            }
            None => None,
        };

        // Balance validation happens here, against the row we hold locked.
        // Any error drops the transaction, rolling back everything above.
        record.apply(&update.mutation)?;
        let stock_after = record.physical_stock();

        query(
            "UPDATE stock_records \
             SET physical_stock = $1, reserved_stock = $2, unit_cost = $3, updated_at = $4 \
             WHERE id = $5",
        )
        .bind(record.physical_stock())
        .bind(record.reserved_stock())
        .bind(record.unit_cost)
        .bind(record.updated_at)
        .bind(record.id.into_inner())
        .execute(&mut *tx)
        .await
        .map_err(|error| self.map_sqlx_error(error))?;

        let movement = MovementEntry::from_draft(update.movement, record.id, stock_before, stock_after, now);
        query(
            "INSERT INTO stock_movements \
             (id, inventory_id, movement_type, quantity, stock_before, stock_after, \
              reference_kind, reference_id, reason, performed_by, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(movement.id.into_inner())
        .bind(movement.inventory_id.into_inner())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.stock_before)
        .bind(movement.stock_after)
        .bind(movement.reference.as_ref().map(MovementRef::kind))
        .bind(movement.reference.as_ref().map(MovementRef::id))
        .bind(movement.reason.as_deref())
        .bind(movement.performed_by.as_ref())
        .bind(movement.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(|error| self.map_sqlx_error(error))?;

        tx.commit()
            .await
            .map_err(|error| self.map_sqlx_error(error))?;

        let created = matches!(update.reservation, Some(ReservationChange::Create(_)));
        Ok(UpdateOutcome {
            record,
            movement,
            reservation: if created { staged } else { None },
        })
    }

    #[instrument(name = "postgres.fetch_reservation", skip(self))]
    async fn fetch_reservation(&self, id: &ReservationId) -> StoreResult<Option<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations WHERE reservation_id = $1"
        );
        let row = query(&sql)
            .bind(id.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| self.map_sqlx_error(error))?;
        row.map(|row| reservation_from_row(&row)).transpose()
    }

    #[instrument(name = "postgres.expired_reservations", skip(self))]
    async fn expired_reservations(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM stock_reservations \
             WHERE state = 'ACTIVE' AND expires_at <= $1 \
             ORDER BY expires_at ASC LIMIT $2"
        );
        let rows = query(&sql)
            .bind(as_of)
            .bind(to_sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| self.map_sqlx_error(error))?;
        rows.iter().map(reservation_from_row).collect()
    }

    #[instrument(name = "postgres.list_records", skip(self, filter))]
    async fn list_records(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> StoreResult<Page<StockRecord>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) AS total FROM stock_records WHERE TRUE");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|error| self.map_sqlx_error(error))?
            .try_get("total")
            .map_err(|error| self.map_sqlx_error(error))?;

        let mut select = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE TRUE"
        ));
        push_filter(&mut select, filter);
        select.push(" ORDER BY product_id, location");
        select.push(" LIMIT ");
        select.push_bind(i64::from(page.limit));
        select.push(" OFFSET ");
        select.push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| self.map_sqlx_error(error))?;
        let items: Vec<StockRecord> = rows
            .iter()
            .map(record_from_row)
            .collect::<StoreResult<_>>()?;

        Ok(Page {
            items,
            page: page.page,
            limit: page.limit,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    #[instrument(name = "postgres.all_records", skip(self, filter))]
    async fn all_records(&self, filter: &InventoryFilter) -> StoreResult<Vec<StockRecord>> {
        let mut select = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM stock_records WHERE TRUE"
        ));
        push_filter(&mut select, filter);
        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| self.map_sqlx_error(error))?;
        rows.iter().map(record_from_row).collect()
    }

    #[instrument(name = "postgres.movements", skip(self))]
    async fn movements(
        &self,
        inventory_id: InventoryId,
        limit: usize,
    ) -> StoreResult<Vec<MovementEntry>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements \
             WHERE inventory_id = $1 \
             ORDER BY recorded_at DESC, id DESC LIMIT $2"
        );
        let rows = query(&sql)
            .bind(inventory_id.into_inner())
            .bind(to_sql_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|error| self.map_sqlx_error(error))?;
        rows.iter().map(movement_from_row).collect()
    }
}

/// Compiles an [`InventoryFilter`] to SQL, matching the in-memory
/// semantics of `InventoryFilter::matches`.
fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &'a InventoryFilter) {
    if let Some(product_id) = &filter.product_id {
        builder.push(" AND product_id = ");
        builder.push_bind(product_id.as_ref().clone());
    }
    if let Some(location) = &filter.location {
        builder.push(" AND location = ");
        builder.push_bind(location.as_ref().clone());
    }
    if let Some(status) = filter.status {
        // Derived status, same ordered rule as stock_status().
        builder.push(match status {
            stockcore::status::StockStatus::OutOfStock => {
                " AND physical_stock - reserved_stock <= 0"
            }
            stockcore::status::StockStatus::LowStock => {
                " AND physical_stock - reserved_stock > 0 \
                 AND physical_stock - reserved_stock <= minimum_stock"
            }
            stockcore::status::StockStatus::InStock => {
                " AND physical_stock - reserved_stock > minimum_stock"
            }
        });
    }
    if let Some(min_stock) = filter.min_stock {
        builder.push(" AND physical_stock >= ");
        builder.push_bind(min_stock);
    }
    if let Some(max_stock) = filter.max_stock {
        builder.push(" AND physical_stock <= ");
        builder.push_bind(max_stock);
    }
    if let Some(search) = &filter.search {
        builder.push(" AND product_id LIKE ");
        builder.push_bind(format!("%{search}%"));
    }
}

fn map_sqlx_error(error: sqlx::Error, lock_timeout: Duration) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        // 55P03: lock_not_available, raised when lock_timeout elapses
        if db_error.code().as_deref() == Some("55P03") {
            warn!(
                error = %db_error,
                "row lock wait exceeded the configured bound"
            );
            return StoreError::LockTimeout(lock_timeout);
        }
    }
    if matches!(
        error,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    ) {
        error!(error = %error, "database connection failed");
        return StoreError::ConnectionFailed(error.to_string());
    }
    error!(error = %error, "database operation failed");
    StoreError::Internal(error.to_string())
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some("23505")
    )
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn corrupt(detail: impl std::fmt::Display) -> StoreError {
    StoreError::SerializationFailed(detail.to_string())
}

fn record_from_row(row: &PgRow) -> StoreResult<StockRecord> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let product_id: String = row.try_get("product_id").map_err(corrupt)?;
    let location: String = row.try_get("location").map_err(corrupt)?;
    let physical_stock: i64 = row.try_get("physical_stock").map_err(corrupt)?;
    let reserved_stock: i64 = row.try_get("reserved_stock").map_err(corrupt)?;
    let minimum_stock: i64 = row.try_get("minimum_stock").map_err(corrupt)?;
    let maximum_stock: Option<i64> = row.try_get("maximum_stock").map_err(corrupt)?;
    let reorder_point: Option<i64> = row.try_get("reorder_point").map_err(corrupt)?;
    let unit_price: Option<Decimal> = row.try_get("unit_price").map_err(corrupt)?;
    let unit_cost: Option<Decimal> = row.try_get("unit_cost").map_err(corrupt)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(corrupt)?;

    let record = StockRecord::hydrate(
        InventoryId::try_new(id).map_err(corrupt)?,
        ProductId::try_new(product_id).map_err(corrupt)?,
        Location::try_new(location).map_err(corrupt)?,
        physical_stock,
        reserved_stock,
        minimum_stock,
        maximum_stock,
        reorder_point,
        unit_price,
        unit_cost,
        updated_at,
    )?;
    Ok(record)
}

fn reservation_from_row(row: &PgRow) -> StoreResult<Reservation> {
    let reservation_id: String = row.try_get("reservation_id").map_err(corrupt)?;
    let inventory_id: Uuid = row.try_get("inventory_id").map_err(corrupt)?;
    let product_id: String = row.try_get("product_id").map_err(corrupt)?;
    let location: String = row.try_get("location").map_err(corrupt)?;
    let quantity: i64 = row.try_get("quantity").map_err(corrupt)?;
    let order_id: Option<String> = row.try_get("order_id").map_err(corrupt)?;
    let reason: Option<String> = row.try_get("reason").map_err(corrupt)?;
    let state: String = row.try_get("state").map_err(corrupt)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(corrupt)?;
    let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(corrupt)?;
    let state_changed_at: DateTime<Utc> = row.try_get("state_changed_at").map_err(corrupt)?;

    Ok(Reservation {
        reservation_id: ReservationId::try_new(reservation_id).map_err(corrupt)?,
        product_id: ProductId::try_new(product_id).map_err(corrupt)?,
        inventory_id: InventoryId::try_new(inventory_id).map_err(corrupt)?,
        location: Location::try_new(location).map_err(corrupt)?,
        quantity: Quantity::try_new(quantity).map_err(corrupt)?,
        order_id,
        reason,
        state: ReservationState::parse(&state)
            .ok_or_else(|| corrupt(format!("unknown reservation state '{state}'")))?,
        created_at,
        expires_at,
        state_changed_at,
    })
}

fn movement_from_row(row: &PgRow) -> StoreResult<MovementEntry> {
    let id: Uuid = row.try_get("id").map_err(corrupt)?;
    let inventory_id: Uuid = row.try_get("inventory_id").map_err(corrupt)?;
    let movement_type: String = row.try_get("movement_type").map_err(corrupt)?;
    let quantity: i64 = row.try_get("quantity").map_err(corrupt)?;
    let stock_before: i64 = row.try_get("stock_before").map_err(corrupt)?;
    let stock_after: i64 = row.try_get("stock_after").map_err(corrupt)?;
    let reference_kind: Option<String> = row.try_get("reference_kind").map_err(corrupt)?;
    let reference_id: Option<String> = row.try_get("reference_id").map_err(corrupt)?;
    let reason: Option<String> = row.try_get("reason").map_err(corrupt)?;
    let performed_by: String = row.try_get("performed_by").map_err(corrupt)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(corrupt)?;

    let reference = match (reference_kind, reference_id) {
        (Some(kind), Some(id)) => Some(
            MovementRef::from_parts(&kind, id)
                .ok_or_else(|| corrupt(format!("unknown movement reference kind '{kind}'")))?,
        ),
        _ => None,
    };

    Ok(MovementEntry {
        id: MovementId::try_new(id).map_err(corrupt)?,
        inventory_id: InventoryId::try_new(inventory_id).map_err(corrupt)?,
        movement_type: MovementType::parse(&movement_type)
            .ok_or_else(|| corrupt(format!("unknown movement type '{movement_type}'")))?,
        quantity,
        stock_before,
        stock_after,
        reference,
        reason,
        performed_by: Actor::try_new(performed_by).map_err(corrupt)?,
        recorded_at,
    })
}
