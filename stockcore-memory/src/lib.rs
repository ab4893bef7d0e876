//! In-memory adapter for the `StockCore` inventory engine
//!
//! This crate provides an in-memory implementation of the `StockStore`
//! trait from the stockcore crate, useful for testing and development
//! scenarios where persistence is not required.
//!
//! Row-level locking is modeled with one async mutex per stock record,
//! acquired with a bounded wait, so engine tests exercise the same
//! lock/validate/commit sequence — and the same `LockTimeout` failure
//! mode — as the Postgres adapter.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use stockcore::errors::{StoreError, StoreResult};
use stockcore::movement::MovementEntry;
use stockcore::record::{NewStockRecord, StockRecord};
use stockcore::reservation::{Reservation, ReservationState};
use stockcore::store::{
    InventoryFilter, LockedUpdate, Page, PageRequest, RecordKey, ReservationChange, StockStore,
    UpdateOutcome,
};
use stockcore::types::{InventoryId, Location, ProductId, ReservationId};

/// How long a writer waits for a record's lock before giving up.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Inner {
    // Record state, readable without touching any row lock
    records: RwLock<HashMap<InventoryId, StockRecord>>,
    // product × location uniqueness and lookup
    index: RwLock<HashMap<(ProductId, Location), InventoryId>>,
    // One async mutex per record: the "row lock" writers contend on
    row_locks: RwLock<HashMap<InventoryId, Arc<Mutex<()>>>>,
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
    movements: RwLock<Vec<MovementEntry>>,
}

/// Thread-safe in-memory stock store for testing.
///
/// Cloning shares the underlying storage, so a clone handed to another
/// task sees the same records and reservations.
#[derive(Clone)]
pub struct InMemoryStockStore {
    inner: Arc<Inner>,
    lock_wait: Duration,
}

impl Default for InMemoryStockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStockStore")
            .field("lock_wait", &self.lock_wait)
            .finish_non_exhaustive()
    }
}

impl InMemoryStockStore {
    /// Create a new empty in-memory stock store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    /// Create a store with a custom bounded lock wait.
    ///
    /// Tests that provoke lock contention shorten this so the timeout
    /// path is observable without a five-second stall.
    pub fn with_lock_wait(lock_wait: Duration) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            lock_wait,
        }
    }

    fn resolve(&self, key: &RecordKey) -> StoreResult<InventoryId> {
        match key {
            RecordKey::ById(id) => {
                let records = self.inner.records.read().expect("RwLock poisoned");
                if records.contains_key(id) {
                    Ok(*id)
                } else {
                    Err(StoreError::RecordNotFound(key.clone()))
                }
            }
            RecordKey::ByProductLocation {
                product_id,
                location,
            } => {
                let index = self.inner.index.read().expect("RwLock poisoned");
                index
                    .get(&(product_id.clone(), location.clone()))
                    .copied()
                    .ok_or_else(|| StoreError::RecordNotFound(key.clone()))
            }
        }
    }

    fn row_lock(&self, id: InventoryId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.row_locks.write().expect("RwLock poisoned");
        Arc::clone(locks.entry(id).or_default())
    }

    /// Stages the reservation side effect, returning the reservation row
    /// to write back on commit. Missing reservations on a transition are
    /// a no-op; reservations held against a different record,
    /// untransitionable ones, and over-settlement fail the whole update.
    fn stage_reservation(
        &self,
        change: &ReservationChange,
        inventory_id: InventoryId,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        match change {
            ReservationChange::Create(new) => {
                let reservations = self.inner.reservations.read().expect("RwLock poisoned");
                if reservations.contains_key(&new.reservation_id) {
                    return Err(StoreError::DuplicateReservation(new.reservation_id.clone()));
                }
                Ok(Some(Reservation::activate(new.clone(), inventory_id, now)))
            }
            ReservationChange::Transition {
                id,
                outcome,
                quantity,
            } => {
                let reservations = self.inner.reservations.read().expect("RwLock poisoned");
                let Some(existing) = reservations.get(id) else {
                    return Ok(None);
                };
                // The row lock held is the record's; a reservation against
                // another record cannot be settled through it.
                if existing.inventory_id != inventory_id {
                    return Err(StoreError::ReservationMismatch { id: id.clone() });
                }
                let mut updated = existing.clone();
                updated.settle(*outcome, *quantity, now)?;
                Ok(Some(updated))
            }
        }
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn create_record(&self, new: NewStockRecord) -> StoreResult<StockRecord> {
        let key = (new.product_id.clone(), new.location.clone());
        let mut index = self.inner.index.write().expect("RwLock poisoned");
        if index.contains_key(&key) {
            return Err(StoreError::DuplicateRecord {
                product_id: key.0,
                location: key.1,
            });
        }
        let record = StockRecord::create(new)?;
        let mut records = self.inner.records.write().expect("RwLock poisoned");
        index.insert(key, record.id);
        records.insert(record.id, record.clone());
        debug!(inventory_id = %record.id, "created stock record");
        Ok(record)
    }

    async fn fetch_record(&self, key: &RecordKey) -> StoreResult<Option<StockRecord>> {
        let id = match self.resolve(key) {
            Ok(id) => id,
            Err(StoreError::RecordNotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let records = self.inner.records.read().expect("RwLock poisoned");
        Ok(records.get(&id).cloned())
    }

    async fn execute_locked(
        &self,
        key: RecordKey,
        update: LockedUpdate,
    ) -> StoreResult<UpdateOutcome> {
        let id = self.resolve(&key)?;
        let row_lock = self.row_lock(id);

        // Bounded lock wait, mirroring the SQL adapter's lock_timeout.
        let _guard = tokio::time::timeout(self.lock_wait, row_lock.lock())
            .await
            .map_err(|_| StoreError::LockTimeout(self.lock_wait))?;

        // Re-read under the lock: the balances a previous writer committed
        // are what this update validates against.
        let mut working = {
            let records = self.inner.records.read().expect("RwLock poisoned");
            records
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::RecordNotFound(key.clone()))?
        };

        let now = Utc::now();
        let stock_before = working.physical_stock();

        // Validate everything before touching shared state, then commit.
        let staged = match &update.reservation {
            Some(change) => self.stage_reservation(change, id, now)?,
            None => None,
        };
        working.apply(&update.mutation)?;
        let stock_after = working.physical_stock();

        let entry =
            MovementEntry::from_draft(update.movement, id, stock_before, stock_after, now);

        {
            let mut records = self.inner.records.write().expect("RwLock poisoned");
            records.insert(id, working.clone());
        }
        if let Some(reservation) = &staged {
            let mut reservations = self.inner.reservations.write().expect("RwLock poisoned");
            reservations.insert(reservation.reservation_id.clone(), reservation.clone());
        }
        {
            let mut movements = self.inner.movements.write().expect("RwLock poisoned");
            movements.push(entry.clone());
        }

        let created = matches!(update.reservation, Some(ReservationChange::Create(_)));
        Ok(UpdateOutcome {
            record: working,
            movement: entry,
            reservation: if created { staged } else { None },
        })
    }

    async fn fetch_reservation(&self, id: &ReservationId) -> StoreResult<Option<Reservation>> {
        let reservations = self.inner.reservations.read().expect("RwLock poisoned");
        Ok(reservations.get(id).cloned())
    }

    async fn expired_reservations(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Reservation>> {
        let reservations = self.inner.reservations.read().expect("RwLock poisoned");
        let mut due: Vec<Reservation> = reservations
            .values()
            .filter(|r| r.state == ReservationState::Active && r.expires_at <= as_of)
            .cloned()
            .collect();
        due.sort_by_key(|r| r.expires_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn list_records(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> StoreResult<Page<StockRecord>> {
        let mut matching = self.all_records(filter).await?;
        // Stable order so pages do not shuffle between requests.
        matching.sort_by(|a, b| {
            (a.product_id.as_ref(), a.location.as_ref())
                .cmp(&(b.product_id.as_ref(), b.location.as_ref()))
        });
        let total = matching.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let items: Vec<StockRecord> = matching
            .into_iter()
            .skip(offset)
            .take(page.limit as usize)
            .collect();
        Ok(Page {
            items,
            page: page.page,
            limit: page.limit,
            total,
        })
    }

    async fn all_records(&self, filter: &InventoryFilter) -> StoreResult<Vec<StockRecord>> {
        let records = self.inner.records.read().expect("RwLock poisoned");
        Ok(records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn movements(
        &self,
        inventory_id: InventoryId,
        limit: usize,
    ) -> StoreResult<Vec<MovementEntry>> {
        let movements = self.inner.movements.read().expect("RwLock poisoned");
        Ok(movements
            .iter()
            .rev()
            .filter(|entry| entry.inventory_id == inventory_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
