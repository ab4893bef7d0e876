//! Storage abstraction for the stock ledger.
//!
//! The [`StockStore`] trait is the port behind which the concurrency
//! contract lives: every mutating operation goes through
//! [`StockStore::execute_locked`], which must open a transaction, take an
//! exclusive lock on the target record *before* reading its balances,
//! apply the mutation, append the ledger entry, apply any reservation
//! change, and commit — or roll the whole thing back. Implementations must
//! use real row-level locking (or equivalent serializable isolation), not
//! an in-process mutex, because multiple service instances may run against
//! the same storage concurrently.
//!
//! Read paths (`fetch_record`, `list_records`, ...) take no lock and may
//! observe balances that change immediately afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreResult;
use crate::movement::{MovementDraft, MovementEntry};
use crate::record::{NewStockRecord, StockMutation, StockRecord};
use crate::reservation::{NewReservation, Reservation, ReservationOutcome};
use crate::status::StockStatus;
use crate::types::{InventoryId, Location, ProductId, Quantity, ReservationId};

/// Addresses the stock record an operation targets.
///
/// Reservation lifecycle operations resolve records by product and
/// location; adjustment operations act on an already-resolved row by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Address by the record's unique id.
    ById(InventoryId),
    /// Address by the product × location key.
    ByProductLocation {
        /// The product to look up.
        product_id: ProductId,
        /// The location to look up.
        location: Location,
    },
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ById(id) => write!(f, "inventory id {id}"),
            Self::ByProductLocation {
                product_id,
                location,
            } => write!(f, "product '{product_id}' at location '{location}'"),
        }
    }
}

/// A reservation-table side effect applied atomically with the balance
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationChange {
    /// Insert a new `Active` reservation bound to the locked record.
    Create(NewReservation),
    /// Settle `quantity` units of an existing reservation, driving it into
    /// the terminal state once its full remaining hold is covered.
    ///
    /// If no reservation with this id exists the change is a no-op: the
    /// quantity-driven balance mutation still applies, preserving support
    /// for callers that track reservation identity externally. The whole
    /// update fails and rolls back when the reservation is held against a
    /// different stock record than the one locked, is not transitionable,
    /// or holds fewer units than `quantity`. Settling less than the
    /// remainder decrements the hold and leaves the reservation `Active`.
    Transition {
        /// The reservation to settle.
        id: ReservationId,
        /// The terminal state a full settlement lands in.
        outcome: ReservationOutcome,
        /// Units settled against the hold.
        quantity: Quantity,
    },
}

/// Everything a mutating engine operation asks the store to commit as one
/// atomic unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedUpdate {
    /// The balance transition to apply under the lock.
    pub mutation: StockMutation,
    /// The ledger entry to append in the same transaction.
    pub movement: MovementDraft,
    /// Optional reservation-table side effect.
    pub reservation: Option<ReservationChange>,
}

/// What a committed [`LockedUpdate`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// The record with its post-commit balances.
    pub record: StockRecord,
    /// The ledger entry that was appended.
    pub movement: MovementEntry,
    /// The reservation created, when the update carried a
    /// [`ReservationChange::Create`].
    pub reservation: Option<Reservation>,
}

/// Filters for the inventory list and stats queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFilter {
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Restrict to one location.
    pub location: Option<Location>,
    /// Restrict to records with this derived status.
    pub status: Option<StockStatus>,
    /// Restrict to records with at least this much physical stock.
    pub min_stock: Option<i64>,
    /// Restrict to records with at most this much physical stock.
    pub max_stock: Option<i64>,
    /// Substring match against the product id.
    pub search: Option<String>,
}

impl InventoryFilter {
    /// Whether a record passes every set criterion.
    ///
    /// The in-memory store filters with this directly; the Postgres store
    /// compiles the same semantics to SQL.
    pub fn matches(&self, record: &StockRecord) -> bool {
        if let Some(product_id) = &self.product_id {
            if &record.product_id != product_id {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if &record.location != location {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status() != status {
                return false;
            }
        }
        if let Some(min_stock) = self.min_stock {
            if record.physical_stock() < min_stock {
                return false;
            }
        }
        if let Some(max_stock) = self.max_stock {
            if record.physical_stock() > max_stock {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !record.product_id.as_ref().contains(search.as_str()) {
                return false;
            }
        }
        true
    }
}

/// 1-based offset pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Maximum items per page.
    pub limit: u32,
}

impl PageRequest {
    /// Default page size for list queries.
    pub const DEFAULT_LIMIT: u32 = 50;

    /// Creates a page request, clamping `page` to at least 1 and `limit`
    /// to at least 1.
    pub const fn new(page: u32, limit: u32) -> Self {
        Self {
            page: if page == 0 { 1 } else { page },
            limit: if limit == 0 { 1 } else { limit },
        }
    }

    /// Number of items to skip.
    pub const fn offset(self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// The page that was requested.
    pub page: u32,
    /// The limit that was requested.
    pub limit: u32,
    /// Total items matching the filter across all pages.
    pub total: u64,
}

impl<T> Page<T> {
    /// Maps the items of the page, preserving the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            limit: self.limit,
            total: self.total,
        }
    }
}

/// Backend-independent storage port for the engine.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Creates the stock record for a newly onboarded product.
    ///
    /// Fails with [`crate::errors::StoreError::DuplicateRecord`] if a
    /// record already exists for the product × location key.
    async fn create_record(&self, new: NewStockRecord) -> StoreResult<StockRecord>;

    /// Reads a record without locking; `None` if absent.
    async fn fetch_record(&self, key: &RecordKey) -> StoreResult<Option<StockRecord>>;

    /// Applies a [`LockedUpdate`] atomically under an exclusive row lock.
    ///
    /// The lock wait must be bounded; exceeding it surfaces
    /// [`crate::errors::StoreError::LockTimeout`]. Any failure — missing
    /// record, balance invariant, reservation state — rolls back the whole
    /// transaction: no partial mutation or partial ledger write commits.
    async fn execute_locked(&self, key: RecordKey, update: LockedUpdate)
        -> StoreResult<UpdateOutcome>;

    /// Reads a reservation by id; `None` if absent.
    async fn fetch_reservation(&self, id: &ReservationId) -> StoreResult<Option<Reservation>>;

    /// Returns up to `limit` `Active` reservations whose expiry has passed
    /// as of `as_of`, oldest expiry first.
    async fn expired_reservations(
        &self,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Reservation>>;

    /// Lists records matching the filter, paged.
    async fn list_records(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> StoreResult<Page<StockRecord>>;

    /// Returns every record matching the filter (for aggregate statistics).
    async fn all_records(&self, filter: &InventoryFilter) -> StoreResult<Vec<StockRecord>>;

    /// Returns the most recent ledger entries for a record, newest first.
    async fn movements(
        &self,
        inventory_id: InventoryId,
        limit: usize,
    ) -> StoreResult<Vec<MovementEntry>>;
}
