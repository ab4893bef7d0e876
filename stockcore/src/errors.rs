//! Error types for the stock ledger and reservation engine.
//!
//! Errors are layered the same way the crates are:
//!
//! - [`BalanceError`]: a pure balance transition on a [`crate::record::StockRecord`]
//!   would violate the `0 ≤ reserved ≤ physical` invariant.
//! - [`StoreError`]: a storage adapter fault — missing rows, lock timeouts,
//!   connection problems, or a balance invariant tripped inside the locked
//!   transaction.
//! - [`EngineError`]: the caller-facing taxonomy. Every engine operation
//!   detects these synchronously inside the locked transaction and rolls
//!   back; no partial mutation or partial ledger write is ever committed.
//!
//! The engine never retries on its own. Lock timeouts surface as a
//! retryable [`EngineError::Conflict`]; retry policy belongs to the caller.

use std::time::Duration;

use crate::reservation::ReservationState;
use crate::store::RecordKey;
use crate::types::{InventoryId, Location, ProductId, ReservationId};
use thiserror::Error;

/// A balance transition would violate the stock invariant.
///
/// These are produced by the pure methods on `StockRecord` and never commit
/// a partial mutation: the record is untouched when a `BalanceError` is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    /// The requested quantity exceeds `physical − reserved`.
    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailable {
        /// The quantity the caller asked for.
        requested: i64,
        /// The available stock at the time of the attempt.
        available: i64,
    },

    /// The requested quantity exceeds the currently reserved stock.
    #[error("insufficient reserved stock: requested {requested}, reserved {reserved}")]
    InsufficientReserved {
        /// The quantity the caller asked for.
        requested: i64,
        /// The reserved stock at the time of the attempt.
        reserved: i64,
    },

    /// Stored balances do not satisfy `0 ≤ reserved ≤ physical`.
    ///
    /// Only reachable when hydrating a record from storage; a record built
    /// through the engine can never get into this state.
    #[error("corrupt stock balances: physical {physical}, reserved {reserved}")]
    CorruptBalances {
        /// The physical stock found in storage.
        physical: i64,
        /// The reserved stock found in storage.
        reserved: i64,
    },

    /// A balance counter would overflow `i64`.
    #[error("stock balance arithmetic overflowed")]
    Overflow,
}

/// Errors surfaced by [`crate::store::StockStore`] implementations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No stock record exists for the given key.
    #[error("stock record not found for {0}")]
    RecordNotFound(RecordKey),

    /// A stock record already exists for this product and location.
    #[error("stock record already exists for product '{product_id}' at location '{location}'")]
    DuplicateRecord {
        /// The product of the conflicting record.
        product_id: ProductId,
        /// The location of the conflicting record.
        location: Location,
    },

    /// A reservation with this id has already been created.
    #[error("reservation '{0}' already exists")]
    DuplicateReservation(ReservationId),

    /// The referenced reservation is no longer active.
    #[error("reservation '{id}' is {state}, expected an active reservation")]
    ReservationNotActive {
        /// The reservation the caller referenced.
        id: ReservationId,
        /// Its current lifecycle state.
        state: ReservationState,
    },

    /// The referenced reservation has passed its expiry time.
    #[error("reservation '{0}' has expired")]
    ReservationExpired(ReservationId),

    /// The referenced reservation is held against a different stock record.
    #[error("reservation '{id}' does not belong to the locked stock record")]
    ReservationMismatch {
        /// The reservation the caller referenced.
        id: ReservationId,
    },

    /// The operation's quantity exceeds the reservation's remaining hold.
    #[error("requested {requested} exceeds the remaining {remaining} units of reservation '{id}'")]
    ReservationQuantityExceeded {
        /// The reservation the caller referenced.
        id: ReservationId,
        /// The quantity the caller asked for.
        requested: i64,
        /// Units still held by the reservation.
        remaining: i64,
    },

    /// A balance invariant failed inside the locked transaction.
    ///
    /// The transaction is rolled back before this is returned.
    #[error("balance invariant violated: {0}")]
    Invariant(#[from] BalanceError),

    /// The row lock could not be acquired within the configured bound.
    ///
    /// Callers should treat this as a retryable conflict.
    #[error("timed out after {0:?} waiting for the stock record lock")]
    LockTimeout(Duration),

    /// The connection to the storage backend failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A value read from storage could not be converted to a domain type.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// An unexpected internal storage error occurred.
    #[error("internal storage error: {0}")]
    Internal(String),
}

/// The caller-facing error taxonomy of the engine.
///
/// The API layer maps these to user-facing responses; none of them are
/// swallowed inside the engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// No stock record exists for the given product and location.
    #[error("no stock record for product '{product_id}' at location '{location}'")]
    RecordNotFound {
        /// The product that was looked up.
        product_id: ProductId,
        /// The location that was looked up.
        location: Location,
    },

    /// No stock record exists with the given inventory id.
    #[error("no stock record with inventory id {0}")]
    InventoryNotFound(InventoryId),

    /// No reservation exists with the given id.
    #[error("no reservation with id '{0}'")]
    ReservationNotFound(ReservationId),

    /// A quantity was zero or negative where a positive count is required.
    #[error("invalid quantity {supplied}: must be a positive integer")]
    InvalidQuantity {
        /// The quantity the caller supplied.
        supplied: i64,
    },

    /// The requested quantity exceeds the available stock.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        /// The quantity the caller asked for.
        requested: i64,
        /// The available stock observed under the row lock.
        available: i64,
    },

    /// The release would violate the reservation invariant.
    #[error("invalid release: {0}")]
    InvalidRelease(String),

    /// The fulfillment would violate the reservation invariant.
    #[error("invalid fulfillment: {0}")]
    InvalidFulfillment(String),

    /// The operation conflicted with a concurrent writer or tripped a
    /// balance or reservation-state invariant inside the locked transaction.
    #[error("conflict on stock record: {reason}")]
    Conflict {
        /// What went wrong.
        reason: String,
        /// Whether retrying the operation may succeed.
        retryable: bool,
    },

    /// A storage fault unrelated to the request itself.
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl EngineError {
    /// Whether the caller may retry the operation as-is.
    ///
    /// Only lock-timeout style conflicts qualify; everything else needs a
    /// changed request or operator intervention.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict {
                retryable: true,
                ..
            }
        )
    }
}

/// Type alias for engine operation results.
pub type EngineResult<T> = Result<T, EngineError>;

/// Type alias for storage adapter results.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for EngineError {
    /// Context-free mapping for store faults.
    ///
    /// Operation-specific faults (insufficient balances, reservation state)
    /// are mapped by the engine per operation, because the same
    /// `BalanceError` means `InsufficientStock` on a reserve but
    /// `InvalidRelease` on a release.
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(waited) => Self::Conflict {
                reason: format!("row lock not acquired within {waited:?}"),
                retryable: true,
            },
            StoreError::Invariant(balance) => Self::Conflict {
                reason: balance.to_string(),
                retryable: false,
            },
            StoreError::DuplicateRecord { .. }
            | StoreError::DuplicateReservation(_)
            | StoreError::ReservationNotActive { .. }
            | StoreError::ReservationExpired(_)
            | StoreError::ReservationMismatch { .. }
            | StoreError::ReservationQuantityExceeded { .. } => Self::Conflict {
                reason: err.to_string(),
                retryable: false,
            },
            other => Self::Store(other),
        }
    }
}
