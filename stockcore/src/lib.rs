//! `StockCore` - Inventory stock ledger and reservation engine
//!
//! This library keeps authoritative per-product, per-location stock
//! balances, time-limited reservations with a strict lifecycle
//! (`Active → Released | Fulfilled | Expired`), and an append-only
//! movement ledger auditing every balance change.
//!
//! Concurrency control is pessimistic: every mutation is applied by a
//! [`store::StockStore`] under an exclusive row lock, so the invariant
//! `0 ≤ reserved_stock ≤ physical_stock` holds under any interleaving of
//! writers, including multiple service instances sharing one database.
//!
//! Storage backends live in companion crates (`stockcore-postgres` for
//! production, `stockcore-memory` for tests); this crate defines the
//! domain model, the storage port, the [`engine::InventoryEngine`]
//! operation surface, and the [`sweeper::ReservationSweeper`] that
//! returns lapsed holds to the available pool.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod errors;
pub mod movement;
pub mod record;
pub mod reservation;
pub mod status;
pub mod store;
pub mod sweeper;
pub mod types;

pub use engine::{
    AddStockRequest, AvailabilityReport, EngineConfig, FulfillRequest, InventoryEngine,
    ReleaseRequest, RemoveStockRequest, ReserveRequest,
};
pub use errors::{BalanceError, EngineError, EngineResult, StoreError, StoreResult};
pub use movement::{replay_physical, MovementDraft, MovementEntry, MovementRef, MovementType};
pub use record::{NewStockRecord, StockMutation, StockRecord, StockSnapshot};
pub use reservation::{
    NewReservation, Reservation, ReservationDetails, ReservationOutcome, ReservationSnapshot,
    ReservationState,
};
pub use status::{stock_status, InventoryStats, StockStatus};
pub use store::{
    InventoryFilter, LockedUpdate, Page, PageRequest, RecordKey, ReservationChange, StockStore,
    UpdateOutcome,
};
pub use sweeper::{ReservationSweeper, SweeperConfig, SweeperHandle};
pub use types::{Actor, InventoryId, Location, MovementId, ProductId, Quantity, ReservationId};
