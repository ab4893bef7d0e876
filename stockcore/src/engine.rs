//! The engine's operation surface: reservation lifecycle, stock
//! adjustments, and the read-only availability/list/stats queries.
//!
//! Every mutating operation builds a [`LockedUpdate`] and hands it to the
//! store, which applies it under an exclusive row lock inside a
//! transaction. Quantity validation happens here, at the boundary; balance
//! validation happens under the lock, so concurrent writers are always
//! evaluated against the freshest committed balances. The engine holds no
//! mutable state of its own — correctness under concurrency rests entirely
//! on the store's row-lock semantics.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::errors::{BalanceError, EngineError, EngineResult, StoreError};
use crate::movement::{MovementDraft, MovementEntry, MovementRef, MovementType};
use crate::record::{NewStockRecord, StockMutation, StockSnapshot};
use crate::reservation::{
    NewReservation, Reservation, ReservationDetails, ReservationOutcome, ReservationSnapshot,
};
use crate::status::InventoryStats;
use crate::store::{
    InventoryFilter, LockedUpdate, Page, PageRequest, RecordKey, ReservationChange, StockStore,
};
use crate::types::{Actor, InventoryId, Location, ProductId, Quantity, ReservationId};

/// Engine-wide defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// TTL applied to reservations that do not specify one (default: 30).
    pub default_ttl_minutes: i64,
    /// Location assumed when a caller does not specify one.
    pub default_location: Location,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl_minutes: 30,
            default_location: Location::default_location(),
        }
    }
}

/// Request to place a hold on stock.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    /// The product to hold.
    pub product_id: ProductId,
    /// Units to hold (validated positive by the engine).
    pub quantity: i64,
    /// Caller-supplied reservation identity.
    pub reservation_id: ReservationId,
    /// Location; engine default when absent.
    pub location: Option<Location>,
    /// Hold TTL in minutes (must be at least 1); engine default when
    /// absent.
    pub ttl_minutes: Option<i64>,
    /// Free-text reason recorded on the ledger and the reservation.
    pub reason: Option<String>,
    /// The order the hold is for, if known.
    pub order_id: Option<String>,
    /// Who is reserving; `system` when absent.
    pub performed_by: Option<Actor>,
}

impl ReserveRequest {
    /// Creates a reserve request with engine defaults for everything
    /// optional.
    pub const fn new(product_id: ProductId, quantity: i64, reservation_id: ReservationId) -> Self {
        Self {
            product_id,
            quantity,
            reservation_id,
            location: None,
            ttl_minutes: None,
            reason: None,
            order_id: None,
            performed_by: None,
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the hold TTL in minutes.
    ///
    /// Zero and negative TTLs are rejected at reserve time with
    /// `InvalidQuantity`.
    #[must_use]
    pub const fn with_ttl_minutes(mut self, ttl_minutes: i64) -> Self {
        self.ttl_minutes = Some(ttl_minutes);
        self
    }

    /// Sets the free-text reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Links the hold to an order.
    #[must_use]
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Sets the performing actor.
    #[must_use]
    pub fn with_performed_by(mut self, actor: Actor) -> Self {
        self.performed_by = Some(actor);
        self
    }
}

/// Request to return held stock to the available pool.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    /// The product the hold is against.
    pub product_id: ProductId,
    /// Units to release (validated positive by the engine).
    pub quantity: i64,
    /// The reservation being released.
    pub reservation_id: ReservationId,
    /// Location; engine default when absent.
    pub location: Option<Location>,
    /// Free-text reason recorded on the ledger.
    pub reason: Option<String>,
    /// Who is releasing; `system` when absent.
    pub performed_by: Option<Actor>,
}

impl ReleaseRequest {
    /// Creates a release request with engine defaults for everything
    /// optional.
    pub const fn new(product_id: ProductId, quantity: i64, reservation_id: ReservationId) -> Self {
        Self {
            product_id,
            quantity,
            reservation_id,
            location: None,
            reason: None,
            performed_by: None,
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the free-text reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the performing actor.
    #[must_use]
    pub fn with_performed_by(mut self, actor: Actor) -> Self {
        self.performed_by = Some(actor);
        self
    }
}

/// Request to convert held stock into a permanent deduction.
#[derive(Debug, Clone)]
pub struct FulfillRequest {
    /// The product the hold is against.
    pub product_id: ProductId,
    /// Units to fulfill (validated positive by the engine).
    pub quantity: i64,
    /// The reservation being fulfilled.
    pub reservation_id: ReservationId,
    /// The order the sale is recorded against.
    pub order_id: String,
    /// Location; engine default when absent.
    pub location: Option<Location>,
    /// Free-text notes recorded on the ledger.
    pub notes: Option<String>,
    /// Who is fulfilling; `system` when absent.
    pub performed_by: Option<Actor>,
}

impl FulfillRequest {
    /// Creates a fulfill request with engine defaults for everything
    /// optional.
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        reservation_id: ReservationId,
        order_id: impl Into<String>,
    ) -> Self {
        Self {
            product_id,
            quantity,
            reservation_id,
            order_id: order_id.into(),
            location: None,
            notes: None,
            performed_by: None,
        }
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the free-text notes.
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Sets the performing actor.
    #[must_use]
    pub fn with_performed_by(mut self, actor: Actor) -> Self {
        self.performed_by = Some(actor);
        self
    }
}

/// Request to add physical stock outside the reservation flow.
#[derive(Debug, Clone)]
pub struct AddStockRequest {
    /// The record to add stock to.
    pub inventory_id: InventoryId,
    /// Units to add (validated positive by the engine).
    pub quantity: i64,
    /// Why stock is entering (`Restock`, `Return`, `Adjustment`, ...).
    pub movement_type: MovementType,
    /// New per-unit acquisition cost, if known.
    pub unit_cost: Option<Decimal>,
    /// What caused the addition (purchase order, order return, ...).
    pub reference: Option<MovementRef>,
    /// Free-text reason recorded on the ledger.
    pub reason: Option<String>,
    /// Who is adjusting; `system` when absent.
    pub performed_by: Option<Actor>,
}

impl AddStockRequest {
    /// Creates an add-stock request with engine defaults for everything
    /// optional.
    pub const fn new(inventory_id: InventoryId, quantity: i64, movement_type: MovementType) -> Self {
        Self {
            inventory_id,
            quantity,
            movement_type,
            unit_cost: None,
            reference: None,
            reason: None,
            performed_by: None,
        }
    }

    /// Sets the per-unit acquisition cost.
    #[must_use]
    pub const fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    /// Sets the causing reference.
    #[must_use]
    pub fn with_reference(mut self, reference: MovementRef) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Sets the free-text reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the performing actor.
    #[must_use]
    pub fn with_performed_by(mut self, actor: Actor) -> Self {
        self.performed_by = Some(actor);
        self
    }
}

/// Request to remove physical stock outside the reservation flow.
#[derive(Debug, Clone)]
pub struct RemoveStockRequest {
    /// The record to remove stock from.
    pub inventory_id: InventoryId,
    /// Units to remove (validated positive by the engine).
    pub quantity: i64,
    /// Why stock is leaving (`Damage`, `Sale`, `Adjustment`, ...).
    pub movement_type: MovementType,
    /// What caused the removal.
    pub reference: Option<MovementRef>,
    /// Free-text reason recorded on the ledger.
    pub reason: Option<String>,
    /// Who is adjusting; `system` when absent.
    pub performed_by: Option<Actor>,
}

impl RemoveStockRequest {
    /// Creates a remove-stock request with engine defaults for everything
    /// optional.
    pub const fn new(inventory_id: InventoryId, quantity: i64, movement_type: MovementType) -> Self {
        Self {
            inventory_id,
            quantity,
            movement_type,
            reference: None,
            reason: None,
            performed_by: None,
        }
    }

    /// Sets the causing reference.
    #[must_use]
    pub fn with_reference(mut self, reference: MovementRef) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Sets the free-text reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the performing actor.
    #[must_use]
    pub fn with_performed_by(mut self, actor: Actor) -> Self {
        self.performed_by = Some(actor);
        self
    }
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    /// The quantity that was asked about.
    pub requested: i64,
    /// Whether `available_stock ≥ requested` at the time of the read.
    ///
    /// Unlocked read: the balance may change immediately afterwards, so
    /// writers re-validate under the lock.
    pub is_available: bool,
    /// The record's balances at the time of the read.
    pub stock: StockSnapshot,
}

/// The inventory stock ledger and reservation engine.
///
/// Cheap to clone-by-`Arc` and safe to share across request handlers and
/// queue workers: all state lives in the store.
pub struct InventoryEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S> std::fmt::Debug for InventoryEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: StockStore> InventoryEngine<S> {
    /// Creates an engine with default configuration.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    /// Creates an engine with custom configuration.
    pub const fn with_config(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// The engine's configuration.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Onboards a product into inventory, creating its stock record.
    #[instrument(skip(self, new), fields(product = %new.product_id, location = %new.location))]
    pub async fn create_record(&self, new: NewStockRecord) -> EngineResult<StockSnapshot> {
        if new.physical_stock < 0 {
            return Err(EngineError::InvalidQuantity {
                supplied: new.physical_stock,
            });
        }
        let record = self.store.create_record(new).await.map_err(EngineError::from)?;
        debug!(inventory_id = %record.id, "stock record created");
        Ok(record.snapshot())
    }

    /// Checks whether `quantity` units of a product are available.
    ///
    /// Takes no lock; callers that intend to mutate must still go through
    /// [`Self::reserve_stock`], which re-validates under the row lock.
    #[instrument(skip(self), fields(product = %product_id))]
    pub async fn check_availability(
        &self,
        product_id: &ProductId,
        quantity: i64,
        location: Option<Location>,
    ) -> EngineResult<AvailabilityReport> {
        let requested = positive(quantity)?.get();
        let location = self.location_or_default(location);
        let key = RecordKey::ByProductLocation {
            product_id: product_id.clone(),
            location: location.clone(),
        };
        let record = self
            .store
            .fetch_record(&key)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::RecordNotFound {
                product_id: product_id.clone(),
                location,
            })?;
        Ok(AvailabilityReport {
            requested,
            is_available: record.available_stock() >= requested,
            stock: record.snapshot(),
        })
    }

    /// Places a hold on stock, creating an `Active` reservation.
    ///
    /// The exclusive row lock serializes this against every other mutation
    /// of the same record: of two concurrent reserves whose combined
    /// quantity exceeds availability, the second waits for the lock,
    /// re-reads the updated balance, and fails with `InsufficientStock`.
    #[instrument(skip(self, req), fields(product = %req.product_id, reservation = %req.reservation_id))]
    pub async fn reserve_stock(&self, req: ReserveRequest) -> EngineResult<ReservationSnapshot> {
        let quantity = positive(req.quantity)?;
        let location = self.location_or_default(req.location);
        let ttl_minutes = req.ttl_minutes.unwrap_or(self.config.default_ttl_minutes);
        if ttl_minutes < 1 {
            return Err(EngineError::InvalidQuantity {
                supplied: ttl_minutes,
            });
        }

        let mutation = StockMutation::Reserve { quantity };
        let update = LockedUpdate {
            movement: MovementDraft {
                movement_type: MovementType::Reservation,
                quantity: mutation.ledger_delta(),
                reference: Some(MovementRef::Reservation(req.reservation_id.clone())),
                reason: req.reason.clone(),
                performed_by: req.performed_by.unwrap_or_else(Actor::system),
            },
            reservation: Some(ReservationChange::Create(NewReservation {
                reservation_id: req.reservation_id,
                product_id: req.product_id.clone(),
                location: location.clone(),
                quantity,
                order_id: req.order_id,
                reason: req.reason,
                ttl: Duration::minutes(ttl_minutes),
            })),
            mutation,
        };

        let outcome = self
            .store
            .execute_locked(
                RecordKey::ByProductLocation {
                    product_id: req.product_id.clone(),
                    location: location.clone(),
                },
                update,
            )
            .await
            .map_err(|err| reserve_error(err, req.product_id, location))?;

        let reservation = outcome.reservation.ok_or_else(|| {
            EngineError::Store(StoreError::Internal(
                "store did not return the created reservation".to_string(),
            ))
        })?;
        Ok(ReservationSnapshot {
            reservation,
            stock: outcome.record.snapshot(),
        })
    }

    /// Returns held stock to the available pool.
    ///
    /// Releasing part of the hold keeps the reservation `Active` with the
    /// remainder; it reaches `Released` only when the full remaining
    /// quantity comes back. Releasing more than the reservation still
    /// holds — including a double release — is a caller error
    /// (`InvalidRelease`), never a silent no-op.
    #[instrument(skip(self, req), fields(product = %req.product_id, reservation = %req.reservation_id))]
    pub async fn release_reservation(&self, req: ReleaseRequest) -> EngineResult<StockSnapshot> {
        let quantity = positive(req.quantity)?;
        let location = self.location_or_default(req.location);

        let mutation = StockMutation::Release { quantity };
        let update = LockedUpdate {
            movement: MovementDraft {
                movement_type: MovementType::ReleaseReservation,
                quantity: mutation.ledger_delta(),
                reference: Some(MovementRef::Reservation(req.reservation_id.clone())),
                reason: req.reason,
                performed_by: req.performed_by.unwrap_or_else(Actor::system),
            },
            reservation: Some(ReservationChange::Transition {
                id: req.reservation_id,
                outcome: ReservationOutcome::Released,
                quantity,
            }),
            mutation,
        };

        let outcome = self
            .store
            .execute_locked(
                RecordKey::ByProductLocation {
                    product_id: req.product_id.clone(),
                    location: location.clone(),
                },
                update,
            )
            .await
            .map_err(|err| release_error(err, req.product_id, location))?;
        Ok(outcome.record.snapshot())
    }

    /// Converts held stock into a permanent deduction, recording a `Sale`.
    ///
    /// Partial fulfillments settle like partial releases: the reservation
    /// stays `Active` holding the remainder until it is fully covered.
    #[instrument(skip(self, req), fields(product = %req.product_id, reservation = %req.reservation_id, order = %req.order_id))]
    pub async fn fulfill_reservation(&self, req: FulfillRequest) -> EngineResult<StockSnapshot> {
        let quantity = positive(req.quantity)?;
        let location = self.location_or_default(req.location);

        let mutation = StockMutation::Fulfill { quantity };
        let update = LockedUpdate {
            movement: MovementDraft {
                movement_type: MovementType::Sale,
                quantity: mutation.ledger_delta(),
                reference: Some(MovementRef::Order(req.order_id)),
                reason: req.notes,
                performed_by: req.performed_by.unwrap_or_else(Actor::system),
            },
            reservation: Some(ReservationChange::Transition {
                id: req.reservation_id,
                outcome: ReservationOutcome::Fulfilled,
                quantity,
            }),
            mutation,
        };

        let outcome = self
            .store
            .execute_locked(
                RecordKey::ByProductLocation {
                    product_id: req.product_id.clone(),
                    location: location.clone(),
                },
                update,
            )
            .await
            .map_err(|err| fulfill_error(err, req.product_id, location))?;
        Ok(outcome.record.snapshot())
    }

    /// Adds physical stock to an already-resolved record.
    #[instrument(skip(self, req), fields(inventory_id = %req.inventory_id, movement_type = %req.movement_type))]
    pub async fn add_stock(&self, req: AddStockRequest) -> EngineResult<StockSnapshot> {
        let quantity = positive(req.quantity)?;
        adjustment_type(req.movement_type)?;

        let mutation = StockMutation::Add {
            quantity,
            unit_cost: req.unit_cost,
        };
        let update = LockedUpdate {
            movement: MovementDraft {
                movement_type: req.movement_type,
                quantity: mutation.ledger_delta(),
                reference: req.reference,
                reason: req.reason,
                performed_by: req.performed_by.unwrap_or_else(Actor::system),
            },
            reservation: None,
            mutation,
        };

        let outcome = self
            .store
            .execute_locked(RecordKey::ById(req.inventory_id), update)
            .await
            .map_err(|err| adjustment_error(err, req.inventory_id))?;

        if let Some(maximum) = outcome.record.maximum_stock {
            if outcome.record.physical_stock() > maximum {
                warn!(
                    inventory_id = %outcome.record.id,
                    physical = outcome.record.physical_stock(),
                    maximum,
                    "physical stock exceeds the configured maximum"
                );
            }
        }
        Ok(outcome.record.snapshot())
    }

    /// Removes physical stock from an already-resolved record.
    ///
    /// Reserved units cannot be removed: the request fails with
    /// `InsufficientStock` when it exceeds available stock.
    #[instrument(skip(self, req), fields(inventory_id = %req.inventory_id, movement_type = %req.movement_type))]
    pub async fn remove_stock(&self, req: RemoveStockRequest) -> EngineResult<StockSnapshot> {
        let quantity = positive(req.quantity)?;
        adjustment_type(req.movement_type)?;

        let mutation = StockMutation::Remove { quantity };
        let update = LockedUpdate {
            movement: MovementDraft {
                movement_type: req.movement_type,
                quantity: mutation.ledger_delta(),
                reference: req.reference,
                reason: req.reason,
                performed_by: req.performed_by.unwrap_or_else(Actor::system),
            },
            reservation: None,
            mutation,
        };

        let outcome = self
            .store
            .execute_locked(RecordKey::ById(req.inventory_id), update)
            .await
            .map_err(|err| adjustment_error(err, req.inventory_id))?;
        Ok(outcome.record.snapshot())
    }

    /// Reads a reservation and its time-dependent predicates.
    #[instrument(skip(self))]
    pub async fn get_reservation_details(
        &self,
        reservation_id: &ReservationId,
    ) -> EngineResult<ReservationDetails> {
        let reservation = self
            .store
            .fetch_reservation(reservation_id)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::ReservationNotFound(reservation_id.clone()))?;
        Ok(ReservationDetails::evaluate(reservation, Utc::now()))
    }

    /// Lists stock snapshots matching the filter, paged.
    #[instrument(skip(self, filter))]
    pub async fn list_inventory(
        &self,
        filter: &InventoryFilter,
        page: PageRequest,
    ) -> EngineResult<Page<StockSnapshot>> {
        let records = self
            .store
            .list_records(filter, page)
            .await
            .map_err(EngineError::from)?;
        Ok(records.map(|record| record.snapshot()))
    }

    /// Aggregate statistics, optionally scoped to one location.
    #[instrument(skip(self))]
    pub async fn inventory_stats(&self, location: Option<Location>) -> EngineResult<InventoryStats> {
        let filter = InventoryFilter {
            location,
            ..InventoryFilter::default()
        };
        let records = self
            .store
            .all_records(&filter)
            .await
            .map_err(EngineError::from)?;
        Ok(InventoryStats::compute(&records))
    }

    /// Reads the most recent ledger entries for a record, newest first.
    #[instrument(skip(self))]
    pub async fn movement_history(
        &self,
        inventory_id: InventoryId,
        limit: usize,
    ) -> EngineResult<Vec<MovementEntry>> {
        let key = RecordKey::ById(inventory_id);
        self.store
            .fetch_record(&key)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::InventoryNotFound(inventory_id))?;
        self.store
            .movements(inventory_id, limit)
            .await
            .map_err(EngineError::from)
    }

    /// Releases one expired reservation through the locked release path,
    /// marking it `Expired`.
    ///
    /// A concurrent explicit release or fulfillment of the same
    /// reservation loses or wins at the row lock; the loser observes the
    /// terminal state and fails with a conflict.
    #[instrument(skip(self, reservation), fields(reservation = %reservation.reservation_id))]
    pub async fn expire_reservation(
        &self,
        reservation: &Reservation,
    ) -> EngineResult<StockSnapshot> {
        let mutation = StockMutation::Release {
            quantity: reservation.quantity,
        };
        let update = LockedUpdate {
            movement: MovementDraft {
                movement_type: MovementType::ReleaseReservation,
                quantity: mutation.ledger_delta(),
                reference: Some(MovementRef::Reservation(reservation.reservation_id.clone())),
                reason: Some("reservation expired".to_string()),
                performed_by: Actor::system(),
            },
            reservation: Some(ReservationChange::Transition {
                id: reservation.reservation_id.clone(),
                outcome: ReservationOutcome::Expired,
                quantity: reservation.quantity,
            }),
            mutation,
        };

        let outcome = self
            .store
            .execute_locked(
                RecordKey::ByProductLocation {
                    product_id: reservation.product_id.clone(),
                    location: reservation.location.clone(),
                },
                update,
            )
            .await
            .map_err(|err| {
                release_error(
                    err,
                    reservation.product_id.clone(),
                    reservation.location.clone(),
                )
            })?;
        Ok(outcome.record.snapshot())
    }

    /// Releases every expired `Active` reservation found, up to `batch`,
    /// returning how many were expired.
    ///
    /// Individual failures (e.g. a reservation that was explicitly
    /// released between the query and the lock) are logged and skipped so
    /// one bad hold cannot stall the sweep.
    #[instrument(skip(self))]
    pub async fn expire_due_reservations(&self, batch: usize) -> EngineResult<usize> {
        let due = self
            .store
            .expired_reservations(Utc::now(), batch)
            .await
            .map_err(EngineError::from)?;

        let mut expired = 0usize;
        for reservation in &due {
            match self.expire_reservation(reservation).await {
                Ok(_) => expired += 1,
                Err(err) => {
                    warn!(
                        reservation = %reservation.reservation_id,
                        error = %err,
                        "skipping reservation during expiry sweep"
                    );
                }
            }
        }
        if expired > 0 {
            debug!(expired, "expiry sweep released reservations");
        }
        Ok(expired)
    }

    fn location_or_default(&self, location: Option<Location>) -> Location {
        location.unwrap_or_else(|| self.config.default_location.clone())
    }
}

fn positive(quantity: i64) -> EngineResult<Quantity> {
    Quantity::try_new(quantity).map_err(|_| EngineError::InvalidQuantity { supplied: quantity })
}

fn adjustment_type(movement_type: MovementType) -> EngineResult<()> {
    if movement_type.affects_physical() {
        Ok(())
    } else {
        Err(EngineError::Conflict {
            reason: format!(
                "movement type {movement_type} is reserved for the reservation lifecycle"
            ),
            retryable: false,
        })
    }
}

fn reserve_error(err: StoreError, product_id: ProductId, location: Location) -> EngineError {
    match err {
        StoreError::RecordNotFound(_) => EngineError::RecordNotFound {
            product_id,
            location,
        },
        StoreError::Invariant(BalanceError::InsufficientAvailable {
            requested,
            available,
        }) => EngineError::InsufficientStock {
            requested,
            available,
        },
        other => other.into(),
    }
}

fn release_error(err: StoreError, product_id: ProductId, location: Location) -> EngineError {
    match err {
        StoreError::RecordNotFound(_) => EngineError::RecordNotFound {
            product_id,
            location,
        },
        StoreError::Invariant(balance @ BalanceError::InsufficientReserved { .. }) => {
            EngineError::InvalidRelease(balance.to_string())
        }
        reservation @ (StoreError::ReservationNotActive { .. }
        | StoreError::ReservationExpired(_)
        | StoreError::ReservationMismatch { .. }
        | StoreError::ReservationQuantityExceeded { .. }) => {
            EngineError::InvalidRelease(reservation.to_string())
        }
        other => other.into(),
    }
}

fn fulfill_error(err: StoreError, product_id: ProductId, location: Location) -> EngineError {
    match err {
        StoreError::RecordNotFound(_) => EngineError::RecordNotFound {
            product_id,
            location,
        },
        StoreError::Invariant(balance @ BalanceError::InsufficientReserved { .. }) => {
            EngineError::InvalidFulfillment(balance.to_string())
        }
        reservation @ (StoreError::ReservationNotActive { .. }
        | StoreError::ReservationExpired(_)
        | StoreError::ReservationMismatch { .. }
        | StoreError::ReservationQuantityExceeded { .. }) => {
            EngineError::InvalidFulfillment(reservation.to_string())
        }
        other => other.into(),
    }
}

fn adjustment_error(err: StoreError, inventory_id: InventoryId) -> EngineError {
    match err {
        StoreError::RecordNotFound(_) => EngineError::InventoryNotFound(inventory_id),
        StoreError::Invariant(BalanceError::InsufficientAvailable {
            requested,
            available,
        }) => EngineError::InsufficientStock {
            requested,
            available,
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::ReservationState;
    use std::time::Duration as StdDuration;

    fn product() -> ProductId {
        ProductId::try_new("prod-1").unwrap()
    }

    fn location() -> Location {
        Location::default_location()
    }

    #[test]
    fn reserve_error_maps_not_found_and_insufficient() {
        let err = reserve_error(
            StoreError::RecordNotFound(RecordKey::ByProductLocation {
                product_id: product(),
                location: location(),
            }),
            product(),
            location(),
        );
        assert!(matches!(err, EngineError::RecordNotFound { .. }));

        let err = reserve_error(
            StoreError::Invariant(BalanceError::InsufficientAvailable {
                requested: 91,
                available: 90,
            }),
            product(),
            location(),
        );
        assert!(matches!(
            err,
            EngineError::InsufficientStock {
                requested: 91,
                available: 90
            }
        ));
    }

    #[test]
    fn release_error_maps_reserved_shortfall_to_invalid_release() {
        let err = release_error(
            StoreError::Invariant(BalanceError::InsufficientReserved {
                requested: 5,
                reserved: 3,
            }),
            product(),
            location(),
        );
        assert!(matches!(err, EngineError::InvalidRelease(_)));

        let err = release_error(
            StoreError::ReservationNotActive {
                id: ReservationId::try_new("RES-1").unwrap(),
                state: ReservationState::Released,
            },
            product(),
            location(),
        );
        assert!(matches!(err, EngineError::InvalidRelease(_)));

        let err = release_error(
            StoreError::ReservationQuantityExceeded {
                id: ReservationId::try_new("RES-1").unwrap(),
                requested: 7,
                remaining: 6,
            },
            product(),
            location(),
        );
        assert!(matches!(err, EngineError::InvalidRelease(_)));

        let err = release_error(
            StoreError::ReservationMismatch {
                id: ReservationId::try_new("RES-1").unwrap(),
            },
            product(),
            location(),
        );
        assert!(matches!(err, EngineError::InvalidRelease(_)));
    }

    #[test]
    fn fulfill_error_maps_to_invalid_fulfillment() {
        let err = fulfill_error(
            StoreError::Invariant(BalanceError::InsufficientReserved {
                requested: 21,
                reserved: 20,
            }),
            product(),
            location(),
        );
        assert!(matches!(err, EngineError::InvalidFulfillment(_)));
    }

    #[test]
    fn adjustment_error_maps_missing_record_to_inventory_not_found() {
        let id = InventoryId::new();
        let err = adjustment_error(StoreError::RecordNotFound(RecordKey::ById(id)), id);
        assert!(matches!(err, EngineError::InventoryNotFound(found) if found == id));
    }

    #[test]
    fn lock_timeouts_stay_retryable_through_op_mapping() {
        let err = release_error(
            StoreError::LockTimeout(StdDuration::from_secs(5)),
            product(),
            location(),
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn positive_rejects_zero_and_negative() {
        assert!(matches!(
            positive(0),
            Err(EngineError::InvalidQuantity { supplied: 0 })
        ));
        assert!(matches!(
            positive(-7),
            Err(EngineError::InvalidQuantity { supplied: -7 })
        ));
        assert_eq!(positive(3).unwrap().get(), 3);
    }

    #[test]
    fn reservation_lifecycle_types_are_rejected_for_adjustments() {
        assert!(adjustment_type(MovementType::Restock).is_ok());
        assert!(adjustment_type(MovementType::Reservation).is_err());
    }

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_ttl_minutes, 30);
        assert_eq!(config.default_location, Location::default_location());
    }
}
