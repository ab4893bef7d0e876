//! The movement ledger: an append-only log of every balance-changing event.
//!
//! Each committed mutation appends exactly one [`MovementEntry`] inside the
//! same transaction as the balance change, capturing before/after physical
//! snapshots. Entries are immutable once written and form the audit trail
//! used to reconcile a record's physical stock independently of its current
//! counters (see [`replay_physical`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Actor, InventoryId, MovementId, ReservationId};

/// The closed set of reasons stock moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Stock received from a supplier.
    Restock,
    /// Stock sold (including fulfillment of a reservation).
    Sale,
    /// Stock written off as damaged.
    Damage,
    /// Manual correction (cycle count, shrinkage, data fix).
    Adjustment,
    /// Stock returned by a customer.
    Return,
    /// Stock moved between locations.
    Transfer,
    /// Stock held against a reservation (reserved counter up).
    Reservation,
    /// A reservation hold returned to the available pool.
    ReleaseReservation,
}

impl MovementType {
    /// Whether entries of this type change physical stock.
    ///
    /// `Reservation` and `ReleaseReservation` move the reserved counter
    /// only; every other type moves physical units in or out.
    pub const fn affects_physical(self) -> bool {
        !matches!(self, Self::Reservation | Self::ReleaseReservation)
    }

    /// Storage-stable name of the movement type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restock => "RESTOCK",
            Self::Sale => "SALE",
            Self::Damage => "DAMAGE",
            Self::Adjustment => "ADJUSTMENT",
            Self::Return => "RETURN",
            Self::Transfer => "TRANSFER",
            Self::Reservation => "RESERVATION",
            Self::ReleaseReservation => "RELEASE_RESERVATION",
        }
    }

    /// Parses a storage-stable movement type name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RESTOCK" => Some(Self::Restock),
            "SALE" => Some(Self::Sale),
            "DAMAGE" => Some(Self::Damage),
            "ADJUSTMENT" => Some(Self::Adjustment),
            "RETURN" => Some(Self::Return),
            "TRANSFER" => Some(Self::Transfer),
            "RESERVATION" => Some(Self::Reservation),
            "RELEASE_RESERVATION" => Some(Self::ReleaseReservation),
            _ => None,
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a movement: the discriminated reference context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementRef {
    /// The movement was caused by an order.
    Order(String),
    /// The movement was caused by a reservation lifecycle transition.
    Reservation(ReservationId),
    /// The movement was caused by a purchase order (restock).
    PurchaseOrder(String),
}

impl MovementRef {
    /// Storage-stable name of the reference kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Order(_) => "ORDER",
            Self::Reservation(_) => "RESERVATION",
            Self::PurchaseOrder(_) => "PURCHASE_ORDER",
        }
    }

    /// The referenced identifier.
    pub fn id(&self) -> &str {
        match self {
            Self::Order(id) | Self::PurchaseOrder(id) => id,
            Self::Reservation(id) => id.as_ref(),
        }
    }

    /// Rebuilds a reference from its stored kind and id columns.
    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "ORDER" => Some(Self::Order(id)),
            "RESERVATION" => ReservationId::try_new(id).ok().map(Self::Reservation),
            "PURCHASE_ORDER" => Some(Self::PurchaseOrder(id)),
            _ => None,
        }
    }
}

/// What the engine asks the store to append alongside a balance mutation.
///
/// The store fills in the id, the physical before/after snapshots read
/// under the row lock, and the commit timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    /// Why the stock moved.
    pub movement_type: MovementType,
    /// Signed unit delta: negative for stock leaving or being held,
    /// positive for stock entering or a hold being released.
    pub quantity: i64,
    /// What caused the movement.
    pub reference: Option<MovementRef>,
    /// Free-text explanation.
    pub reason: Option<String>,
    /// Who performed the operation.
    pub performed_by: Actor,
}

/// One immutable row of the movement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovementEntry {
    /// Unique, time-ordered entry id.
    pub id: MovementId,
    /// The stock record this entry belongs to.
    pub inventory_id: InventoryId,
    /// Why the stock moved.
    pub movement_type: MovementType,
    /// Signed unit delta (see [`MovementDraft::quantity`]).
    pub quantity: i64,
    /// Physical stock immediately before the mutation.
    pub stock_before: i64,
    /// Physical stock immediately after the mutation.
    pub stock_after: i64,
    /// What caused the movement.
    pub reference: Option<MovementRef>,
    /// Free-text explanation.
    pub reason: Option<String>,
    /// Who performed the operation.
    pub performed_by: Actor,
    /// When the entry was committed.
    pub recorded_at: DateTime<Utc>,
}

impl MovementEntry {
    /// Materializes a draft into a ledger entry.
    ///
    /// Called by stores inside the locked transaction, with the physical
    /// snapshots taken around [`crate::record::StockRecord::apply`].
    pub fn from_draft(
        draft: MovementDraft,
        inventory_id: InventoryId,
        stock_before: i64,
        stock_after: i64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            inventory_id,
            movement_type: draft.movement_type,
            quantity: draft.quantity,
            stock_before,
            stock_after,
            reference: draft.reference,
            reason: draft.reason,
            performed_by: draft.performed_by,
            recorded_at,
        }
    }
}

/// Replays the physical deltas of a ledger slice from an initial level.
///
/// Reservation-counter entries (`Reservation`, `ReleaseReservation`) are
/// skipped: their signed quantity tracks the hold, not physical units.
/// For a complete ledger starting from the record's opening stock, the
/// result reproduces the current physical stock — the reconciliation
/// property auditors rely on.
pub fn replay_physical(initial_physical: i64, entries: &[MovementEntry]) -> i64 {
    entries
        .iter()
        .filter(|entry| entry.movement_type.affects_physical())
        .fold(initial_physical, |level, entry| level + entry.quantity)
}
