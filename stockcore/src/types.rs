//! Core identifier and quantity types for the stock ledger.
//!
//! All types use smart constructors so that validity is established at
//! construction time, following the "parse, don't validate" principle.
//! Once a [`Quantity`] exists it is positive; once a [`ProductId`] exists
//! it is non-empty. Domain code never re-checks these properties.

use nutype::nutype;
use uuid::Uuid;

/// Identifies a product in the catalog.
///
/// `ProductId` values are guaranteed to be non-empty and at most 255
/// characters. The catalog itself is an external collaborator; the engine
/// only uses the id as a lookup key.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ProductId(String);

/// A stocking location (warehouse, store, fulfillment center).
///
/// Each stock record is keyed by product and location. Callers that do not
/// care about locations use [`Location::default_location`].
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Location(String);

impl Location {
    /// The implicit location used when a caller does not specify one.
    pub fn default_location() -> Self {
        Self::try_new("default").expect("'default' is a valid location")
    }
}

/// A caller-supplied identifier for a stock reservation.
///
/// Reservation ids are chosen by the caller (typically an order or checkout
/// id) so that the same caller can later release or fulfill the hold.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ReservationId(String);

/// A globally unique stock record identifier using UUIDv7 format.
///
/// UUIDv7 gives time-ordered ids, which keeps physical index locality in
/// storage backends that cluster on the primary key.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct InventoryId(Uuid);

impl InventoryId {
    /// Creates a new `InventoryId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for InventoryId {
    fn default() -> Self {
        Self::new()
    }
}

/// A globally unique movement ledger entry identifier (UUIDv7).
///
/// Because UUIDv7 sorts by creation time, ordering ledger entries by id
/// reproduces the order in which they were committed.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct MovementId(Uuid);

impl MovementId {
    /// Creates a new `MovementId` with the current timestamp.
    pub fn new() -> Self {
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for MovementId {
    fn default() -> Self {
        Self::new()
    }
}

/// A strictly positive unit count.
///
/// Every balance-changing operation takes a `Quantity`, so zero and negative
/// amounts are rejected once, at the system boundary, and cannot reach the
/// balance arithmetic.
#[nutype(
    validate(greater = 0),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct Quantity(i64);

impl Quantity {
    /// Returns the quantity as a plain integer.
    pub fn get(self) -> i64 {
        self.into_inner()
    }
}

/// The identity that performed a balance-changing operation.
///
/// Recorded on every ledger entry. Defaults to [`Actor::system`] for
/// mutations driven by the engine itself (e.g. the expiry sweeper).
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct Actor(String);

impl Actor {
    /// The actor recorded for engine-initiated mutations.
    pub fn system() -> Self {
        Self::try_new("system").expect("'system' is a valid actor")
    }
}
