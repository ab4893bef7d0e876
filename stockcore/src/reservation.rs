//! The reservation lifecycle: `Active → {Released, Fulfilled, Expired}`.
//!
//! A reservation is a liability against its stock record's reserved
//! counter. The state machine here is deliberately small: terminal states
//! have no way out, and the only legal transition source is `Active`.
//! Whether the transition may happen *now* (expiry) is checked together
//! with the state, under the same row lock as the balance mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::types::{InventoryId, Location, ProductId, Quantity, ReservationId};

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    /// The hold is live; stock is set aside.
    Active,
    /// The hold was cancelled and the stock returned to the pool.
    Released,
    /// The hold converted into a sale.
    Fulfilled,
    /// The hold lapsed and the sweeper returned the stock.
    Expired,
}

impl ReservationState {
    /// Whether this state has no outgoing transitions.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Storage-stable name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Released => "RELEASED",
            Self::Fulfilled => "FULFILLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parses a storage-stable state name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "RELEASED" => Some(Self::Released),
            "FULFILLED" => Some(Self::Fulfilled),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal state a transition drives a reservation into.
///
/// Modeled separately from [`ReservationState`] so a transition back to
/// `Active` is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationOutcome {
    /// Explicit cancellation by the caller.
    Released,
    /// Conversion into a sale.
    Fulfilled,
    /// TTL lapse detected by the sweeper.
    Expired,
}

impl ReservationOutcome {
    /// The lifecycle state this outcome lands in.
    pub const fn state(self) -> ReservationState {
        match self {
            Self::Released => ReservationState::Released,
            Self::Fulfilled => ReservationState::Fulfilled,
            Self::Expired => ReservationState::Expired,
        }
    }
}

/// Input for creating a reservation; the store fills in the inventory id
/// of the locked record and the `Active` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    /// Caller-supplied reservation identity.
    pub reservation_id: ReservationId,
    /// The product being held.
    pub product_id: ProductId,
    /// The location the hold is against.
    pub location: Location,
    /// Units held.
    pub quantity: Quantity,
    /// The order this hold is for, if known.
    pub order_id: Option<String>,
    /// Free-text reason.
    pub reason: Option<String>,
    /// How long the hold lives, measured from the instant the store
    /// stamps `created_at`. Keeping this relative makes `expires_at` and
    /// `created_at` share one clock reading.
    pub ttl: Duration,
}

/// A stock reservation with its lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    /// Caller-supplied reservation identity.
    pub reservation_id: ReservationId,
    /// The product being held.
    pub product_id: ProductId,
    /// The stock record the hold is a liability against.
    pub inventory_id: InventoryId,
    /// The location the hold is against.
    pub location: Location,
    /// Units held.
    pub quantity: Quantity,
    /// The order this hold is for, if known.
    pub order_id: Option<String>,
    /// Free-text reason.
    pub reason: Option<String>,
    /// Current lifecycle state.
    pub state: ReservationState,
    /// When the hold was taken.
    pub created_at: DateTime<Utc>,
    /// When the hold lapses.
    pub expires_at: DateTime<Utc>,
    /// When the state last changed.
    pub state_changed_at: DateTime<Utc>,
}

impl Reservation {
    /// Activates a new reservation against the given stock record.
    pub fn activate(new: NewReservation, inventory_id: InventoryId, now: DateTime<Utc>) -> Self {
        Self {
            reservation_id: new.reservation_id,
            product_id: new.product_id,
            inventory_id,
            location: new.location,
            quantity: new.quantity,
            order_id: new.order_id,
            reason: new.reason,
            state: ReservationState::Active,
            created_at: now,
            expires_at: now + new.ttl,
            state_changed_at: now,
        }
    }

    /// Whether the TTL has lapsed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True only while `Active` and not expired.
    pub fn can_be_released(&self, now: DateTime<Utc>) -> bool {
        self.state == ReservationState::Active && !self.is_expired(now)
    }

    /// True only while `Active` and not expired.
    pub fn can_be_fulfilled(&self, now: DateTime<Utc>) -> bool {
        self.state == ReservationState::Active && !self.is_expired(now)
    }

    /// Settles `quantity` units of the hold toward a terminal state.
    ///
    /// Stores call this under the row lock, so a race between explicit
    /// release/fulfill and the expiry sweeper resolves here: the loser
    /// observes a terminal state and gets `ReservationNotActive`.
    ///
    /// `Released` and `Fulfilled` additionally require the hold not to have
    /// expired; `Expired` only requires it to still be `Active` (the
    /// sweeper decides lateness from its own query).
    ///
    /// Settling less than the remaining hold decrements `quantity` and
    /// keeps the reservation `Active`; the terminal state is reached only
    /// when the full remainder is settled. Settling more than remains
    /// fails and leaves the reservation untouched.
    pub fn settle(
        &mut self,
        outcome: ReservationOutcome,
        quantity: Quantity,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if self.state.is_terminal() {
            return Err(StoreError::ReservationNotActive {
                id: self.reservation_id.clone(),
                state: self.state,
            });
        }
        match outcome {
            ReservationOutcome::Released | ReservationOutcome::Fulfilled
                if self.is_expired(now) =>
            {
                return Err(StoreError::ReservationExpired(self.reservation_id.clone()));
            }
            _ => {}
        }
        let remaining = self.quantity.get();
        if quantity.get() > remaining {
            return Err(StoreError::ReservationQuantityExceeded {
                id: self.reservation_id.clone(),
                requested: quantity.get(),
                remaining,
            });
        }
        if quantity.get() == remaining {
            self.state = outcome.state();
            self.state_changed_at = now;
        } else {
            // remaining − quantity ≥ 1 here, so the constructor cannot fail.
            self.quantity = Quantity::try_new(remaining - quantity.get()).map_err(|_| {
                StoreError::Internal("reservation remainder not positive".to_string())
            })?;
        }
        Ok(())
    }

    /// Settles the full remaining hold in one step.
    pub fn transition(
        &mut self,
        outcome: ReservationOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let remaining = self.quantity;
        self.settle(outcome, remaining, now)
    }
}

/// Read model for `get_reservation_details`, with the time-dependent
/// predicates evaluated at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationDetails {
    /// The reservation itself.
    pub reservation: Reservation,
    /// Whether an explicit release would currently be accepted.
    pub can_be_released: bool,
    /// Whether a fulfillment would currently be accepted.
    pub can_be_fulfilled: bool,
    /// Seconds until expiry; `None` once expired or terminal.
    pub expires_in_seconds: Option<i64>,
}

impl ReservationDetails {
    /// Evaluates the reservation's predicates as of `now`.
    pub fn evaluate(reservation: Reservation, now: DateTime<Utc>) -> Self {
        let can_be_released = reservation.can_be_released(now);
        let can_be_fulfilled = reservation.can_be_fulfilled(now);
        let expires_in_seconds = (reservation.state == ReservationState::Active
            && !reservation.is_expired(now))
        .then(|| (reservation.expires_at - now).num_seconds());
        Self {
            reservation,
            can_be_released,
            can_be_fulfilled,
            expires_in_seconds,
        }
    }
}

/// Snapshot returned by a successful reserve operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservationSnapshot {
    /// The reservation that was created (state `Active`).
    pub reservation: Reservation,
    /// The stock record's balances after the hold was taken.
    pub stock: crate::record::StockSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(expires_in_minutes: i64) -> Reservation {
        Reservation::activate(
            NewReservation {
                reservation_id: ReservationId::try_new("RES-1").unwrap(),
                product_id: ProductId::try_new("prod-1").unwrap(),
                location: Location::default_location(),
                quantity: Quantity::try_new(5).unwrap(),
                order_id: None,
                reason: None,
                ttl: Duration::minutes(expires_in_minutes),
            },
            InventoryId::new(),
            Utc::now(),
        )
    }

    fn quantity(q: i64) -> Quantity {
        Quantity::try_new(q).unwrap()
    }

    #[test]
    fn new_reservations_are_active() {
        let res = reservation(30);
        assert_eq!(res.state, ReservationState::Active);
        assert!(!res.state.is_terminal());
        assert!(res.can_be_released(Utc::now()));
        assert!(res.can_be_fulfilled(Utc::now()));
    }

    #[test]
    fn terminal_states_have_no_way_out() {
        for outcome in [
            ReservationOutcome::Released,
            ReservationOutcome::Fulfilled,
            ReservationOutcome::Expired,
        ] {
            let mut res = reservation(30);
            res.transition(outcome, Utc::now()).unwrap();
            assert!(res.state.is_terminal());
            let err = res
                .transition(ReservationOutcome::Released, Utc::now())
                .unwrap_err();
            assert!(matches!(err, StoreError::ReservationNotActive { .. }));
        }
    }

    #[test]
    fn expired_reservations_reject_release_and_fulfill() {
        let mut res = reservation(-1); // already lapsed
        assert!(!res.can_be_released(Utc::now()));
        assert!(!res.can_be_fulfilled(Utc::now()));
        assert!(matches!(
            res.transition(ReservationOutcome::Released, Utc::now()),
            Err(StoreError::ReservationExpired(_))
        ));
        assert!(matches!(
            res.transition(ReservationOutcome::Fulfilled, Utc::now()),
            Err(StoreError::ReservationExpired(_))
        ));
        // The sweeper's transition is still legal.
        res.transition(ReservationOutcome::Expired, Utc::now())
            .unwrap();
        assert_eq!(res.state, ReservationState::Expired);
    }

    #[test]
    fn activation_measures_expiry_from_the_creation_instant() {
        let res = reservation(45);
        assert_eq!(res.expires_at - res.created_at, Duration::minutes(45));
    }

    #[test]
    fn partial_settlement_decrements_the_remaining_hold() {
        let mut res = reservation(30);
        res.settle(ReservationOutcome::Released, quantity(2), Utc::now())
            .unwrap();
        assert_eq!(res.state, ReservationState::Active);
        assert_eq!(res.quantity.get(), 3);

        // Settling the remainder lands the terminal state.
        res.settle(ReservationOutcome::Released, quantity(3), Utc::now())
            .unwrap();
        assert_eq!(res.state, ReservationState::Released);
    }

    #[test]
    fn settling_more_than_the_remaining_hold_fails_untouched() {
        let mut res = reservation(30);
        res.settle(ReservationOutcome::Fulfilled, quantity(2), Utc::now())
            .unwrap();
        let err = res
            .settle(ReservationOutcome::Fulfilled, quantity(4), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ReservationQuantityExceeded {
                requested: 4,
                remaining: 3,
                ..
            }
        ));
        assert_eq!(res.state, ReservationState::Active);
        assert_eq!(res.quantity.get(), 3);
    }

    #[test]
    fn state_names_roundtrip() {
        for state in [
            ReservationState::Active,
            ReservationState::Released,
            ReservationState::Fulfilled,
            ReservationState::Expired,
        ] {
            assert_eq!(ReservationState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ReservationState::parse("GONE"), None);
    }

    #[test]
    fn details_expose_remaining_ttl_only_while_live() {
        let res = reservation(30);
        let details = ReservationDetails::evaluate(res, Utc::now());
        assert!(details.can_be_released);
        let remaining = details.expires_in_seconds.unwrap();
        assert!(remaining > 0 && remaining <= 30 * 60);

        let lapsed = reservation(-5);
        let details = ReservationDetails::evaluate(lapsed, Utc::now());
        assert!(!details.can_be_released);
        assert_eq!(details.expires_in_seconds, None);
    }

    #[test]
    fn transition_stamps_state_changed_at() {
        let mut res = reservation(30);
        let created = res.state_changed_at;
        let later = Utc::now() + Duration::seconds(10);
        res.transition(ReservationOutcome::Fulfilled, later).unwrap();
        assert_eq!(res.state_changed_at, later);
        assert!(res.state_changed_at > created);
    }
}
