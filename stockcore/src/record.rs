//! The stock record: the per-product-per-location row that locking is
//! scoped to, and the pure balance transitions on it.
//!
//! A [`StockRecord`] holds two counters, `physical_stock` and
//! `reserved_stock`, with the invariant `0 ≤ reserved ≤ physical` enforced
//! at every mutation point. Available stock is always derived as
//! `physical − reserved` and never stored, so it cannot drift.
//!
//! The transition methods here are pure in-memory balance arithmetic: they
//! do not persist and do not lock. Persistence and locking are the store's
//! job — adapters call [`StockRecord::apply`] with a [`StockMutation`]
//! while holding an exclusive row lock inside a transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::errors::BalanceError;
use crate::status::{stock_status, StockStatus};
use crate::types::{InventoryId, Location, ProductId, Quantity};

/// Input for onboarding a product into inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockRecord {
    /// The product being onboarded.
    pub product_id: ProductId,
    /// Where the stock is held.
    pub location: Location,
    /// Opening physical stock level (must be non-negative).
    pub physical_stock: i64,
    /// Threshold below which the record reports `LowStock`.
    pub minimum_stock: i64,
    /// Optional soft ceiling; exceeding it on restock is logged, not rejected.
    pub maximum_stock: Option<i64>,
    /// Optional reorder trigger level.
    pub reorder_point: Option<i64>,
    /// Optional selling price per unit, used for inventory valuation.
    pub unit_price: Option<Decimal>,
    /// Optional acquisition cost per unit.
    pub unit_cost: Option<Decimal>,
}

impl NewStockRecord {
    /// Creates an onboarding request with zero opening stock and no
    /// thresholds.
    pub const fn new(product_id: ProductId, location: Location) -> Self {
        Self {
            product_id,
            location,
            physical_stock: 0,
            minimum_stock: 0,
            maximum_stock: None,
            reorder_point: None,
            unit_price: None,
            unit_cost: None,
        }
    }

    /// Sets the opening physical stock.
    #[must_use]
    pub const fn with_physical_stock(mut self, physical_stock: i64) -> Self {
        self.physical_stock = physical_stock;
        self
    }

    /// Sets the low-stock threshold.
    #[must_use]
    pub const fn with_minimum_stock(mut self, minimum_stock: i64) -> Self {
        self.minimum_stock = minimum_stock;
        self
    }

    /// Sets the soft maximum stock ceiling.
    #[must_use]
    pub const fn with_maximum_stock(mut self, maximum_stock: i64) -> Self {
        self.maximum_stock = Some(maximum_stock);
        self
    }

    /// Sets the reorder trigger level.
    #[must_use]
    pub const fn with_reorder_point(mut self, reorder_point: i64) -> Self {
        self.reorder_point = Some(reorder_point);
        self
    }

    /// Sets the per-unit selling price.
    #[must_use]
    pub const fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    /// Sets the per-unit acquisition cost.
    #[must_use]
    pub const fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }
}

/// One stock record per product × location; the unit of locking.
///
/// The balance counters are private: the only way to change them is through
/// the transition methods, which makes the `0 ≤ reserved ≤ physical`
/// invariant impossible to bypass from outside this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockRecord {
    /// Unique identifier for this record.
    pub id: InventoryId,
    /// The product this record tracks.
    pub product_id: ProductId,
    /// The location the stock is held at.
    pub location: Location,
    physical_stock: i64,
    reserved_stock: i64,
    /// Threshold below which the record reports `LowStock`.
    pub minimum_stock: i64,
    /// Optional soft ceiling on physical stock.
    pub maximum_stock: Option<i64>,
    /// Optional reorder trigger level.
    pub reorder_point: Option<i64>,
    /// Optional selling price per unit.
    pub unit_price: Option<Decimal>,
    /// Optional acquisition cost per unit.
    pub unit_cost: Option<Decimal>,
    /// When the balances last changed.
    pub updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// Creates a record for a newly onboarded product.
    ///
    /// Fails with [`BalanceError::CorruptBalances`] if the opening physical
    /// stock is negative.
    pub fn create(new: NewStockRecord) -> Result<Self, BalanceError> {
        Self::hydrate(
            InventoryId::new(),
            new.product_id,
            new.location,
            new.physical_stock,
            0,
            new.minimum_stock,
            new.maximum_stock,
            new.reorder_point,
            new.unit_price,
            new.unit_cost,
            Utc::now(),
        )
    }

    /// Rebuilds a record from stored values, re-checking the balance
    /// invariant.
    ///
    /// Storage adapters use this when mapping rows back into the domain;
    /// a row that fails here indicates corruption outside the engine.
    #[allow(clippy::too_many_arguments)]
    pub fn hydrate(
        id: InventoryId,
        product_id: ProductId,
        location: Location,
        physical_stock: i64,
        reserved_stock: i64,
        minimum_stock: i64,
        maximum_stock: Option<i64>,
        reorder_point: Option<i64>,
        unit_price: Option<Decimal>,
        unit_cost: Option<Decimal>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, BalanceError> {
        if physical_stock < 0 || reserved_stock < 0 || reserved_stock > physical_stock {
            return Err(BalanceError::CorruptBalances {
                physical: physical_stock,
                reserved: reserved_stock,
            });
        }
        Ok(Self {
            id,
            product_id,
            location,
            physical_stock,
            reserved_stock,
            minimum_stock,
            maximum_stock,
            reorder_point,
            unit_price,
            unit_cost,
            updated_at,
        })
    }

    /// Total units physically present.
    pub const fn physical_stock(&self) -> i64 {
        self.physical_stock
    }

    /// Units held against active reservations.
    pub const fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    /// Units that can still be promised: `physical − reserved`.
    ///
    /// Always derived, never stored, so it cannot drift from the counters.
    pub const fn available_stock(&self) -> i64 {
        self.physical_stock - self.reserved_stock
    }

    /// The tri-state stock status derived from the current balances.
    pub const fn status(&self) -> StockStatus {
        stock_status(self.available_stock(), self.minimum_stock)
    }

    /// Adds units to physical stock, optionally recording a new unit cost.
    pub fn add_stock(
        &mut self,
        quantity: Quantity,
        unit_cost: Option<Decimal>,
    ) -> Result<(), BalanceError> {
        let physical = self
            .physical_stock
            .checked_add(quantity.get())
            .ok_or(BalanceError::Overflow)?;
        self.physical_stock = physical;
        if unit_cost.is_some() {
            self.unit_cost = unit_cost;
        }
        self.touch();
        Ok(())
    }

    /// Removes units from physical stock.
    ///
    /// Fails if the quantity exceeds available stock: reserved units cannot
    /// be removed out from under their reservations.
    pub fn remove_stock(&mut self, quantity: Quantity) -> Result<(), BalanceError> {
        let requested = quantity.get();
        let available = self.available_stock();
        if requested > available {
            return Err(BalanceError::InsufficientAvailable {
                requested,
                available,
            });
        }
        self.physical_stock -= requested;
        self.touch();
        Ok(())
    }

    /// Holds units against a reservation.
    ///
    /// Fails if the quantity exceeds available stock. The boundary is
    /// inclusive: reserving exactly the available amount succeeds.
    pub fn reserve_stock(&mut self, quantity: Quantity) -> Result<(), BalanceError> {
        let requested = quantity.get();
        let available = self.available_stock();
        if requested > available {
            return Err(BalanceError::InsufficientAvailable {
                requested,
                available,
            });
        }
        self.reserved_stock += requested;
        self.touch();
        Ok(())
    }

    /// Returns reserved units to the available pool.
    pub fn release_reserved_stock(&mut self, quantity: Quantity) -> Result<(), BalanceError> {
        let requested = quantity.get();
        if requested > self.reserved_stock {
            return Err(BalanceError::InsufficientReserved {
                requested,
                reserved: self.reserved_stock,
            });
        }
        self.reserved_stock -= requested;
        self.touch();
        Ok(())
    }

    /// Converts reserved units into a permanent deduction.
    ///
    /// Decrements both counters in one step, so the invariant holds at
    /// every observable point.
    pub fn fulfill_reservation(&mut self, quantity: Quantity) -> Result<(), BalanceError> {
        let requested = quantity.get();
        if requested > self.reserved_stock {
            return Err(BalanceError::InsufficientReserved {
                requested,
                reserved: self.reserved_stock,
            });
        }
        self.reserved_stock -= requested;
        self.physical_stock -= requested;
        self.touch();
        Ok(())
    }

    /// Applies a mutation described as data.
    ///
    /// Storage adapters call this under their row lock, so the transition
    /// is always evaluated against the freshest committed balances.
    pub fn apply(&mut self, mutation: &StockMutation) -> Result<(), BalanceError> {
        match mutation {
            StockMutation::Add {
                quantity,
                unit_cost,
            } => self.add_stock(*quantity, *unit_cost),
            StockMutation::Remove { quantity } => self.remove_stock(*quantity),
            StockMutation::Reserve { quantity } => self.reserve_stock(*quantity),
            StockMutation::Release { quantity } => self.release_reserved_stock(*quantity),
            StockMutation::Fulfill { quantity } => self.fulfill_reservation(*quantity),
        }
    }

    /// Point-in-time view of this record for callers.
    pub fn snapshot(&self) -> StockSnapshot {
        StockSnapshot {
            inventory_id: self.id,
            product_id: self.product_id.clone(),
            location: self.location.clone(),
            physical_stock: self.physical_stock,
            reserved_stock: self.reserved_stock,
            available_stock: self.available_stock(),
            minimum_stock: self.minimum_stock,
            maximum_stock: self.maximum_stock,
            reorder_point: self.reorder_point,
            status: self.status(),
            last_updated: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A balance transition described as data.
///
/// The engine builds one of these per operation and hands it to the store,
/// which applies it to the locked row via [`StockRecord::apply`]. Keeping
/// the transition as data means validation always runs against the balances
/// read under the lock, never against a stale earlier read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockMutation {
    /// Physical stock enters (restock, return, transfer in).
    Add {
        /// Units added.
        quantity: Quantity,
        /// New per-unit acquisition cost, if known.
        unit_cost: Option<Decimal>,
    },
    /// Physical stock leaves outside the reservation flow (damage, direct
    /// sale, transfer out).
    Remove {
        /// Units removed.
        quantity: Quantity,
    },
    /// Units are held against a reservation.
    Reserve {
        /// Units reserved.
        quantity: Quantity,
    },
    /// Reserved units return to the available pool.
    Release {
        /// Units released.
        quantity: Quantity,
    },
    /// Reserved units convert into a permanent deduction.
    Fulfill {
        /// Units fulfilled.
        quantity: Quantity,
    },
}

impl StockMutation {
    /// The (positive) unit count this mutation moves.
    pub fn quantity(&self) -> Quantity {
        match self {
            Self::Add { quantity, .. }
            | Self::Remove { quantity }
            | Self::Reserve { quantity }
            | Self::Release { quantity }
            | Self::Fulfill { quantity } => *quantity,
        }
    }

    /// The signed quantity recorded on the movement ledger.
    ///
    /// Negative for stock leaving or being held, positive for stock
    /// entering or a hold being released.
    pub fn ledger_delta(&self) -> i64 {
        match self {
            Self::Add { quantity, .. } | Self::Release { quantity } => quantity.get(),
            Self::Remove { quantity } | Self::Reserve { quantity } | Self::Fulfill { quantity } => {
                -quantity.get()
            }
        }
    }
}

/// Point-in-time view of a stock record.
///
/// This is the DTO every read path returns; status is derived through the
/// single [`stock_status`] function so list, stats, and single-record
/// queries can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSnapshot {
    /// The record's unique id (the key adjustment operations use).
    pub inventory_id: InventoryId,
    /// The product this record tracks.
    pub product_id: ProductId,
    /// The location the stock is held at.
    pub location: Location,
    /// Total units physically present.
    pub physical_stock: i64,
    /// Units held against active reservations.
    pub reserved_stock: i64,
    /// `physical − reserved`.
    pub available_stock: i64,
    /// Low-stock threshold.
    pub minimum_stock: i64,
    /// Optional soft ceiling.
    pub maximum_stock: Option<i64>,
    /// Optional reorder trigger level.
    pub reorder_point: Option<i64>,
    /// Derived tri-state status.
    pub status: StockStatus,
    /// When the balances last changed.
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(physical: i64, reserved: i64) -> StockRecord {
        StockRecord::hydrate(
            InventoryId::new(),
            ProductId::try_new("prod-1").unwrap(),
            Location::default_location(),
            physical,
            reserved,
            10,
            None,
            None,
            None,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn qty(q: i64) -> Quantity {
        Quantity::try_new(q).unwrap()
    }

    #[test]
    fn create_rejects_negative_opening_stock() {
        let new = NewStockRecord::new(
            ProductId::try_new("prod-1").unwrap(),
            Location::default_location(),
        )
        .with_physical_stock(-1);
        assert!(matches!(
            StockRecord::create(new),
            Err(BalanceError::CorruptBalances { .. })
        ));
    }

    #[test]
    fn hydrate_rejects_reserved_above_physical() {
        let result = StockRecord::hydrate(
            InventoryId::new(),
            ProductId::try_new("prod-1").unwrap(),
            Location::default_location(),
            5,
            6,
            0,
            None,
            None,
            None,
            None,
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(BalanceError::CorruptBalances {
                physical: 5,
                reserved: 6
            })
        ));
    }

    #[test]
    fn reserve_at_exact_availability_succeeds() {
        // physical=100, reserved=10 -> available=90; reserving 90 is allowed
        let mut rec = record(100, 10);
        rec.reserve_stock(qty(90)).unwrap();
        assert_eq!(rec.reserved_stock(), 100);
        assert_eq!(rec.available_stock(), 0);
        assert_eq!(rec.status(), StockStatus::OutOfStock);
    }

    #[test]
    fn reserve_one_past_availability_fails_and_leaves_balances_untouched() {
        let mut rec = record(100, 10);
        let err = rec.reserve_stock(qty(91)).unwrap_err();
        assert_eq!(
            err,
            BalanceError::InsufficientAvailable {
                requested: 91,
                available: 90
            }
        );
        assert_eq!(rec.physical_stock(), 100);
        assert_eq!(rec.reserved_stock(), 10);
    }

    #[test]
    fn remove_cannot_take_reserved_units() {
        let mut rec = record(100, 40);
        assert!(rec.remove_stock(qty(61)).is_err());
        assert!(rec.remove_stock(qty(60)).is_ok());
        assert_eq!(rec.physical_stock(), 40);
        assert_eq!(rec.reserved_stock(), 40);
        assert_eq!(rec.available_stock(), 0);
    }

    #[test]
    fn fulfill_decrements_both_counters() {
        let mut rec = record(100, 20);
        rec.fulfill_reservation(qty(20)).unwrap();
        assert_eq!(rec.physical_stock(), 80);
        assert_eq!(rec.reserved_stock(), 0);
    }

    #[test]
    fn fulfill_more_than_reserved_fails() {
        let mut rec = record(100, 20);
        assert_eq!(
            rec.fulfill_reservation(qty(21)).unwrap_err(),
            BalanceError::InsufficientReserved {
                requested: 21,
                reserved: 20
            }
        );
    }

    #[test]
    fn release_more_than_reserved_fails() {
        let mut rec = record(100, 20);
        assert!(rec.release_reserved_stock(qty(20)).is_ok());
        assert!(rec.release_reserved_stock(qty(1)).is_err());
    }

    #[test]
    fn add_stock_records_new_unit_cost_but_keeps_old_when_absent() {
        let mut rec = record(100, 0);
        rec.add_stock(qty(50), Some(Decimal::new(1000, 2))).unwrap();
        assert_eq!(rec.physical_stock(), 150);
        assert_eq!(rec.unit_cost, Some(Decimal::new(1000, 2)));
        rec.add_stock(qty(10), None).unwrap();
        assert_eq!(rec.unit_cost, Some(Decimal::new(1000, 2)));
    }

    #[test]
    fn add_stock_overflow_is_rejected() {
        let mut rec = record(i64::MAX - 1, 0);
        assert_eq!(
            rec.add_stock(qty(2), None).unwrap_err(),
            BalanceError::Overflow
        );
        assert_eq!(rec.physical_stock(), i64::MAX - 1);
    }

    #[test]
    fn fulfill_equals_release_then_remove_in_net_effect() {
        let mut fulfilled = record(100, 30);
        fulfilled.fulfill_reservation(qty(30)).unwrap();

        let mut staged = record(100, 30);
        staged.release_reserved_stock(qty(30)).unwrap();
        staged.remove_stock(qty(30)).unwrap();

        assert_eq!(fulfilled.physical_stock(), staged.physical_stock());
        assert_eq!(fulfilled.reserved_stock(), staged.reserved_stock());
    }

    #[test]
    fn apply_dispatches_to_the_matching_transition() {
        let mut rec = record(100, 0);
        rec.apply(&StockMutation::Reserve { quantity: qty(40) })
            .unwrap();
        rec.apply(&StockMutation::Fulfill { quantity: qty(15) })
            .unwrap();
        rec.apply(&StockMutation::Release { quantity: qty(25) })
            .unwrap();
        rec.apply(&StockMutation::Add {
            quantity: qty(5),
            unit_cost: None,
        })
        .unwrap();
        rec.apply(&StockMutation::Remove { quantity: qty(10) })
            .unwrap();
        assert_eq!(rec.physical_stock(), 80);
        assert_eq!(rec.reserved_stock(), 0);
    }

    #[test]
    fn ledger_delta_signs_match_movement_direction() {
        assert_eq!(
            StockMutation::Add {
                quantity: qty(5),
                unit_cost: None
            }
            .ledger_delta(),
            5
        );
        assert_eq!(StockMutation::Remove { quantity: qty(5) }.ledger_delta(), -5);
        assert_eq!(StockMutation::Reserve { quantity: qty(5) }.ledger_delta(), -5);
        assert_eq!(StockMutation::Release { quantity: qty(5) }.ledger_delta(), 5);
        assert_eq!(StockMutation::Fulfill { quantity: qty(5) }.ledger_delta(), -5);
    }

    #[test]
    fn snapshot_reflects_derived_fields() {
        let rec = record(100, 10);
        let snap = rec.snapshot();
        assert_eq!(snap.physical_stock, 100);
        assert_eq!(snap.reserved_stock, 10);
        assert_eq!(snap.available_stock, 90);
        assert_eq!(snap.status, StockStatus::InStock);
        assert_eq!(snap.inventory_id, rec.id);
    }

    // Mutation generator for the invariant property below.
    fn arb_mutation() -> impl Strategy<Value = StockMutation> {
        (0u8..5, 1i64..50).prop_map(|(kind, q)| {
            let quantity = Quantity::try_new(q).unwrap();
            match kind {
                0 => StockMutation::Add {
                    quantity,
                    unit_cost: None,
                },
                1 => StockMutation::Remove { quantity },
                2 => StockMutation::Reserve { quantity },
                3 => StockMutation::Release { quantity },
                _ => StockMutation::Fulfill { quantity },
            }
        })
    }

    proptest! {
        /// For any sequence of transitions, at every observable point
        /// `0 <= reserved <= physical`, and failed transitions change
        /// nothing.
        #[test]
        fn invariant_holds_across_any_operation_sequence(
            physical in 0i64..200,
            reserved_seed in 0i64..200,
            mutations in proptest::collection::vec(arb_mutation(), 0..40),
        ) {
            let reserved = reserved_seed.min(physical);
            let mut rec = record(physical, reserved);

            for mutation in &mutations {
                let before = (rec.physical_stock(), rec.reserved_stock());
                let result = rec.apply(mutation);

                prop_assert!(rec.reserved_stock() >= 0);
                prop_assert!(rec.reserved_stock() <= rec.physical_stock());
                prop_assert_eq!(
                    rec.available_stock(),
                    rec.physical_stock() - rec.reserved_stock()
                );

                if result.is_err() {
                    prop_assert_eq!((rec.physical_stock(), rec.reserved_stock()), before);
                }
            }
        }
    }
}
