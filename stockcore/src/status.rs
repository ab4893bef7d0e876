//! Stock status derivation and aggregate statistics.
//!
//! Status is derived in exactly one place — [`stock_status`] — and invoked
//! by snapshots, list queries, filters, and statistics alike, so the code
//! paths can never drift apart.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::StockRecord;

/// Tri-state availability classification of a stock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    /// Available stock is above the minimum threshold.
    InStock,
    /// Available stock is positive but at or below the minimum threshold.
    LowStock,
    /// No available stock (everything is gone or reserved).
    OutOfStock,
}

impl StockStatus {
    /// Storage-stable name of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InStock => "IN_STOCK",
            Self::LowStock => "LOW_STOCK",
            Self::OutOfStock => "OUT_OF_STOCK",
        }
    }

    /// Parses a storage-stable status name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IN_STOCK" => Some(Self::InStock),
            "LOW_STOCK" => Some(Self::LowStock),
            "OUT_OF_STOCK" => Some(Self::OutOfStock),
            _ => None,
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the stock status from available stock and the minimum threshold.
///
/// Evaluated strictly in this order:
/// 1. `available ≤ 0` → `OutOfStock`
/// 2. `available ≤ minimum` → `LowStock`
/// 3. otherwise → `InStock`
pub const fn stock_status(available_stock: i64, minimum_stock: i64) -> StockStatus {
    if available_stock <= 0 {
        StockStatus::OutOfStock
    } else if available_stock <= minimum_stock {
        StockStatus::LowStock
    } else {
        StockStatus::InStock
    }
}

/// Aggregate statistics over a set of stock records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryStats {
    /// Number of records matched.
    pub total_items: u64,
    /// Σ `physical_stock × unit_price` over records with a price, rounded
    /// to 2 decimal places.
    pub total_value: Decimal,
    /// Number of records currently `LowStock`.
    pub low_stock_count: u64,
    /// Number of records currently `OutOfStock`.
    pub out_of_stock_count: u64,
    /// Record count per status.
    pub status_breakdown: HashMap<StockStatus, u64>,
}

impl InventoryStats {
    /// Computes statistics over the given records.
    ///
    /// Uses the same [`stock_status`] derivation as every other read path.
    pub fn compute<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a StockRecord>,
    {
        let mut total_items = 0u64;
        let mut total_value = Decimal::ZERO;
        let mut status_breakdown: HashMap<StockStatus, u64> = HashMap::new();

        for record in records {
            total_items += 1;
            if let Some(price) = record.unit_price {
                total_value += price * Decimal::from(record.physical_stock());
            }
            *status_breakdown.entry(record.status()).or_insert(0) += 1;
        }

        Self {
            total_items,
            total_value: total_value.round_dp(2),
            low_stock_count: status_breakdown
                .get(&StockStatus::LowStock)
                .copied()
                .unwrap_or(0),
            out_of_stock_count: status_breakdown
                .get(&StockStatus::OutOfStock)
                .copied()
                .unwrap_or(0),
            status_breakdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NewStockRecord;
    use crate::types::{InventoryId, Location, ProductId};
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(physical: i64, reserved: i64, minimum: i64, price: Option<&str>) -> StockRecord {
        StockRecord::hydrate(
            InventoryId::new(),
            ProductId::try_new("prod-1").unwrap(),
            Location::default_location(),
            physical,
            reserved,
            minimum,
            None,
            None,
            price.map(|p| p.parse().unwrap()),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn status_rule_is_evaluated_in_order() {
        // out-of-stock wins even when minimum is also breached
        assert_eq!(stock_status(0, 10), StockStatus::OutOfStock);
        assert_eq!(stock_status(-5, 10), StockStatus::OutOfStock);
        // boundary: available == minimum is low, one above is in stock
        assert_eq!(stock_status(10, 10), StockStatus::LowStock);
        assert_eq!(stock_status(11, 10), StockStatus::InStock);
        // minimum of zero can never classify a positive balance as low
        assert_eq!(stock_status(1, 0), StockStatus::InStock);
    }

    #[test]
    fn status_names_roundtrip() {
        for status in [
            StockStatus::InStock,
            StockStatus::LowStock,
            StockStatus::OutOfStock,
        ] {
            assert_eq!(StockStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StockStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn stats_count_one_record_per_status() {
        let records = vec![
            record(100, 0, 10, Some("2.50")), // in stock
            record(100, 95, 10, Some("1.00")), // available 5 <= 10: low
            record(100, 100, 10, Some("0.10")), // available 0: out
        ];
        let stats = InventoryStats::compute(&records);
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.low_stock_count, 1);
        assert_eq!(stats.out_of_stock_count, 1);
        assert_eq!(stats.status_breakdown.get(&StockStatus::InStock), Some(&1));
        assert_eq!(stats.status_breakdown.get(&StockStatus::LowStock), Some(&1));
        assert_eq!(
            stats.status_breakdown.get(&StockStatus::OutOfStock),
            Some(&1)
        );
        // 100*2.50 + 100*1.00 + 100*0.10 = 360.00
        assert_eq!(stats.total_value, "360.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn stats_skip_unpriced_records_in_valuation_but_count_them() {
        let records = vec![record(10, 0, 0, None), record(10, 0, 0, Some("1.99"))];
        let stats = InventoryStats::compute(&records);
        assert_eq!(stats.total_items, 2);
        assert_eq!(stats.total_value, "19.90".parse::<Decimal>().unwrap());
    }

    #[test]
    fn total_value_rounds_to_two_decimal_places() {
        let records = vec![record(3, 0, 0, Some("0.333"))];
        let stats = InventoryStats::compute(&records);
        assert_eq!(stats.total_value, "1.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn empty_input_yields_zeroed_stats() {
        let stats = InventoryStats::compute(std::iter::empty::<&StockRecord>());
        assert_eq!(stats.total_items, 0);
        assert_eq!(stats.total_value, Decimal::ZERO);
        assert!(stats.status_breakdown.is_empty());
    }

    #[test]
    fn onboarded_record_without_stock_is_out_of_stock() {
        let rec = StockRecord::create(NewStockRecord::new(
            ProductId::try_new("prod-2").unwrap(),
            Location::default_location(),
        ))
        .unwrap();
        assert_eq!(rec.status(), StockStatus::OutOfStock);
    }

    proptest! {
        #[test]
        fn status_matches_the_ordered_rule(available in -100i64..200, minimum in 0i64..100) {
            let expected = if available <= 0 {
                StockStatus::OutOfStock
            } else if available <= minimum {
                StockStatus::LowStock
            } else {
                StockStatus::InStock
            };
            prop_assert_eq!(stock_status(available, minimum), expected);
        }
    }
}
