use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::StoreTarget;

pub const METRIC_ORDERS: &str = "orders";
pub const METRIC_UNITS: &str = "units";
pub const METRIC_UPH: &str = "uph";
pub const METRIC_INF_RATE: &str = "inf_rate";
pub const METRIC_LATE_RATE: &str = "late_rate";

/// A row of the per-shopper performance table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopperMetrics {
    pub name: String,
    pub orders: u64,
    pub units: f64,
    pub pick_time_secs: f64,
    pub requested_units: f64,
    pub uph: f64,
    pub inf_rate: f64,
    pub late_rate: f64,
}

/// An item reported as not found during picking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub sku: String,
    pub product_name: String,
    pub image_url: String,
    pub inf_units: f64,
    pub orders_impacted: u64,
    pub inf_rate: f64,
}

/// Store-wide sums behind the weighted performance metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreTotals {
    pub orders: u64,
    pub units: f64,
    pub pick_time_secs: f64,
    pub requested_units: f64,
    pub inf_units: f64,
    pub late_orders: f64,
}

pub fn units_per_hour(units: f64, pick_time_secs: f64) -> f64 {
    if pick_time_secs > 0.0 {
        units / (pick_time_secs / 3600.0)
    } else {
        0.0
    }
}

impl StoreTotals {
    pub fn from_shoppers(shoppers: &[ShopperMetrics]) -> Self {
        shoppers.iter().fold(Self::default(), |mut totals, shopper| {
            totals.orders += shopper.orders;
            totals.units += shopper.units;
            totals.pick_time_secs += shopper.pick_time_secs;
            totals.requested_units += shopper.requested_units;
            totals.inf_units += shopper.requested_units * shopper.inf_rate / 100.0;
            totals.late_orders += shopper.orders as f64 * shopper.late_rate / 100.0;
            totals
        })
    }

    pub fn add(&mut self, other: &StoreTotals) {
        self.orders += other.orders;
        self.units += other.units;
        self.pick_time_secs += other.pick_time_secs;
        self.requested_units += other.requested_units;
        self.inf_units += other.inf_units;
        self.late_orders += other.late_orders;
    }

    pub fn uph(&self) -> f64 {
        units_per_hour(self.units, self.pick_time_secs)
    }

    /// Percentage of requested units not found, weighted by requested units.
    pub fn inf_rate(&self) -> f64 {
        if self.requested_units > 0.0 {
            self.inf_units / self.requested_units * 100.0
        } else {
            0.0
        }
    }

    /// Percentage of late orders, weighted by orders.
    pub fn late_rate(&self) -> f64 {
        if self.orders > 0 {
            self.late_orders / self.orders as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// Metrics collected for one store during one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    pub store: StoreTarget,
    pub collected_at: DateTime<Utc>,
    pub performance: BTreeMap<String, f64>,
    pub totals: StoreTotals,
    pub shoppers: Vec<ShopperMetrics>,
    pub inventory: Vec<InventoryItem>,
}

impl MetricsRecord {
    pub fn new(store: StoreTarget, shoppers: Vec<ShopperMetrics>, inventory: Vec<InventoryItem>) -> Self {
        let totals = StoreTotals::from_shoppers(&shoppers);
        let mut performance = BTreeMap::new();
        if totals.orders > 0 {
            performance.insert(METRIC_ORDERS.to_string(), totals.orders as f64);
            performance.insert(METRIC_UNITS.to_string(), totals.units);
            performance.insert(METRIC_UPH.to_string(), totals.uph());
            performance.insert(METRIC_INF_RATE.to_string(), totals.inf_rate());
            performance.insert(METRIC_LATE_RATE.to_string(), totals.late_rate());
        }

        Self {
            store,
            collected_at: Utc::now(),
            performance,
            totals,
            shoppers,
            inventory,
        }
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.performance.get(key).copied()
    }

    pub fn has_activity(&self) -> bool {
        self.totals.orders > 0
    }
}
