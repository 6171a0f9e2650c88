//! Cost arithmetic.
//!
//! Pure functions over compute units, hours and a unit price in credits per
//! compute-unit-hour. Range checking belongs to [`crate::safety`].

use vmward_types::{CostEstimate, VmRecord};

/// Reference price in credits per compute-unit-hour.
///
/// Live estimates always use the price fetched from the network.
pub const DEFAULT_UNIT_PRICE: f64 = 1.425;

/// Hourly and total cost for running `compute_units` for `hours`.
pub fn estimate(compute_units: u32, hours: f64, unit_price: f64) -> CostEstimate {
    let hourly_cost = f64::from(compute_units) * unit_price;
    CostEstimate {
        hourly_cost,
        total_cost: hourly_cost * hours,
        ttl_hours: hours,
        compute_units,
    }
}

/// Credits per hour consumed by `records` at `unit_price`.
pub fn burn_rate(records: &[VmRecord], unit_price: f64) -> f64 {
    records
        .iter()
        .map(|r| f64::from(r.compute_units) * unit_price)
        .sum()
}

/// Hours until `balance` is exhausted at `burn_rate`.
///
/// `None` when nothing is burning.
pub fn runway_hours(balance: f64, burn_rate: f64) -> Option<f64> {
    (burn_rate > 0.0).then(|| balance / burn_rate)
}

/// Credits consumed by `record` over `uptime_minutes` at its fixed rate.
pub fn cost_since_creation(record: &VmRecord, uptime_minutes: f64) -> f64 {
    record.cost_for_minutes(uptime_minutes)
}
