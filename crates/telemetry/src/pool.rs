//! Quota-pool clustering.
//!
//! The server does not say which models share a usage limit, so pools are
//! inferred: systems whose fuel levels agree to [`POOL_PRECISION_DIGITS`]
//! decimal digits are assumed to drain the same quota. This is a heuristic.
//! Two unrelated models can coincide (false positive), and pooled models whose
//! reported fractions differ by rounding noise split apart (false negative).
//! Full systems are skipped since every untouched quota reads `1.0`.

use fuelwatch_core::FuelSystem;
use std::collections::HashMap;

/// Decimal digits compared when grouping fuel levels.
pub const POOL_PRECISION_DIGITS: i32 = 6;

fn pool_key(fuel_level: f64) -> i64 {
    (fuel_level * 10f64.powi(POOL_PRECISION_DIGITS)).round() as i64
}

/// Assign `pool-N` ids in first-encounter order; singletons stay unpooled.
pub fn assign_quota_pools(systems: &mut [FuelSystem]) {
    let mut groups: Vec<(i64, Vec<usize>)> = Vec::new();
    let mut index_of: HashMap<i64, usize> = HashMap::new();

    for (i, system) in systems.iter_mut().enumerate() {
        system.quota_pool_id = None;
        if system.fuel_level >= 1.0 {
            continue;
        }
        let key = pool_key(system.fuel_level);
        let slot = *index_of.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(i);
    }

    let mut next_pool = 1;
    for (_, members) in groups.iter().filter(|(_, members)| members.len() >= 2) {
        let pool_id = format!("pool-{}", next_pool);
        for &i in members {
            systems[i].quota_pool_id = Some(pool_id.clone());
        }
        next_pool += 1;
    }
}
