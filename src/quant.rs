// Fixed-point quantization module
// This file handles basis-point arithmetic and the discretization of input capital
// into allocation units for split routing
//
// Numan Thabit 2025 Nov

use anyhow::{ensure, Result};

pub const BPS_DENOMINATOR: u32 = 10_000;

/// Discretized input capital: `count` units of size `unit` plus a `remainder`
/// smaller than one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationUnits {
    pub unit: u128,
    pub count: u128,
    pub remainder: u128,
}

/// `floor(amount * bps / 10000)` without overflowing on large amounts.
pub fn bps_of(amount: u128, bps: u32) -> u128 {
    let bps = bps.min(BPS_DENOMINATOR) as u128;
    let denom = BPS_DENOMINATOR as u128;
    (amount / denom) * bps + (amount % denom) * bps / denom
}

/// `floor(amount * (10000 - bps) / 10000)`.
pub fn apply_bps_discount(amount: u128, bps: u32) -> u128 {
    bps_of(amount, BPS_DENOMINATOR - bps.min(BPS_DENOMINATOR))
}

/// Convert a fractional shortfall (0.0 = none, 1.0 = total) into basis points.
pub fn ratio_to_bps(ratio: f64) -> u32 {
    if !ratio.is_finite() || ratio <= 0.0 {
        return 0;
    }
    let bps = (ratio * BPS_DENOMINATOR as f64).round();
    bps.min(BPS_DENOMINATOR as f64) as u32
}

/// Capital-weighted average of basis-point values, rounded to nearest.
/// Weights too large for exact `weight * bps` products are scaled down first.
pub fn weighted_average_bps(samples: &[(u128, u32)]) -> u32 {
    let total = samples
        .iter()
        .fold(0u128, |acc, (weight, _)| acc.saturating_add(*weight));
    if total == 0 {
        return 0;
    }
    let headroom = u128::MAX / (2 * BPS_DENOMINATOR as u128);
    let scale = total / headroom + 1;

    let mut scaled_total: u128 = 0;
    let mut weighted: u128 = 0;
    for (weight, bps) in samples {
        let weight = weight / scale;
        scaled_total += weight;
        weighted += weight * (*bps).min(BPS_DENOMINATOR) as u128;
    }
    if scaled_total == 0 {
        return 0;
    }
    ((weighted + scaled_total / 2) / scaled_total) as u32
}

pub fn allocation_units(amount: u128, granularity_bps: u32) -> Result<AllocationUnits> {
    ensure!(
        granularity_bps > 0 && granularity_bps <= BPS_DENOMINATOR,
        "granularity must be within 1..=10000 bps, got {granularity_bps}"
    );
    ensure!(amount > 0, "amount must be positive");
    let unit = bps_of(amount, granularity_bps);
    ensure!(
        unit > 0,
        "amount {amount} too small for {granularity_bps} bps allocation units"
    );
    Ok(AllocationUnits {
        unit,
        count: amount / unit,
        remainder: amount % unit,
    })
}

/// Parse a decimal integer amount as sent on the wire.
pub fn parse_amount(raw: &str) -> Result<u128> {
    let raw = raw.trim();
    ensure!(
        !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()),
        "amount {raw:?} is not a decimal integer"
    );
    Ok(raw.parse::<u128>()?)
}

/// Serde helper: `u128` amounts travel as decimal strings and are accepted as
/// strings or integers.
pub mod amount_str {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer amount or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative amount {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            super::parse_amount(v).map_err(|e| E::custom(e.to_string()))
        }
    }
}
