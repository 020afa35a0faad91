//! Conversions between native token precision and the 18-decimal canonical
//! unit used for all cross-chain comparisons.
//!
//! The upscaling happens exactly once, at the balance-aggregation and
//! earmark boundaries; everything that carries native precision keeps the
//! `_native` suffix in its name.

use alloy_primitives::U256;

/// Precision of the canonical unit.
pub const CANONICAL_DECIMALS: u8 = 18;

/// Denominator for deci-basis-point arithmetic: 1 dbps = 1e-5.
pub const DBPS_DENOMINATOR: u64 = 100_000;

fn scale(exponent: u8) -> U256 {
    U256::from(10).pow(U256::from(exponent))
}

/// Upscale a native-precision amount to the canonical 18-decimal unit.
///
/// Assets with more than 18 decimals are truncated toward zero; no such
/// asset is expected in practice.
pub fn to_canonical(amount_native: U256, decimals: u8) -> U256 {
    if decimals < CANONICAL_DECIMALS {
        amount_native * scale(CANONICAL_DECIMALS - decimals)
    } else if decimals > CANONICAL_DECIMALS {
        amount_native / scale(decimals - CANONICAL_DECIMALS)
    } else {
        amount_native
    }
}

/// Downscale a canonical amount to native precision, truncating toward zero.
pub fn from_canonical(amount: U256, decimals: u8) -> U256 {
    if decimals < CANONICAL_DECIMALS {
        amount / scale(CANONICAL_DECIMALS - decimals)
    } else if decimals > CANONICAL_DECIMALS {
        amount * scale(decimals - CANONICAL_DECIMALS)
    } else {
        amount
    }
}
