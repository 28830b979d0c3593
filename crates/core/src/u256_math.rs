//! U256 fixed-point arithmetic for position valuation.
//!
//! All valuation is done in WAD (1e18) so token amounts with different
//! decimals and oracle answers with their own scale can be combined
//! without going through floating point. `f64` conversions exist for
//! display and logging only.

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Percent denominator used by the protocol's threshold and bonus constants
pub const PCT_DENOMINATOR: U256 = U256::from_limbs([100u64, 0, 0, 0]);

/// Decimals of a WAD value
pub const WAD_DECIMALS: u8 = 18;

/// Power of 10 as U256.
#[inline]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Rescale an amount with `decimals` decimals to WAD.
#[inline]
pub fn to_wad(amount: U256, decimals: u8) -> U256 {
    if decimals <= WAD_DECIMALS {
        amount.saturating_mul(pow10(WAD_DECIMALS - decimals))
    } else {
        amount / pow10(decimals - WAD_DECIMALS)
    }
}

/// Rescale a WAD value to a token's `decimals` (floor).
#[inline]
pub fn from_wad(wad: U256, decimals: u8) -> U256 {
    if decimals <= WAD_DECIMALS {
        wad / pow10(WAD_DECIMALS - decimals)
    } else {
        wad.saturating_mul(pow10(decimals - WAD_DECIMALS))
    }
}

/// USD value in WAD of `amount` token units priced at `price_wad`.
///
/// Example: 1.5 WETH (18 decimals) at $2000 = 3000 * 10^18
#[inline]
pub fn usd_value_wad(amount: U256, decimals: u8, price_wad: U256) -> U256 {
    if amount.is_zero() || price_wad.is_zero() {
        return U256::ZERO;
    }
    wad_mul(to_wad(amount, decimals), price_wad)
}

/// Token units worth `usd_wad` at `price_wad` (floor).
#[inline]
pub fn units_for_usd(usd_wad: U256, decimals: u8, price_wad: U256) -> U256 {
    if price_wad.is_zero() {
        return U256::ZERO;
    }
    from_wad(wad_div(usd_wad, price_wad), decimals)
}

/// Apply a percentage: value * pct / 100
#[inline]
pub fn apply_pct(value: U256, pct: u64) -> U256 {
    value.saturating_mul(U256::from(pct)) / PCT_DENOMINATOR
}

/// Multiply two WAD values: (a * b) / WAD
#[inline]
pub fn wad_mul(a: U256, b: U256) -> U256 {
    a.saturating_mul(b) / WAD
}

/// Divide two WAD values: (a * WAD) / b
#[inline]
pub fn wad_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    a.saturating_mul(WAD) / b
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline]
pub fn wad_to_f64(wad: U256) -> f64 {
    units_to_f64(wad, WAD_DECIMALS)
}

/// Convert a token amount to f64 in whole tokens (display only).
pub fn units_to_f64(amount: U256, decimals: u8) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    if amount <= U256::from(u128::MAX) {
        amount.to::<u128>() as f64 / scale
    } else {
        let limbs = amount.as_limbs();
        let mut value = 0f64;
        for limb in limbs.iter().rev() {
            value = value * 18_446_744_073_709_551_616f64 + *limb as f64;
        }
        value / scale
    }
}
