//! Interest projection.
//!
//! The ledger accrues simple interest per second on every interaction:
//! `interest = debt * ratePerSecond * elapsed / PRECISION`, floored. The
//! functions here reproduce that exactly so the projected figure matches
//! what the ledger will book at the same instant.

use crate::u256_math::{BPS_DENOMINATOR, WAD};
use alloy::primitives::U256;
use lendwatch_chain::{ProtocolParams, RawPosition};
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Per-second borrow rate at a fixed-point precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualRate {
    per_second: U256,
    precision: U256,
}

impl AccrualRate {
    /// Rate from an annual rate in basis points, floored the same way the
    /// ledger derives its constant (`bps * 1e18 / 10000 / 365 days`).
    pub fn from_annual_bps(annual_bps: u64) -> Self {
        Self {
            per_second: U256::from(annual_bps) * WAD
                / BPS_DENOMINATOR
                / U256::from(SECONDS_PER_YEAR),
            precision: WAD,
        }
    }

    /// Rate as read from the ledger.
    pub fn from_per_second(per_second: U256, precision: U256) -> Self {
        let precision = if precision.is_zero() { WAD } else { precision };
        Self {
            per_second,
            precision,
        }
    }

    pub fn from_params(params: &ProtocolParams) -> Self {
        Self::from_per_second(params.borrow_rate_per_second, params.precision)
    }

    pub fn per_second(&self) -> U256 {
        self.per_second
    }

    pub fn precision(&self) -> U256 {
        self.precision
    }

    /// Approximate annual rate in basis points (display only).
    pub fn annual_bps(&self) -> u64 {
        (self.per_second * U256::from(SECONDS_PER_YEAR) * BPS_DENOMINATOR / self.precision)
            .saturating_to::<u64>()
    }
}

/// Interest on `principal` over `elapsed_secs`.
#[inline]
pub fn interest_over(principal: U256, elapsed_secs: u64, rate: AccrualRate) -> U256 {
    if principal.is_zero() || elapsed_secs == 0 {
        return U256::ZERO;
    }
    principal
        .saturating_mul(rate.per_second)
        .saturating_mul(U256::from(elapsed_secs))
        / rate.precision
}

/// Interest accrued since `last_accrual` that the ledger has not booked yet.
///
/// Zero when the account never accrued or has no principal. A `now` earlier
/// than `last_accrual` (local clock behind the chain) projects zero.
pub fn projected_interest(principal: U256, last_accrual: u64, now: u64, rate: AccrualRate) -> U256 {
    if last_accrual == 0 {
        return U256::ZERO;
    }
    interest_over(principal, now.saturating_sub(last_accrual), rate)
}

/// [`projected_interest`] with the rate given as annual basis points.
pub fn projected_interest_bps(
    principal: U256,
    last_accrual: u64,
    now: u64,
    annual_rate_bps: u64,
) -> U256 {
    projected_interest(
        principal,
        last_accrual,
        now,
        AccrualRate::from_annual_bps(annual_rate_bps),
    )
}

/// Principal plus projected interest at an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtProjection {
    /// On-chain debt as of the last accrual
    pub principal: U256,
    /// Interest accrued since then, not yet on-chain
    pub pending_interest: U256,
    /// `principal + pending_interest`
    pub total: U256,
    /// Unix time the projection was computed for
    pub as_of: u64,
}

impl DebtProjection {
    pub fn at(position: &RawPosition, rate: AccrualRate, now: u64) -> Self {
        Self::for_debt(position.principal_debt, position.last_accrual_time, rate, now)
    }

    pub fn for_debt(principal: U256, last_accrual: u64, rate: AccrualRate, now: u64) -> Self {
        let pending_interest = projected_interest(principal, last_accrual, now, rate);
        Self {
            principal,
            pending_interest,
            total: principal.saturating_add(pending_interest),
            as_of: now,
        }
    }
}

/// Interest a principal would accrue over common horizons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestHorizons {
    pub day: U256,
    pub month: U256,
    pub year: U256,
}

/// Interest over 24 hours, 30 days and 365 days.
pub fn interest_horizons(principal: U256, rate: AccrualRate) -> InterestHorizons {
    InterestHorizons {
        day: interest_over(principal, SECONDS_PER_DAY, rate),
        month: interest_over(principal, 30 * SECONDS_PER_DAY, rate),
        year: interest_over(principal, SECONDS_PER_YEAR, rate),
    }
}
