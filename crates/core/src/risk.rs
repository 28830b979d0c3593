//! Health factor and risk classification.

use crate::u256_math::{apply_pct, units_for_usd, usd_value_wad, wad_div, wad_to_f64, WAD};
use alloy::primitives::U256;
use lendwatch_chain::{OracleReading, ProtocolParams};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HF at or above which a position is `Healthy` (1.5)
pub const HEALTHY_HF_WAD: U256 = U256::from_limbs([1_500_000_000_000_000_000u64, 0, 0, 0]);

/// HF at or above which a position is `Warning` rather than `Danger` (1.2)
pub const WARNING_HF_WAD: U256 = U256::from_limbs([1_200_000_000_000_000_000u64, 0, 0, 0]);

/// HF below which a position can be liquidated (1.0)
pub const LIQUIDATION_HF_WAD: U256 = WAD;

/// Health factor; `Unbounded` means the account has no debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthFactor {
    Unbounded,
    /// WAD-scaled ratio
    Finite(U256),
}

impl HealthFactor {
    /// From a WAD value where `U256::MAX` is the ledger's "no debt" sentinel.
    pub fn from_wad(wad: U256) -> Self {
        if wad == U256::MAX {
            Self::Unbounded
        } else {
            Self::Finite(wad)
        }
    }

    /// WAD value, `U256::MAX` for unbounded.
    pub fn as_wad(&self) -> U256 {
        match self {
            Self::Unbounded => U256::MAX,
            Self::Finite(wad) => *wad,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Self::Unbounded)
    }

    pub fn is_liquidatable(&self) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Finite(wad) => *wad < LIQUIDATION_HF_WAD,
        }
    }

    /// Ratio as f64 for display; `None` when unbounded.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Unbounded => None,
            Self::Finite(wad) => Some(wad_to_f64(*wad)),
        }
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("∞"),
            Self::Finite(wad) => write!(f, "{:.4}", wad_to_f64(*wad)),
        }
    }
}

/// Risk band of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskBand {
    Healthy,
    Warning,
    Danger,
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Danger => "danger",
        })
    }
}

/// Band plus the liquidation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub band: RiskBand,
    pub liquidatable: bool,
}

/// Classify a health factor. Total and pure; comparisons stay in WAD.
pub fn classify(hf: HealthFactor) -> Classification {
    let band = match hf {
        HealthFactor::Unbounded => RiskBand::Healthy,
        HealthFactor::Finite(wad) if wad >= HEALTHY_HF_WAD => RiskBand::Healthy,
        HealthFactor::Finite(wad) if wad >= WARNING_HF_WAD => RiskBand::Warning,
        HealthFactor::Finite(_) => RiskBand::Danger,
    };
    Classification {
        band,
        liquidatable: hf.is_liquidatable(),
    }
}

/// USD prices of both assets in WAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub collateral_usd: U256,
    pub debt_usd: U256,
}

impl PriceQuote {
    /// From the two feed readings; `None` if either answer is non-positive.
    pub fn from_readings(collateral: &OracleReading, debt: &OracleReading) -> Option<Self> {
        if collateral.positive_price().is_none() || debt.positive_price().is_none() {
            return None;
        }
        Some(Self {
            collateral_usd: collateral.price_wad(),
            debt_usd: debt.price_wad(),
        })
    }
}

/// Health factor from raw amounts:
/// `collateralUsd * threshold% / debtUsd`.
pub fn health_factor_from_values(
    collateral_amount: U256,
    debt_amount: U256,
    prices: &PriceQuote,
    params: &ProtocolParams,
) -> HealthFactor {
    if debt_amount.is_zero() {
        return HealthFactor::Unbounded;
    }
    let collateral_usd = usd_value_wad(
        collateral_amount,
        params.collateral_decimals,
        prices.collateral_usd,
    );
    let debt_usd = usd_value_wad(debt_amount, params.borrow_decimals, prices.debt_usd);
    if debt_usd.is_zero() {
        // dust debt that rounds to nothing in USD
        return HealthFactor::Unbounded;
    }
    let adjusted = apply_pct(collateral_usd, params.liquidation_threshold_pct);
    HealthFactor::Finite(wad_div(adjusted, debt_usd))
}

/// Additional borrow-token units that keep the health factor at or above 1.0.
///
/// `current_debt` should already include projected interest.
pub fn borrow_capacity(
    collateral_amount: U256,
    current_debt: U256,
    prices: &PriceQuote,
    params: &ProtocolParams,
) -> U256 {
    let collateral_usd = usd_value_wad(
        collateral_amount,
        params.collateral_decimals,
        prices.collateral_usd,
    );
    let max_debt_usd = apply_pct(collateral_usd, params.liquidation_threshold_pct);
    let debt_usd = usd_value_wad(current_debt, params.borrow_decimals, prices.debt_usd);
    let headroom = max_debt_usd.saturating_sub(debt_usd);
    units_for_usd(headroom, params.borrow_decimals, prices.debt_usd)
}

/// What a liquidator receives for covering some debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationPreview {
    /// Debt covered, borrow-token units
    pub debt_to_cover: U256,
    /// USD value of the covered debt (WAD)
    pub debt_value_usd: U256,
    /// Collateral received including the bonus, collateral-token units
    pub collateral_seized: U256,
    /// Part of `collateral_seized` that is bonus
    pub bonus_collateral: U256,
}

/// Collateral seized = debt value * (100 + bonus) / 100, in collateral units.
pub fn preview_liquidation(
    debt_to_cover: U256,
    prices: &PriceQuote,
    params: &ProtocolParams,
) -> LiquidationPreview {
    let debt_value_usd = usd_value_wad(debt_to_cover, params.borrow_decimals, prices.debt_usd);
    let base = units_for_usd(debt_value_usd, params.collateral_decimals, prices.collateral_usd);
    let collateral_seized = units_for_usd(
        apply_pct(debt_value_usd, 100 + params.liquidation_bonus_pct),
        params.collateral_decimals,
        prices.collateral_usd,
    );
    LiquidationPreview {
        debt_to_cover,
        debt_value_usd,
        collateral_seized,
        bonus_collateral: collateral_seized.saturating_sub(base),
    }
}
