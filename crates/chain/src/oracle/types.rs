//! Oracle type definitions.

use alloy::primitives::{I256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price feeds a position depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedId {
    /// Collateral asset quoted in USD (the protocol's `priceFeed`)
    CollateralQuote,
    /// Borrow asset quoted in USD (the protocol's `borrowPriceFeed`)
    DebtQuote,
}

impl FeedId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollateralQuote => "collateral/usd",
            Self::DebtQuote => "debt/usd",
        }
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single price observation from a feed.
///
/// The answer is kept signed exactly as the aggregator reports it; a
/// non-positive answer is a malformed reading, not a zero price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleReading {
    /// Feed this reading came from
    pub feed_id: FeedId,
    /// Raw answer (in `decimals` decimals)
    pub price: I256,
    /// Unix timestamp of the round's last update
    pub updated_at: u64,
    /// Answer decimals (8 for Chainlink USD feeds)
    pub decimals: u8,
}

impl OracleReading {
    /// Create a new reading.
    pub fn new(feed_id: FeedId, price: I256, updated_at: u64, decimals: u8) -> Self {
        Self {
            feed_id,
            price,
            updated_at,
            decimals,
        }
    }

    /// Positive price as an unsigned value, `None` for zero or negative answers.
    pub fn positive_price(&self) -> Option<U256> {
        if self.price.is_positive() {
            Some(self.price.into_raw())
        } else {
            None
        }
    }

    /// Price normalized to 18 decimals (WAD). Non-positive prices yield zero,
    /// answers too large for 256 bits saturate.
    pub fn price_wad(&self) -> U256 {
        let Some(price) = self.positive_price() else {
            return U256::ZERO;
        };
        if self.decimals == 18 {
            price
        } else if self.decimals < 18 {
            price.saturating_mul(U256::from(10u64).pow(U256::from(18 - self.decimals)))
        } else {
            price / U256::from(10u64).pow(U256::from(self.decimals - 18))
        }
    }

    /// Price as f64 (display only).
    pub fn price_f64(&self) -> f64 {
        let divisor = 10_f64.powi(self.decimals as i32);
        self.price.to_string().parse::<f64>().unwrap_or(0.0) / divisor
    }

    /// Age in seconds at `now`; readings from the future have age zero.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.updated_at)
    }

    /// Update time as a UTC timestamp (display only).
    pub fn updated_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.updated_at as i64, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(price: i64, decimals: u8) -> OracleReading {
        OracleReading::new(
            FeedId::CollateralQuote,
            I256::try_from(price).unwrap(),
            1_700_000_000,
            decimals,
        )
    }

    #[test]
    fn test_price_conversion() {
        // $2000 with 8 decimals
        let r = reading(200_000_000_000, 8);
        assert!((r.price_f64() - 2000.0).abs() < 0.01);
        assert_eq!(r.price_wad(), U256::from(2000u64) * U256::from(10u64).pow(U256::from(18)));
    }

    #[test]
    fn test_non_positive_price() {
        assert!(reading(0, 8).positive_price().is_none());
        assert!(reading(-1, 8).positive_price().is_none());
        assert_eq!(reading(-1, 8).price_wad(), U256::ZERO);
    }

    #[test]
    fn test_huge_price_saturates() {
        let r = OracleReading::new(FeedId::DebtQuote, I256::MAX, 1_700_000_000, 8);
        assert_eq!(r.price_wad(), U256::MAX);

        // Scaling down never overflows
        let r = OracleReading::new(FeedId::DebtQuote, I256::MAX, 1_700_000_000, 20);
        assert_eq!(r.price_wad(), I256::MAX.into_raw() / U256::from(100u64));
    }

    #[test]
    fn test_age() {
        let r = reading(100_000_000, 8);
        assert_eq!(r.age_secs(1_700_000_100), 100);
        // Clock behind the feed
        assert_eq!(r.age_secs(1_699_999_000), 0);
    }

    #[test]
    fn test_updated_at_utc() {
        let r = reading(100_000_000, 8);
        assert_eq!(r.updated_at_utc().map(|t| t.timestamp()), Some(1_700_000_000));
    }
}
