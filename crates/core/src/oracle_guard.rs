//! Oracle staleness and sanity checks.

use lendwatch_chain::OracleReading;
use serde::{Deserialize, Serialize};

/// Verdict on a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleStatus {
    Ok,
    /// Older than the allowed age
    Stale,
    /// Non-positive answer
    Invalid,
}

impl OracleStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Judge a reading at `now`. A non-positive price is `Invalid` whatever its
/// age; otherwise it is `Stale` once `now - updated_at` exceeds `max_age`.
pub fn validate(reading: &OracleReading, now: u64, max_age_secs: u64) -> OracleStatus {
    if reading.positive_price().is_none() {
        return OracleStatus::Invalid;
    }
    if reading.age_secs(now) > max_age_secs {
        return OracleStatus::Stale;
    }
    OracleStatus::Ok
}
