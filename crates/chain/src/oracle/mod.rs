//! Oracle reads for the position's price feeds.
//!
//! The protocol prices collateral and debt through two Chainlink
//! aggregators whose addresses it exposes (`priceFeed`, `borrowPriceFeed`).
//! This module only reads them; deciding whether a reading is usable is the
//! caller's job.

mod chainlink;
mod types;

pub use chainlink::ChainlinkFeed;
pub use types::{FeedId, OracleReading};
