//! Chainlink feed reader.

use super::{FeedId, OracleReading};
use crate::contracts::IAggregatorV3;
use crate::ledger::LedgerError;
use alloy::primitives::Address;
use alloy::providers::Provider;
use std::sync::Arc;

/// Reads a Chainlink AggregatorV3 feed.
#[derive(Clone)]
pub struct ChainlinkFeed<P> {
    /// Which of the position's feeds this is
    feed_id: FeedId,
    /// Aggregator contract address
    aggregator: Address,
    /// Provider for RPC calls
    provider: Arc<P>,
}

impl<P> std::fmt::Debug for ChainlinkFeed<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainlinkFeed")
            .field("feed_id", &self.feed_id)
            .field("aggregator", &self.aggregator)
            .finish()
    }
}

impl<P: Provider + Clone + 'static> ChainlinkFeed<P> {
    /// Create a new feed reader.
    pub fn new(feed_id: FeedId, aggregator: Address, provider: Arc<P>) -> Self {
        Self {
            feed_id,
            aggregator,
            provider,
        }
    }

    /// Fetch the latest round and the feed's decimals in parallel.
    ///
    /// The answer is returned as reported; sanity checks belong to the caller.
    pub async fn latest(&self) -> Result<OracleReading, LedgerError> {
        let contract = IAggregatorV3::new(self.aggregator, &*self.provider);
        let round_call = contract.latestRoundData();
        let decimals_call = contract.decimals();

        let (round, decimals) = tokio::join!(round_call.call(), decimals_call.call());
        let round = round?;
        let decimals = decimals?;

        Ok(OracleReading::new(
            self.feed_id,
            round.answer,
            round.updatedAt.saturating_to::<u64>(),
            decimals._0,
        ))
    }
}
