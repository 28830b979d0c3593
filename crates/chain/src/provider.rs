//! Alloy-backed ledger gateway.
//!
//! Every read is a typed `#[sol(rpc)]` call; independent reads of one
//! resource are issued together with `tokio::join!`.

use crate::contracts::{ILendingProtocol, IERC20};
use crate::ledger::{
    AccountActivity, ActivityKind, Asset, ContractSet, LedgerCall, LedgerError, LedgerGateway,
    ProtocolAggregate, ProtocolParams, RawPosition,
};
use crate::oracle::{ChainlinkFeed, FeedId, OracleReading};
use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ledger gateway over an alloy provider.
pub struct AlloyLedger<P> {
    provider: Arc<P>,
    contracts: ContractSet,
    /// Feed addresses resolved from the protocol (they never change for a deployment)
    feeds: DashMap<FeedId, Address>,
}

impl<P> std::fmt::Debug for AlloyLedger<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyLedger")
            .field("contracts", &self.contracts)
            .field("cached_feeds", &self.feeds.len())
            .finish_non_exhaustive()
    }
}

impl<P: Provider + Clone + 'static> AlloyLedger<P> {
    pub fn new(provider: Arc<P>, contracts: ContractSet) -> Self {
        Self {
            provider,
            contracts,
            feeds: DashMap::new(),
        }
    }

    /// Contract addresses this gateway talks to.
    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    /// Chain head, used as a connectivity probe.
    pub async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.provider.get_block_number().await?)
    }

    /// Resolve (and cache) the aggregator address behind a feed.
    async fn feed_address(&self, feed: FeedId) -> Result<Address, LedgerError> {
        if let Some(addr) = self.feeds.get(&feed) {
            return Ok(*addr);
        }

        let protocol = ILendingProtocol::new(self.contracts.lending_protocol, &*self.provider);
        let address = match feed {
            FeedId::CollateralQuote => protocol.priceFeed().call().await?._0,
            FeedId::DebtQuote => protocol.borrowPriceFeed().call().await?._0,
        };

        debug!(feed = %feed, aggregator = %address, "Resolved price feed");
        self.feeds.insert(feed, address);
        Ok(address)
    }
}

/// Turn a log into an activity entry if it decodes as `E`.
fn decode_activity<E: SolEvent>(
    log: &Log,
    kind: ActivityKind,
    amount: impl Fn(&E) -> U256,
) -> Option<AccountActivity> {
    let decoded = log.log_decode::<E>().ok()?;
    Some(AccountActivity {
        kind,
        amount: amount(&decoded.inner.data),
        block_number: log.block_number.unwrap_or_default(),
        tx_hash: log.transaction_hash.unwrap_or_default(),
    })
}

#[async_trait]
impl<P: Provider + Clone + 'static> LedgerGateway for AlloyLedger<P> {
    async fn position(&self, account: Address) -> Result<RawPosition, LedgerError> {
        let protocol = ILendingProtocol::new(self.contracts.lending_protocol, &*self.provider);

        let collateral_call = protocol.userToCollateralDeposited(account);
        let debt_call = protocol.userToAmountBorrowed(account);
        let accrued_call = protocol.lastAccrued(account);
        let hf_call = protocol.getHealthFactor(account);

        let (collateral, debt, accrued, hf) = tokio::join!(
            collateral_call.call(),
            debt_call.call(),
            accrued_call.call(),
            hf_call.call()
        );

        // The protocol reverts getHealthFactor for some account states; that is
        // an absent value, not a failed read.
        let health_factor = match hf {
            Ok(r) => Some(r._0),
            Err(e) => match LedgerError::from(e) {
                LedgerError::Reverted { message, .. } => {
                    debug!(account = %account, reason = %message, "Health factor read reverted");
                    None
                }
                other => return Err(other),
            },
        };

        Ok(RawPosition {
            collateral_amount: collateral?._0,
            principal_debt: debt?._0,
            last_accrual_time: accrued?._0.saturating_to::<u64>(),
            health_factor,
        })
    }

    async fn protocol_aggregate(&self) -> Result<ProtocolAggregate, LedgerError> {
        let protocol = ILendingProtocol::new(self.contracts.lending_protocol, &*self.provider);
        let total_borrowed = protocol.totalBorrowed().call().await?._0;
        Ok(ProtocolAggregate { total_borrowed })
    }

    async fn oracle_reading(&self, feed: FeedId) -> Result<OracleReading, LedgerError> {
        let aggregator = self.feed_address(feed).await?;
        ChainlinkFeed::new(feed, aggregator, self.provider.clone())
            .latest()
            .await
    }

    async fn protocol_params(&self) -> Result<ProtocolParams, LedgerError> {
        let protocol = ILendingProtocol::new(self.contracts.lending_protocol, &*self.provider);
        let collateral = IERC20::new(self.contracts.collateral_token, &*self.provider);
        let borrow = IERC20::new(self.contracts.borrow_token, &*self.provider);

        let threshold_call = protocol.LIQUIDATION_THRESHOLD();
        let bonus_call = protocol.LIQUIDATION_BONUS();
        let rate_call = protocol.BORROW_RATE_PER_SECOND();
        let precision_call = protocol.PRECISION();
        let max_age_call = protocol.MAX_PRICE_AGE();
        let collateral_decimals_call = collateral.decimals();
        let borrow_decimals_call = borrow.decimals();

        let (threshold, bonus, rate, precision, max_age, collateral_decimals, borrow_decimals) = tokio::join!(
            threshold_call.call(),
            bonus_call.call(),
            rate_call.call(),
            precision_call.call(),
            max_age_call.call(),
            collateral_decimals_call.call(),
            borrow_decimals_call.call()
        );

        Ok(ProtocolParams {
            liquidation_threshold_pct: threshold?._0.saturating_to::<u64>(),
            liquidation_bonus_pct: bonus?._0.saturating_to::<u64>(),
            borrow_rate_per_second: rate?._0,
            precision: precision?._0,
            max_price_age_secs: max_age?._0.saturating_to::<u64>(),
            collateral_decimals: collateral_decimals?._0,
            borrow_decimals: borrow_decimals?._0,
        })
    }

    async fn token_balance(&self, asset: Asset, owner: Address) -> Result<U256, LedgerError> {
        let token = IERC20::new(self.contracts.token(asset), &*self.provider);
        Ok(token.balanceOf(owner).call().await?._0)
    }

    async fn allowance(&self, asset: Asset, owner: Address) -> Result<U256, LedgerError> {
        let token = IERC20::new(self.contracts.token(asset), &*self.provider);
        Ok(token
            .allowance(owner, self.contracts.lending_protocol)
            .call()
            .await?
            ._0)
    }

    async fn simulate(&self, from: Address, call: &LedgerCall) -> Result<(), LedgerError> {
        debug!(from = %from, call = call.name(), "Simulating call");
        trial_call(&*self.provider, &self.contracts, from, call, BlockId::latest()).await
    }

    async fn account_activity(
        &self,
        account: Address,
        lookback_blocks: u64,
    ) -> Result<Vec<AccountActivity>, LedgerError> {
        let head = self.provider.get_block_number().await?;
        let from_block = head.saturating_sub(lookback_blocks);

        let filter = Filter::new()
            .address(self.contracts.lending_protocol)
            .event_signature(vec![
                ILendingProtocol::userAddedCollateral::SIGNATURE_HASH,
                ILendingProtocol::userBorrowedToken::SIGNATURE_HASH,
                ILendingProtocol::userRepaidDebt::SIGNATURE_HASH,
            ])
            .topic1(account.into_word())
            .from_block(BlockNumberOrTag::Number(from_block))
            .to_block(BlockNumberOrTag::Latest);

        let logs = self.provider.get_logs(&filter).await?;

        let mut activity: Vec<AccountActivity> = logs
            .iter()
            .filter_map(|log| {
                let decoded = decode_activity::<ILendingProtocol::userAddedCollateral>(
                    log,
                    ActivityKind::Deposit,
                    |e| e.collateralAmount,
                )
                .or_else(|| {
                    decode_activity::<ILendingProtocol::userBorrowedToken>(
                        log,
                        ActivityKind::Borrow,
                        |e| e.borrowAmount,
                    )
                })
                .or_else(|| {
                    decode_activity::<ILendingProtocol::userRepaidDebt>(
                        log,
                        ActivityKind::Repay,
                        |e| e.repaidAmount,
                    )
                });
                if decoded.is_none() {
                    warn!(tx = ?log.transaction_hash, "Skipping undecodable protocol log");
                }
                decoded
            })
            .collect();

        activity.sort_by(|a, b| b.block_number.cmp(&a.block_number));

        debug!(
            account = %account,
            from_block,
            head,
            events = activity.len(),
            "Fetched account activity"
        );

        Ok(activity)
    }
}

/// Execute `call` as `from` via `eth_call` against the state at `block`.
///
/// Used both for pre-submission simulation and for recovering the revert
/// reason of a mined transaction that failed.
pub(crate) async fn trial_call<P: Provider>(
    provider: &P,
    contracts: &ContractSet,
    from: Address,
    call: &LedgerCall,
    block: BlockId,
) -> Result<(), LedgerError> {
    let protocol = ILendingProtocol::new(contracts.lending_protocol, provider);

    match *call {
        LedgerCall::Approve { asset, amount } => {
            IERC20::new(contracts.token(asset), provider)
                .approve(contracts.lending_protocol, amount)
                .from(from)
                .block(block)
                .call()
                .await?;
        }
        LedgerCall::DepositCollateral { amount } => {
            protocol.depositCollateral(amount).from(from).block(block).call().await?;
        }
        LedgerCall::WithdrawCollateral { amount } => {
            protocol.withdrawCollateral(amount).from(from).block(block).call().await?;
        }
        LedgerCall::Borrow { amount } => {
            protocol.borrow(amount).from(from).block(block).call().await?;
        }
        LedgerCall::Repay { amount } => {
            protocol.repay(amount).from(from).block(block).call().await?;
        }
        LedgerCall::Liquidate {
            target,
            debt_to_cover,
        } => {
            protocol
                .liquidate(target, debt_to_cover)
                .from(from)
                .block(block)
                .call()
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_sepolia_reads() {
        let url = std::env::var("RPC_URL").unwrap_or_else(|_| "https://rpc.sepolia.org".into());
        let provider = ProviderBuilder::new().on_http(url.parse().unwrap());
        let ledger = AlloyLedger::new(
            Arc::new(provider),
            ContractSet {
                lending_protocol: "0x3db2787AE4258B4aA30872a972516A0e51e93cFc".parse().unwrap(),
                collateral_token: "0x7b79995e5f793A07Bc00c21412e50Ecae098E7f9".parse().unwrap(),
                borrow_token: "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238".parse().unwrap(),
            },
        );

        let params = ledger.protocol_params().await.unwrap();
        assert_eq!(params.liquidation_threshold_pct, 80);
        assert_eq!(params.borrow_decimals, 6);

        let position = ledger.position(Address::ZERO).await.unwrap();
        assert_eq!(position.principal_debt, U256::ZERO);
    }
}
