//! Ledger Gateway and wallet collaborator interfaces.
//!
//! The lending protocol is an external state machine: reads may fail in
//! transport, writes may revert with a typed reason, and the wallet may
//! refuse to sign. These traits are the only surface the engine touches, so
//! the whole sync/pre-flight pipeline runs against in-memory doubles in tests.

mod error;
mod types;

pub use error::{LedgerError, EXECUTION_REVERTED_CODE, USER_REJECTED_CODE};
pub use types::{
    AccountActivity, ActivityKind, Asset, Confirmation, ContractSet, LedgerCall, ProtocolAggregate,
    ProtocolParams, RawPosition, WalletBalances,
};

use crate::oracle::{FeedId, OracleReading};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::fmt::Debug;

/// Typed read/simulate surface of the lending protocol.
#[async_trait]
pub trait LedgerGateway: Send + Sync + Debug {
    /// Position of one account.
    async fn position(&self, account: Address) -> Result<RawPosition, LedgerError>;

    /// Protocol-wide aggregate.
    async fn protocol_aggregate(&self) -> Result<ProtocolAggregate, LedgerError>;

    /// Latest reading of one of the protocol's price feeds.
    async fn oracle_reading(&self, feed: FeedId) -> Result<OracleReading, LedgerError>;

    /// Protocol constants (threshold, bonus, rate, max price age, decimals).
    async fn protocol_params(&self) -> Result<ProtocolParams, LedgerError>;

    /// Wallet balance of a token.
    async fn token_balance(&self, asset: Asset, owner: Address) -> Result<U256, LedgerError>;

    /// Both wallet balances of an account.
    async fn wallet_balances(&self, owner: Address) -> Result<WalletBalances, LedgerError> {
        let (collateral, borrow) = tokio::join!(
            self.token_balance(Asset::Collateral, owner),
            self.token_balance(Asset::Borrow, owner)
        );
        Ok(WalletBalances {
            collateral: collateral?,
            borrow: borrow?,
        })
    }

    /// Allowance granted by `owner` to the lending protocol.
    async fn allowance(&self, asset: Asset, owner: Address) -> Result<U256, LedgerError>;

    /// Non-mutating trial execution of a write as `from`.
    async fn simulate(&self, from: Address, call: &LedgerCall) -> Result<(), LedgerError>;

    /// Deposit/borrow/repay events of an account over the last `lookback_blocks`, newest first.
    async fn account_activity(
        &self,
        account: Address,
        lookback_blocks: u64,
    ) -> Result<Vec<AccountActivity>, LedgerError>;
}

/// Account identity and signing.
#[async_trait]
pub trait WalletProvider: Send + Sync + Debug {
    /// Account the wallet signs for.
    async fn connect(&self) -> Result<Address, LedgerError>;

    /// Sign and broadcast a call; returns the transaction hash.
    async fn sign_and_submit(&self, call: &LedgerCall) -> Result<B256, LedgerError>;

    /// Wait for the transaction to reach a terminal state.
    async fn wait_for_confirmation(&self, tx_hash: B256) -> Result<Confirmation, LedgerError>;
}
