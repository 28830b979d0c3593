//! Lending protocol chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for the lending protocol, its tokens and price feeds
//! - The `LedgerGateway` / `WalletProvider` seams the engine is written against
//! - An alloy-backed gateway and a local private-key wallet

mod contracts;
pub mod ledger;
pub mod oracle;
mod provider;
mod signer;

pub use contracts::{IAggregatorV3, ILendingProtocol, IERC20};
pub use ledger::{
    AccountActivity, ActivityKind, Asset, Confirmation, ContractSet, LedgerCall, LedgerError,
    LedgerGateway, ProtocolAggregate, ProtocolParams, RawPosition, WalletBalances, WalletProvider,
};
pub use oracle::{ChainlinkFeed, FeedId, OracleReading};
pub use provider::AlloyLedger;
pub use signer::{LocalWallet, NonceManager};
