//! Value types exchanged with the ledger.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::contracts::{ILendingProtocol, IERC20};

/// The two tokens the protocol deals in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// Collateral token (WETH on the reference deployment, 18 decimals)
    Collateral,
    /// Borrow token (USDC on the reference deployment, 6 decimals)
    Borrow,
}

/// Deployed contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSet {
    pub lending_protocol: Address,
    pub collateral_token: Address,
    pub borrow_token: Address,
}

impl ContractSet {
    /// Token address for an asset.
    pub fn token(&self, asset: Asset) -> Address {
        match asset {
            Asset::Collateral => self.collateral_token,
            Asset::Borrow => self.borrow_token,
        }
    }
}

/// Per-account ledger state as read, before any local interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPosition {
    /// Collateral deposited (collateral token decimals)
    pub collateral_amount: U256,
    /// Debt as of `last_accrual_time` (borrow token decimals)
    pub principal_debt: U256,
    /// Unix timestamp of the last accrual, 0 if never accrued
    pub last_accrual_time: u64,
    /// Health factor in WAD as reported by the ledger; `None` when the read
    /// reverted (the ledger does that for accounts without debt)
    pub health_factor: Option<U256>,
}

/// Protocol-wide aggregate figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProtocolAggregate {
    /// Total outstanding debt (borrow token decimals)
    pub total_borrowed: U256,
}

/// Protocol constants the client mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Liquidation threshold in percent (80 = 80%)
    pub liquidation_threshold_pct: u64,
    /// Liquidator bonus in percent (10 = 10%)
    pub liquidation_bonus_pct: u64,
    /// Per-second borrow rate scaled by `precision`
    pub borrow_rate_per_second: U256,
    /// Fixed-point scale of the rate (1e18)
    pub precision: U256,
    /// Maximum oracle age accepted by the protocol (seconds)
    pub max_price_age_secs: u64,
    /// Collateral token decimals
    pub collateral_decimals: u8,
    /// Borrow token decimals
    pub borrow_decimals: u8,
}

impl ProtocolParams {
    /// Token decimals for an asset.
    pub fn decimals(&self, asset: Asset) -> u8 {
        match asset {
            Asset::Collateral => self.collateral_decimals,
            Asset::Borrow => self.borrow_decimals,
        }
    }
}

/// Wallet token balances of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletBalances {
    pub collateral: U256,
    pub borrow: U256,
}

impl WalletBalances {
    pub fn of(&self, asset: Asset) -> U256 {
        match asset {
            Asset::Collateral => self.collateral,
            Asset::Borrow => self.borrow,
        }
    }
}

/// A single state-changing ledger call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    /// ERC20 approval of the lending protocol as spender
    Approve { asset: Asset, amount: U256 },
    DepositCollateral { amount: U256 },
    WithdrawCollateral { amount: U256 },
    Borrow { amount: U256 },
    Repay { amount: U256 },
    Liquidate { target: Address, debt_to_cover: U256 },
}

impl LedgerCall {
    /// Contract the call is sent to.
    pub fn target(&self, contracts: &ContractSet) -> Address {
        match self {
            Self::Approve { asset, .. } => contracts.token(*asset),
            _ => contracts.lending_protocol,
        }
    }

    /// ABI-encoded calldata.
    pub fn calldata(&self, contracts: &ContractSet) -> Bytes {
        let encoded = match self {
            Self::Approve { amount, .. } => IERC20::approveCall {
                spender: contracts.lending_protocol,
                amount: *amount,
            }
            .abi_encode(),
            Self::DepositCollateral { amount } => {
                ILendingProtocol::depositCollateralCall { amount: *amount }.abi_encode()
            }
            Self::WithdrawCollateral { amount } => {
                ILendingProtocol::withdrawCollateralCall { amount: *amount }.abi_encode()
            }
            Self::Borrow { amount } => ILendingProtocol::borrowCall { amount: *amount }.abi_encode(),
            Self::Repay { amount } => ILendingProtocol::repayCall { amount: *amount }.abi_encode(),
            Self::Liquidate {
                target,
                debt_to_cover,
            } => ILendingProtocol::liquidateCall {
                user: *target,
                debtToCover: *debt_to_cover,
            }
            .abi_encode(),
        };
        Bytes::from(encoded)
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::DepositCollateral { .. } => "depositCollateral",
            Self::WithdrawCollateral { .. } => "withdrawCollateral",
            Self::Borrow { .. } => "borrow",
            Self::Repay { .. } => "repay",
            Self::Liquidate { .. } => "liquidate",
        }
    }
}

/// Terminal status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Kind of recorded account activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Deposit,
    Borrow,
    Repay,
}

/// One protocol event emitted for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountActivity {
    pub kind: ActivityKind,
    /// Amount in the token the event refers to
    pub amount: U256,
    pub block_number: u64,
    pub tx_hash: B256,
}
