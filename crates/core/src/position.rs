//! Position and snapshot types published by the scheduler.

use crate::interest::{AccrualRate, DebtProjection};
use crate::risk::{classify, Classification, HealthFactor, PriceQuote};
use alloy::primitives::{Address, U256};
use lendwatch_chain::{
    FeedId, OracleReading, ProtocolAggregate, ProtocolParams, RawPosition, WalletBalances,
};
use serde::{Deserialize, Serialize};

/// Per-account view of the ledger, replaced wholesale on every successful poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account: Address,
    /// Collateral deposited (collateral token decimals)
    pub collateral_amount: U256,
    /// Debt as of `last_accrual_time` (borrow token decimals)
    pub principal_debt: U256,
    /// 0 if never accrued
    pub last_accrual_time: u64,
    /// `Unbounded` iff `principal_debt == 0`
    pub health_factor: HealthFactor,
    /// Wallet balances read in the same poll
    pub balances: WalletBalances,
    /// Whether `health_factor` was computed locally from oracle prices
    pub health_factor_local: bool,
}

impl Position {
    /// Build from a raw read. `local_hf` is used when the ledger did not
    /// report a usable value for an indebted account.
    pub fn new(
        account: Address,
        raw: &RawPosition,
        balances: WalletBalances,
        local_hf: Option<HealthFactor>,
    ) -> Option<Self> {
        let (health_factor, health_factor_local) = if raw.principal_debt.is_zero() {
            (HealthFactor::Unbounded, false)
        } else {
            match raw.health_factor.map(HealthFactor::from_wad) {
                Some(hf @ HealthFactor::Finite(_)) => (hf, false),
                _ => (local_hf.filter(|hf| !hf.is_unbounded())?, true),
            }
        };

        Some(Self {
            account,
            collateral_amount: raw.collateral_amount,
            principal_debt: raw.principal_debt,
            last_accrual_time: raw.last_accrual_time,
            health_factor,
            balances,
            health_factor_local,
        })
    }

    pub fn has_debt(&self) -> bool {
        !self.principal_debt.is_zero()
    }

    pub fn classification(&self) -> Classification {
        classify(self.health_factor)
    }

    pub fn debt_projection(&self, rate: AccrualRate, now: u64) -> DebtProjection {
        DebtProjection::for_debt(self.principal_debt, self.last_accrual_time, rate, now)
    }
}

/// Latest readings of both feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSet {
    pub collateral: Option<OracleReading>,
    pub debt: Option<OracleReading>,
}

impl OracleSet {
    pub fn get(&self, feed: FeedId) -> Option<&OracleReading> {
        match feed {
            FeedId::CollateralQuote => self.collateral.as_ref(),
            FeedId::DebtQuote => self.debt.as_ref(),
        }
    }

    pub fn set(&mut self, reading: OracleReading) {
        match reading.feed_id {
            FeedId::CollateralQuote => self.collateral = Some(reading),
            FeedId::DebtQuote => self.debt = Some(reading),
        }
    }

    /// Both prices, if both readings exist and are positive.
    pub fn prices(&self) -> Option<PriceQuote> {
        PriceQuote::from_readings(self.collateral.as_ref()?, self.debt.as_ref()?)
    }
}

/// Consistent view handed to readers. Only the scheduler writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Account being synchronized, `None` when stopped
    pub account: Option<Address>,
    pub position: Option<Position>,
    pub aggregate: Option<ProtocolAggregate>,
    pub oracles: OracleSet,
    /// Gateway-read once available, configured constants before that
    pub params: ProtocolParams,
    /// True while params still hold the configured fallback
    pub params_fallback: bool,
    /// A fetch is in flight
    pub is_syncing: bool,
    /// Generation of the sync session that produced this snapshot
    pub epoch: u64,
    /// Unix time of the last successful position poll
    pub position_updated_at: Option<u64>,
    /// Unix time of the last successful market poll
    pub market_updated_at: Option<u64>,
}

impl Snapshot {
    pub fn empty(params: ProtocolParams, epoch: u64) -> Self {
        Self {
            account: None,
            position: None,
            aggregate: None,
            oracles: OracleSet::default(),
            params,
            params_fallback: true,
            is_syncing: false,
            epoch,
            position_updated_at: None,
            market_updated_at: None,
        }
    }

    pub fn rate(&self) -> AccrualRate {
        AccrualRate::from_params(&self.params)
    }

    pub fn classification(&self) -> Option<Classification> {
        self.position.as_ref().map(Position::classification)
    }
}
