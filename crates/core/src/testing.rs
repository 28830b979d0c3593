//! In-memory ledger and wallet doubles for unit tests.

use crate::risk::PriceQuote;
use crate::u256_math::WAD;
use crate::unix_now;
use alloy::primitives::{Address, B256, I256, U256};
use async_trait::async_trait;
use lendwatch_chain::{
    AccountActivity, Asset, Confirmation, FeedId, LedgerCall, LedgerError, LedgerGateway,
    OracleReading, ProtocolAggregate, ProtocolParams, RawPosition, WalletProvider,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// 80% threshold, 10% bonus, 10% APR, 7 day max price age, WETH/USDC decimals.
pub fn params() -> ProtocolParams {
    ProtocolParams {
        liquidation_threshold_pct: 80,
        liquidation_bonus_pct: 10,
        borrow_rate_per_second: U256::from(3_170_979_198u64),
        precision: WAD,
        max_price_age_secs: 7 * 24 * 60 * 60,
        collateral_decimals: 18,
        borrow_decimals: 6,
    }
}

/// Whole-dollar prices in WAD.
pub fn prices(collateral_usd: u64, debt_usd: u64) -> PriceQuote {
    PriceQuote {
        collateral_usd: U256::from(collateral_usd) * WAD,
        debt_usd: U256::from(debt_usd) * WAD,
    }
}

pub fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

pub fn account(n: u8) -> Address {
    Address::with_last_byte(n)
}

/// Position with a never-accrued debt given in raw USDC units.
pub fn raw_position(collateral: U256, debt: u64, health_factor: Option<U256>) -> RawPosition {
    RawPosition {
        collateral_amount: collateral,
        principal_debt: U256::from(debt),
        last_accrual_time: 0,
        health_factor,
    }
}

/// Poll `cond` every 10ms for up to 2s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// Ledger double. Defaults: fresh $3000 / $1 readings, `params()`, no
/// positions, balances or allowances.
#[derive(Debug, Default)]
pub struct MockLedger {
    positions: Mutex<HashMap<Address, RawPosition>>,
    balances: Mutex<HashMap<(Asset, Address), U256>>,
    allowances: Mutex<HashMap<(Asset, Address), U256>>,
    oracles: Mutex<HashMap<FeedId, OracleReading>>,
    activity: Mutex<Vec<AccountActivity>>,
    aggregate: Mutex<ProtocolAggregate>,
    read_failure: Mutex<Option<LedgerError>>,
    simulate_error: Mutex<Option<LedgerError>>,
    /// Simulation failures for one call, keyed by call name
    call_errors: Mutex<HashMap<&'static str, LedgerError>>,
    held: Mutex<HashSet<Address>>,
    release: Notify,
    position_calls: AtomicUsize,
    simulate_calls: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        let ledger = Self::default();
        let now = unix_now();
        ledger.set_oracle(OracleReading::new(
            FeedId::CollateralQuote,
            I256::try_from(300_000_000_000i64).unwrap(),
            now,
            8,
        ));
        ledger.set_oracle(OracleReading::new(
            FeedId::DebtQuote,
            I256::try_from(100_000_000i64).unwrap(),
            now,
            8,
        ));
        *ledger.aggregate.lock() = ProtocolAggregate {
            total_borrowed: U256::from(1_000_000_000u64),
        };
        ledger
    }

    pub fn set_position(&self, account: Address, position: RawPosition) {
        self.positions.lock().insert(account, position);
    }

    pub fn set_balances(&self, account: Address, balances: lendwatch_chain::WalletBalances) {
        let mut map = self.balances.lock();
        map.insert((Asset::Collateral, account), balances.collateral);
        map.insert((Asset::Borrow, account), balances.borrow);
    }

    pub fn set_allowance(&self, asset: Asset, owner: Address, amount: U256) {
        self.allowances.lock().insert((asset, owner), amount);
    }

    pub fn set_oracle(&self, reading: OracleReading) {
        self.oracles.lock().insert(reading.feed_id, reading);
    }

    pub fn oracle(&self, feed: FeedId) -> OracleReading {
        self.oracles.lock()[&feed].clone()
    }

    pub fn set_activity(&self, activity: Vec<AccountActivity>) {
        *self.activity.lock() = activity;
    }

    /// Every read fails with `err` until cleared.
    pub fn fail_reads(&self, err: LedgerError) {
        *self.read_failure.lock() = Some(err);
    }

    pub fn clear_failure(&self) {
        *self.read_failure.lock() = None;
    }

    pub fn set_simulate_error(&self, err: Option<LedgerError>) {
        *self.simulate_error.lock() = err;
    }

    /// Fail simulations of the named call only.
    pub fn fail_simulation(&self, call_name: &'static str, err: LedgerError) {
        self.call_errors.lock().insert(call_name, err);
    }

    /// Park the next position read for `account` until `release`.
    pub fn hold(&self, account: Address) {
        self.held.lock().insert(account);
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn position_calls(&self) -> usize {
        self.position_calls.load(Ordering::SeqCst)
    }

    pub fn simulate_calls(&self) -> usize {
        self.simulate_calls.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<(), LedgerError> {
        match self.read_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn position(&self, account: Address) -> Result<RawPosition, LedgerError> {
        self.position_calls.fetch_add(1, Ordering::SeqCst);
        let held = self.held.lock().remove(&account);
        if held {
            self.release.notified().await;
        }
        self.check_reads()?;
        Ok(self
            .positions
            .lock()
            .get(&account)
            .cloned()
            .unwrap_or_else(|| raw_position(U256::ZERO, 0, None)))
    }

    async fn protocol_aggregate(&self) -> Result<ProtocolAggregate, LedgerError> {
        self.check_reads()?;
        Ok(*self.aggregate.lock())
    }

    async fn oracle_reading(&self, feed: FeedId) -> Result<OracleReading, LedgerError> {
        self.check_reads()?;
        Ok(self.oracle(feed))
    }

    async fn protocol_params(&self) -> Result<ProtocolParams, LedgerError> {
        self.check_reads()?;
        Ok(params())
    }

    async fn token_balance(&self, asset: Asset, owner: Address) -> Result<U256, LedgerError> {
        self.check_reads()?;
        Ok(self
            .balances
            .lock()
            .get(&(asset, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(&self, asset: Asset, owner: Address) -> Result<U256, LedgerError> {
        self.check_reads()?;
        Ok(self
            .allowances
            .lock()
            .get(&(asset, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn simulate(&self, _from: Address, call: &LedgerCall) -> Result<(), LedgerError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.call_errors.lock().get(call.name()) {
            return Err(err.clone());
        }
        match self.simulate_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn account_activity(
        &self,
        _account: Address,
        _lookback_blocks: u64,
    ) -> Result<Vec<AccountActivity>, LedgerError> {
        self.check_reads()?;
        Ok(self.activity.lock().clone())
    }
}

/// Wallet double. Submissions and confirmations succeed unless scripted.
#[derive(Debug)]
pub struct MockWallet {
    account: Address,
    submitted: Mutex<Vec<LedgerCall>>,
    submit_script: Mutex<VecDeque<Result<B256, LedgerError>>>,
    confirm_script: Mutex<VecDeque<Result<Confirmation, LedgerError>>>,
    next_hash: AtomicU64,
}

impl MockWallet {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            submitted: Mutex::new(Vec::new()),
            submit_script: Mutex::new(VecDeque::new()),
            confirm_script: Mutex::new(VecDeque::new()),
            next_hash: AtomicU64::new(1),
        }
    }

    pub fn script_submit(&self, result: Result<B256, LedgerError>) {
        self.submit_script.lock().push_back(result);
    }

    pub fn script_confirm(&self, result: Result<Confirmation, LedgerError>) {
        self.confirm_script.lock().push_back(result);
    }

    pub fn submitted(&self) -> Vec<LedgerCall> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn connect(&self) -> Result<Address, LedgerError> {
        Ok(self.account)
    }

    async fn sign_and_submit(&self, call: &LedgerCall) -> Result<B256, LedgerError> {
        self.submitted.lock().push(call.clone());
        let scripted = self.submit_script.lock().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
            Ok(B256::left_padding_from(&n.to_be_bytes()))
        })
    }

    async fn wait_for_confirmation(&self, tx_hash: B256) -> Result<Confirmation, LedgerError> {
        let scripted = self.confirm_script.lock().pop_front();
        scripted.unwrap_or(Ok(Confirmation {
            tx_hash,
            block_number: 1,
        }))
    }
}
