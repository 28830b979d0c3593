//! Engine facade handed to the presentation layer.

use crate::config::EngineConfig;
use crate::errors::ErrorKind;
use crate::interest::{interest_horizons, DebtProjection, InterestHorizons};
use crate::position::Snapshot;
use crate::preflight::{Operation, PreflightValidator, SubmitResult, TransactionIntent};
use crate::risk::{self, Classification, HealthFactor, LiquidationPreview};
use crate::sync::{SchedulerConfig, SyncScheduler};
use crate::unix_now;
use alloy::primitives::{Address, U256};
use lendwatch_chain::{AccountActivity, LedgerGateway, WalletProvider};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Wires the scheduler and pre-flight validator to one wallet and gateway.
#[derive(Debug)]
pub struct LendingEngine {
    gateway: Arc<dyn LedgerGateway>,
    wallet: Arc<dyn WalletProvider>,
    scheduler: SyncScheduler,
    validator: PreflightValidator,
    activity_lookback_blocks: u64,
}

impl LendingEngine {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        wallet: Arc<dyn WalletProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            scheduler: SyncScheduler::new(gateway.clone(), SchedulerConfig::from_engine(config)),
            validator: PreflightValidator::new(gateway.clone(), config.preflight.simulate),
            activity_lookback_blocks: config.sync.activity_lookback_blocks,
            gateway,
            wallet,
        }
    }

    /// Connect the wallet and start synchronizing its account.
    pub async fn connect(&self) -> Result<Address, ErrorKind> {
        let account = self.wallet.connect().await?;
        info!(account = %account, "Wallet connected");
        self.scheduler.start(account);
        Ok(account)
    }

    pub fn disconnect(&self) {
        self.scheduler.stop();
    }

    pub fn account(&self) -> Option<Address> {
        self.scheduler.active_account()
    }

    pub fn current_snapshot(&self) -> Snapshot {
        self.scheduler.current_snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.scheduler.subscribe()
    }

    pub fn subscribe_projection(&self) -> watch::Receiver<Option<DebtProjection>> {
        self.scheduler.subscribe_projection()
    }

    pub fn debt_projection(&self) -> Option<DebtProjection> {
        self.scheduler.debt_projection()
    }

    pub fn classify(&self, hf: HealthFactor) -> Classification {
        risk::classify(hf)
    }

    /// Validate and execute an operation for the connected account. A
    /// position resync follows any on-chain change, partial ones included.
    pub async fn submit(&self, operation: Operation, amount: U256) -> SubmitResult {
        let Some(account) = self.account() else {
            return SubmitResult::Invalid(ErrorKind::Connection("wallet not connected".into()));
        };
        let intent = TransactionIntent::new(operation, amount, account);
        let params = self.scheduler.current_snapshot().params;

        let result = self
            .validator
            .submit(self.wallet.as_ref(), &intent, &params)
            .await;

        if let SubmitResult::Executed(outcome) = &result {
            if !outcome.nothing_happened() {
                self.scheduler.request_resync();
            }
            if outcome.is_partial() {
                warn!(
                    operation = %operation,
                    "Intent partially applied, earlier steps remain on-chain"
                );
            }
        }
        result
    }

    /// Collateral received for covering `debt_to_cover`, at current snapshot prices.
    pub fn preview_liquidation(&self, debt_to_cover: U256) -> Option<LiquidationPreview> {
        let snapshot = self.current_snapshot();
        let prices = snapshot.oracles.prices()?;
        Some(risk::preview_liquidation(debt_to_cover, &prices, &snapshot.params))
    }

    /// Remaining borrowable amount including projected interest on the current debt.
    pub fn borrow_capacity(&self) -> Option<U256> {
        let snapshot = self.current_snapshot();
        let position = snapshot.position.as_ref()?;
        let prices = snapshot.oracles.prices()?;
        let debt = position.debt_projection(snapshot.rate(), unix_now()).total;
        Some(risk::borrow_capacity(
            position.collateral_amount,
            debt,
            &prices,
            &snapshot.params,
        ))
    }

    /// Interest the current debt would accrue over a day, a month and a year.
    pub fn interest_horizons(&self) -> Option<InterestHorizons> {
        let snapshot = self.current_snapshot();
        let position = snapshot.position.as_ref()?;
        Some(interest_horizons(position.principal_debt, snapshot.rate()))
    }

    /// Recent deposit/borrow/repay events of the connected account.
    pub async fn activity(&self) -> Result<Vec<AccountActivity>, ErrorKind> {
        let account = self
            .account()
            .ok_or_else(|| ErrorKind::Connection("wallet not connected".into()))?;
        Ok(self
            .gateway
            .account_activity(account, self.activity_lookback_blocks)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskBand;
    use crate::testing::{account, raw_position, usdc, wait_until, MockLedger, MockWallet};
    use crate::u256_math::WAD;
    use alloy::primitives::B256;
    use lendwatch_chain::{ActivityKind, WalletBalances};

    fn engine(ledger: &Arc<MockLedger>, user: Address) -> LendingEngine {
        let mut config = EngineConfig::default();
        config.sync.position_interval_secs = 3600;
        config.sync.market_interval_secs = 3600;
        LendingEngine::new(ledger.clone(), Arc::new(MockWallet::new(user)), &config)
    }

    async fn synced(ledger: &Arc<MockLedger>, user: Address) -> LendingEngine {
        let engine = engine(ledger, user);
        assert_eq!(engine.connect().await.unwrap(), user);
        wait_until(|| {
            let s = engine.current_snapshot();
            s.position.is_some() && s.oracles.prices().is_some() && !s.is_syncing
        })
        .await;
        engine
    }

    #[tokio::test]
    async fn test_submit_requires_connection() {
        let ledger = Arc::new(MockLedger::new());
        let engine = engine(&ledger, account(1));
        let result = engine.submit(Operation::Deposit, WAD).await;
        assert!(matches!(result, SubmitResult::Invalid(ErrorKind::Connection(_))));
        assert!(engine.activity().await.is_err());
    }

    #[tokio::test]
    async fn test_confirmed_submit_triggers_resync() {
        let ledger = Arc::new(MockLedger::new());
        let user = account(1);
        ledger.set_position(user, raw_position(WAD, 0, None));
        ledger.set_balances(
            user,
            WalletBalances {
                collateral: WAD,
                borrow: U256::ZERO,
            },
        );
        let engine = synced(&ledger, user).await;
        let polls = ledger.position_calls();

        let result = engine.submit(Operation::Deposit, WAD).await;
        assert!(result.is_confirmed());
        // validation read + out-of-band resync
        wait_until(|| ledger.position_calls() >= polls + 2).await;
    }

    #[tokio::test]
    async fn test_disconnect_clears_snapshot() {
        let ledger = Arc::new(MockLedger::new());
        let user = account(1);
        let engine = synced(&ledger, user).await;
        engine.disconnect();
        assert!(engine.account().is_none());
        assert!(engine.current_snapshot().position.is_none());
    }

    #[tokio::test]
    async fn test_capacity_preview_and_classification() {
        let ledger = Arc::new(MockLedger::new());
        let user = account(1);
        ledger.set_position(user, raw_position(WAD, 1_000_000_000, None));
        let engine = synced(&ledger, user).await;

        // $3000 * 80% - $1000
        assert_eq!(engine.borrow_capacity(), Some(usdc(1_400)));

        // $300 of debt at $3000/WETH plus 10%
        let preview = engine.preview_liquidation(usdc(300)).unwrap();
        assert_eq!(preview.collateral_seized, WAD * U256::from(11u64) / U256::from(100u64));
        assert_eq!(preview.bonus_collateral, WAD / U256::from(100u64));

        // hf 2.4
        let class = engine.current_snapshot().classification().unwrap();
        assert_eq!(class.band, RiskBand::Healthy);
        assert_eq!(engine.classify(HealthFactor::Unbounded).band, RiskBand::Healthy);

        let horizons = engine.interest_horizons().unwrap();
        assert_eq!(horizons.year, U256::from(99_999_999u64));
    }

    #[tokio::test]
    async fn test_activity_for_connected_account() {
        let ledger = Arc::new(MockLedger::new());
        let user = account(1);
        let event = AccountActivity {
            kind: ActivityKind::Deposit,
            amount: WAD,
            block_number: 42,
            tx_hash: B256::with_last_byte(7),
        };
        ledger.set_activity(vec![event.clone()]);
        let engine = synced(&ledger, user).await;
        assert_eq!(engine.activity().await.unwrap(), vec![event]);
    }
}
