//! Transaction pre-flight validation and sequential execution.
//!
//! An intent moves through
//! `Drafted -> Validating -> {Ready | Rejected} -> Submitting ->
//! AwaitingConfirmation -> {Confirmed | Reverted | Rejected}`.
//!
//! Validation short-circuits on the first failure:
//! 1. amount sanity against the account's recorded position and wallet balance
//! 2. oracle validation and local health-factor checks for price-sensitive intents
//! 3. allowance-aware planning and a non-mutating simulation of the first write
//!
//! Nothing is signed unless all three pass.

use crate::errors::{decode, ErrorKind};
use crate::interest::{AccrualRate, DebtProjection};
use crate::oracle_guard::{self, OracleStatus};
use crate::risk::{health_factor_from_values, HealthFactor, PriceQuote};
use crate::unix_now;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolError;
use lendwatch_chain::{
    Asset, Confirmation, FeedId, LedgerCall, LedgerError, LedgerGateway, OracleReading,
    ProtocolParams, RawPosition, WalletProvider, IERC20,
};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// User-facing operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdraw,
    Borrow,
    Repay,
    /// Repay `target`'s debt in exchange for its collateral plus bonus
    Liquidate { target: Address },
}

impl Operation {
    /// Token the caller's wallet must fund (and approve) for this operation.
    pub fn funding_asset(&self) -> Option<Asset> {
        match self {
            Self::Deposit => Some(Asset::Collateral),
            Self::Repay | Self::Liquidate { .. } => Some(Asset::Borrow),
            Self::Withdraw | Self::Borrow => None,
        }
    }

    /// Whether prices must be checked before accepting the intent.
    pub fn is_price_sensitive(&self, position: &RawPosition) -> bool {
        match self {
            Self::Borrow | Self::Liquidate { .. } => true,
            Self::Withdraw => !position.principal_debt.is_zero(),
            Self::Deposit | Self::Repay => false,
        }
    }

    fn ledger_call(&self, amount: U256) -> LedgerCall {
        match *self {
            Self::Deposit => LedgerCall::DepositCollateral { amount },
            Self::Withdraw => LedgerCall::WithdrawCollateral { amount },
            Self::Borrow => LedgerCall::Borrow { amount },
            Self::Repay => LedgerCall::Repay { amount },
            Self::Liquidate { target } => LedgerCall::Liquidate {
                target,
                debt_to_cover: amount,
            },
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deposit => f.write_str("deposit"),
            Self::Withdraw => f.write_str("withdraw"),
            Self::Borrow => f.write_str("borrow"),
            Self::Repay => f.write_str("repay"),
            Self::Liquidate { target } => write!(f, "liquidate({target})"),
        }
    }
}

/// A user request, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionIntent {
    pub operation: Operation,
    /// Token units of the asset the operation moves
    pub amount: U256,
    pub account: Address,
}

impl TransactionIntent {
    pub fn new(operation: Operation, amount: U256, account: Address) -> Self {
        Self {
            operation,
            amount,
            account,
        }
    }
}

/// Lifecycle state of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentState {
    Drafted,
    Validating,
    Ready,
    /// Refused locally or by the signer
    Rejected,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    /// A submitted step failed on-chain
    Reverted,
}

/// Ordered ledger calls for one intent; the main call is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub steps: SmallVec<[LedgerCall; 2]>,
}

impl Plan {
    pub fn needs_approval(&self) -> bool {
        matches!(self.steps.first(), Some(LedgerCall::Approve { .. }))
    }
}

/// Outcome of the validating stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accept(Plan),
    Reject(ErrorKind),
}

impl ValidationResult {
    pub fn state(&self) -> IntentState {
        match self {
            Self::Accept(_) => IntentState::Ready,
            Self::Reject(_) => IntentState::Rejected,
        }
    }

    pub fn rejection(&self) -> Option<&ErrorKind> {
        match self {
            Self::Accept(_) => None,
            Self::Reject(kind) => Some(kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Confirmed(Confirmation),
    Failed(ErrorKind),
    /// An earlier step failed
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub call: LedgerCall,
    pub outcome: StepOutcome,
}

/// Per-step result of executing a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// `Confirmed`, `Reverted` or `Rejected`
    pub state: IntentState,
    pub steps: Vec<StepReport>,
}

impl TransactionOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.state == IntentState::Confirmed
    }

    /// Index and reason of the failing step.
    pub fn failure(&self) -> Option<(usize, &ErrorKind)> {
        self.steps
            .iter()
            .enumerate()
            .find_map(|(i, step)| match &step.outcome {
                StepOutcome::Failed(kind) => Some((i, kind)),
                _ => None,
            })
    }

    /// Some steps landed on-chain, a later one failed.
    pub fn is_partial(&self) -> bool {
        self.failure().is_some() && self.confirmed_steps() > 0
    }

    /// No step changed ledger state.
    pub fn nothing_happened(&self) -> bool {
        self.confirmed_steps() == 0
    }

    fn confirmed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Confirmed(_)))
            .count()
    }
}

/// Result of `submit`: refused before signing, or executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    Invalid(ErrorKind),
    Executed(TransactionOutcome),
}

impl SubmitResult {
    pub fn state(&self) -> IntentState {
        match self {
            Self::Invalid(_) => IntentState::Rejected,
            Self::Executed(outcome) => outcome.state,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Executed(outcome) if outcome.is_confirmed())
    }
}

/// Validates intents against fresh ledger reads and executes accepted plans.
#[derive(Debug, Clone)]
pub struct PreflightValidator {
    gateway: Arc<dyn LedgerGateway>,
    simulate: bool,
}

impl PreflightValidator {
    pub fn new(gateway: Arc<dyn LedgerGateway>, simulate: bool) -> Self {
        Self { gateway, simulate }
    }

    /// Validate then, if accepted, execute.
    #[instrument(skip(self, wallet, params), fields(account = %intent.account, op = %intent.operation))]
    pub async fn submit(
        &self,
        wallet: &dyn WalletProvider,
        intent: &TransactionIntent,
        params: &ProtocolParams,
    ) -> SubmitResult {
        match self.validate(intent, params).await {
            ValidationResult::Accept(plan) => SubmitResult::Executed(self.execute(wallet, &plan).await),
            ValidationResult::Reject(kind) => SubmitResult::Invalid(kind),
        }
    }

    /// Run the validating stage. No transaction is signed here.
    pub async fn validate(
        &self,
        intent: &TransactionIntent,
        params: &ProtocolParams,
    ) -> ValidationResult {
        debug!(state = ?IntentState::Validating, amount = %intent.amount, "Validating intent");
        match self.run_checks(intent, params).await {
            Ok(plan) => {
                debug!(
                    state = ?IntentState::Ready,
                    steps = plan.steps.len(),
                    approval = plan.needs_approval(),
                    "Intent accepted"
                );
                ValidationResult::Accept(plan)
            }
            Err(kind) => {
                info!(reason = %kind, "Intent rejected before submission");
                ValidationResult::Reject(kind)
            }
        }
    }

    async fn run_checks(
        &self,
        intent: &TransactionIntent,
        params: &ProtocolParams,
    ) -> Result<Plan, ErrorKind> {
        let position = self.check_amount(intent).await?;
        if intent.operation.is_price_sensitive(&position) {
            self.check_prices(intent, &position, params).await?;
        }
        let plan = self.plan(intent).await?;
        if self.simulate {
            self.simulate_plan(intent.account, &plan).await?;
        }
        Ok(plan)
    }

    /// Step 1: local amount sanity.
    async fn check_amount(&self, intent: &TransactionIntent) -> Result<RawPosition, ErrorKind> {
        if intent.amount.is_zero() {
            return Err(ErrorKind::InvalidAmount);
        }
        let position = self.gateway.position(intent.account).await?;

        match intent.operation {
            Operation::Withdraw if intent.amount > position.collateral_amount => {
                return Err(ErrorKind::InsufficientCollateral);
            }
            Operation::Borrow if position.collateral_amount.is_zero() => {
                return Err(ErrorKind::NoCollateral);
            }
            Operation::Repay if position.principal_debt.is_zero() => {
                return Err(ErrorKind::NoDebt);
            }
            _ => {}
        }

        if let Some(asset) = intent.operation.funding_asset() {
            let available = self.gateway.token_balance(asset, intent.account).await?;
            if available < intent.amount {
                return Err(ErrorKind::InsufficientBalance {
                    required: intent.amount,
                    available,
                });
            }
        }
        Ok(position)
    }

    /// Step 2: both feeds must be usable, then the local health factor must hold.
    async fn check_prices(
        &self,
        intent: &TransactionIntent,
        position: &RawPosition,
        params: &ProtocolParams,
    ) -> Result<(), ErrorKind> {
        let (collateral, debt) = tokio::join!(
            self.gateway.oracle_reading(FeedId::CollateralQuote),
            self.gateway.oracle_reading(FeedId::DebtQuote)
        );
        let (collateral, debt) = (collateral?, debt?);
        let now = unix_now();
        check_reading(&collateral, now, params.max_price_age_secs)?;
        check_reading(&debt, now, params.max_price_age_secs)?;

        let prices = PriceQuote::from_readings(&collateral, &debt)
            .ok_or(ErrorKind::OracleInvalid { feed: None })?;
        let rate = AccrualRate::from_params(params);
        let current_debt = DebtProjection::at(position, rate, now).total;

        match intent.operation {
            Operation::Borrow => {
                let hf = health_factor_from_values(
                    position.collateral_amount,
                    current_debt.saturating_add(intent.amount),
                    &prices,
                    params,
                );
                ensure_solvent(hf)
            }
            Operation::Withdraw => {
                let hf = health_factor_from_values(
                    position.collateral_amount.saturating_sub(intent.amount),
                    current_debt,
                    &prices,
                    params,
                );
                ensure_solvent(hf)
            }
            Operation::Liquidate { target } => {
                let target_position = self.gateway.position(target).await?;
                if target_position.principal_debt.is_zero() {
                    return Err(ErrorKind::NoDebt);
                }
                let hf = match target_position.health_factor.map(HealthFactor::from_wad) {
                    Some(hf @ HealthFactor::Finite(_)) => hf,
                    _ => health_factor_from_values(
                        target_position.collateral_amount,
                        target_position.principal_debt,
                        &prices,
                        params,
                    ),
                };
                if hf.is_liquidatable() {
                    Ok(())
                } else {
                    debug!(target = %target, hf = %hf, "Target is not liquidatable");
                    Err(ErrorKind::HealthFactorViolation)
                }
            }
            Operation::Deposit | Operation::Repay => Ok(()),
        }
    }

    /// Prepend an approval when the current allowance does not cover the amount.
    async fn plan(&self, intent: &TransactionIntent) -> Result<Plan, ErrorKind> {
        let main = intent.operation.ledger_call(intent.amount);
        let Some(asset) = intent.operation.funding_asset() else {
            return Ok(Plan {
                steps: smallvec![main],
            });
        };

        let allowance = self.gateway.allowance(asset, intent.account).await?;
        let steps = if allowance < intent.amount {
            smallvec![
                LedgerCall::Approve {
                    asset,
                    amount: intent.amount,
                },
                main
            ]
        } else {
            debug!(allowance = %allowance, "Existing allowance covers amount, skipping approval");
            smallvec![main]
        };
        Ok(Plan { steps })
    }

    /// Step 3: trial execution of every step against current state.
    ///
    /// The main call runs before the planned approval has landed, so a
    /// missing-allowance revert from it is expected. Any other revert is a
    /// rejection.
    async fn simulate_plan(&self, from: Address, plan: &Plan) -> Result<(), ErrorKind> {
        let last = plan.steps.len().saturating_sub(1);
        for (i, call) in plan.steps.iter().enumerate() {
            match self.gateway.simulate(from, call).await {
                Ok(()) => {}
                Err(e) if i == last && plan.needs_approval() && is_allowance_shortfall(&e) => {
                    debug!(step = call.name(), "Main call awaits the planned approval");
                }
                Err(e) => {
                    let kind = decode(&e);
                    debug!(step = call.name(), error = %e, decoded = %kind, "Simulation failed");
                    return Err(kind);
                }
            }
        }
        Ok(())
    }

    /// Sign and confirm each step in order; stop at the first failure.
    pub async fn execute(&self, wallet: &dyn WalletProvider, plan: &Plan) -> TransactionOutcome {
        let mut steps = Vec::with_capacity(plan.steps.len());
        let mut failure: Option<ErrorKind> = None;

        for call in &plan.steps {
            if failure.is_some() {
                steps.push(StepReport {
                    call: call.clone(),
                    outcome: StepOutcome::NotAttempted,
                });
                continue;
            }

            let outcome = match execute_step(wallet, call).await {
                Ok(confirmation) => {
                    info!(
                        step = call.name(),
                        tx_hash = %confirmation.tx_hash,
                        block = confirmation.block_number,
                        "Step confirmed"
                    );
                    StepOutcome::Confirmed(confirmation)
                }
                Err(kind) => {
                    warn!(step = call.name(), reason = %kind, "Step failed");
                    failure = Some(kind.clone());
                    StepOutcome::Failed(kind)
                }
            };
            steps.push(StepReport {
                call: call.clone(),
                outcome,
            });
        }

        let state = match failure {
            None => IntentState::Confirmed,
            Some(ErrorKind::UserRejected) => IntentState::Rejected,
            Some(_) => IntentState::Reverted,
        };
        info!(state = ?state, steps = steps.len(), "Intent finished");
        TransactionOutcome { state, steps }
    }
}

async fn execute_step(
    wallet: &dyn WalletProvider,
    call: &LedgerCall,
) -> Result<Confirmation, ErrorKind> {
    debug!(state = ?IntentState::Submitting, step = call.name());
    let tx_hash = wallet.sign_and_submit(call).await?;
    debug!(state = ?IntentState::AwaitingConfirmation, step = call.name(), tx_hash = %tx_hash);
    Ok(wallet.wait_for_confirmation(tx_hash).await?)
}

fn check_reading(reading: &OracleReading, now: u64, max_age_secs: u64) -> Result<(), ErrorKind> {
    match oracle_guard::validate(reading, now, max_age_secs) {
        OracleStatus::Ok => Ok(()),
        OracleStatus::Stale => Err(ErrorKind::OracleStale {
            feed: reading.feed_id,
            age_secs: reading.age_secs(now),
            max_age_secs,
        }),
        OracleStatus::Invalid => Err(ErrorKind::OracleInvalid {
            feed: Some(reading.feed_id),
        }),
    }
}

fn ensure_solvent(hf: HealthFactor) -> Result<(), ErrorKind> {
    if hf.is_liquidatable() {
        Err(ErrorKind::HealthFactorViolation)
    } else {
        Ok(())
    }
}

fn is_allowance_shortfall(err: &LedgerError) -> bool {
    err.revert_data()
        .is_some_and(|data| data.starts_with(&IERC20::ERC20InsufficientAllowance::SELECTOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, params, raw_position, usdc, MockLedger, MockWallet};
    use crate::u256_math::WAD;
    use alloy::primitives::{Bytes, I256, B256};
    use lendwatch_chain::{ILendingProtocol, WalletBalances};

    const EIGHT_DAYS: u64 = 8 * 24 * 60 * 60;

    struct Fixture {
        ledger: Arc<MockLedger>,
        wallet: MockWallet,
        validator: PreflightValidator,
        user: Address,
    }

    /// 1 WETH collateral, no debt, funded wallet, no allowances.
    fn fixture() -> Fixture {
        let ledger = Arc::new(MockLedger::new());
        let user = account(1);
        ledger.set_position(user, raw_position(WAD, 0, None));
        ledger.set_balances(
            user,
            WalletBalances {
                collateral: WAD * U256::from(10u64),
                borrow: usdc(5_000),
            },
        );
        Fixture {
            validator: PreflightValidator::new(ledger.clone(), true),
            wallet: MockWallet::new(user),
            ledger,
            user,
        }
    }

    impl Fixture {
        async fn submit(&self, operation: Operation, amount: U256) -> SubmitResult {
            let intent = TransactionIntent::new(operation, amount, self.user);
            self.validator.submit(&self.wallet, &intent, &params()).await
        }

        async fn rejection(&self, operation: Operation, amount: U256) -> ErrorKind {
            match self.submit(operation, amount).await {
                SubmitResult::Invalid(kind) => kind,
                other => panic!("expected rejection, got {other:?}"),
            }
        }

        fn assert_nothing_sent(&self) {
            assert!(self.wallet.submitted().is_empty());
        }
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let f = fixture();
        assert_eq!(f.rejection(Operation::Deposit, U256::ZERO).await, ErrorKind::InvalidAmount);
        assert_eq!(f.ledger.simulate_calls(), 0);
        f.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_amount_sanity_checks() {
        let f = fixture();

        let kind = f.rejection(Operation::Deposit, WAD * U256::from(11u64)).await;
        assert_eq!(
            kind,
            ErrorKind::InsufficientBalance {
                required: WAD * U256::from(11u64),
                available: WAD * U256::from(10u64),
            }
        );
        assert_eq!(
            f.rejection(Operation::Withdraw, WAD * U256::from(2u64)).await,
            ErrorKind::InsufficientCollateral
        );
        assert_eq!(f.rejection(Operation::Repay, usdc(10)).await, ErrorKind::NoDebt);

        f.ledger.set_position(f.user, raw_position(U256::ZERO, 0, None));
        assert_eq!(f.rejection(Operation::Borrow, usdc(10)).await, ErrorKind::NoCollateral);
        f.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_stale_oracle_rejects_borrow_before_any_write() {
        let f = fixture();
        let mut reading = f.ledger.oracle(FeedId::CollateralQuote);
        reading.updated_at = unix_now() - EIGHT_DAYS;
        f.ledger.set_oracle(reading);

        match f.rejection(Operation::Borrow, usdc(100)).await {
            ErrorKind::OracleStale {
                feed, max_age_secs, ..
            } => {
                assert_eq!(feed, FeedId::CollateralQuote);
                assert_eq!(max_age_secs, 7 * 24 * 60 * 60);
            }
            other => panic!("expected OracleStale, got {other:?}"),
        }
        assert_eq!(f.ledger.simulate_calls(), 0);
        f.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_invalid_oracle_rejects_liquidation() {
        let f = fixture();
        let mut reading = f.ledger.oracle(FeedId::DebtQuote);
        reading.price = I256::MINUS_ONE;
        f.ledger.set_oracle(reading);

        let kind = f
            .rejection(Operation::Liquidate { target: account(2) }, usdc(100))
            .await;
        assert_eq!(kind, ErrorKind::OracleInvalid { feed: Some(FeedId::DebtQuote) });
    }

    #[tokio::test]
    async fn test_deposit_ignores_stale_oracle() {
        let f = fixture();
        let mut reading = f.ledger.oracle(FeedId::CollateralQuote);
        reading.updated_at = unix_now() - EIGHT_DAYS;
        f.ledger.set_oracle(reading);

        assert!(f.submit(Operation::Deposit, WAD).await.is_confirmed());
    }

    #[tokio::test]
    async fn test_borrow_health_factor_bound() {
        let f = fixture();
        // 1 WETH at $3000 supports exactly $2400 at 80%
        assert_eq!(
            f.rejection(Operation::Borrow, usdc(2_401)).await,
            ErrorKind::HealthFactorViolation
        );
        let result = f.submit(Operation::Borrow, usdc(2_400)).await;
        assert!(result.is_confirmed());
        assert_eq!(f.wallet.submitted(), vec![LedgerCall::Borrow { amount: usdc(2_400) }]);
    }

    #[tokio::test]
    async fn test_withdraw_with_debt_checks_health_factor() {
        let f = fixture();
        f.ledger.set_position(f.user, raw_position(WAD, 1_200_000_000, None));

        // half the collateral still covers $1200 exactly
        assert!(f.submit(Operation::Withdraw, WAD / U256::from(2u64)).await.is_confirmed());
        assert_eq!(
            f.rejection(Operation::Withdraw, WAD * U256::from(6u64) / U256::from(10u64))
                .await,
            ErrorKind::HealthFactorViolation
        );
    }

    #[tokio::test]
    async fn test_liquidation_target_checks() {
        let f = fixture();
        let target = account(2);
        let op = Operation::Liquidate { target };

        f.ledger.set_position(target, raw_position(WAD, 0, None));
        assert_eq!(f.rejection(op, usdc(100)).await, ErrorKind::NoDebt);

        // hf 1.2: not liquidatable
        f.ledger.set_position(
            target,
            raw_position(WAD, 2_000_000_000, Some(WAD * U256::from(12u64) / U256::from(10u64))),
        );
        assert_eq!(f.rejection(op, usdc(100)).await, ErrorKind::HealthFactorViolation);

        // hf 0.96
        f.ledger.set_position(target, raw_position(WAD, 2_500_000_000, None));
        let result = f.submit(op, usdc(100)).await;
        assert!(result.is_confirmed());
        assert_eq!(f.wallet.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_approval_only_when_allowance_short() {
        let f = fixture();
        let intent = TransactionIntent::new(Operation::Deposit, WAD, f.user);

        let ValidationResult::Accept(plan) = f.validator.validate(&intent, &params()).await else {
            panic!("deposit should validate");
        };
        assert!(plan.needs_approval());
        assert_eq!(plan.steps.len(), 2);

        f.ledger.set_allowance(Asset::Collateral, f.user, WAD);
        let ValidationResult::Accept(plan) = f.validator.validate(&intent, &params()).await else {
            panic!("deposit should validate");
        };
        assert!(!plan.needs_approval());
        assert_eq!(plan.steps.as_slice(), &[LedgerCall::DepositCollateral { amount: WAD }]);
    }

    fn reverted<E: SolError>(err: E) -> LedgerError {
        LedgerError::Reverted {
            data: Some(Bytes::from(err.abi_encode())),
            message: "execution reverted".into(),
        }
    }

    #[tokio::test]
    async fn test_simulation_revert_is_decoded() {
        let f = fixture();
        f.ledger.set_simulate_error(Some(reverted(
            ILendingProtocol::LENDINGPROTOCOL__insufficientLiquidity {},
        )));

        let kind = f.rejection(Operation::Borrow, usdc(100)).await;
        assert_eq!(kind, ErrorKind::InsufficientLiquidity);
        assert_eq!(f.ledger.simulate_calls(), 1);
        f.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_main_call_simulated_behind_approval() {
        let f = fixture();
        let target = account(2);
        // hf 0.96 with 2500 USDC debt; covering 3000 exceeds what the protocol allows
        f.ledger.set_position(target, raw_position(WAD, 2_500_000_000, None));
        f.ledger.fail_simulation(
            "liquidate",
            reverted(ILendingProtocol::LENDINGPROTOCOL__amountMoreThanAllowed {}),
        );

        let kind = f.rejection(Operation::Liquidate { target }, usdc(3_000)).await;
        assert_eq!(kind, ErrorKind::HealthFactorViolation);
        // approve and liquidate both simulated
        assert_eq!(f.ledger.simulate_calls(), 2);
        f.assert_nothing_sent();

        f.ledger.fail_simulation(
            "depositCollateral",
            reverted(ILendingProtocol::LENDINGPROTOCOL__valueMustBeMoreThanZero {}),
        );
        assert_eq!(f.rejection(Operation::Deposit, WAD).await, ErrorKind::InvalidAmount);
        f.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_missing_allowance_expected_when_approval_planned() {
        let f = fixture();
        f.ledger.fail_simulation(
            "depositCollateral",
            reverted(IERC20::ERC20InsufficientAllowance {
                spender: account(9),
                allowance: U256::ZERO,
                needed: WAD,
            }),
        );

        assert!(f.submit(Operation::Deposit, WAD).await.is_confirmed());
        assert_eq!(f.wallet.submitted().len(), 2);

        // with the allowance already in place the same revert is a real failure
        let f = fixture();
        f.ledger.set_allowance(Asset::Collateral, f.user, WAD);
        f.ledger.fail_simulation(
            "depositCollateral",
            reverted(IERC20::ERC20InsufficientAllowance {
                spender: account(9),
                allowance: U256::ZERO,
                needed: WAD,
            }),
        );
        let kind = f.rejection(Operation::Deposit, WAD).await;
        assert!(matches!(kind, ErrorKind::UnknownRevert { .. }));
        f.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_gateway_outage_is_connection_error() {
        let f = fixture();
        f.ledger.fail_reads(LedgerError::Transport("connection refused".into()));
        let kind = f.rejection(Operation::Deposit, WAD).await;
        assert!(matches!(kind, ErrorKind::Connection(_)));
        assert!(kind.is_transient());
    }

    #[tokio::test]
    async fn test_failed_first_step_skips_the_rest() {
        let f = fixture();
        f.wallet.script_submit(Err(LedgerError::UserRejected));

        let SubmitResult::Executed(outcome) = f.submit(Operation::Deposit, WAD).await else {
            panic!("deposit should pass validation");
        };
        assert_eq!(outcome.state, IntentState::Rejected);
        assert_eq!(outcome.failure(), Some((0, &ErrorKind::UserRejected)));
        assert_eq!(outcome.steps[1].outcome, StepOutcome::NotAttempted);
        assert!(outcome.nothing_happened());
        assert!(!outcome.is_partial());
        assert_eq!(f.wallet.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_partial_completion_is_reported() {
        let f = fixture();
        f.wallet.script_confirm(Ok(Confirmation {
            tx_hash: B256::with_last_byte(1),
            block_number: 100,
        }));
        f.wallet
            .script_confirm(Err(LedgerError::FailedReceipt(B256::with_last_byte(2))));

        let SubmitResult::Executed(outcome) = f.submit(Operation::Deposit, WAD).await else {
            panic!("deposit should pass validation");
        };
        assert_eq!(outcome.state, IntentState::Reverted);
        assert!(outcome.is_partial());
        assert!(!outcome.nothing_happened());
        assert!(matches!(outcome.steps[0].outcome, StepOutcome::Confirmed(_)));
        assert!(matches!(
            outcome.failure(),
            Some((1, ErrorKind::UnknownRevert { .. }))
        ));
    }
}
