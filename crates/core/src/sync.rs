//! Position synchronization scheduler.
//!
//! Owns the polling cadence and the single-writer snapshot store:
//! - position + wallet balances every `position_interval` (10s)
//! - aggregate, both oracle readings and protocol params every `market_interval` (30s)
//! - a projected-debt tick every `interest_tick` (1s), display only
//!
//! Each `start` opens a session tagged with a fresh epoch. Fetches carry
//! their session; a result whose epoch is no longer current is dropped
//! inside the snapshot's write lock, so `stop` or an account switch can
//! never be overwritten by a late answer. At most one fetch per resource
//! is in flight per session; interval ticks that find one running are
//! skipped, out-of-band resyncs are queued behind it.

use crate::config::{config, EngineConfig};
use crate::interest::DebtProjection;
use crate::oracle_guard::{self, OracleStatus};
use crate::position::{Position, Snapshot};
use crate::risk::{health_factor_from_values, HealthFactor, PriceQuote};
use crate::unix_now;
use alloy::primitives::{Address, U256};
use lendwatch_chain::{FeedId, LedgerGateway, ProtocolParams, RawPosition};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Scheduler configuration.
/// Uses values from the global EngineConfig by default.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub position_interval: Duration,
    pub market_interval: Duration,
    pub interest_tick: Duration,
    /// Replace `fallback_params` with gateway-read params
    pub prefer_gateway: bool,
    pub fallback_params: ProtocolParams,
}

impl SchedulerConfig {
    pub fn from_engine(cfg: &EngineConfig) -> Self {
        Self {
            position_interval: cfg.sync.position_interval(),
            market_interval: cfg.sync.market_interval(),
            interest_tick: cfg.sync.interest_tick(),
            prefer_gateway: cfg.protocol.prefer_gateway,
            fallback_params: cfg.protocol.to_params(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_engine(config())
    }
}

/// Independently polled resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResource {
    /// Per-account position and wallet balances
    Position,
    /// Protocol aggregate, oracle readings and params
    Market,
}

/// Bounded-concurrency guard for one resource.
#[derive(Default)]
struct InFlight {
    busy: AtomicBool,
    /// A resync was requested while busy
    pending: AtomicBool,
}

impl InFlight {
    fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Acquire now, or leave a request for the running fetch to pick up.
    fn acquire_or_queue(&self) -> bool {
        if self.try_acquire() {
            return true;
        }
        self.pending.store(true, Ordering::Release);
        // the running fetch may have finished in between
        if self.try_acquire() {
            self.pending.store(false, Ordering::Release);
            return true;
        }
        false
    }

    /// Release; returns true if the caller re-acquired to serve a queued request.
    fn release(&self) -> bool {
        self.busy.store(false, Ordering::Release);
        self.pending.swap(false, Ordering::AcqRel) && self.try_acquire()
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// One `start` .. `stop` span for one account.
struct Session {
    epoch: u64,
    account: Address,
    position: InFlight,
    market: InFlight,
}

impl Session {
    fn guard(&self, resource: SyncResource) -> &InFlight {
        match resource {
            SyncResource::Position => &self.position,
            SyncResource::Market => &self.market,
        }
    }
}

struct Shared {
    gateway: Arc<dyn LedgerGateway>,
    config: SchedulerConfig,
    epoch: AtomicU64,
    session: RwLock<Option<Arc<Session>>>,
    snapshot: watch::Sender<Snapshot>,
    projection: watch::Sender<Option<DebtProjection>>,
}

/// Polls the ledger for one account at a time and publishes snapshots.
pub struct SyncScheduler {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(gateway: Arc<dyn LedgerGateway>, config: SchedulerConfig) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::empty(config.fallback_params, 0));
        let (projection, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                gateway,
                config,
                epoch: AtomicU64::new(0),
                session: RwLock::new(None),
                snapshot,
                projection,
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Begin synchronizing `account`, replacing any running session.
    pub fn start(&self, account: Address) {
        self.abort_tasks();

        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(Session {
            epoch,
            account,
            position: InFlight::default(),
            market: InFlight::default(),
        });
        *self.shared.session.write() = Some(session.clone());

        self.shared.snapshot.send_modify(|s| {
            let (params, fallback) = (s.params, s.params_fallback);
            *s = Snapshot::empty(params, epoch);
            s.params_fallback = fallback;
            s.account = Some(account);
        });
        self.shared.projection.send_replace(None);

        info!(
            account = %account,
            epoch,
            position_secs = self.shared.config.position_interval.as_secs(),
            market_secs = self.shared.config.market_interval.as_secs(),
            "Starting position sync"
        );

        let mut tasks = self.tasks.lock();
        tasks.push(Shared::spawn_poll_loop(
            self.shared.clone(),
            session.clone(),
            SyncResource::Position,
            self.shared.config.position_interval,
        ));
        tasks.push(Shared::spawn_poll_loop(
            self.shared.clone(),
            session.clone(),
            SyncResource::Market,
            self.shared.config.market_interval,
        ));
        tasks.push(Shared::spawn_interest_ticker(self.shared.clone(), epoch));
    }

    /// Cancel polling and clear the per-account state.
    pub fn stop(&self) {
        self.abort_tasks();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.shared.session.write().take();

        self.shared.snapshot.send_modify(|s| {
            let (params, fallback) = (s.params, s.params_fallback);
            *s = Snapshot::empty(params, epoch);
            s.params_fallback = fallback;
        });
        self.shared.projection.send_replace(None);

        if let Some(session) = previous {
            info!(account = %session.account, epoch = session.epoch, "Stopped position sync");
        }
    }

    /// Account currently synchronized.
    pub fn active_account(&self) -> Option<Address> {
        self.shared.session.read().as_ref().map(|s| s.account)
    }

    /// Latest snapshot, by value.
    pub fn current_snapshot(&self) -> Snapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Latest projected debt; `None` without a position.
    pub fn debt_projection(&self) -> Option<DebtProjection> {
        *self.shared.projection.borrow()
    }

    pub fn subscribe_projection(&self) -> watch::Receiver<Option<DebtProjection>> {
        self.shared.projection.subscribe()
    }

    /// Fetch a resource now as if its interval had fired. Returns false when
    /// skipped because a fetch is already in flight or nothing is running.
    pub fn tick(&self, resource: SyncResource) -> bool {
        match self.current_session() {
            Some(session) => Shared::trigger(&self.shared, &session, resource),
            None => false,
        }
    }

    /// Out-of-band position refresh (after a confirmed transaction). If a
    /// fetch is running, another one follows it. Returns true if started now.
    pub fn request_resync(&self) -> bool {
        let Some(session) = self.current_session() else {
            return false;
        };
        if session.position.acquire_or_queue() {
            debug!(account = %session.account, "Out-of-band resync");
            Shared::spawn_fetch(self.shared.clone(), session, SyncResource::Position);
            true
        } else {
            debug!(account = %session.account, "Resync queued behind in-flight fetch");
            false
        }
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.shared.session.read().clone()
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("epoch", &self.shared.epoch.load(Ordering::Relaxed))
            .field("account", &self.active_account())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn spawn_poll_loop(
        shared: Arc<Self>,
        session: Arc<Session>,
        resource: SyncResource,
        period: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // first tick completes immediately
                ticker.tick().await;
                Self::trigger(&shared, &session, resource);
            }
        })
    }

    fn spawn_interest_ticker(shared: Arc<Self>, epoch: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(shared.config.interest_tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let projection = {
                    let snapshot = shared.snapshot.borrow();
                    if snapshot.epoch != epoch {
                        break;
                    }
                    snapshot
                        .position
                        .as_ref()
                        .map(|p| p.debt_projection(snapshot.rate(), unix_now()))
                };
                shared.projection.send_replace(projection);
            }
        })
    }

    fn trigger(shared: &Arc<Self>, session: &Arc<Session>, resource: SyncResource) -> bool {
        if !session.guard(resource).try_acquire() {
            debug!(account = %session.account, ?resource, "Fetch in flight, skipping tick");
            return false;
        }
        Self::spawn_fetch(shared.clone(), session.clone(), resource);
        true
    }

    /// Run a fetch whose guard is already held.
    fn spawn_fetch(shared: Arc<Self>, session: Arc<Session>, resource: SyncResource) {
        tokio::spawn(async move {
            shared.refresh_syncing_flag(&session);
            loop {
                match resource {
                    SyncResource::Position => shared.fetch_position(&session).await,
                    SyncResource::Market => shared.fetch_market(&session).await,
                }
                if !session.guard(resource).release() {
                    break;
                }
                debug!(account = %session.account, ?resource, "Serving queued resync");
            }
            shared.refresh_syncing_flag(&session);
        });
    }

    fn is_current(&self, session: &Session) -> bool {
        self.epoch.load(Ordering::SeqCst) == session.epoch
    }

    /// Guards are read under the snapshot lock so a fetch finishing cannot
    /// overwrite the flag set by one that just started.
    fn refresh_syncing_flag(&self, session: &Session) {
        self.snapshot.send_if_modified(|s| {
            if !self.is_current(session) {
                return false;
            }
            let syncing = session.position.is_busy() || session.market.is_busy();
            if s.is_syncing == syncing {
                return false;
            }
            s.is_syncing = syncing;
            true
        });
    }

    async fn fetch_position(&self, session: &Session) {
        let account = session.account;
        let (raw, balances) = tokio::join!(
            self.gateway.position(account),
            self.gateway.wallet_balances(account)
        );

        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                warn!(account = %account, error = %e, "Position poll failed, keeping previous snapshot");
                return;
            }
        };
        let balances = match balances {
            Ok(b) => b,
            Err(e) => {
                warn!(account = %account, error = %e, "Balance poll failed, keeping previous balances");
                self.snapshot
                    .borrow()
                    .position
                    .as_ref()
                    .filter(|p| p.account == account)
                    .map(|p| p.balances)
                    .unwrap_or_default()
            }
        };

        let needs_local_hf = !raw.principal_debt.is_zero()
            && raw.health_factor.map_or(true, |hf| hf == U256::MAX);
        let local_hf = if needs_local_hf {
            self.local_health_factor(&raw).await
        } else {
            None
        };

        let Some(position) = Position::new(account, &raw, balances, local_hf) else {
            warn!(account = %account, "Health factor unavailable, keeping previous snapshot");
            return;
        };

        let classification = position.classification();
        let hf = position.health_factor;
        let now = unix_now();
        let committed = self.snapshot.send_if_modified(|s| {
            if !self.is_current(session) || s.account != Some(account) {
                return false;
            }
            s.position = Some(position);
            s.position_updated_at = Some(now);
            true
        });

        if committed {
            debug!(
                account = %account,
                hf = %hf,
                band = %classification.band,
                liquidatable = classification.liquidatable,
                "Position synced"
            );
        } else {
            debug!(account = %account, epoch = session.epoch, "Discarding stale position result");
        }
    }

    /// HF from the current feed prices when the ledger did not provide one.
    async fn local_health_factor(&self, raw: &RawPosition) -> Option<HealthFactor> {
        let (collateral, debt) = tokio::join!(
            self.gateway.oracle_reading(FeedId::CollateralQuote),
            self.gateway.oracle_reading(FeedId::DebtQuote)
        );
        let (collateral, debt) = match (collateral, debt) {
            (Ok(c), Ok(d)) => (c, d),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Oracle read for local health factor failed");
                return None;
            }
        };
        let prices = PriceQuote::from_readings(&collateral, &debt)?;
        let params = self.snapshot.borrow().params;
        Some(health_factor_from_values(
            raw.collateral_amount,
            raw.principal_debt,
            &prices,
            &params,
        ))
    }

    async fn fetch_market(&self, session: &Session) {
        let (aggregate, collateral, debt, params) = tokio::join!(
            self.gateway.protocol_aggregate(),
            self.gateway.oracle_reading(FeedId::CollateralQuote),
            self.gateway.oracle_reading(FeedId::DebtQuote),
            self.gateway.protocol_params()
        );

        let aggregate = aggregate
            .map_err(|e| warn!(error = %e, "Aggregate poll failed"))
            .ok();
        let params = params
            .map_err(|e| warn!(error = %e, "Protocol params poll failed"))
            .ok()
            .filter(|_| self.config.prefer_gateway);

        let now = unix_now();
        let max_age = params
            .map(|p| p.max_price_age_secs)
            .unwrap_or_else(|| self.snapshot.borrow().params.max_price_age_secs);
        let mut readings = Vec::with_capacity(2);
        for (feed, result) in [(FeedId::CollateralQuote, collateral), (FeedId::DebtQuote, debt)] {
            match result {
                Ok(reading) => {
                    match oracle_guard::validate(&reading, now, max_age) {
                        OracleStatus::Ok => {}
                        OracleStatus::Stale => warn!(
                            feed = %feed,
                            age_secs = reading.age_secs(now),
                            max_age,
                            "Oracle reading is stale"
                        ),
                        OracleStatus::Invalid => {
                            warn!(feed = %feed, price = %reading.price, "Oracle reading is invalid")
                        }
                    }
                    readings.push(reading);
                }
                Err(e) => warn!(feed = %feed, error = %e, "Oracle poll failed"),
            }
        }

        if aggregate.is_none() && params.is_none() && readings.is_empty() {
            return;
        }

        let committed = self.snapshot.send_if_modified(|s| {
            if !self.is_current(session) {
                return false;
            }
            if let Some(aggregate) = aggregate {
                s.aggregate = Some(aggregate);
            }
            if let Some(params) = params {
                s.params = params;
                s.params_fallback = false;
            }
            for reading in readings {
                s.oracles.set(reading);
            }
            s.market_updated_at = Some(now);
            true
        });

        if committed {
            debug!(
                total_borrowed = ?aggregate.map(|a| a.total_borrowed),
                "Market data synced"
            );
        } else {
            debug!(epoch = session.epoch, "Discarding stale market result");
        }
    }
}
