//! Lending position monitor
//!
//! Connects a local signing key to the lending protocol, keeps the account's
//! position, oracle readings and protocol figures in sync, and logs every
//! snapshot with its risk band until Ctrl-C.

use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lendwatch_chain::{AlloyLedger, LocalWallet};
use lendwatch_core::{init_config, Deployment, EngineConfig, LendingEngine, Snapshot};

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const LENDWATCH_CONFIG: &str = "LENDWATCH_CONFIG";
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lendwatch_core=debug,lendwatch_chain=debug")),
        )
        .init();

    // LENDWATCH_CONFIG points at a TOML file; otherwise LENDWATCH_PROFILE picks a profile
    let engine_config = match std::env::var(env::LENDWATCH_CONFIG) {
        Ok(path) => EngineConfig::from_file(&path)
            .with_context(|| format!("Failed to load engine config from {path}"))?,
        Err(_) => EngineConfig::from_env(),
    };
    engine_config.log_config();
    init_config(engine_config.clone());

    let deployment = Deployment::from_env()?;
    info!(
        deployment = %deployment.name,
        chain_id = deployment.chain_id,
        lending_protocol = %deployment.contracts.lending_protocol,
        "Deployment loaded"
    );

    let contracts = deployment.contract_set();
    let rpc_url = deployment
        .rpc_url
        .parse()
        .with_context(|| format!("Invalid RPC URL: {}", deployment.rpc_url))?;
    let provider = Arc::new(ProviderBuilder::new().on_http(rpc_url));
    let ledger = Arc::new(AlloyLedger::new(provider, contracts));

    let head = ledger.block_number().await.context("RPC endpoint unreachable")?;
    info!(block = head, "Connected to RPC");

    let private_key = std::env::var(env::PRIVATE_KEY)
        .map_err(|_| anyhow::anyhow!("Missing env var: {}", env::PRIVATE_KEY))?;
    let wallet = Arc::new(LocalWallet::new(&private_key, &deployment.rpc_url, contracts).await?);

    let engine = LendingEngine::new(ledger, wallet, &engine_config);
    let account = engine.connect().await?;
    info!(account = %account, "Monitoring position");

    let mut snapshots = engine.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("Snapshot channel closed");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log_snapshot(&engine, &snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    engine.disconnect();
    Ok(())
}

fn log_snapshot(engine: &LendingEngine, snapshot: &Snapshot) {
    let Some(position) = &snapshot.position else {
        return;
    };
    let classification = position.classification();
    let projection = engine.debt_projection();

    info!(
        hf = %position.health_factor,
        band = %classification.band,
        liquidatable = classification.liquidatable,
        collateral = %position.collateral_amount,
        principal_debt = %position.principal_debt,
        pending_interest = ?projection.map(|p| p.pending_interest),
        borrow_capacity = ?engine.borrow_capacity(),
        total_borrowed = ?snapshot.aggregate.map(|a| a.total_borrowed),
        syncing = snapshot.is_syncing,
        "Position"
    );

    if classification.liquidatable {
        warn!(hf = %position.health_factor, "Position is liquidatable");
    }

    for reading in [&snapshot.oracles.collateral, &snapshot.oracles.debt]
        .into_iter()
        .flatten()
    {
        debug!(
            feed = %reading.feed_id,
            price = reading.price_f64(),
            updated_at = ?reading.updated_at_utc(),
            "Oracle"
        );
    }

    match serde_json::to_string(snapshot) {
        Ok(json) => debug!(snapshot = %json, "Snapshot"),
        Err(e) => debug!(error = %e, "Failed to serialize snapshot"),
    }
}

fn print_banner() {
    println!(r#"
    ╦  ┌─┐┌┐┌┌┬┐┬ ┬┌─┐┌┬┐┌─┐┬ ┬
    ║  ├┤ │││ │││││├─┤ │ │  ├─┤
    ╩═╝└─┘┘└┘─┴┘└┴┘┴ ┴ ┴ └─┘┴ ┴
    Position Monitor v0.1.0
    "#);
}
