//! Lending position and risk synchronization core.
//!
//! This crate provides:
//! - Fixed-point math and interest projection matching the ledger's accrual
//! - Oracle staleness/sanity validation and health-factor risk bands
//! - A single-writer snapshot store fed by an epoch-tagged sync scheduler
//! - Pre-flight validation of user intents and a structured revert decoder
//! - The `LendingEngine` facade tying them to a gateway and a wallet

pub mod config;
mod engine;
mod errors;
pub mod interest;
pub mod oracle_guard;
mod position;
mod preflight;
pub mod risk;
mod sync;
pub mod u256_math;

#[cfg(test)]
mod testing;

pub use config::{config, init_config, Deployment, EngineConfig};
pub use engine::LendingEngine;
pub use errors::{decode, decode_revert_data, ErrorKind};
pub use interest::{AccrualRate, DebtProjection, InterestHorizons};
pub use oracle_guard::OracleStatus;
pub use position::{OracleSet, Position, Snapshot};
pub use preflight::{
    IntentState, Operation, Plan, PreflightValidator, StepOutcome, StepReport, SubmitResult,
    TransactionIntent, TransactionOutcome, ValidationResult,
};
pub use risk::{Classification, HealthFactor, LiquidationPreview, PriceQuote, RiskBand};
pub use sync::{SchedulerConfig, SyncResource, SyncScheduler};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
