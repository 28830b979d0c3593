//! Configuration system.
//!
//! - Engine runtime configuration (profiles, cadence, fallback constants)
//! - Deployment configuration (RPC endpoint and contract addresses)

mod deployment;
mod engine;

pub use deployment::{
    Deployment, DeploymentContracts, SEPOLIA_CHAIN_ID, SEPOLIA_LENDING_PROTOCOL, SEPOLIA_USDC,
    SEPOLIA_WETH,
};
pub use engine::{
    config, init_config, EngineConfig, PreflightConfig, ProtocolConstants, SyncConfig,
};
