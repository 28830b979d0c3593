//! Deployment configuration: where the protocol lives.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use lendwatch_chain::ContractSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Contracts on Sepolia.
pub const SEPOLIA_LENDING_PROTOCOL: &str = "0x3db2787AE4258B4aA30872a972516A0e51e93cFc";
pub const SEPOLIA_WETH: &str = "0x7b79995e5f793A07Bc00c21412e50Ecae098E7f9";
pub const SEPOLIA_USDC: &str = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238";
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Network and contract addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment name (e.g., "sepolia")
    pub name: String,
    pub chain_id: u64,
    /// HTTP RPC endpoint; `${VAR}` references are expanded
    pub rpc_url: String,
    pub contracts: DeploymentContracts,
}

/// Contract addresses as written in config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentContracts {
    pub lending_protocol: Address,
    /// WETH on the reference deployment
    pub collateral_token: Address,
    /// USDC on the reference deployment
    pub borrow_token: Address,
}

impl Deployment {
    /// Load from a TOML file, expanding `${VAR}` in the RPC URL.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment {:?}", path))?;
        let mut deployment: Deployment = toml::from_str(&content)
            .with_context(|| format!("Failed to parse deployment {:?}", path))?;
        deployment.rpc_url = expand_env(&deployment.rpc_url);
        info!(name = %deployment.name, chain_id = deployment.chain_id, "Deployment loaded");
        Ok(deployment)
    }

    /// Sepolia reference deployment; the RPC URL comes from `RPC_URL`.
    pub fn sepolia() -> Result<Self> {
        let rpc_url = std::env::var("RPC_URL").context("RPC_URL not set")?;
        Ok(Self {
            name: "sepolia".to_string(),
            chain_id: SEPOLIA_CHAIN_ID,
            rpc_url,
            contracts: DeploymentContracts {
                lending_protocol: SEPOLIA_LENDING_PROTOCOL.parse()?,
                collateral_token: SEPOLIA_WETH.parse()?,
                borrow_token: SEPOLIA_USDC.parse()?,
            },
        })
    }

    /// Load `DEPLOYMENT_FILE` if set, else the Sepolia defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var("DEPLOYMENT_FILE") {
            Ok(path) => Self::from_file(path),
            Err(_) => Self::sepolia(),
        }
    }

    pub fn contract_set(&self) -> ContractSet {
        ContractSet {
            lending_protocol: self.contracts.lending_protocol,
            collateral_token: self.contracts.collateral_token,
            borrow_token: self.contracts.borrow_token,
        }
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
fn expand_env(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return s.to_string();
    };
    let mut result = s.to_string();

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}
