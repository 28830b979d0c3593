//! Engine configuration with profile support.
//!
//! Provides centralized configuration for sync cadence, protocol fallback
//! constants and pre-flight behaviour, with named profiles (default,
//! testing, fast).

use crate::interest::AccrualRate;
use lendwatch_chain::ProtocolParams;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Polling cadence
    #[serde(default)]
    pub sync: SyncConfig,

    /// Static protocol constants used until the gateway has answered
    #[serde(default)]
    pub protocol: ProtocolConstants,

    /// Pre-flight pipeline settings
    #[serde(default)]
    pub preflight: PreflightConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Per-account position poll (seconds)
    #[serde(default = "default_position_interval")]
    pub position_interval_secs: u64,

    /// Protocol aggregate, oracle and parameter poll (seconds)
    #[serde(default = "default_market_interval")]
    pub market_interval_secs: u64,

    /// Projected-debt display tick (milliseconds)
    #[serde(default = "default_interest_tick")]
    pub interest_tick_ms: u64,

    /// Block window for account activity queries
    #[serde(default = "default_activity_lookback")]
    pub activity_lookback_blocks: u64,
}

fn default_position_interval() -> u64 {
    10
}
fn default_market_interval() -> u64 {
    30
}
fn default_interest_tick() -> u64 {
    1000
}
fn default_activity_lookback() -> u64 {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            position_interval_secs: default_position_interval(),
            market_interval_secs: default_market_interval(),
            interest_tick_ms: default_interest_tick(),
            activity_lookback_blocks: default_activity_lookback(),
        }
    }
}

impl SyncConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_secs(self.position_interval_secs)
    }
    pub fn market_interval(&self) -> Duration {
        Duration::from_secs(self.market_interval_secs)
    }
    pub fn interest_tick(&self) -> Duration {
        Duration::from_millis(self.interest_tick_ms)
    }
}

/// Protocol constants mirrored client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConstants {
    /// Liquidation threshold in percent
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold_pct: u64,

    /// Liquidator bonus in percent
    #[serde(default = "default_liquidation_bonus")]
    pub liquidation_bonus_pct: u64,

    /// Annual borrow rate in basis points (1000 = 10%)
    #[serde(default = "default_annual_rate")]
    pub annual_rate_bps: u64,

    /// Maximum oracle age (seconds)
    #[serde(default = "default_max_price_age")]
    pub max_price_age_secs: u64,

    #[serde(default = "default_collateral_decimals")]
    pub collateral_decimals: u8,

    #[serde(default = "default_borrow_decimals")]
    pub borrow_decimals: u8,

    /// Replace these constants with gateway-read values once available
    #[serde(default = "default_prefer_gateway")]
    pub prefer_gateway: bool,
}

fn default_liquidation_threshold() -> u64 {
    80
}
fn default_liquidation_bonus() -> u64 {
    10
}
fn default_annual_rate() -> u64 {
    1000
}
fn default_max_price_age() -> u64 {
    7 * 24 * 60 * 60
}
fn default_collateral_decimals() -> u8 {
    18
}
fn default_borrow_decimals() -> u8 {
    6
}
fn default_prefer_gateway() -> bool {
    true
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            liquidation_threshold_pct: default_liquidation_threshold(),
            liquidation_bonus_pct: default_liquidation_bonus(),
            annual_rate_bps: default_annual_rate(),
            max_price_age_secs: default_max_price_age(),
            collateral_decimals: default_collateral_decimals(),
            borrow_decimals: default_borrow_decimals(),
            prefer_gateway: default_prefer_gateway(),
        }
    }
}

impl ProtocolConstants {
    /// Protocol parameters as configured, for use before the gateway answers.
    pub fn to_params(&self) -> ProtocolParams {
        let rate = AccrualRate::from_annual_bps(self.annual_rate_bps);
        ProtocolParams {
            liquidation_threshold_pct: self.liquidation_threshold_pct,
            liquidation_bonus_pct: self.liquidation_bonus_pct,
            borrow_rate_per_second: rate.per_second(),
            precision: rate.precision(),
            max_price_age_secs: self.max_price_age_secs,
            collateral_decimals: self.collateral_decimals,
            borrow_decimals: self.borrow_decimals,
        }
    }
}

/// Pre-flight pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightConfig {
    /// Run a non-mutating simulation before submitting
    #[serde(default = "default_simulate")]
    pub simulate: bool,
}

fn default_simulate() -> bool {
    true
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            simulate: default_simulate(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            sync: SyncConfig::default(),
            protocol: ProtocolConstants::default(),
            preflight: PreflightConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Short intervals for local nodes and integration runs.
    pub fn testing() -> Self {
        Self {
            profile: "testing".to_string(),
            sync: SyncConfig {
                position_interval_secs: 2,
                market_interval_secs: 5,
                interest_tick_ms: 250,
                activity_lookback_blocks: 1_000,
            },
            protocol: ProtocolConstants::default(),
            preflight: PreflightConfig::default(),
        }
    }

    /// Tighter polling for users close to liquidation.
    pub fn fast() -> Self {
        Self {
            profile: "fast".to_string(),
            sync: SyncConfig {
                position_interval_secs: 5,
                market_interval_secs: 15,
                interest_tick_ms: 500,
                ..Default::default()
            },
            protocol: ProtocolConstants::default(),
            preflight: PreflightConfig::default(),
        }
    }

    /// Get profile from environment variable LENDWATCH_PROFILE, or default.
    /// Supported values: testing, fast
    pub fn from_env() -> Self {
        let profile = std::env::var("LENDWATCH_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "testing" | "test" => Self::testing(),
            "fast" => Self::fast(),
            _ => Self::default(),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            position_secs = self.sync.position_interval_secs,
            market_secs = self.sync.market_interval_secs,
            interest_tick_ms = self.sync.interest_tick_ms,
            "Sync cadence"
        );
        tracing::info!(
            threshold_pct = self.protocol.liquidation_threshold_pct,
            bonus_pct = self.protocol.liquidation_bonus_pct,
            annual_rate_bps = self.protocol.annual_rate_bps,
            max_price_age = self.protocol.max_price_age_secs,
            prefer_gateway = self.protocol.prefer_gateway,
            "Protocol constants"
        );
        tracing::info!(simulate = self.preflight.simulate, "Pre-flight");
    }
}

static GLOBAL_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize global configuration.
pub fn init_config(config: EngineConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static EngineConfig {
    GLOBAL_CONFIG.get_or_init(EngineConfig::from_env)
}
