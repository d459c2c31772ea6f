//! Protocol defaults shared by every network (`config/protocol.toml`).

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Protocol-level defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub oracle_provider: OracleProviderDefaults,
    #[serde(default)]
    pub settlement_token: SettlementTokenDefaults,
    #[serde(default)]
    pub keeper: KeeperDefaults,
    #[serde(default)]
    pub indexer: IndexerDefaults,
    #[serde(default)]
    pub verify: VerifyDefaults,
}

/// Properties applied by `oracle-provider:register` when no flags are given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleProviderDefaults {
    #[serde(default = "default_min_take_profit_bps")]
    pub min_take_profit_bps: u32,
    #[serde(default = "default_max_take_profit_bps")]
    pub max_take_profit_bps: u32,
    /// 0 = up to 10x, 1 = up to 20x
    #[serde(default)]
    pub leverage_level: u8,
}

fn default_min_take_profit_bps() -> u32 {
    1_000
}
fn default_max_take_profit_bps() -> u32 {
    100_000
}

impl Default for OracleProviderDefaults {
    fn default() -> Self {
        Self {
            min_take_profit_bps: default_min_take_profit_bps(),
            max_take_profit_bps: default_max_take_profit_bps(),
            leverage_level: 0,
        }
    }
}

/// Registration parameters for `settlement-token:register`.
///
/// Token amounts are decimal strings in whole token units and are scaled by
/// the token's decimals at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementTokenDefaults {
    #[serde(default = "default_minimum_margin")]
    pub minimum_margin: String,
    #[serde(default = "default_interest_rate_bps")]
    pub interest_rate_bps: u64,
    #[serde(default = "default_flash_loan_fee_rate_bps")]
    pub flash_loan_fee_rate_bps: u64,
    #[serde(default = "default_earning_distribution_threshold")]
    pub earning_distribution_threshold: String,
    #[serde(default = "default_uniswap_fee_tier")]
    pub uniswap_fee_tier: u32,
}

fn default_minimum_margin() -> String {
    "10".to_string()
}
fn default_interest_rate_bps() -> u64 {
    1_000
}
fn default_flash_loan_fee_rate_bps() -> u64 {
    5_000
}
fn default_earning_distribution_threshold() -> String {
    "1000".to_string()
}
fn default_uniswap_fee_tier() -> u32 {
    3_000
}

impl Default for SettlementTokenDefaults {
    fn default() -> Self {
        Self {
            minimum_margin: default_minimum_margin(),
            interest_rate_bps: default_interest_rate_bps(),
            flash_loan_fee_rate_bps: default_flash_loan_fee_rate_bps(),
            earning_distribution_threshold: default_earning_distribution_threshold(),
            uniswap_fee_tier: default_uniswap_fee_tier(),
        }
    }
}

/// Keeper simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperDefaults {
    /// Wallets polled when `--accounts` is not given
    #[serde(default = "default_keeper_accounts")]
    pub accounts: Vec<String>,
}

fn default_keeper_accounts() -> Vec<String> {
    vec!["alice".to_string(), "bob".to_string()]
}

impl Default for KeeperDefaults {
    fn default() -> Self {
        Self {
            accounts: default_keeper_accounts(),
        }
    }
}

/// Indexer paging and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerDefaults {
    /// Blocks per `eth_getLogs` page
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Head polling interval in follow mode
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_batch_size() -> u64 {
    2_000
}
fn default_poll_interval_ms() -> u64 {
    4_000
}

impl Default for IndexerDefaults {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Explorer verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyDefaults {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_poll_delay_ms")]
    pub poll_delay_ms: u64,
}

fn default_attempts() -> u32 {
    5
}
fn default_poll_delay_ms() -> u64 {
    3_000
}

impl Default for VerifyDefaults {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            poll_delay_ms: default_poll_delay_ms(),
        }
    }
}

impl ProtocolConfig {
    /// Load protocol config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ProtocolConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// `<config_dir>/protocol.toml`, or defaults when the file is absent.
    pub fn load_or_default(config_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = config_dir.as_ref().join("protocol.toml");
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::debug!(
            min_take_profit_bps = self.oracle_provider.min_take_profit_bps,
            max_take_profit_bps = self.oracle_provider.max_take_profit_bps,
            leverage_level = self.oracle_provider.leverage_level,
            "Oracle provider defaults"
        );
        tracing::debug!(
            minimum_margin = %self.settlement_token.minimum_margin,
            interest_rate_bps = self.settlement_token.interest_rate_bps,
            flash_loan_fee_rate_bps = self.settlement_token.flash_loan_fee_rate_bps,
            uniswap_fee_tier = self.settlement_token.uniswap_fee_tier,
            "Settlement token defaults"
        );
    }
}
