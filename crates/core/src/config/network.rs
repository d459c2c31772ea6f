//! Network configuration (one TOML file per chain).

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network details
    pub network: NetworkDetails,
}

/// Network details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkDetails {
    /// Name used on the command line and as deployments subdirectory
    pub name: String,
    /// Chain ID
    pub chain_id: u64,
    /// HTTP RPC endpoint, may contain `${VAR}` references
    pub rpc_url: String,
    /// `local`, `mockup`, `testnet`, `mainnet`
    #[serde(default)]
    pub tags: Vec<String>,
    /// First block the indexer scans (factory deployment block)
    #[serde(default)]
    pub start_block: u64,
    /// Number of mnemonic accounts exposed to the REPL
    #[serde(default = "default_mnemonic_accounts")]
    pub mnemonic_accounts: u32,
    /// Gas configuration
    #[serde(default)]
    pub gas: GasConfig,
    /// Block explorer for verification
    #[serde(default)]
    pub explorer: Option<ExplorerConfig>,
    /// Contracts that exist independently of this deployment
    #[serde(default)]
    pub external: ExternalContracts,
    /// Oracle providers registered by `4_setup_markets`
    #[serde(default)]
    pub oracle_providers: Vec<OracleProviderEntry>,
    /// Settlement tokens registered by `4_setup_markets`
    #[serde(default)]
    pub settlement_tokens: Vec<SettlementTokenEntry>,
}

fn default_mnemonic_accounts() -> u32 {
    8
}

/// Gas pricing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Gas pricing model
    #[serde(default = "default_pricing")]
    pub pricing: GasPricingModel,
    /// Gas limit multiplier (e.g., 1.2 for 20% buffer)
    #[serde(default = "default_limit_multiplier")]
    pub limit_multiplier: f64,
    /// Maximum gas price willing to pay (in gwei)
    #[serde(default = "default_max_gas_price")]
    pub max_gas_price_gwei: f64,
    /// Default gas price for legacy transactions (in gwei)
    #[serde(default = "default_gas_price")]
    pub default_gas_price_gwei: f64,
    /// Priority fee for EIP-1559 transactions (in gwei)
    #[serde(default)]
    pub priority_fee_gwei: Option<f64>,
}

fn default_pricing() -> GasPricingModel {
    GasPricingModel::Eip1559
}

fn default_limit_multiplier() -> f64 {
    1.2
}

fn default_max_gas_price() -> f64 {
    10.0
}

fn default_gas_price() -> f64 {
    0.1
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            pricing: default_pricing(),
            limit_multiplier: default_limit_multiplier(),
            max_gas_price_gwei: default_max_gas_price(),
            default_gas_price_gwei: default_gas_price(),
            priority_fee_gwei: None,
        }
    }
}

/// Gas pricing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasPricingModel {
    /// Legacy gas pricing (gas price only)
    Legacy,
    /// EIP-1559 (base fee + priority fee)
    Eip1559,
}

impl GasPricingModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            GasPricingModel::Legacy => "Legacy",
            GasPricingModel::Eip1559 => "Eip1559",
        }
    }
}

/// Etherscan-compatible explorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// API endpoint
    pub api_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Browser URL for links
    #[serde(default)]
    pub browser_url: Option<String>,
}

/// Third-party contracts on this network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalContracts {
    /// Wrapped native token
    #[serde(default)]
    pub weth: Option<Address>,
    /// Uniswap V3 SwapRouter
    #[serde(default)]
    pub swap_router: Option<Address>,
    /// Gelato Automate
    #[serde(default)]
    pub automate: Option<Address>,
    /// Fixed-price swap router (mockup networks deploy their own)
    #[serde(default)]
    pub fixed_price_swap_router: Option<Address>,
    /// Protocol treasury, defaults to the deployer
    #[serde(default)]
    pub treasury: Option<Address>,
}

/// Oracle provider to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleProviderEntry {
    /// Feed description, e.g. `ETH/USD`
    pub description: String,
    /// Provider address; `None` uses the deployed `OracleProviderMock`
    #[serde(default)]
    pub address: Option<Address>,
}

/// Settlement token to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementTokenEntry {
    /// Token symbol
    pub symbol: String,
    /// Token address; `None` uses the deployed test token
    #[serde(default)]
    pub address: Option<Address>,
    /// Oracle provider pricing the token; `None` uses the deployed mock
    #[serde(default)]
    pub oracle_provider: Option<Address>,
    /// Uniswap pool fee tier for keeper fee swaps
    #[serde(default)]
    pub uniswap_fee_tier: Option<u32>,
}

impl NetworkConfig {
    /// Load network config from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: NetworkConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Expand environment variables in config values.
    pub fn expand_env_vars(&mut self) {
        self.network.rpc_url = expand_env(&self.network.rpc_url);
        if let Some(ref mut explorer) = self.network.explorer {
            explorer.api_url = expand_env(&explorer.api_url);
        }
    }

    pub fn name(&self) -> &str {
        &self.network.name
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.network.tags.iter().any(|t| t == tag)
    }

    /// Local node (anvil / hardhat).
    pub fn is_local(&self) -> bool {
        self.has_tag("local")
    }

    /// Network that runs against mock oracles and a mock liquidator.
    pub fn is_mockup(&self) -> bool {
        self.has_tag("mockup")
    }

    pub fn is_mainnet(&self) -> bool {
        self.has_tag("mainnet")
    }
}

/// Expand ${VAR_NAME} patterns with environment variable values.
///
/// Unset variables are left in place so the failure is visible in logs.
pub fn expand_env(s: &str) -> String {
    let mut result = s.to_string();
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return result;
    };

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOERLI: &str = r#"
[network]
name = "arbitrum_goerli"
chain_id = 421613
rpc_url = "https://arb-goerli.g.alchemy.com/v2/${NETWORK_TEST_KEY}"
tags = ["testnet", "mockup"]

[network.gas]
pricing = "Legacy"

[network.explorer]
api_url = "https://api-goerli.arbiscan.io/api"
api_key_env = "ARBISCAN_GOERLI_API_KEY"

[network.external]
weth = "0xEe01c0CD76354C383B8c7B4e65EA88D00B06f36f"

[[network.oracle_providers]]
description = "ETH/USD"
"#;

    #[test]
    fn test_expand_env() {
        // Unique var name to avoid conflicts with parallel tests
        std::env::set_var("NETWORK_EXPAND_VAR", "test_value");
        assert_eq!(expand_env("${NETWORK_EXPAND_VAR}"), "test_value");
        assert_eq!(
            expand_env("prefix_${NETWORK_EXPAND_VAR}_suffix"),
            "prefix_test_value_suffix"
        );
        assert_eq!(expand_env("no_vars"), "no_vars");
        assert_eq!(expand_env("${NETWORK_UNSET_VAR}"), "${NETWORK_UNSET_VAR}");
        std::env::remove_var("NETWORK_EXPAND_VAR");
    }

    #[test]
    fn test_parse_network() {
        std::env::set_var("NETWORK_TEST_KEY", "abc");
        let mut config: NetworkConfig = toml::from_str(GOERLI).unwrap();
        config.expand_env_vars();

        assert_eq!(config.name(), "arbitrum_goerli");
        assert_eq!(config.chain_id(), 421613);
        assert!(config.network.rpc_url.ends_with("/v2/abc"));
        assert!(config.is_mockup());
        assert!(!config.is_local());
        assert_eq!(config.network.gas.pricing, GasPricingModel::Legacy);
        assert_eq!(config.network.gas.limit_multiplier, 1.2);
        assert_eq!(config.network.mnemonic_accounts, 8);
        assert!(config.network.external.weth.is_some());
        assert!(config.network.external.automate.is_none());
        assert!(config.network.oracle_providers[0].address.is_none());
        std::env::remove_var("NETWORK_TEST_KEY");
    }
}
