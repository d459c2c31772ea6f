//! Gas pricing strategies.
//!
//! Local forks and Arbitrum both accept EIP-1559 transactions, but some
//! testnet RPCs report unusable base fees, so the pricing model is selected
//! per network from config.
//!
//! ```rust,ignore
//! use chromatic_chain::gas::create_gas_strategy;
//!
//! let strategy = create_gas_strategy("Eip1559", 0.1, 2.0, Some(0.01));
//! let params = strategy.fetch_params(client.provider()).await?;
//! ```

mod eip1559;
mod legacy;

pub use eip1559::Eip1559GasStrategy;
pub use legacy::LegacyGasStrategy;

use alloy::providers::DynProvider;
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

const GWEI: f64 = 1e9;

/// Gas parameters fetched from the chain.
#[derive(Debug, Clone)]
pub enum GasParams {
    /// Legacy gas pricing.
    Legacy {
        /// Gas price in wei.
        gas_price: u128,
    },
    /// EIP-1559 gas pricing.
    Eip1559 {
        /// Maximum fee per gas in wei.
        max_fee_per_gas: u128,
        /// Maximum priority fee per gas in wei.
        max_priority_fee_per_gas: u128,
        /// Base fee of the latest block.
        base_fee: u128,
    },
}

impl GasParams {
    /// Upper bound on the per-gas price paid.
    pub fn effective_gas_price(&self) -> u128 {
        match self {
            GasParams::Legacy { gas_price } => *gas_price,
            GasParams::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// Gas pricing strategy.
#[async_trait]
pub trait GasStrategy: Send + Sync + Debug {
    /// Query the chain for current gas prices.
    async fn fetch_params(&self, provider: &DynProvider) -> Result<GasParams>;

    /// Write the gas fields of a transaction request.
    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams);

    /// Strategy name for logging.
    fn strategy_name(&self) -> &'static str;
}

/// Build a gas strategy from a network's gas section.
///
/// Unknown pricing models fall back to Legacy.
pub fn create_gas_strategy(
    pricing_model: &str,
    default_gas_price_gwei: f64,
    max_gas_price_gwei: f64,
    priority_fee_gwei: Option<f64>,
) -> Box<dyn GasStrategy> {
    match pricing_model.to_lowercase().as_str() {
        "eip1559" | "eip-1559" => {
            let priority_fee = priority_fee_gwei.unwrap_or(0.0);
            Box::new(
                Eip1559GasStrategy::new((priority_fee * GWEI) as u128, 2.0)
                    .with_max_fee_cap((max_gas_price_gwei * GWEI) as u128),
            )
        }
        _ => Box::new(LegacyGasStrategy::new(
            (default_gas_price_gwei * GWEI) as u128,
            (max_gas_price_gwei * GWEI) as u128,
        )),
    }
}

/// Apply a safety multiplier to an `eth_estimateGas` result.
pub fn buffered_gas_limit(estimate: u64, multiplier: f64) -> u64 {
    if multiplier <= 1.0 {
        return estimate;
    }
    ((estimate as f64) * multiplier).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_params_effective_price() {
        let legacy = GasParams::Legacy {
            gas_price: 100_000_000,
        };
        assert_eq!(legacy.effective_gas_price(), 100_000_000);

        let eip1559 = GasParams::Eip1559 {
            max_fee_per_gas: 200_000_000,
            max_priority_fee_per_gas: 0,
            base_fee: 100_000_000,
        };
        assert_eq!(eip1559.effective_gas_price(), 200_000_000);
    }

    #[test]
    fn test_create_gas_strategy() {
        let legacy = create_gas_strategy("Legacy", 0.1, 2.0, None);
        assert_eq!(legacy.strategy_name(), "Legacy");

        let eip1559 = create_gas_strategy("Eip1559", 0.1, 2.0, Some(0.01));
        assert_eq!(eip1559.strategy_name(), "EIP-1559");

        let unknown = create_gas_strategy("arbitrum-custom", 0.1, 2.0, None);
        assert_eq!(unknown.strategy_name(), "Legacy");
    }

    #[test]
    fn test_buffered_gas_limit() {
        assert_eq!(buffered_gas_limit(1_000_000, 1.2), 1_200_000);
        assert_eq!(buffered_gas_limit(21_000, 1.0), 21_000);
        assert_eq!(buffered_gas_limit(21_000, 0.5), 21_000);
        assert_eq!(buffered_gas_limit(3, 1.5), 5);
    }
}
