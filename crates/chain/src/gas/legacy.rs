//! Legacy gas pricing (single `gas_price` field).

use super::{GasParams, GasStrategy};
use alloy::network::TransactionBuilder;
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

/// Legacy gas pricing strategy, node price capped at `max_gas_price`.
#[derive(Debug)]
pub struct LegacyGasStrategy {
    /// Price used when the node does not answer `eth_gasPrice`.
    default_gas_price: u128,
    /// Cap in wei.
    max_gas_price: u128,
}

impl LegacyGasStrategy {
    pub fn new(default_gas_price: u128, max_gas_price: u128) -> Self {
        Self {
            default_gas_price,
            max_gas_price,
        }
    }

    fn cap(&self, gas_price: u128) -> u128 {
        gas_price.min(self.max_gas_price)
    }
}

#[async_trait]
impl GasStrategy for LegacyGasStrategy {
    async fn fetch_params(&self, provider: &DynProvider) -> Result<GasParams> {
        let gas_price = match provider.get_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                debug!(error = %e, "eth_gasPrice failed, using default");
                self.default_gas_price
            }
        };

        Ok(GasParams::Legacy {
            gas_price: self.cap(gas_price),
        })
    }

    fn apply_gas(&self, tx: &mut TransactionRequest, params: &GasParams) {
        tx.set_gas_price(params.effective_gas_price());
    }

    fn strategy_name(&self) -> &'static str {
        "Legacy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_legacy_cap() {
        let strategy = LegacyGasStrategy::new(100_000_000, 2_000_000_000);
        assert_eq!(strategy.cap(500_000_000), 500_000_000);
        assert_eq!(strategy.cap(5_000_000_000), 2_000_000_000);
    }

    #[test]
    fn test_legacy_apply_gas_from_eip1559_params() {
        let strategy = LegacyGasStrategy::new(100_000_000, 2_000_000_000);
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);

        let params = GasParams::Eip1559 {
            max_fee_per_gas: 300_000_000,
            max_priority_fee_per_gas: 0,
            base_fee: 150_000_000,
        };

        strategy.apply_gas(&mut tx, &params);
        assert_eq!(tx.gas_price(), Some(300_000_000));
    }
}
