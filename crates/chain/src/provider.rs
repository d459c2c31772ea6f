//! RPC connection management.
//! Uses Alloy providers for type-safe RPC interactions.

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// Default block span per `eth_getLogs` request.
pub const DEFAULT_LOG_PAGE: u64 = 2_000;

/// Read-side connection to a single network.
///
/// Cheap to clone: the underlying provider is reference counted.
#[derive(Clone)]
pub struct ChainClient {
    /// RPC URL
    rpc_url: String,
    /// Type-erased Alloy provider
    provider: DynProvider,
    /// Chain ID reported by the node
    chain_id: u64,
}

impl ChainClient {
    /// Connect to an RPC endpoint and verify it answers.
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        info!(rpc = %redact(rpc_url), "Connecting to RPC");

        let provider = ProviderBuilder::new()
            .on_http(rpc_url.parse().context("Invalid RPC URL")?)
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to query chain id")?;
        let block = provider.get_block_number().await?;
        info!(chain_id, block, "Provider connection verified");

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            provider,
            chain_id,
        })
    }

    /// Get the RPC URL.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Get the underlying provider.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Get the chain ID.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Get current block number.
    pub async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    /// Get native balance of an account.
    pub async fn balance(&self, account: Address) -> Result<U256> {
        Ok(self.provider.get_balance(account).await?)
    }

    /// Check whether an address holds contract code.
    pub async fn code_exists(&self, address: Address) -> Result<bool> {
        let code = self.provider.get_code_at(address).await?;
        Ok(!code.is_empty())
    }

    /// Fetch logs for `[from, to]` in pages of `step` blocks.
    ///
    /// Results are ordered by (block number, log index).
    pub async fn logs_in_range(
        &self,
        filter: &Filter,
        from: u64,
        to: u64,
        step: u64,
    ) -> Result<Vec<Log>> {
        let step = step.max(1);
        let mut logs = Vec::new();
        let mut start = from;

        while start <= to {
            let end = start.saturating_add(step - 1).min(to);
            let page = filter.clone().from_block(start).to_block(end);
            let mut batch = self
                .provider
                .get_logs(&page)
                .await
                .with_context(|| format!("eth_getLogs failed for blocks {start}..={end}"))?;
            debug!(from = start, to = end, count = batch.len(), "Fetched logs");
            logs.append(&mut batch);
            start = end + 1;
        }

        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &redact(&self.rpc_url))
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Strip the last path segment of an RPC URL (usually the API key) for logging.
pub fn redact(rpc_url: &str) -> String {
    match rpc_url.rsplit_once('/') {
        Some((base, key)) if key.len() >= 16 => format!("{base}/***"),
        _ => rpc_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_api_key() {
        assert_eq!(
            redact("https://arb-goerli.g.alchemy.com/v2/abcdefghijklmnopqrstuvwxyz"),
            "https://arb-goerli.g.alchemy.com/v2/***"
        );
        assert_eq!(redact("http://127.0.0.1:8545"), "http://127.0.0.1:8545");
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_client_connect() {
        let rpc = std::env::var("CHROMATIC_TEST_RPC")
            .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string());
        let client = ChainClient::connect(&rpc).await.unwrap();
        assert!(client.block_number().await.is_ok());
    }
}
