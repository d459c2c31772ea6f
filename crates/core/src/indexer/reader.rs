//! Contract state reads pinned to the block an event was emitted in.

use alloy::eips::BlockId;
use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromatic_chain::contracts::{
    ICLBToken, IChromaticMarket, IChromaticMarketFactory, IOracleProvider, InterestRateRecord,
    LiquidityBinStatus, OracleProviderProperties, OracleVersion, IERC20,
};

/// Static wiring of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketInfo {
    pub oracle_provider: Address,
    pub settlement_token: Address,
    pub clb_token: Address,
}

/// Reads the handlers need, each evaluated at `block`.
#[async_trait]
pub trait StateReader: Send + Sync {
    async fn markets(&self, factory: Address, block: u64) -> Result<Vec<Address>>;

    async fn market_info(&self, market: Address, block: u64) -> Result<MarketInfo>;

    /// `(symbol, decimals)`
    async fn token_metadata(&self, token: Address, block: u64) -> Result<(String, u8)>;

    async fn oracle_description(&self, provider: Address, block: u64) -> Result<String>;

    async fn oracle_provider_properties(
        &self,
        factory: Address,
        provider: Address,
        block: u64,
    ) -> Result<OracleProviderProperties>;

    async fn interest_rate_records(
        &self,
        factory: Address,
        token: Address,
        block: u64,
    ) -> Result<Vec<InterestRateRecord>>;

    async fn bin_statuses(&self, market: Address, block: u64) -> Result<Vec<LiquidityBinStatus>>;

    /// Total supply per id, in `ids` order.
    async fn clb_total_supply(&self, token: Address, ids: &[U256], block: u64) -> Result<Vec<U256>>;

    async fn oracle_version(&self, provider: Address, block: u64) -> Result<OracleVersion>;
}

/// [`StateReader`] over an archive-capable RPC node.
#[derive(Clone)]
pub struct OnChainReader {
    provider: DynProvider,
}

impl OnChainReader {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

fn at(block: u64) -> BlockId {
    BlockId::number(block)
}

#[async_trait]
impl StateReader for OnChainReader {
    async fn markets(&self, factory: Address, block: u64) -> Result<Vec<Address>> {
        Ok(IChromaticMarketFactory::new(factory, &self.provider)
            .getMarkets()
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("getMarkets at {block}"))?
            ._0)
    }

    async fn market_info(&self, market: Address, block: u64) -> Result<MarketInfo> {
        let instance = IChromaticMarket::new(market, &self.provider);
        let (oracle_provider, settlement_token, clb_token) = futures::try_join!(
            async { instance.oracleProvider().block(at(block)).call().await.map(|r| r._0) },
            async { instance.settlementToken().block(at(block)).call().await.map(|r| r._0) },
            async { instance.clbToken().block(at(block)).call().await.map(|r| r._0) },
        )
        .with_context(|| format!("market {market} at {block}"))?;
        Ok(MarketInfo {
            oracle_provider,
            settlement_token,
            clb_token,
        })
    }

    async fn token_metadata(&self, token: Address, block: u64) -> Result<(String, u8)> {
        let instance = IERC20::new(token, &self.provider);
        futures::try_join!(
            async { instance.symbol().block(at(block)).call().await.map(|r| r._0) },
            async { instance.decimals().block(at(block)).call().await.map(|r| r._0) },
        )
        .with_context(|| format!("token {token} at {block}"))
    }

    async fn oracle_description(&self, provider: Address, block: u64) -> Result<String> {
        Ok(IOracleProvider::new(provider, &self.provider)
            .description()
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("description of {provider} at {block}"))?
            ._0)
    }

    async fn oracle_provider_properties(
        &self,
        factory: Address,
        provider: Address,
        block: u64,
    ) -> Result<OracleProviderProperties> {
        Ok(IChromaticMarketFactory::new(factory, &self.provider)
            .getOracleProviderProperties(provider)
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("properties of {provider} at {block}"))?
            ._0)
    }

    async fn interest_rate_records(
        &self,
        factory: Address,
        token: Address,
        block: u64,
    ) -> Result<Vec<InterestRateRecord>> {
        Ok(IChromaticMarketFactory::new(factory, &self.provider)
            .getInterestRateRecords(token)
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("interest rate records of {token} at {block}"))?
            ._0)
    }

    async fn bin_statuses(&self, market: Address, block: u64) -> Result<Vec<LiquidityBinStatus>> {
        Ok(IChromaticMarket::new(market, &self.provider)
            .liquidityBinStatuses()
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("bin statuses of {market} at {block}"))?
            ._0)
    }

    async fn clb_total_supply(&self, token: Address, ids: &[U256], block: u64) -> Result<Vec<U256>> {
        Ok(ICLBToken::new(token, &self.provider)
            .totalSupplyBatch(ids.to_vec())
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("CLB supply of {token} at {block}"))?
            ._0)
    }

    async fn oracle_version(&self, provider: Address, block: u64) -> Result<OracleVersion> {
        Ok(IOracleProvider::new(provider, &self.provider)
            .currentVersion()
            .block(at(block))
            .call()
            .await
            .with_context(|| format!("oracle version of {provider} at {block}"))?
            ._0)
    }
}
