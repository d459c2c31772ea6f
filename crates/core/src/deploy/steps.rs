//! Concrete deployment steps, run in id order.

use super::orchestrator::{DeployContext, DeployOptions, DeployStep, Orchestrator};
use crate::facets::HotfixFacets;
use crate::math::parse_amount;
use crate::tasks::{factory, oracle_provider, settlement_token, TaskOutcome, FACTORY};
use alloy::primitives::{Address, U256};
use alloy::sol_types::{SolCall, SolValue};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromatic_chain::contracts::IChromaticMarketFactory;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub const TEST_SETTLEMENT_TOKEN: &str = "TestSettlementToken";
pub const ORACLE_PROVIDER_MOCK: &str = "OracleProviderMock";
pub const FIXED_PRICE_SWAP_ROUTER: &str = "FixedPriceSwapRouter";
pub const WETH9: &str = "WETH9";
pub const AUTOMATE_MOCK: &str = "AutomateMock";

pub const KEEPER_FEE_PAYER: &str = "KeeperFeePayer";
pub const EARNING_DISTRIBUTOR: &str = "VaultEarningDistributor";
pub const VAULT: &str = "ChromaticVault";
pub const LIQUIDATOR: &str = "ChromaticLiquidator";
pub const LIQUIDATOR_MOCK: &str = "ChromaticLiquidatorMock";
pub const MARKET_SETTLEMENT: &str = "MarketSettlement";
pub const ROUTER: &str = "ChromaticRouter";
pub const LENS: &str = "ChromaticLens";

/// External libraries linked into the factory.
pub const LIBRARIES: [&str; 2] = ["CLBTokenDeployerLib", "MarketDeployerLib"];

/// Diamond cut facet plus the 8 facets behind [`FacetRole`](crate::facets::FacetRole),
/// in factory constructor order.
pub const MARKET_FACETS: [&str; 9] = [
    "MarketDiamondCutFacet",
    "DiamondLoupeFacet",
    "MarketStateFacet",
    "MarketLiquidityFacet",
    "MarketLiquidityLensFacet",
    "MarketTradeOpenPositionFacet",
    "MarketTradeClosePositionFacet",
    "MarketLiquidateFacet",
    "MarketSettleFacet",
];

/// Test token faucet: 1,000,000 tokens once a day.
const FAUCET_AMOUNT: &str = "1000000";
const FAUCET_INTERVAL_SECS: u64 = 86_400;

/// Every step in execution order.
pub fn default_orchestrator() -> Orchestrator {
    Orchestrator::new()
        .step(DeployMocks)
        .step(DeployCore)
        .step(DeployPeriphery)
        .step(SetupMarkets)
        .step(HotfixFacets)
}

/// Liquidator deployment name for the context's network.
pub fn liquidator_name(ctx: &DeployContext) -> &'static str {
    if ctx.tasks.network.is_mockup() {
        LIQUIDATOR_MOCK
    } else {
        LIQUIDATOR
    }
}

/// Configured external address, else a deployment recorded by `1_deploy_mocks`.
fn external_or_deployed(
    ctx: &DeployContext,
    configured: Option<Address>,
    deployment: &str,
) -> Result<Address> {
    match configured {
        Some(address) => Ok(address),
        None => ctx.deployments().require(deployment).with_context(|| {
            format!(
                "{deployment} is neither configured for {} nor deployed",
                ctx.tasks.network.name()
            )
        }),
    }
}

/// Mock contracts on mockup networks.
pub struct DeployMocks;

#[async_trait]
impl DeployStep for DeployMocks {
    fn id(&self) -> &'static str {
        "1_deploy_mocks"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["mocks"]
    }

    fn skip(&self, ctx: &DeployContext) -> bool {
        !ctx.tasks.network.is_mockup()
    }

    #[instrument(skip_all, name = "1_deploy_mocks")]
    async fn run(&self, ctx: &DeployContext) -> Result<()> {
        let external = &ctx.tasks.network.network.external;

        let faucet = parse_amount(FAUCET_AMOUNT, 18)?;
        ctx.deploy(
            TEST_SETTLEMENT_TOKEN,
            DeployOptions::args(
                (
                    "Chromatic Test USD".to_string(),
                    "cUSD".to_string(),
                    faucet,
                    U256::from(FAUCET_INTERVAL_SECS),
                )
                    .abi_encode_params(),
            ),
        )
        .await?;

        ctx.deploy(ORACLE_PROVIDER_MOCK, DeployOptions::default())
            .await?;

        let weth = match external.weth {
            Some(weth) => weth,
            None => ctx.deploy(WETH9, DeployOptions::default()).await?.address,
        };

        if external.fixed_price_swap_router.is_none() {
            ctx.deploy(
                FIXED_PRICE_SWAP_ROUTER,
                DeployOptions::args((weth,).abi_encode_params()),
            )
            .await?;
        }

        if external.automate.is_none() {
            ctx.deploy(AUTOMATE_MOCK, DeployOptions::default()).await?;
        }

        Ok(())
    }
}

/// Libraries, market facets, factory, vault, liquidator and their wiring.
pub struct DeployCore;

impl DeployCore {
    /// Call `setter` only when the factory's current value differs.
    async fn wire<C: SolCall>(
        ctx: &DeployContext,
        factory: Address,
        label: &str,
        current: Address,
        target: Address,
        call: C,
    ) -> Result<bool> {
        if current == target {
            info!(setting = %label, address = %target, "Factory already wired");
            return Ok(false);
        }
        ctx.execute(label, factory, call).await?;
        Ok(true)
    }
}

#[async_trait]
impl DeployStep for DeployCore {
    fn id(&self) -> &'static str {
        "2_deploy_core"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["core"]
    }

    #[instrument(skip_all, name = "2_deploy_core")]
    async fn run(&self, ctx: &DeployContext) -> Result<()> {
        let network = &ctx.tasks.network;
        let external = &network.network.external;

        let mut libraries = BTreeMap::new();
        for library in LIBRARIES {
            let deployed = ctx.deploy(library, DeployOptions::default()).await?;
            libraries.insert(library.to_string(), deployed.address);
        }

        let mut facets = Vec::with_capacity(MARKET_FACETS.len());
        for facet in MARKET_FACETS {
            facets.push(ctx.deploy(facet, DeployOptions::default()).await?.address);
        }

        let factory_args = (
            facets[0], facets[1], facets[2], facets[3], facets[4], facets[5], facets[6],
            facets[7], facets[8],
        )
            .abi_encode_params();
        let factory = ctx
            .deploy(
                FACTORY,
                DeployOptions {
                    args: factory_args.into(),
                    libraries,
                    ..Default::default()
                },
            )
            .await?
            .address;

        let weth = external_or_deployed(ctx, external.weth, WETH9)?;
        let swap_router = match (external.swap_router, network.is_mockup()) {
            (Some(router), false) => router,
            _ => external_or_deployed(
                ctx,
                external.fixed_price_swap_router,
                FIXED_PRICE_SWAP_ROUTER,
            )?,
        };
        let automate = external_or_deployed(ctx, external.automate, AUTOMATE_MOCK)?;

        let keeper_fee_payer = ctx
            .deploy(
                KEEPER_FEE_PAYER,
                DeployOptions::args((factory, swap_router, weth).abi_encode_params()),
            )
            .await?
            .address;
        let distributor = ctx
            .deploy(
                EARNING_DISTRIBUTOR,
                DeployOptions::args((factory, automate).abi_encode_params()),
            )
            .await?
            .address;
        let vault = ctx
            .deploy(
                VAULT,
                DeployOptions::args((factory, distributor).abi_encode_params()),
            )
            .await?
            .address;
        let liquidator = ctx
            .deploy(
                liquidator_name(ctx),
                DeployOptions::args((factory, automate).abi_encode_params()),
            )
            .await?
            .address;
        let market_settlement = ctx
            .deploy(
                MARKET_SETTLEMENT,
                DeployOptions::args((factory, automate).abi_encode_params()),
            )
            .await?
            .address;

        let instance = IChromaticMarketFactory::new(factory, ctx.tasks.provider());

        let current = instance.vault().call().await?._0;
        let call = IChromaticMarketFactory::setVaultCall { vault };
        Self::wire(ctx, factory, "factory.setVault", current, vault, call).await?;

        let current = instance.liquidator().call().await?._0;
        let call = IChromaticMarketFactory::setLiquidatorCall { liquidator };
        Self::wire(ctx, factory, "factory.setLiquidator", current, liquidator, call).await?;

        let current = instance.keeperFeePayer().call().await?._0;
        let call = IChromaticMarketFactory::setKeeperFeePayerCall {
            keeperFeePayer: keeper_fee_payer,
        };
        Self::wire(ctx, factory, "factory.setKeeperFeePayer", current, keeper_fee_payer, call)
            .await?;

        let current = instance.marketSettlement().call().await?._0;
        let call = IChromaticMarketFactory::setMarketSettlementCall {
            marketSettlement: market_settlement,
        };
        Self::wire(ctx, factory, "factory.setMarketSettlement", current, market_settlement, call)
            .await?;

        if let Some(treasury) = external.treasury {
            let current = instance.treasury().call().await?._0;
            let call = IChromaticMarketFactory::updateTreasuryCall { treasury };
            Self::wire(ctx, factory, "factory.updateTreasury", current, treasury, call).await?;
        }

        Ok(())
    }
}

/// Router and lens.
pub struct DeployPeriphery;

#[async_trait]
impl DeployStep for DeployPeriphery {
    fn id(&self) -> &'static str {
        "3_deploy_periphery"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["periphery"]
    }

    #[instrument(skip_all, name = "3_deploy_periphery")]
    async fn run(&self, ctx: &DeployContext) -> Result<()> {
        let factory = ctx.tasks.factory_address()?;
        let router = ctx
            .deploy(ROUTER, DeployOptions::args((factory,).abi_encode_params()))
            .await?
            .address;
        ctx.deploy(LENS, DeployOptions::args((router,).abi_encode_params()))
            .await?;
        Ok(())
    }
}

/// Register configured oracle providers and settlement tokens, then create
/// one market per pair. Not run on mainnet.
pub struct SetupMarkets;

#[async_trait]
impl DeployStep for SetupMarkets {
    fn id(&self) -> &'static str {
        "4_setup_markets"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["markets"]
    }

    fn skip(&self, ctx: &DeployContext) -> bool {
        ctx.tasks.network.is_mainnet()
    }

    #[instrument(skip_all, name = "4_setup_markets")]
    async fn run(&self, ctx: &DeployContext) -> Result<()> {
        let tasks = &ctx.tasks;
        let network = &tasks.network.network;
        let defaults = &tasks.protocol.oracle_provider;

        let mut providers = Vec::new();
        for entry in &network.oracle_providers {
            let address = external_or_deployed(ctx, entry.address, ORACLE_PROVIDER_MOCK)?;
            let outcome = oracle_provider::register(
                tasks,
                address,
                oracle_provider::RegisterArgs::from_defaults(defaults),
            )
            .await
            .with_context(|| format!("registering oracle provider {}", entry.description))?;
            log_outcome(&entry.description, &outcome);
            providers.push(address);
        }

        let mut tokens = Vec::new();
        for entry in &network.settlement_tokens {
            let token = external_or_deployed(ctx, entry.address, TEST_SETTLEMENT_TOKEN)?;
            let oracle = external_or_deployed(ctx, entry.oracle_provider, ORACLE_PROVIDER_MOCK)?;
            let mut args = settlement_token::RegisterArgs::new(token, oracle);
            args.uniswap_fee_tier = entry.uniswap_fee_tier;
            let outcome = settlement_token::register(tasks, args)
                .await
                .with_context(|| format!("registering settlement token {}", entry.symbol))?;
            log_outcome(&entry.symbol, &outcome);
            tokens.push(token);
        }

        for &provider in &providers {
            for &token in &tokens {
                let outcome = factory::create_market(tasks, provider, token).await?;
                log_outcome("market", &outcome);
            }
        }

        Ok(())
    }
}

fn log_outcome(subject: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Done => info!(subject = %subject, "Done"),
        TaskOutcome::Skipped(reason) => info!(subject = %subject, reason = %reason, "Unchanged"),
    }
}
