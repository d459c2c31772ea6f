//! Diamond facet upgrades for deployed markets.
//!
//! Every market is a diamond whose selectors are routed to shared facet
//! contracts. After new facets are deployed, each market's loupe is asked
//! which facet currently serves a representative selector of every role; a
//! role whose facet moved gets one `Replace` cut carrying all selectors of the
//! old facet. Roles already pointing at the new facet produce no cut, so a
//! rerun with unchanged facets sends no transaction.

use crate::deploy::{DeployContext, DeployOptions, DeployStep};
use alloy::primitives::{Address, Bytes, FixedBytes};
use alloy::providers::DynProvider;
use anyhow::{Context, Result};
use arrayvec::ArrayVec;
use async_trait::async_trait;
use chromatic_chain::contracts::{IChromaticMarketFactory, IDiamondCut, IDiamondLoupe};
use chromatic_chain::{selector, FacetCut, FacetCutAction};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// A group of market functions deployed as one facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FacetRole {
    DiamondLoupe,
    State,
    Liquidity,
    LiquidityLens,
    TradeOpenPosition,
    TradeClosePosition,
    Liquidate,
    Settle,
}

impl FacetRole {
    pub const ALL: [FacetRole; 8] = [
        FacetRole::DiamondLoupe,
        FacetRole::State,
        FacetRole::Liquidity,
        FacetRole::LiquidityLens,
        FacetRole::TradeOpenPosition,
        FacetRole::TradeClosePosition,
        FacetRole::Liquidate,
        FacetRole::Settle,
    ];

    /// Artifact and deployment name of the facet.
    pub fn artifact_name(self) -> &'static str {
        match self {
            FacetRole::DiamondLoupe => "DiamondLoupeFacet",
            FacetRole::State => "MarketStateFacet",
            FacetRole::Liquidity => "MarketLiquidityFacet",
            FacetRole::LiquidityLens => "MarketLiquidityLensFacet",
            FacetRole::TradeOpenPosition => "MarketTradeOpenPositionFacet",
            FacetRole::TradeClosePosition => "MarketTradeClosePositionFacet",
            FacetRole::Liquidate => "MarketLiquidateFacet",
            FacetRole::Settle => "MarketSettleFacet",
        }
    }

    /// Signature of a function only this facet serves.
    pub fn representative_signature(self) -> &'static str {
        match self {
            FacetRole::DiamondLoupe => "facets()",
            FacetRole::State => "factory()",
            FacetRole::Liquidity => "addLiquidity(address,int16,bytes)",
            FacetRole::LiquidityLens => "getBinValues(int16[])",
            FacetRole::TradeOpenPosition => "openPosition(int256,uint256,uint256,uint256,bytes)",
            FacetRole::TradeClosePosition => "closePosition(uint256)",
            FacetRole::Liquidate => "liquidate(uint256,address,uint256)",
            FacetRole::Settle => "settle()",
        }
    }

    pub fn selector(self) -> FixedBytes<4> {
        selector(self.representative_signature())
    }
}

impl fmt::Display for FacetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_name())
    }
}

/// Read side of a diamond's loupe.
#[async_trait]
pub trait DiamondLoupeReader: Send + Sync {
    /// Facet currently serving `selector` (zero if unrouted).
    async fn facet_address(&self, selector: FixedBytes<4>) -> Result<Address>;

    /// Every selector routed to `facet`.
    async fn facet_function_selectors(&self, facet: Address) -> Result<Vec<FixedBytes<4>>>;
}

/// Loupe of one deployed market.
pub struct OnChainLoupe {
    market: Address,
    provider: DynProvider,
}

impl OnChainLoupe {
    pub fn new(market: Address, provider: &DynProvider) -> Self {
        Self {
            market,
            provider: provider.clone(),
        }
    }
}

#[async_trait]
impl DiamondLoupeReader for OnChainLoupe {
    async fn facet_address(&self, selector: FixedBytes<4>) -> Result<Address> {
        let loupe = IDiamondLoupe::new(self.market, &self.provider);
        Ok(loupe.facetAddress(selector).call().await?._0)
    }

    async fn facet_function_selectors(&self, facet: Address) -> Result<Vec<FixedBytes<4>>> {
        let loupe = IDiamondLoupe::new(self.market, &self.provider);
        Ok(loupe.facetFunctionSelectors(facet).call().await?._0)
    }
}

/// Cuts for one diamond plus the roles left alone.
#[derive(Debug, Default, Clone)]
pub struct CutPlan {
    pub cuts: ArrayVec<FacetCut, 8>,
    pub unchanged: SmallVec<[FacetRole; 8]>,
}

impl CutPlan {
    pub fn is_empty(&self) -> bool {
        self.cuts.is_empty()
    }

    /// Selectors moved by all cuts together.
    pub fn selector_count(&self) -> usize {
        self.cuts.iter().map(|c| c.functionSelectors.len()).sum()
    }

    /// `diamondCut(cuts, 0x0, "")`: no initializer.
    pub fn to_call(&self) -> IDiamondCut::diamondCutCall {
        IDiamondCut::diamondCutCall {
            cuts: self.cuts.to_vec(),
            init: Address::ZERO,
            data: Bytes::new(),
        }
    }
}

/// Compare installed facets with `new_facets` and build the replace cuts.
pub async fn plan_facet_cuts<L: DiamondLoupeReader + ?Sized>(
    loupe: &L,
    new_facets: &BTreeMap<FacetRole, Address>,
) -> Result<CutPlan> {
    let mut plan = CutPlan::default();

    for role in FacetRole::ALL {
        let Some(&new_facet) = new_facets.get(&role) else {
            continue;
        };

        let old_facet = loupe
            .facet_address(role.selector())
            .await
            .with_context(|| format!("loupe lookup for {role}"))?;

        if old_facet == new_facet {
            debug!(role = %role, facet = %new_facet, "Facet unchanged");
            plan.unchanged.push(role);
            continue;
        }

        let selectors = loupe
            .facet_function_selectors(old_facet)
            .await
            .with_context(|| format!("selectors of {role} at {old_facet}"))?;
        if selectors.is_empty() {
            warn!(role = %role, old = %old_facet, "No selectors routed to installed facet, not cutting");
            plan.unchanged.push(role);
            continue;
        }

        info!(
            role = %role,
            old = %old_facet,
            new = %new_facet,
            selectors = selectors.len(),
            "Replacing facet"
        );
        plan.cuts.push(FacetCut {
            facetAddress: new_facet,
            action: FacetCutAction::Replace.as_u8(),
            functionSelectors: selectors,
        });
    }

    Ok(plan)
}

/// What a hotfix run changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HotfixReport {
    pub markets_cut: Vec<Address>,
    pub markets_unchanged: Vec<Address>,
}

/// Redeploy changed facets and cut them into every market.
pub struct HotfixFacets;

impl HotfixFacets {
    #[instrument(skip_all, name = "hotfix_facets")]
    pub async fn apply(ctx: &DeployContext) -> Result<HotfixReport> {
        let mut new_facets = BTreeMap::new();
        for role in FacetRole::ALL {
            let deployed = ctx
                .deploy(role.artifact_name(), DeployOptions::default())
                .await?;
            new_facets.insert(role, deployed.address);
        }

        let factory = ctx.tasks.factory_address()?;
        let markets = IChromaticMarketFactory::new(factory, ctx.tasks.provider())
            .getMarkets()
            .call()
            .await
            .context("factory.getMarkets")?
            ._0;
        info!(markets = markets.len(), "Planning facet cuts");

        let mut report = HotfixReport::default();
        for market in markets {
            let loupe = OnChainLoupe::new(market, ctx.tasks.provider());
            let plan = plan_facet_cuts(&loupe, &new_facets)
                .await
                .with_context(|| format!("planning cuts for market {market}"))?;

            if plan.is_empty() {
                info!(market = %market, "All facets current, no cut");
                report.markets_unchanged.push(market);
                continue;
            }

            info!(
                market = %market,
                cuts = plan.cuts.len(),
                selectors = plan.selector_count(),
                "Applying diamond cut"
            );
            ctx.execute("market.diamondCut", market, plan.to_call())
                .await?;
            report.markets_cut.push(market);
        }

        info!(
            cut = report.markets_cut.len(),
            unchanged = report.markets_unchanged.len(),
            "Hotfix finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl DeployStep for HotfixFacets {
    fn id(&self) -> &'static str {
        "hotfix_facets"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["hotfix"]
    }

    fn manual(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &DeployContext) -> Result<()> {
        Self::apply(ctx).await.map(|_| ())
    }
}
