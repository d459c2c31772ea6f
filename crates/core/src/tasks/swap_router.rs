//! `fixed-price-swap-router:*` tasks for the mock swap router used on test networks.

use super::{TaskContext, TaskOutcome};
use crate::deploy::steps::FIXED_PRICE_SWAP_ROUTER;
use crate::math::{format_amount, parse_amount};
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use chromatic_chain::contracts::{IChromaticMarketFactory, IFixedPriceSwapRouter, IERC20};
use colored::Colorize;
use tracing::{info, instrument, warn};

/// Configured router, else the one `1_deploy_mocks` recorded.
pub fn router_address(tasks: &TaskContext) -> Option<Address> {
    tasks
        .network
        .network
        .external
        .fixed_price_swap_router
        .or_else(|| tasks.deployments.address(FIXED_PRICE_SWAP_ROUTER))
}

async fn decimals(tasks: &TaskContext, token: Address) -> Result<u8> {
    Ok(IERC20::new(token, tasks.provider())
        .decimals()
        .call()
        .await
        .with_context(|| format!("decimals of {token}"))?
        ._0)
}

/// `price`: token amount one ETH buys, per token.
#[instrument(skip(tasks), name = "fixed-price-swap-router:price")]
pub async fn price(tasks: &TaskContext, token: Option<Address>) -> Result<Vec<(Address, U256)>> {
    let Some(router) = router_address(tasks) else {
        warn!("No fixed price swap router on this network");
        return Ok(Vec::new());
    };
    let tokens = match token {
        Some(token) => vec![token],
        None => {
            IChromaticMarketFactory::new(tasks.factory_address()?, tasks.provider())
                .registeredSettlementTokens()
                .call()
                .await?
                ._0
        }
    };

    let instance = IFixedPriceSwapRouter::new(router, tasks.provider());
    let mut prices = Vec::with_capacity(tokens.len());
    for token in tokens {
        let price = instance.ethPrice(token).call().await?._0;
        let decimals = decimals(tasks, token).await?;
        println!(
            "{} {} per ETH",
            token.to_string().bright_white(),
            format_amount(price, decimals).green()
        );
        prices.push((token, price));
    }
    Ok(prices)
}

/// `set-price`: `price` is a decimal token amount per ETH.
#[instrument(skip(tasks), name = "fixed-price-swap-router:set-price")]
pub async fn set_price(tasks: &TaskContext, token: Address, price: &str) -> Result<TaskOutcome> {
    let Some(router) = router_address(tasks) else {
        return Ok(TaskOutcome::skipped("no fixed price swap router on this network"));
    };
    let value = parse_amount(price, decimals(tasks, token).await?).context("--price")?;
    if value.is_zero() {
        anyhow::bail!("--price must be positive");
    }

    let current = IFixedPriceSwapRouter::new(router, tasks.provider())
        .ethPrice(token)
        .call()
        .await?
        ._0;
    if current == value {
        return Ok(TaskOutcome::skipped(format!("price of {token} already {price}")));
    }

    let call = IFixedPriceSwapRouter::setEthPriceCall { token, price: value };
    tasks.send("swapRouter.setEthPrice", router, call).await?;
    info!(token = %token, price = %price, "ETH price set");
    Ok(TaskOutcome::Done)
}

/// `whitelist` / `unwhitelist`
#[instrument(skip(tasks), name = "fixed-price-swap-router:whitelist")]
pub async fn set_whitelisted(tasks: &TaskContext, client: Address, allowed: bool) -> Result<TaskOutcome> {
    let Some(router) = router_address(tasks) else {
        return Ok(TaskOutcome::skipped("no fixed price swap router on this network"));
    };
    if allowed {
        let call = IFixedPriceSwapRouter::addWhitelistedClientCall { client };
        tasks.send("swapRouter.addWhitelistedClient", router, call).await?;
    } else {
        let call = IFixedPriceSwapRouter::removeWhitelistedClientCall { client };
        tasks.send("swapRouter.removeWhitelistedClient", router, call).await?;
    }
    Ok(TaskOutcome::Done)
}
