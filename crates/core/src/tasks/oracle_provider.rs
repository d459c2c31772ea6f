//! `oracle-provider:register` and `oracle-provider:list`.

use super::{TaskContext, TaskOutcome};
use crate::config::OracleProviderDefaults;
use alloy::primitives::Address;
use anyhow::{Context, Result};
use chromatic_chain::contracts::{IChromaticMarketFactory, IOracleProvider, OracleProviderProperties};
use colored::Colorize;
use futures::future::try_join_all;
use tracing::{info, instrument};

/// Properties for a newly registered oracle provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterArgs {
    pub min_take_profit_bps: u32,
    pub max_take_profit_bps: u32,
    pub leverage_level: u8,
}

impl RegisterArgs {
    pub fn from_defaults(defaults: &OracleProviderDefaults) -> Self {
        Self {
            min_take_profit_bps: defaults.min_take_profit_bps,
            max_take_profit_bps: defaults.max_take_profit_bps,
            leverage_level: defaults.leverage_level,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_take_profit_bps > self.max_take_profit_bps {
            anyhow::bail!(
                "min take-profit {} bps exceeds max {} bps",
                self.min_take_profit_bps,
                self.max_take_profit_bps
            );
        }
        if self.leverage_level > 1 {
            anyhow::bail!("leverage level must be 0 or 1, got {}", self.leverage_level);
        }
        Ok(())
    }

    fn properties(&self) -> OracleProviderProperties {
        OracleProviderProperties {
            minTakeProfitBPS: self.min_take_profit_bps,
            maxTakeProfitBPS: self.max_take_profit_bps,
            leverageLevel: self.leverage_level,
        }
    }
}

/// Register `oracle_provider` unless the factory already knows it.
#[instrument(skip(tasks, args), name = "oracle-provider:register")]
pub async fn register(
    tasks: &TaskContext,
    oracle_provider: Address,
    args: RegisterArgs,
) -> Result<TaskOutcome> {
    args.validate()?;

    let address = tasks.factory_address()?;
    let factory = IChromaticMarketFactory::new(address, tasks.provider());
    if factory
        .isRegisteredOracleProvider(oracle_provider)
        .call()
        .await?
        ._0
    {
        return Ok(TaskOutcome::skipped(format!(
            "oracle provider {oracle_provider} already registered"
        )));
    }

    let call = IChromaticMarketFactory::registerOracleProviderCall {
        oracleProvider: oracle_provider,
        properties: args.properties(),
    };
    tasks
        .send("factory.registerOracleProvider", address, call)
        .await?;
    info!(
        oracle_provider = %oracle_provider,
        min_take_profit_bps = args.min_take_profit_bps,
        max_take_profit_bps = args.max_take_profit_bps,
        leverage_level = args.leverage_level,
        "Oracle provider registered"
    );
    Ok(TaskOutcome::Done)
}

/// One registered oracle provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleProviderReport {
    pub address: Address,
    pub description: String,
    pub min_take_profit_bps: u32,
    pub max_take_profit_bps: u32,
    pub leverage_level: u8,
}

/// Registered providers with their properties.
#[instrument(skip_all, name = "oracle-provider:list")]
pub async fn list(tasks: &TaskContext) -> Result<Vec<OracleProviderReport>> {
    let factory = IChromaticMarketFactory::new(tasks.factory_address()?, tasks.provider());
    let providers = factory.registeredOracleProviders().call().await?._0;
    let factory = &factory;

    let reports = providers.into_iter().map(|provider| async move {
        let properties = factory
            .getOracleProviderProperties(provider)
            .call()
            .await
            .with_context(|| format!("properties of {provider}"))?
            ._0;
        // Feeds without a description are still listed
        let description = IOracleProvider::new(provider, tasks.provider())
            .description()
            .call()
            .await
            .map(|r| r._0)
            .unwrap_or_default();
        Ok::<_, anyhow::Error>(OracleProviderReport {
            address: provider,
            description,
            min_take_profit_bps: properties.minTakeProfitBPS,
            max_take_profit_bps: properties.maxTakeProfitBPS,
            leverage_level: properties.leverageLevel,
        })
    });
    try_join_all(reports).await
}

pub fn print_report(reports: &[OracleProviderReport]) {
    if reports.is_empty() {
        println!("{}", "No oracle providers registered".yellow());
        return;
    }
    println!("{}", "Oracle providers".bright_cyan().bold());
    for r in reports {
        println!(
            "  {} {}  take-profit {}..{} bps  leverage level {}",
            r.address.to_string().bright_white(),
            r.description.green(),
            r.min_take_profit_bps,
            r.max_take_profit_bps,
            r.leverage_level
        );
    }
}
