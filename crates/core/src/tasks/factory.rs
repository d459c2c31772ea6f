//! `factory:set` and `market:create`.

use super::{TaskContext, TaskOutcome};
use alloy::primitives::Address;
use anyhow::Result;
use chromatic_chain::contracts::IChromaticMarketFactory;
use tracing::{debug, info, instrument};

/// Addresses to install on the factory; `None` leaves a setting alone.
#[derive(Debug, Clone, Default)]
pub struct FactorySetArgs {
    pub dao: Option<Address>,
    pub treasury: Option<Address>,
    pub vault: Option<Address>,
    pub liquidator: Option<Address>,
    pub keeper_fee_payer: Option<Address>,
    pub market_settlement: Option<Address>,
}

impl FactorySetArgs {
    pub fn is_empty(&self) -> bool {
        self.dao.is_none()
            && self.treasury.is_none()
            && self.vault.is_none()
            && self.liquidator.is_none()
            && self.keeper_fee_payer.is_none()
            && self.market_settlement.is_none()
    }
}

/// One setter call per provided address that differs from the factory's.
#[instrument(skip_all, name = "factory:set")]
pub async fn set(tasks: &TaskContext, args: &FactorySetArgs) -> Result<TaskOutcome> {
    if args.is_empty() {
        return Ok(TaskOutcome::skipped("no factory setting given"));
    }

    let address = tasks.factory_address()?;
    let factory = IChromaticMarketFactory::new(address, tasks.provider());
    let mut changed = 0usize;

    if let Some(dao) = args.dao {
        if factory.dao().call().await?._0 != dao {
            let call = IChromaticMarketFactory::updateDaoCall { dao };
            tasks.send("factory.updateDao", address, call).await?;
            changed += 1;
        }
    }
    if let Some(treasury) = args.treasury {
        if factory.treasury().call().await?._0 != treasury {
            let call = IChromaticMarketFactory::updateTreasuryCall { treasury };
            tasks.send("factory.updateTreasury", address, call).await?;
            changed += 1;
        }
    }
    if let Some(vault) = args.vault {
        if factory.vault().call().await?._0 != vault {
            let call = IChromaticMarketFactory::setVaultCall { vault };
            tasks.send("factory.setVault", address, call).await?;
            changed += 1;
        }
    }
    if let Some(liquidator) = args.liquidator {
        if factory.liquidator().call().await?._0 != liquidator {
            let call = IChromaticMarketFactory::setLiquidatorCall { liquidator };
            tasks.send("factory.setLiquidator", address, call).await?;
            changed += 1;
        }
    }
    if let Some(keeper_fee_payer) = args.keeper_fee_payer {
        if factory.keeperFeePayer().call().await?._0 != keeper_fee_payer {
            let call = IChromaticMarketFactory::setKeeperFeePayerCall {
                keeperFeePayer: keeper_fee_payer,
            };
            tasks.send("factory.setKeeperFeePayer", address, call).await?;
            changed += 1;
        }
    }
    if let Some(market_settlement) = args.market_settlement {
        if factory.marketSettlement().call().await?._0 != market_settlement {
            let call = IChromaticMarketFactory::setMarketSettlementCall {
                marketSettlement: market_settlement,
            };
            tasks.send("factory.setMarketSettlement", address, call).await?;
            changed += 1;
        }
    }

    if changed == 0 {
        return Ok(TaskOutcome::skipped("factory already holds the given addresses"));
    }
    info!(changed, "Factory updated");
    Ok(TaskOutcome::Done)
}

/// Existing market for the pair, if any.
pub async fn find_market(
    tasks: &TaskContext,
    oracle_provider: Address,
    settlement_token: Address,
) -> Result<Option<Address>> {
    let factory = IChromaticMarketFactory::new(tasks.factory_address()?, tasks.provider());
    // getMarket reverts for an unknown pair on some factory versions
    match factory.getMarket(oracle_provider, settlement_token).call().await {
        Ok(ret) if ret._0 != Address::ZERO => Ok(Some(ret._0)),
        Ok(_) => Ok(None),
        Err(e) => {
            debug!(error = %e, "getMarket failed, treating pair as unmarketed");
            Ok(None)
        }
    }
}

/// Create the market for a registered oracle provider and settlement token.
#[instrument(skip(tasks), name = "market:create")]
pub async fn create_market(
    tasks: &TaskContext,
    oracle_provider: Address,
    settlement_token: Address,
) -> Result<TaskOutcome> {
    let address = tasks.factory_address()?;
    let factory = IChromaticMarketFactory::new(address, tasks.provider());

    if !factory
        .isRegisteredOracleProvider(oracle_provider)
        .call()
        .await?
        ._0
    {
        return Ok(TaskOutcome::skipped(format!(
            "oracle provider {oracle_provider} is not registered"
        )));
    }
    if !factory
        .isRegisteredSettlementToken(settlement_token)
        .call()
        .await?
        ._0
    {
        return Ok(TaskOutcome::skipped(format!(
            "settlement token {settlement_token} is not registered"
        )));
    }
    if let Some(market) = find_market(tasks, oracle_provider, settlement_token).await? {
        return Ok(TaskOutcome::skipped(format!("market already exists at {market}")));
    }

    let call = IChromaticMarketFactory::createMarketCall {
        oracleProvider: oracle_provider,
        settlementToken: settlement_token,
    };
    tasks.send("factory.createMarket", address, call).await?;

    if let Some(market) = find_market(tasks, oracle_provider, settlement_token).await? {
        info!(market = %market, "Market created");
    }
    Ok(TaskOutcome::Done)
}
