//! Keeper automation tasks (`upkeep`, `upkeep:*`).
//!
//! Two automation clients are involved. The vault's earning distributor
//! registers maker (per settlement token) and market earning distribution
//! tasks, and the factory's market settlement registers one settlement task
//! per market. Each client is bound to an automate registry whose task
//! treasury holds the ETH that pays for executions.

use super::{TaskContext, TaskOutcome};
use crate::math::format_amount;
use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use chromatic_chain::contracts::{
    IAutomate, IChromaticMarketFactory, IChromaticVault, IMarketSettlement, ITaskTreasury,
    IVaultEarningDistributor,
};
use chromatic_chain::ETH_SENTINEL;
use colored::Colorize;
use tracing::{info, instrument};

/// Addresses behind the two automation clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpkeepContracts {
    pub factory: Address,
    pub vault: Address,
    pub distributor: Address,
    pub distributor_automate: Address,
    pub distributor_treasury: Address,
    pub market_settlement: Address,
    pub settlement_automate: Address,
    pub settlement_treasury: Address,
}

impl UpkeepContracts {
    /// vault -> distributor -> automate -> treasury and
    /// factory -> market settlement -> automate -> treasury.
    pub async fn resolve(tasks: &TaskContext) -> Result<Self> {
        let provider = tasks.provider();
        let factory = tasks.factory_address()?;
        let instance = IChromaticMarketFactory::new(factory, provider);

        let vault = instance.vault().call().await?._0;
        let distributor = IChromaticVault::new(vault, provider)
            .earningDistributor()
            .call()
            .await
            .context("vault.earningDistributor")?
            ._0;
        let distributor_automate = IVaultEarningDistributor::new(distributor, provider)
            .automate()
            .call()
            .await
            .context("distributor.automate")?
            ._0;
        let distributor_treasury = IAutomate::new(distributor_automate, provider)
            .taskTreasury()
            .call()
            .await
            .context("automate.taskTreasury")?
            ._0;

        let market_settlement = instance.marketSettlement().call().await?._0;
        let settlement_automate = IMarketSettlement::new(market_settlement, provider)
            .automate()
            .call()
            .await
            .context("marketSettlement.automate")?
            ._0;
        let settlement_treasury = IAutomate::new(settlement_automate, provider)
            .taskTreasury()
            .call()
            .await
            .context("automate.taskTreasury")?
            ._0;

        Ok(Self {
            factory,
            vault,
            distributor,
            distributor_automate,
            distributor_treasury,
            market_settlement,
            settlement_automate,
            settlement_treasury,
        })
    }
}

/// A task id, if one is registered.
fn registered(task_id: B256) -> Option<B256> {
    (task_id != B256::ZERO).then_some(task_id)
}

/// Registered automation tasks and treasury balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpkeepReport {
    pub contracts: UpkeepContracts,
    pub distributor_balance: U256,
    pub settlement_balance: U256,
    /// (settlement token, maker earning distribution task)
    pub maker_tasks: Vec<(Address, Option<B256>)>,
    /// (market, market earning distribution task, settlement task)
    pub market_tasks: Vec<(Address, Option<B256>, Option<B256>)>,
}

impl UpkeepReport {
    pub fn registered_count(&self) -> usize {
        let makers = self.maker_tasks.iter().filter(|(_, t)| t.is_some()).count();
        let markets: usize = self
            .market_tasks
            .iter()
            .map(|(_, earning, settlement)| earning.is_some() as usize + settlement.is_some() as usize)
            .sum();
        makers + markets
    }
}

/// `upkeep`: every task the two clients have registered.
#[instrument(skip_all, name = "upkeep")]
pub async fn report(tasks: &TaskContext) -> Result<UpkeepReport> {
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let provider = tasks.provider();
    let factory = IChromaticMarketFactory::new(contracts.factory, provider);
    let distributor = IVaultEarningDistributor::new(contracts.distributor, provider);
    let settlement = IMarketSettlement::new(contracts.market_settlement, provider);

    let mut maker_tasks = Vec::new();
    for token in factory.registeredSettlementTokens().call().await?._0 {
        let id = distributor
            .makerEarningDistributionTaskIds(token)
            .call()
            .await?
            ._0;
        maker_tasks.push((token, registered(id)));
    }

    let mut market_tasks = Vec::new();
    for market in factory.getMarkets().call().await?._0 {
        let earning = distributor
            .marketEarningDistributionTaskIds(market)
            .call()
            .await?
            ._0;
        let settle = settlement.settlementTaskIds(market).call().await?._0;
        market_tasks.push((market, registered(earning), registered(settle)));
    }

    let distributor_balance = ITaskTreasury::new(contracts.distributor_treasury, provider)
        .userTokenBalance(contracts.distributor, ETH_SENTINEL)
        .call()
        .await?
        ._0;
    let settlement_balance = ITaskTreasury::new(contracts.settlement_treasury, provider)
        .userTokenBalance(contracts.market_settlement, ETH_SENTINEL)
        .call()
        .await?
        ._0;

    Ok(UpkeepReport {
        contracts,
        distributor_balance,
        settlement_balance,
        maker_tasks,
        market_tasks,
    })
}

fn task_label(task: Option<B256>) -> String {
    match task {
        Some(id) => id.to_string().green().to_string(),
        None => "none".dimmed().to_string(),
    }
}

pub fn print_report(report: &UpkeepReport) {
    let c = &report.contracts;
    println!("{}", "Vault earning distribution".bright_cyan().bold());
    println!("  distributor {}", c.distributor);
    println!("  automate    {}", c.distributor_automate);
    println!("  treasury    {}", c.distributor_treasury);
    println!(
        "  balance     {} ETH",
        format_amount(report.distributor_balance, 18).bright_white()
    );
    for (token, task) in &report.maker_tasks {
        println!("  maker  {token}  {}", task_label(*task));
    }

    println!("{}", "Market settlement".bright_cyan().bold());
    println!("  settlement  {}", c.market_settlement);
    println!("  automate    {}", c.settlement_automate);
    println!("  treasury    {}", c.settlement_treasury);
    println!(
        "  balance     {} ETH",
        format_amount(report.settlement_balance, 18).bright_white()
    );
    for (market, earning, settle) in &report.market_tasks {
        println!(
            "  market {market}  earning {}  settle {}",
            task_label(*earning),
            task_label(*settle)
        );
    }
}

/// Targets of a create/cancel task; `None` means every known one.
fn targets(only: Option<Address>, all: Vec<Address>) -> Vec<Address> {
    match only {
        Some(address) => vec![address],
        None => all,
    }
}

fn outcome(changed: usize, what: &str) -> TaskOutcome {
    if changed == 0 {
        TaskOutcome::skipped(format!("no {what} to change"))
    } else {
        info!(changed, what, "Upkeep updated");
        TaskOutcome::Done
    }
}

/// `upkeep:vault:maker[:clear]`
#[instrument(skip(tasks), name = "upkeep:vault:maker")]
pub async fn maker_tasks(tasks: &TaskContext, token: Option<Address>, clear: bool) -> Result<TaskOutcome> {
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let factory = IChromaticMarketFactory::new(contracts.factory, tasks.provider());
    let distributor = IVaultEarningDistributor::new(contracts.distributor, tasks.provider());

    let tokens = targets(token, factory.registeredSettlementTokens().call().await?._0);
    let mut changed = 0;
    for token in tokens {
        let existing = registered(
            distributor
                .makerEarningDistributionTaskIds(token)
                .call()
                .await?
                ._0,
        );
        match (existing, clear) {
            (None, false) => {
                let call = IVaultEarningDistributor::createMakerEarningDistributionTaskCall { token };
                tasks
                    .send("distributor.createMakerEarningDistributionTask", contracts.distributor, call)
                    .await?;
                changed += 1;
            }
            (Some(_), true) => {
                let call = IVaultEarningDistributor::cancelMakerEarningDistributionTaskCall { token };
                tasks
                    .send("distributor.cancelMakerEarningDistributionTask", contracts.distributor, call)
                    .await?;
                changed += 1;
            }
            _ => info!(token = %token, registered = existing.is_some(), "Maker task unchanged"),
        }
    }
    Ok(outcome(changed, "maker earning distribution task"))
}

/// `upkeep:vault:market[:clear]`
#[instrument(skip(tasks), name = "upkeep:vault:market")]
pub async fn market_tasks(tasks: &TaskContext, market: Option<Address>, clear: bool) -> Result<TaskOutcome> {
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let factory = IChromaticMarketFactory::new(contracts.factory, tasks.provider());
    let distributor = IVaultEarningDistributor::new(contracts.distributor, tasks.provider());

    let markets = targets(market, factory.getMarkets().call().await?._0);
    let mut changed = 0;
    for market in markets {
        let existing = registered(
            distributor
                .marketEarningDistributionTaskIds(market)
                .call()
                .await?
                ._0,
        );
        match (existing, clear) {
            (None, false) => {
                let call = IVaultEarningDistributor::createMarketEarningDistributionTaskCall { market };
                tasks
                    .send("distributor.createMarketEarningDistributionTask", contracts.distributor, call)
                    .await?;
                changed += 1;
            }
            (Some(_), true) => {
                let call = IVaultEarningDistributor::cancelMarketEarningDistributionTaskCall { market };
                tasks
                    .send("distributor.cancelMarketEarningDistributionTask", contracts.distributor, call)
                    .await?;
                changed += 1;
            }
            _ => info!(market = %market, registered = existing.is_some(), "Market task unchanged"),
        }
    }
    Ok(outcome(changed, "market earning distribution task"))
}

/// `upkeep:settlement[:clear]`
#[instrument(skip(tasks), name = "upkeep:settlement")]
pub async fn settlement_tasks(
    tasks: &TaskContext,
    market: Option<Address>,
    clear: bool,
) -> Result<TaskOutcome> {
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let factory = IChromaticMarketFactory::new(contracts.factory, tasks.provider());
    let settlement = IMarketSettlement::new(contracts.market_settlement, tasks.provider());

    let markets = targets(market, factory.getMarkets().call().await?._0);
    let mut changed = 0;
    for market in markets {
        let existing = registered(settlement.settlementTaskIds(market).call().await?._0);
        match (existing, clear) {
            (None, false) => {
                let call = IMarketSettlement::createSettlementTaskCall { market };
                tasks
                    .send("marketSettlement.createSettlementTask", contracts.market_settlement, call)
                    .await?;
                changed += 1;
            }
            (Some(_), true) => {
                let call = IMarketSettlement::cancelSettlementTaskCall { market };
                tasks
                    .send("marketSettlement.cancelSettlementTask", contracts.market_settlement, call)
                    .await?;
                changed += 1;
            }
            _ => info!(market = %market, registered = existing.is_some(), "Settlement task unchanged"),
        }
    }
    Ok(outcome(changed, "settlement task"))
}

/// `upkeep:clear`: cancel every registered task of both clients.
#[instrument(skip_all, name = "upkeep:clear")]
pub async fn clear_all(tasks: &TaskContext) -> Result<TaskOutcome> {
    let results = [
        maker_tasks(tasks, None, true).await?,
        market_tasks(tasks, None, true).await?,
        settlement_tasks(tasks, None, true).await?,
    ];
    if results.iter().any(TaskOutcome::is_done) {
        Ok(TaskOutcome::Done)
    } else {
        Ok(TaskOutcome::skipped("no registered upkeep"))
    }
}

/// `upkeep:settlement:balance`: ETH the market settlement holds in its treasury.
pub async fn settlement_balance(tasks: &TaskContext) -> Result<U256> {
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let balance = ITaskTreasury::new(contracts.settlement_treasury, tasks.provider())
        .userTokenBalance(contracts.market_settlement, ETH_SENTINEL)
        .call()
        .await?
        ._0;
    println!(
        "{} {} ETH",
        "Settlement treasury balance:".bright_cyan(),
        format_amount(balance, 18).bright_white()
    );
    Ok(balance)
}

/// `upkeep:settlement:deposit`: fund the market settlement's treasury.
#[instrument(skip(tasks), name = "upkeep:settlement:deposit")]
pub async fn settlement_deposit(tasks: &TaskContext, amount: U256) -> Result<TaskOutcome> {
    if amount.is_zero() {
        return Ok(TaskOutcome::skipped("deposit amount is zero"));
    }
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let call = ITaskTreasury::depositFundsCall {
        receiver: contracts.market_settlement,
        token: ETH_SENTINEL,
        amount,
    };
    tasks
        .send_with_value("taskTreasury.depositFunds", contracts.settlement_treasury, call, amount)
        .await?;
    Ok(TaskOutcome::Done)
}

/// `upkeep:settlement:withdraw`: pull funds back from the treasury.
#[instrument(skip(tasks), name = "upkeep:settlement:withdraw")]
pub async fn settlement_withdraw(tasks: &TaskContext, amount: U256) -> Result<TaskOutcome> {
    if amount.is_zero() {
        return Ok(TaskOutcome::skipped("withdraw amount is zero"));
    }
    let contracts = UpkeepContracts::resolve(tasks).await?;
    let balance = ITaskTreasury::new(contracts.settlement_treasury, tasks.provider())
        .userTokenBalance(contracts.market_settlement, ETH_SENTINEL)
        .call()
        .await?
        ._0;
    if balance < amount {
        return Ok(TaskOutcome::skipped(format!(
            "treasury holds {} ETH, less than {}",
            format_amount(balance, 18),
            format_amount(amount, 18)
        )));
    }
    let call = IMarketSettlement::withdrawTaskFundsCall { amount };
    tasks
        .send("marketSettlement.withdrawTaskFunds", contracts.market_settlement, call)
        .await?;
    Ok(TaskOutcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contracts() -> UpkeepContracts {
        UpkeepContracts {
            factory: Address::repeat_byte(1),
            vault: Address::repeat_byte(2),
            distributor: Address::repeat_byte(3),
            distributor_automate: Address::repeat_byte(4),
            distributor_treasury: Address::repeat_byte(5),
            market_settlement: Address::repeat_byte(6),
            settlement_automate: Address::repeat_byte(7),
            settlement_treasury: Address::repeat_byte(8),
        }
    }

    #[test]
    fn test_zero_task_id_is_unregistered() {
        assert_eq!(registered(B256::ZERO), None);
        assert_eq!(registered(B256::repeat_byte(1)), Some(B256::repeat_byte(1)));
    }

    #[test]
    fn test_targets() {
        let all = vec![Address::repeat_byte(1), Address::repeat_byte(2)];
        assert_eq!(targets(None, all.clone()), all);
        assert_eq!(
            targets(Some(Address::repeat_byte(9)), all),
            vec![Address::repeat_byte(9)]
        );
    }

    #[test]
    fn test_registered_count() {
        let report = UpkeepReport {
            contracts: contracts(),
            distributor_balance: U256::ZERO,
            settlement_balance: U256::ZERO,
            maker_tasks: vec![
                (Address::repeat_byte(10), Some(B256::repeat_byte(1))),
                (Address::repeat_byte(11), None),
            ],
            market_tasks: vec![(
                Address::repeat_byte(12),
                Some(B256::repeat_byte(2)),
                Some(B256::repeat_byte(3)),
            )],
        };
        assert_eq!(report.registered_count(), 3);
    }
}
