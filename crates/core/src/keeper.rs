//! Liquidation keeper simulation.
//!
//! Replays a scripted oracle price sequence. After each price push the
//! keeper polls every watched account's open positions once, asks the
//! market whether each is liquidatable and liquidates the ones that are.
//! There is no backoff and no retry: one check per position per step.

use crate::config::AmbientEnv;
use crate::deploy::steps::ROUTER;
use crate::math::{format_amount, parse_signed_amount, PRICE_DECIMALS};
use crate::session::WALLET_NAMES;
use crate::tasks::{build_sender, parse_address, TaskContext};
use alloy::primitives::{Address, B256, I256, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromatic_chain::contracts::{
    IChromaticLiquidator, IChromaticMarket, IChromaticMarketFactory, IChromaticRouter,
    IOracleProviderMock,
};
use chromatic_chain::{revert, TransactionSender};
use colored::Colorize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Position queries and liquidation for one market.
#[async_trait]
pub trait KeeperMarket: Send + Sync {
    /// Open position ids owned by `account`.
    async fn position_ids(&self, account: Address) -> Result<Vec<U256>>;

    async fn check_liquidation(&self, position_id: U256) -> Result<bool>;

    /// Liquidate and return the transaction hash.
    async fn liquidate(&self, position_id: U256) -> Result<B256>;
}

/// Pushes oracle prices.
#[async_trait]
pub trait PriceDriver: Send + Sync {
    async fn set_price(&self, price: I256) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Liquidation {
    pub account: Address,
    pub position_id: U256,
    pub tx_hash: B256,
}

/// A liquidation that reverted, e.g. because the position was closed
/// between the check and the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLiquidation {
    pub account: Address,
    pub position_id: U256,
    pub reason: String,
}

/// What happened at one scripted price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperStep {
    pub price: I256,
    /// Positions checked at this price
    pub checked: usize,
    pub liquidated: Vec<Liquidation>,
    pub failed: Vec<FailedLiquidation>,
}

pub struct KeeperSimulation<'a, M: ?Sized, P: ?Sized> {
    market: &'a M,
    driver: &'a P,
}

impl<'a, M, P> KeeperSimulation<'a, M, P>
where
    M: KeeperMarket + ?Sized,
    P: PriceDriver + ?Sized,
{
    pub fn new(market: &'a M, driver: &'a P) -> Self {
        Self { market, driver }
    }

    /// Run every price step in order.
    pub async fn run(&self, prices: &[I256], accounts: &[Address]) -> Result<Vec<KeeperStep>> {
        let mut steps = Vec::with_capacity(prices.len());
        for (index, price) in prices.iter().enumerate() {
            self.driver
                .set_price(*price)
                .await
                .with_context(|| format!("price step {index}"))?;
            let step = self.poll(*price, accounts).await?;
            info!(
                step = index,
                price = %format_amount(*price, PRICE_DECIMALS),
                checked = step.checked,
                liquidated = step.liquidated.len(),
                "Keeper step"
            );
            steps.push(step);
        }
        Ok(steps)
    }

    async fn poll(&self, price: I256, accounts: &[Address]) -> Result<KeeperStep> {
        let mut seen = BTreeSet::new();
        let mut step = KeeperStep {
            price,
            checked: 0,
            liquidated: Vec::new(),
            failed: Vec::new(),
        };

        for &account in accounts {
            let ids = self
                .market
                .position_ids(account)
                .await
                .with_context(|| format!("position ids of {account}"))?;
            for id in ids {
                if !seen.insert(id) {
                    continue;
                }
                step.checked += 1;
                if !self.market.check_liquidation(id).await? {
                    continue;
                }
                match self.market.liquidate(id).await {
                    Ok(tx_hash) => {
                        debug!(account = %account, position_id = %id, tx_hash = %tx_hash, "Liquidated");
                        step.liquidated.push(Liquidation {
                            account,
                            position_id: id,
                            tx_hash,
                        });
                    }
                    Err(e) => {
                        let reason = revert::describe(&e);
                        warn!(account = %account, position_id = %id, error = %reason, "Liquidation failed");
                        step.failed.push(FailedLiquidation {
                            account,
                            position_id: id,
                            reason,
                        });
                    }
                }
            }
        }
        Ok(step)
    }
}

/// Market reads plus liquidation through the market's liquidator.
pub struct OnChainKeeper {
    market: Address,
    router: Address,
    liquidator: Address,
    sender: Arc<TransactionSender>,
}

impl OnChainKeeper {
    pub fn new(market: Address, router: Address, liquidator: Address, sender: Arc<TransactionSender>) -> Self {
        Self {
            market,
            router,
            liquidator,
            sender,
        }
    }

    pub fn market(&self) -> Address {
        self.market
    }
}

#[async_trait]
impl KeeperMarket for OnChainKeeper {
    async fn position_ids(&self, account: Address) -> Result<Vec<U256>> {
        Ok(IChromaticRouter::new(self.router, self.sender.provider())
            .getPositionIds(self.market)
            .from(account)
            .call()
            .await?
            ._0)
    }

    async fn check_liquidation(&self, position_id: U256) -> Result<bool> {
        Ok(IChromaticMarket::new(self.market, self.sender.provider())
            .checkLiquidation(position_id)
            .call()
            .await?
            ._0)
    }

    async fn liquidate(&self, position_id: U256) -> Result<B256> {
        let call = IChromaticLiquidator::liquidateCall {
            market: self.market,
            positionId: position_id,
        };
        let receipt = self.sender.send_call(self.liquidator, &call, U256::ZERO).await?;
        Ok(receipt.transaction_hash)
    }
}

/// `increaseVersion` on the oracle provider mock.
pub struct OracleMockDriver {
    oracle_provider: Address,
    sender: Arc<TransactionSender>,
}

impl OracleMockDriver {
    pub fn new(oracle_provider: Address, sender: Arc<TransactionSender>) -> Self {
        Self {
            oracle_provider,
            sender,
        }
    }
}

#[async_trait]
impl PriceDriver for OracleMockDriver {
    async fn set_price(&self, price: I256) -> Result<()> {
        let call = IOracleProviderMock::increaseVersionCall { price };
        self.sender
            .send_call(self.oracle_provider, &call, U256::ZERO)
            .await
            .context("oracleProvider.increaseVersion")?;
        Ok(())
    }
}

/// Parse `1800,1750.5,...` into 18-decimal prices.
pub fn parse_prices(list: &str) -> Result<Vec<I256>> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| parse_signed_amount(p, PRICE_DECIMALS).with_context(|| format!("price '{p}'")))
        .collect()
}

/// A wallet name from the session set, or a hex address.
async fn resolve_account(tasks: &TaskContext, account: &str) -> Result<Address> {
    if account.starts_with("0x") {
        return parse_address("accounts", account);
    }
    let index = WALLET_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(account))
        .with_context(|| format!("unknown wallet '{account}'"))?;
    if index == 0 {
        return Ok(tasks.deployer());
    }
    Ok(build_sender(&tasks.network, AmbientEnv::get(), index as u32).await?.address)
}

/// `keeper`: drive the mock oracle through `prices` and liquidate as needed.
///
/// `accounts` falls back to the configured keeper accounts.
#[instrument(skip_all, name = "keeper")]
pub async fn run(
    tasks: &TaskContext,
    market: Option<Address>,
    prices: &[I256],
    accounts: &[String],
) -> Result<Vec<KeeperStep>> {
    let market = match market {
        Some(market) => market,
        None => IChromaticMarketFactory::new(tasks.factory_address()?, tasks.provider())
            .getMarkets()
            .call()
            .await?
            ._0
            .first()
            .copied()
            .context("factory has no markets, run `deploy` first")?,
    };
    let instance = IChromaticMarket::new(market, tasks.provider());
    let liquidator = instance.liquidator().call().await?._0;
    let oracle_provider = instance.oracleProvider().call().await?._0;

    let names = if accounts.is_empty() {
        tasks.protocol.keeper.accounts.as_slice()
    } else {
        accounts
    };
    let mut watched = Vec::with_capacity(names.len());
    for name in names {
        watched.push(resolve_account(tasks, name).await?);
    }
    info!(
        market = %market,
        liquidator = %liquidator,
        accounts = watched.len(),
        steps = prices.len(),
        "Keeper simulation starting"
    );

    let keeper = OnChainKeeper::new(
        market,
        tasks.deployments.require(ROUTER)?,
        liquidator,
        tasks.sender.clone(),
    );
    let driver = OracleMockDriver::new(oracle_provider, tasks.sender.clone());
    let steps = KeeperSimulation::new(&keeper, &driver).run(prices, &watched).await?;
    print_steps(&steps);
    Ok(steps)
}

pub fn print_steps(steps: &[KeeperStep]) {
    for (index, step) in steps.iter().enumerate() {
        println!(
            "{} price {}  checked {}",
            format!("#{index}").bright_cyan(),
            format_amount(step.price, PRICE_DECIMALS).bright_white(),
            step.checked
        );
        for l in &step.liquidated {
            println!(
                "    {} position #{} of {} ({})",
                "liquidated".red().bold(),
                l.position_id,
                l.account,
                l.tx_hash
            );
        }
        for f in &step.failed {
            println!(
                "    {} position #{} of {}: {}",
                "failed".yellow().bold(),
                f.position_id,
                f.account,
                f.reason
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    fn price(p: i64) -> I256 {
        I256::try_from(p).unwrap() * I256::try_from(10i64.pow(18)).unwrap()
    }

    /// Long positions liquidated once the price falls to their threshold.
    #[derive(Default)]
    struct FakeMarket {
        price: Mutex<I256>,
        positions: Mutex<BTreeMap<Address, Vec<(U256, I256)>>>,
        checks: Mutex<Vec<U256>>,
        /// Liquidations of these ids revert
        reverting: Mutex<Vec<U256>>,
    }

    impl FakeMarket {
        fn open(&self, account: Address, id: u64, liquidation_price: i64) {
            self.positions
                .lock()
                .entry(account)
                .or_default()
                .push((U256::from(id), price(liquidation_price)));
        }
    }

    #[async_trait]
    impl KeeperMarket for FakeMarket {
        async fn position_ids(&self, account: Address) -> Result<Vec<U256>> {
            Ok(self
                .positions
                .lock()
                .get(&account)
                .map(|p| p.iter().map(|(id, _)| *id).collect())
                .unwrap_or_default())
        }

        async fn check_liquidation(&self, position_id: U256) -> Result<bool> {
            self.checks.lock().push(position_id);
            let current = *self.price.lock();
            Ok(self
                .positions
                .lock()
                .values()
                .flatten()
                .any(|(id, threshold)| *id == position_id && current <= *threshold))
        }

        async fn liquidate(&self, position_id: U256) -> Result<B256> {
            if self.reverting.lock().contains(&position_id) {
                anyhow::bail!("execution reverted: NotLiquidatable");
            }
            for positions in self.positions.lock().values_mut() {
                positions.retain(|(id, _)| *id != position_id);
            }
            Ok(B256::with_last_byte(position_id.to::<u8>()))
        }
    }

    #[async_trait]
    impl PriceDriver for FakeMarket {
        async fn set_price(&self, price: I256) -> Result<()> {
            if price.is_negative() {
                anyhow::bail!("negative price");
            }
            *self.price.lock() = price;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_liquidates_as_price_falls() {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let market = FakeMarket::default();
        market.open(alice, 1, 85);
        market.open(bob, 2, 95);

        let steps = KeeperSimulation::new(&market, &market)
            .run(&[price(100), price(90), price(80)], &[alice, bob])
            .await
            .unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].checked, 2);
        assert!(steps[0].liquidated.is_empty());
        assert_eq!(steps[1].checked, 2);
        assert_eq!(steps[1].liquidated.len(), 1);
        assert_eq!(steps[1].liquidated[0].account, bob);
        assert_eq!(steps[1].liquidated[0].position_id, U256::from(2u64));
        assert_eq!(steps[2].checked, 1);
        assert_eq!(steps[2].liquidated[0].position_id, U256::from(1u64));
        assert_eq!(steps[2].liquidated[0].tx_hash, B256::with_last_byte(1));
    }

    #[tokio::test]
    async fn test_one_check_per_position_per_step() {
        let alice = Address::repeat_byte(0xa1);
        let market = FakeMarket::default();
        market.open(alice, 7, 10);

        // Same account listed twice
        let steps = KeeperSimulation::new(&market, &market)
            .run(&[price(100), price(50)], &[alice, alice])
            .await
            .unwrap();

        assert_eq!(steps.iter().map(|s| s.checked).sum::<usize>(), 2);
        assert_eq!(market.checks.lock().len(), 2);
        assert!(steps.iter().all(|s| s.liquidated.is_empty()));
    }

    #[tokio::test]
    async fn test_reverted_liquidation_does_not_stop_the_run() {
        let alice = Address::repeat_byte(0xa1);
        let bob = Address::repeat_byte(0xb0);
        let market = FakeMarket::default();
        market.open(alice, 1, 95);
        market.open(bob, 2, 95);
        market.open(bob, 3, 85);
        market.reverting.lock().push(U256::from(1u64));

        let steps = KeeperSimulation::new(&market, &market)
            .run(&[price(90), price(80)], &[alice, bob])
            .await
            .unwrap();

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].failed.len(), 1);
        assert_eq!(steps[0].failed[0].account, alice);
        assert_eq!(steps[0].failed[0].position_id, U256::from(1u64));
        assert!(steps[0].failed[0].reason.contains("NotLiquidatable"));
        // bob's position after the failed one is still liquidated
        assert_eq!(steps[0].liquidated.len(), 1);
        assert_eq!(steps[0].liquidated[0].position_id, U256::from(2u64));

        // the failed position is retried at the next step, and later steps still run
        assert_eq!(steps[1].failed.len(), 1);
        assert_eq!(steps[1].liquidated.len(), 1);
        assert_eq!(steps[1].liquidated[0].position_id, U256::from(3u64));
    }

    #[tokio::test]
    async fn test_driver_error_stops_the_run() {
        let market = FakeMarket::default();
        let err = KeeperSimulation::new(&market, &market)
            .run(&[price(100), price(-1)], &[])
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("price step 1"));
    }

    #[test]
    fn test_parse_prices() {
        let prices = parse_prices("100, 90.5,,80").unwrap();
        assert_eq!(prices.len(), 3);
        assert_eq!(prices[0], price(100));
        assert_eq!(prices[1], price(90) + price(1) / I256::try_from(2).unwrap());
        assert!(parse_prices("100,abc").is_err());
    }
}
