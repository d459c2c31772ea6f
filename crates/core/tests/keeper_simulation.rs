//! Profit-stop and loss-cut scenarios driven by scripted prices.
//!
//! The fake market settles a liquidated position the way the protocol does:
//! the taker gets back its margin plus PnL, bounded below by losing the whole
//! margin and above by the maker margin.

use std::collections::BTreeMap;

use alloy::primitives::{Address, B256, I256, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromatic_core::fees::pnl;
use chromatic_core::{KeeperMarket, KeeperSimulation, PriceDriver};
use parking_lot::Mutex;

const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);
const CHARLIE: Address = Address::repeat_byte(0xc4);

fn int(v: i64) -> I256 {
    I256::try_from(v).unwrap()
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    owner: Address,
    qty: I256,
    entry_price: I256,
    taker_margin: I256,
    maker_margin: I256,
}

impl OpenPosition {
    fn pnl_at(&self, price: I256) -> I256 {
        pnl(self.qty, self.entry_price, price).unwrap()
    }

    fn crossed(&self, price: I256) -> bool {
        let pnl = self.pnl_at(price);
        pnl >= self.maker_margin || pnl <= -self.taker_margin
    }

    fn settlement(&self, price: I256) -> I256 {
        let pnl = self.pnl_at(price).max(-self.taker_margin).min(self.maker_margin);
        self.taker_margin + pnl
    }
}

#[derive(Default)]
struct ScriptedMarket {
    price: Mutex<I256>,
    next_id: Mutex<u64>,
    positions: Mutex<BTreeMap<U256, OpenPosition>>,
    balances: Mutex<BTreeMap<Address, I256>>,
}

impl ScriptedMarket {
    fn fund(&self, account: Address, amount: i64) {
        self.balances.lock().insert(account, int(amount));
    }

    fn balance(&self, account: Address) -> I256 {
        self.balances.lock().get(&account).copied().unwrap_or_default()
    }

    /// Open at the current price, locking the taker margin.
    fn open(&self, owner: Address, qty: i64, taker_margin: i64, maker_margin: i64) -> U256 {
        let mut next = self.next_id.lock();
        *next += 1;
        let id = U256::from(*next);
        let position = OpenPosition {
            owner,
            qty: int(qty),
            entry_price: *self.price.lock(),
            taker_margin: int(taker_margin),
            maker_margin: int(maker_margin),
        };
        *self.balances.lock().entry(owner).or_default() -= position.taker_margin;
        self.positions.lock().insert(id, position);
        id
    }
}

#[async_trait]
impl KeeperMarket for ScriptedMarket {
    async fn position_ids(&self, account: Address) -> Result<Vec<U256>> {
        Ok(self
            .positions
            .lock()
            .iter()
            .filter(|(_, p)| p.owner == account)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn check_liquidation(&self, position_id: U256) -> Result<bool> {
        let price = *self.price.lock();
        Ok(self
            .positions
            .lock()
            .get(&position_id)
            .is_some_and(|p| p.crossed(price)))
    }

    async fn liquidate(&self, position_id: U256) -> Result<B256> {
        let price = *self.price.lock();
        let position = self
            .positions
            .lock()
            .remove(&position_id)
            .context("position already closed")?;
        *self.balances.lock().entry(position.owner).or_default() += position.settlement(price);
        Ok(B256::with_last_byte(position_id.to::<u8>()))
    }
}

#[async_trait]
impl PriceDriver for ScriptedMarket {
    async fn set_price(&self, price: I256) -> Result<()> {
        *self.price.lock() = price;
        Ok(())
    }
}

fn prices(path: &[i64]) -> Vec<I256> {
    path.iter().map(|p| int(*p)).collect()
}

#[tokio::test]
async fn test_profit_stop_liquidates_at_crossing_step() {
    let market = ScriptedMarket::default();
    market.set_price(int(100)).await.unwrap();
    market.fund(ALICE, 1_000);

    // long: pnl = 10 * (price - 100), profit stop at 105
    let id = market.open(ALICE, 1_000, 100, 50);

    let steps = KeeperSimulation::new(&market, &market)
        .run(&prices(&[101, 104, 106, 90]), &[ALICE])
        .await
        .unwrap();

    let liquidated_at: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.liquidated.is_empty())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(liquidated_at, vec![2]);
    assert_eq!(steps[2].liquidated[0].position_id, id);
    // gone from the position list afterwards
    assert_eq!(steps[3].checked, 0);
    assert!(market.position_ids(ALICE).await.unwrap().is_empty());
    assert!(market.balance(ALICE) > int(1_000));
    assert_eq!(market.balance(ALICE), int(1_050));
}

#[tokio::test]
async fn test_short_profit_stop() {
    let market = ScriptedMarket::default();
    market.set_price(int(100)).await.unwrap();
    market.fund(BOB, 1_000);

    // short: pnl = -10 * (price - 100), profit stop at 95
    market.open(BOB, -1_000, 100, 50);

    let steps = KeeperSimulation::new(&market, &market)
        .run(&prices(&[102, 97, 95]), &[BOB])
        .await
        .unwrap();

    assert!(steps[0].liquidated.is_empty());
    assert!(steps[1].liquidated.is_empty());
    assert_eq!(steps[2].liquidated.len(), 1);
    assert!(market.balance(BOB) > int(1_000));
}

#[tokio::test]
async fn test_loss_cut_absorbed_by_margin() {
    let market = ScriptedMarket::default();
    market.set_price(int(100)).await.unwrap();
    market.fund(CHARLIE, 1_000);

    // long: loss cut once pnl reaches -100 at price 90
    market.open(CHARLIE, 1_000, 100, 500);
    let after_open = market.balance(CHARLIE);

    let steps = KeeperSimulation::new(&market, &market)
        .run(&prices(&[95, 91, 85]), &[CHARLIE])
        .await
        .unwrap();

    assert_eq!(steps[2].liquidated.len(), 1);
    assert!(steps[..2].iter().all(|s| s.liquidated.is_empty()));
    // the whole margin is lost, nothing more
    assert_eq!(market.balance(CHARLIE), after_open);
    assert_eq!(after_open, int(900));
}

#[tokio::test]
async fn test_accounts_are_liquidated_independently() {
    let market = ScriptedMarket::default();
    market.set_price(int(100)).await.unwrap();
    let long = market.open(ALICE, 1_000, 100, 50);
    let short = market.open(BOB, -1_000, 100, 50);

    let steps = KeeperSimulation::new(&market, &market)
        .run(&prices(&[106, 94]), &[ALICE, BOB])
        .await
        .unwrap();

    assert_eq!(steps[0].checked, 2);
    assert_eq!(steps[0].liquidated.len(), 1);
    assert_eq!(steps[0].liquidated[0].position_id, long);
    assert_eq!(steps[1].checked, 1);
    assert_eq!(steps[1].liquidated[0].position_id, short);
    assert_eq!(steps[1].liquidated[0].account, BOB);
}
