//! Indexer scenarios over an in-memory chain: market discovery, projection
//! rules, position settlement and replay idempotence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, LogData, B256, I256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use anyhow::Result;
use async_trait::async_trait;
use chromatic_chain::contracts::{
    BinMargin, ICLBToken, IChromaticMarket, IChromaticMarketFactory, InterestRateRecord,
    LiquidityBinStatus, OracleProviderProperties, OracleVersion, Position,
};
use chromatic_core::indexer::entities::{
    address_key, at_block, position_id, ClaimedPositionEntity, CloseKind, ClosedPositionEntity,
};
use chromatic_core::indexer::{
    EntityKind, EntityStore, EventHandlers, IndexerRunner, JsonStore, LogSource, MarketInfo,
    MemoryStore, Record, RunnerConfig, StateReader,
};

const FACTORY: Address = Address::repeat_byte(0xfa);
const MARKET: Address = Address::repeat_byte(0x33);
const PROVIDER: Address = Address::repeat_byte(0x0e);
const TOKEN: Address = Address::repeat_byte(0x70);
const CLB: Address = Address::repeat_byte(0xc1);
const TRADER: Address = Address::repeat_byte(0xa1);
const OTHER: Address = Address::repeat_byte(0xb2);

#[derive(Clone)]
struct FakeChain {
    logs: Vec<Log>,
    head: u64,
}

#[async_trait]
impl LogSource for FakeChain {
    async fn head(&self) -> Result<u64> {
        Ok(self.head)
    }

    async fn logs(&self, addresses: &[Address], topics: &[B256], from: u64, to: u64) -> Result<Vec<Log>> {
        Ok(self
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                addresses.contains(&log.address())
                    && log.topic0().is_some_and(|t| topics.contains(t))
                    && (from..=to).contains(&block)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeReader {
    supply_reads: AtomicUsize,
}

#[async_trait]
impl StateReader for FakeReader {
    async fn markets(&self, _factory: Address, _block: u64) -> Result<Vec<Address>> {
        Ok(vec![MARKET])
    }

    async fn market_info(&self, _market: Address, _block: u64) -> Result<MarketInfo> {
        Ok(MarketInfo {
            oracle_provider: PROVIDER,
            settlement_token: TOKEN,
            clb_token: CLB,
        })
    }

    async fn token_metadata(&self, _token: Address, _block: u64) -> Result<(String, u8)> {
        Ok(("USDT".to_string(), 6))
    }

    async fn oracle_description(&self, _provider: Address, _block: u64) -> Result<String> {
        Ok("ETH/USD".to_string())
    }

    async fn oracle_provider_properties(
        &self,
        _factory: Address,
        _provider: Address,
        _block: u64,
    ) -> Result<OracleProviderProperties> {
        Ok(OracleProviderProperties {
            minTakeProfitBPS: 500,
            maxTakeProfitBPS: 50_000,
            leverageLevel: 1,
        })
    }

    async fn interest_rate_records(
        &self,
        _factory: Address,
        _token: Address,
        _block: u64,
    ) -> Result<Vec<InterestRateRecord>> {
        Ok(vec![
            InterestRateRecord {
                annualRateBPS: U256::from(1_000u64),
                beginTimestamp: U256::ZERO,
            },
            InterestRateRecord {
                annualRateBPS: U256::from(1_500u64),
                beginTimestamp: U256::from(1_700_000_000u64),
            },
        ])
    }

    async fn bin_statuses(&self, _market: Address, _block: u64) -> Result<Vec<LiquidityBinStatus>> {
        Ok(vec![
            LiquidityBinStatus {
                liquidity: U256::from(100u64),
                freeLiquidity: U256::from(80u64),
                binValue: U256::from(100u64),
                tradingFeeRate: 1,
            },
            LiquidityBinStatus {
                liquidity: U256::from(50u64),
                freeLiquidity: U256::from(50u64),
                binValue: U256::from(50u64),
                tradingFeeRate: -1,
            },
        ])
    }

    async fn clb_total_supply(&self, _token: Address, ids: &[U256], _block: u64) -> Result<Vec<U256>> {
        self.supply_reads.fetch_add(1, Ordering::SeqCst);
        Ok(ids.iter().map(|_| U256::from(100u64)).collect())
    }

    async fn oracle_version(&self, _provider: Address, block: u64) -> Result<OracleVersion> {
        Ok(OracleVersion {
            version: U256::from(block),
            timestamp: U256::from(1_700_000_000u64 + block),
            price: I256::try_from(2_000i64).unwrap(),
        })
    }
}

fn log(address: Address, data: LogData, block: u64, index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log { address, data },
        block_hash: Some(B256::repeat_byte(block as u8)),
        block_number: Some(block),
        block_timestamp: Some(1_700_000_000 + block),
        transaction_hash: Some(B256::repeat_byte(0x10 + index as u8)),
        transaction_index: Some(0),
        log_index: Some(index),
        removed: false,
    }
}

fn position(id: u64) -> Position {
    Position {
        id: U256::from(id),
        openVersion: U256::from(12u64),
        closeVersion: U256::ZERO,
        qty: I256::try_from(10i64).unwrap(),
        openTimestamp: U256::from(1_700_000_012u64),
        closeTimestamp: U256::ZERO,
        takerMargin: U256::from(10u64),
        owner: TRADER,
        _binMargins: vec![BinMargin {
            tradingFeeRate: 1,
            amount: U256::from(20u64),
        }],
        _feeProtocol: 0,
    }
}

fn transfer(from: Address, to: Address, id: u64) -> LogData {
    ICLBToken::TransferSingle {
        operator: TRADER,
        from,
        to,
        id: U256::from(id),
        value: U256::from(100u64),
    }
    .encode_log_data()
}

/// Market created at 10, position 1 opened at 12 with a CLB mint, a plain
/// CLB transfer at 13, position 1 closed at 14, and a close of an unknown
/// position at 15.
fn scenario() -> FakeChain {
    let created = IChromaticMarketFactory::MarketCreated {
        oracleProvider: PROVIDER,
        settlementToken: TOKEN,
        market: MARKET,
    };
    let open = IChromaticMarket::OpenPosition {
        account: TRADER,
        position: position(1),
    };
    let close = IChromaticMarket::ClosePosition {
        account: TRADER,
        position: position(1),
    };
    let close_unknown = IChromaticMarket::ClosePosition {
        account: TRADER,
        position: position(2),
    };

    FakeChain {
        logs: vec![
            log(FACTORY, created.encode_log_data(), 10, 0),
            log(MARKET, open.encode_log_data(), 12, 0),
            log(CLB, transfer(Address::ZERO, TRADER, 1), 12, 1),
            log(CLB, transfer(TRADER, OTHER, 1), 13, 0),
            log(MARKET, close.encode_log_data(), 14, 0),
            log(MARKET, close_unknown.encode_log_data(), 15, 0),
        ],
        head: 15,
    }
}

fn config(from_block: u64) -> RunnerConfig {
    RunnerConfig {
        factory: FACTORY,
        from_block,
        batch_size: 5,
        follow: false,
        poll_interval: Duration::from_millis(10),
    }
}

#[tokio::test]
async fn test_discovers_market_and_projects_events() {
    let store = Arc::new(MemoryStore::new());
    let reader = Arc::new(FakeReader::default());
    let handlers = EventHandlers::new(store.clone(), reader.clone());

    let mut runner = IndexerRunner::new(scenario(), handlers, reader.clone(), config(0));
    let stats = runner.run().await.unwrap();

    assert_eq!(stats.blocks, 16);
    assert_eq!(stats.events, 6);
    assert_eq!(stats.markets, 1);
    assert!(runner.markets().contains(&MARKET));

    assert_eq!(store.count(EntityKind::ChromaticMarket), 1);
    assert_eq!(store.count(EntityKind::Position), 1);
    assert_eq!(store.count(EntityKind::ClosedPosition), 1);
    assert_eq!(store.count(EntityKind::ClbTokenTotalSupply), 1);
    // position and close events at blocks 12, 14 and 15
    assert_eq!(store.count(EntityKind::ChromaticMarketBinStatus), 3);
    assert_eq!(store.count(EntityKind::LiquidityBinStatus), 6);
    assert_eq!(store.count(EntityKind::OracleVersion), 3);

    let market = store
        .load(EntityKind::ChromaticMarket, &address_key(MARKET))
        .unwrap();
    let market = market.as_market().unwrap();
    assert_eq!(market.clb_token, CLB);
    assert_eq!(market.settlement_token_symbol, "USDT");
    assert_eq!(market.oracle_description, "ETH/USD");

    let id = position_id(MARKET, U256::from(1u64));
    let opened = store.load(EntityKind::Position, &id).unwrap();
    assert_eq!(opened.as_position().unwrap().maker_margin, U256::from(20u64));
    match store.load(EntityKind::ClosedPosition, &id).unwrap() {
        Record::ClosedPosition(closed) => {
            assert_eq!(closed.kind, CloseKind::Closed);
            assert_eq!(closed.provenance.block_number, 14);
        }
        other => panic!("unexpected {other:?}"),
    }

    // only the mint triggered a supply read
    assert_eq!(reader.supply_reads.load(Ordering::SeqCst), 1);
    assert_eq!(store.cursor(), Some(15));
}

#[tokio::test]
async fn test_close_without_parent_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let reader = Arc::new(FakeReader::default());
    let handlers = EventHandlers::new(store.clone(), reader.clone());

    let mut runner = IndexerRunner::new(scenario(), handlers, reader, config(0));
    runner.run().await.unwrap();

    let orphan = position_id(MARKET, U256::from(2u64));
    assert!(store.load(EntityKind::Position, &orphan).is_none());
    assert!(store.load(EntityKind::ClosedPosition, &orphan).is_none());
    // the market snapshot at that block is still taken
    assert!(store
        .load(EntityKind::ChromaticMarketBinStatus, &at_block(MARKET, 15))
        .is_some());
}

#[tokio::test]
async fn test_replay_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let reader = Arc::new(FakeReader::default());

    let first = IndexerRunner::new(
        scenario(),
        EventHandlers::new(store.clone(), reader.clone()),
        reader.clone(),
        config(0),
    )
    .run()
    .await
    .unwrap();
    let counts: Vec<usize> = EntityKind::ALL.iter().map(|k| store.count(*k)).collect();

    let second = IndexerRunner::new(
        scenario(),
        EventHandlers::new(store.clone(), reader.clone()),
        reader,
        config(0),
    )
    .run()
    .await
    .unwrap();

    assert!(first.written > 0);
    assert_eq!(second.events, first.events);
    assert_eq!(second.written, 0);
    let replayed: Vec<usize> = EntityKind::ALL.iter().map(|k| store.count(*k)).collect();
    assert_eq!(replayed, counts);
}

#[tokio::test]
async fn test_resume_seeds_known_markets() {
    let store = Arc::new(MemoryStore::new());
    let reader = Arc::new(FakeReader::default());

    // start after the MarketCreated block: the market must come from getMarkets
    let mut runner = IndexerRunner::new(
        scenario(),
        EventHandlers::new(store.clone(), reader.clone()),
        reader.clone(),
        config(11),
    );
    let stats = runner.run().await.unwrap();

    assert_eq!(stats.markets, 1);
    assert_eq!(store.count(EntityKind::ChromaticMarket), 0);
    assert_eq!(store.count(EntityKind::Position), 1);
    assert_eq!(store.count(EntityKind::ClbTokenTotalSupply), 1);
}

#[tokio::test]
async fn test_handler_replay_of_single_event() {
    let store = Arc::new(MemoryStore::new());
    let reader = Arc::new(FakeReader::default());
    let handlers = EventHandlers::new(store.clone(), reader);

    let registered = IChromaticMarketFactory::SettlementTokenRegistered {
        token: TOKEN,
        oracleProvider: PROVIDER,
        minimumMargin: U256::from(10u64),
        interestRate: U256::from(1_000u64),
        flashLoanFeeRate: U256::from(5_000u64),
        earningDistributionThreshold: U256::from(1_000u64),
        uniswapFeeTier: alloy::primitives::aliases::U24::from(3_000u32),
    };
    let raw = log(FACTORY, registered.encode_log_data(), 20, 0);
    let (event, meta) = chromatic_chain::events::decode(&raw).unwrap();

    // snapshot plus two rate children
    assert_eq!(handlers.handle(&event, &meta).await.unwrap(), 3);
    assert_eq!(handlers.handle(&event, &meta).await.unwrap(), 0);
    assert_eq!(store.count(EntityKind::InterestRatesSnapshot), 1);
    assert_eq!(store.count(EntityKind::InterestRate), 2);
}

#[tokio::test]
async fn test_json_store_keeps_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    let reader = Arc::new(FakeReader::default());

    {
        let store = Arc::new(JsonStore::open(&path).unwrap());
        IndexerRunner::new(
            scenario(),
            EventHandlers::new(store.clone(), reader.clone()),
            reader.clone(),
            config(0),
        )
        .run()
        .await
        .unwrap();
    }

    let reopened = JsonStore::open(&path).unwrap();
    assert_eq!(reopened.cursor(), Some(15));
    assert_eq!(reopened.count(EntityKind::Position), 1);
    assert_eq!(reopened.count(EntityKind::ClosedPosition), 1);
}

/// Decode `data` as emitted by the market at `block` and project it.
async fn handle_market_event(handlers: &EventHandlers, data: LogData, block: u64) -> usize {
    let raw = log(MARKET, data, block, 0);
    let (event, meta) = chromatic_chain::events::decode(&raw).unwrap();
    handlers.handle(&event, &meta).await.unwrap()
}

fn int(v: i64) -> I256 {
    I256::try_from(v).unwrap()
}

fn claimed(store: &MemoryStore, id: &str) -> ClaimedPositionEntity {
    match store.load(EntityKind::ClaimedPosition, id).unwrap() {
        Record::ClaimedPosition(claimed) => claimed,
        other => panic!("unexpected {other:?}"),
    }
}

fn closed(store: &MemoryStore, id: &str) -> ClosedPositionEntity {
    match store.load(EntityKind::ClosedPosition, id).unwrap() {
        Record::ClosedPosition(closed) => closed,
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_claim_after_close_keeps_pnl_and_interest() {
    let store = Arc::new(MemoryStore::new());
    let handlers = EventHandlers::new(store.clone(), Arc::new(FakeReader::default()));

    let open = IChromaticMarket::OpenPosition {
        account: TRADER,
        position: position(1),
    };
    let close = IChromaticMarket::ClosePosition {
        account: TRADER,
        position: position(1),
    };
    let claim = IChromaticMarket::ClaimPosition {
        account: TRADER,
        pnl: int(5),
        interest: U256::from(3u64),
        position: position(1),
    };
    handle_market_event(&handlers, open.encode_log_data(), 12).await;
    handle_market_event(&handlers, close.encode_log_data(), 14).await;
    assert!(handle_market_event(&handlers, claim.encode_log_data(), 16).await > 0);

    let id = position_id(MARKET, U256::from(1u64));
    let close = closed(&store, &id);
    assert_eq!(close.kind, CloseKind::Closed);
    assert_eq!(close.provenance.block_number, 14);

    let settled = claimed(&store, &id);
    assert!(!settled.liquidated);
    assert_eq!(settled.pnl, int(5));
    assert_eq!(settled.interest, U256::from(3u64));
    assert_eq!(settled.used_keeper_fee, None);
    assert_eq!(settled.provenance.block_number, 16);

    // replaying the claim changes nothing
    assert_eq!(handle_market_event(&handlers, claim.encode_log_data(), 16).await, 0);
    assert_eq!(store.count(EntityKind::ClaimedPosition), 1);
    assert_eq!(claimed(&store, &id).pnl, int(5));
}

#[tokio::test]
async fn test_liquidation_closes_and_settles() {
    let store = Arc::new(MemoryStore::new());
    let handlers = EventHandlers::new(store.clone(), Arc::new(FakeReader::default()));

    let open = IChromaticMarket::OpenPosition {
        account: TRADER,
        position: position(3),
    };
    let liquidate = IChromaticMarket::Liquidate {
        account: TRADER,
        pnl: int(-10),
        interest: U256::from(2u64),
        usedKeeperFee: U256::from(1u64),
        position: position(3),
    };
    handle_market_event(&handlers, open.encode_log_data(), 12).await;
    assert!(handle_market_event(&handlers, liquidate.encode_log_data(), 13).await > 0);

    let id = position_id(MARKET, U256::from(3u64));
    let close = closed(&store, &id);
    assert_eq!(close.kind, CloseKind::Liquidated);
    assert_eq!(close.provenance.block_number, 13);

    let settled = claimed(&store, &id);
    assert!(settled.liquidated);
    assert_eq!(settled.pnl, int(-10));
    assert_eq!(settled.interest, U256::from(2u64));
    assert_eq!(settled.used_keeper_fee, Some(U256::from(1u64)));

    assert_eq!(handle_market_event(&handlers, liquidate.encode_log_data(), 13).await, 0);
    assert_eq!(store.count(EntityKind::ClosedPosition), 1);
    assert_eq!(store.count(EntityKind::ClaimedPosition), 1);
}

#[tokio::test]
async fn test_settlement_without_parent_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let handlers = EventHandlers::new(store.clone(), Arc::new(FakeReader::default()));

    let claim = IChromaticMarket::ClaimPosition {
        account: TRADER,
        pnl: int(5),
        interest: U256::from(3u64),
        position: position(9),
    };
    let liquidate = IChromaticMarket::Liquidate {
        account: TRADER,
        pnl: int(-1),
        interest: U256::ZERO,
        usedKeeperFee: U256::ZERO,
        position: position(9),
    };
    handle_market_event(&handlers, claim.encode_log_data(), 20).await;
    handle_market_event(&handlers, liquidate.encode_log_data(), 21).await;

    assert_eq!(store.count(EntityKind::ClosedPosition), 0);
    assert_eq!(store.count(EntityKind::ClaimedPosition), 0);
    assert_eq!(store.count(EntityKind::ChromaticMarketBinStatus), 2);
}
