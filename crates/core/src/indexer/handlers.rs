//! Event to entity projections.
//!
//! Each handler derives the entity id, loads it, and only when it is absent
//! populates it from the event payload or from contract state read at the
//! event's block. Replaying an event therefore never writes twice.

use super::entities::{
    address_key, at_block, clb_supply_id, oracle_version_id, position_id,
    ChromaticMarketBinStatusEntity, ChromaticMarketEntity, ClaimedPositionEntity,
    ClbTokenTotalSupplyEntity, CloseKind, ClosedPositionEntity, EntityKind, InterestRateEntity, InterestRatesSnapshotEntity,
    LiquidityBinStatusEntity, OracleProviderPropertyEntity, OracleVersionEntity, PositionEntity,
    Provenance, Record,
};
use super::reader::StateReader;
use super::store::EntityStore;
use alloy::primitives::{Address, I256, U256};
use anyhow::{Context, Result};
use chromatic_chain::contracts::{LiquidityBinStatus, OracleProviderProperties, Position};
use chromatic_chain::{ChromaticEvent, LogMeta};
use std::sync::Arc;
use tracing::{debug, trace};

fn provenance(meta: &LogMeta) -> Provenance {
    Provenance {
        block_number: meta.block_number,
        block_timestamp: meta.block_timestamp,
        tx_hash: meta.tx_hash,
    }
}

/// Long (positive fee rate) and short (negative) liquidity totals.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BinTotals {
    pub long_liquidity: U256,
    pub long_free_liquidity: U256,
    pub short_liquidity: U256,
    pub short_free_liquidity: U256,
}

pub fn bin_totals(bins: &[LiquidityBinStatus]) -> BinTotals {
    bins.iter().fold(BinTotals::default(), |mut t, bin| {
        if bin.tradingFeeRate > 0 {
            t.long_liquidity += bin.liquidity;
            t.long_free_liquidity += bin.freeLiquidity;
        } else if bin.tradingFeeRate < 0 {
            t.short_liquidity += bin.liquidity;
            t.short_free_liquidity += bin.freeLiquidity;
        }
        t
    })
}

/// Total maker margin across the position's bins.
pub fn maker_margin(position: &Position) -> U256 {
    position
        ._binMargins
        .iter()
        .fold(U256::ZERO, |acc, m| acc + m.amount)
}

/// Payload shared by `ClaimPosition` and `Liquidate`.
struct Settlement {
    liquidated: bool,
    pnl: I256,
    interest: U256,
    used_keeper_fee: Option<U256>,
}

/// Dispatches decoded events to their projections.
#[derive(Clone)]
pub struct EventHandlers {
    store: Arc<dyn EntityStore>,
    reader: Arc<dyn StateReader>,
}

impl EventHandlers {
    pub fn new(store: Arc<dyn EntityStore>, reader: Arc<dyn StateReader>) -> Self {
        Self { store, reader }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn exists(&self, kind: EntityKind, id: &str) -> bool {
        let found = self.store.load(kind, id).is_some();
        if found {
            trace!(kind = %kind, id = %id, "Entity exists, skipping");
        }
        found
    }

    fn save(&self, record: Record) -> usize {
        usize::from(self.store.save_if_absent(record))
    }

    /// Project one event. Returns the number of entities written.
    pub async fn handle(&self, event: &ChromaticEvent, meta: &LogMeta) -> Result<usize> {
        let written = match event {
            ChromaticEvent::MarketCreated {
                oracle_provider,
                settlement_token,
                market,
            } => {
                self.market_created(*market, *oracle_provider, *settlement_token, meta)
                    .await?
            }
            ChromaticEvent::OracleProviderRegistered {
                oracle_provider,
                properties,
            } => self.oracle_provider_property(*oracle_provider, properties, meta),
            ChromaticEvent::TakeProfitBpsRangeUpdated {
                oracle_provider, ..
            }
            | ChromaticEvent::LeverageLevelUpdated {
                oracle_provider, ..
            } => self.reread_oracle_provider_property(*oracle_provider, meta).await?,
            ChromaticEvent::SettlementTokenRegistered { token, .. }
            | ChromaticEvent::InterestRateRecordAppended { token, .. }
            | ChromaticEvent::LastInterestRateRecordRemoved { token, .. } => {
                self.interest_rates_snapshot(*token, meta).await?
            }
            ChromaticEvent::OpenPosition { account, position } => {
                self.position_opened(*account, position, meta)
                    + self.market_snapshots(meta).await?
            }
            ChromaticEvent::ClosePosition { position, .. } => {
                self.position_closed(position, CloseKind::Closed, meta)
                    + self.market_snapshots(meta).await?
            }
            ChromaticEvent::ClaimPosition {
                pnl,
                interest,
                position,
                ..
            } => {
                let settlement = Settlement {
                    liquidated: false,
                    pnl: *pnl,
                    interest: *interest,
                    used_keeper_fee: None,
                };
                self.position_claimed(position, settlement, meta)
                    + self.market_snapshots(meta).await?
            }
            ChromaticEvent::Liquidate {
                pnl,
                interest,
                used_keeper_fee,
                position,
                ..
            } => {
                let settlement = Settlement {
                    liquidated: true,
                    pnl: *pnl,
                    interest: *interest,
                    used_keeper_fee: Some(*used_keeper_fee),
                };
                self.position_closed(position, CloseKind::Liquidated, meta)
                    + self.position_claimed(position, settlement, meta)
                    + self.market_snapshots(meta).await?
            }
            ChromaticEvent::AddLiquidity { .. }
            | ChromaticEvent::ClaimLiquidity { .. }
            | ChromaticEvent::RemoveLiquidity { .. }
            | ChromaticEvent::WithdrawLiquidity { .. } => self.market_snapshots(meta).await?,
            ChromaticEvent::ClbTransferSingle { from, to, id, .. } => {
                self.clb_supply(*from, *to, std::slice::from_ref(id), meta)
                    .await?
            }
            ChromaticEvent::ClbTransferBatch { from, to, ids, .. } => {
                self.clb_supply(*from, *to, ids, meta).await?
            }
        };

        debug!(
            event = event.name(),
            block = meta.block_number,
            log_index = meta.log_index,
            written,
            "Event handled"
        );
        Ok(written)
    }

    async fn market_created(
        &self,
        market: Address,
        oracle_provider: Address,
        settlement_token: Address,
        meta: &LogMeta,
    ) -> Result<usize> {
        let id = address_key(market);
        if self.exists(EntityKind::ChromaticMarket, &id) {
            return Ok(0);
        }

        let block = meta.block_number;
        let (info, (symbol, decimals), description) = futures::try_join!(
            self.reader.market_info(market, block),
            self.reader.token_metadata(settlement_token, block),
            self.reader.oracle_description(oracle_provider, block),
        )?;

        Ok(self.save(Record::ChromaticMarket(ChromaticMarketEntity {
            id,
            address: market,
            oracle_provider,
            oracle_description: description,
            settlement_token,
            settlement_token_symbol: symbol,
            settlement_token_decimals: decimals,
            clb_token: info.clb_token,
            provenance: provenance(meta),
        })))
    }

    fn oracle_provider_property(
        &self,
        oracle_provider: Address,
        properties: &OracleProviderProperties,
        meta: &LogMeta,
    ) -> usize {
        self.save(Record::OracleProviderProperty(OracleProviderPropertyEntity {
            id: at_block(oracle_provider, meta.block_number),
            oracle_provider,
            min_take_profit_bps: properties.minTakeProfitBPS,
            max_take_profit_bps: properties.maxTakeProfitBPS,
            leverage_level: properties.leverageLevel,
            provenance: provenance(meta),
        }))
    }

    async fn reread_oracle_provider_property(
        &self,
        oracle_provider: Address,
        meta: &LogMeta,
    ) -> Result<usize> {
        let id = at_block(oracle_provider, meta.block_number);
        if self.exists(EntityKind::OracleProviderProperty, &id) {
            return Ok(0);
        }
        let properties = self
            .reader
            .oracle_provider_properties(meta.address, oracle_provider, meta.block_number)
            .await?;
        Ok(self.oracle_provider_property(oracle_provider, &properties, meta))
    }

    async fn interest_rates_snapshot(&self, token: Address, meta: &LogMeta) -> Result<usize> {
        let id = at_block(token, meta.block_number);
        if self.exists(EntityKind::InterestRatesSnapshot, &id) {
            return Ok(0);
        }
        let records = self
            .reader
            .interest_rate_records(meta.address, token, meta.block_number)
            .await?;

        let mut written = 0;
        let mut rates = Vec::with_capacity(records.len());
        for record in records {
            let rate_id = format!("{id}/{}", record.beginTimestamp);
            written += self.save(Record::InterestRate(InterestRateEntity {
                id: rate_id.clone(),
                snapshot: id.clone(),
                annual_rate_bps: record.annualRateBPS,
                begin_timestamp: record.beginTimestamp,
            }));
            rates.push(rate_id);
        }
        written += self.save(Record::InterestRatesSnapshot(InterestRatesSnapshotEntity {
            id,
            settlement_token: token,
            rates,
            provenance: provenance(meta),
        }));
        Ok(written)
    }

    fn position_opened(&self, account: Address, position: &Position, meta: &LogMeta) -> usize {
        self.save(Record::Position(PositionEntity {
            id: position_id(meta.address, position.id),
            market: meta.address,
            position_id: position.id,
            account,
            qty: position.qty,
            taker_margin: position.takerMargin,
            maker_margin: maker_margin(position),
            open_version: position.openVersion,
            open_timestamp: position.openTimestamp,
            provenance: provenance(meta),
        }))
    }

    /// Id of the indexed parent position, if any.
    fn parent_position(&self, position: &Position, meta: &LogMeta) -> Option<String> {
        let id = position_id(meta.address, position.id);
        if self.store.load(EntityKind::Position, &id).is_none() {
            debug!(position = %id, "Event for an unindexed position ignored");
            return None;
        }
        Some(id)
    }

    fn position_closed(&self, position: &Position, kind: CloseKind, meta: &LogMeta) -> usize {
        let Some(id) = self.parent_position(position, meta) else {
            return 0;
        };
        self.save(Record::ClosedPosition(ClosedPositionEntity {
            id,
            kind,
            close_version: position.closeVersion,
            close_timestamp: position.closeTimestamp,
            provenance: provenance(meta),
        }))
    }

    fn position_claimed(&self, position: &Position, settlement: Settlement, meta: &LogMeta) -> usize {
        let Some(id) = self.parent_position(position, meta) else {
            return 0;
        };
        self.save(Record::ClaimedPosition(ClaimedPositionEntity {
            id,
            liquidated: settlement.liquidated,
            pnl: settlement.pnl,
            interest: settlement.interest,
            used_keeper_fee: settlement.used_keeper_fee,
            provenance: provenance(meta),
        }))
    }

    /// Bin status and oracle version of the emitting market at this block.
    async fn market_snapshots(&self, meta: &LogMeta) -> Result<usize> {
        Ok(self.bin_status(meta).await? + self.oracle_version(meta).await?)
    }

    async fn bin_status(&self, meta: &LogMeta) -> Result<usize> {
        let market = meta.address;
        let id = at_block(market, meta.block_number);
        if self.exists(EntityKind::ChromaticMarketBinStatus, &id) {
            return Ok(0);
        }
        let mut bins = self.reader.bin_statuses(market, meta.block_number).await?;
        bins.sort_by_key(|b| b.tradingFeeRate);
        let totals = bin_totals(&bins);

        let mut written = 0;
        let mut children = Vec::with_capacity(bins.len());
        for bin in &bins {
            let bin_id = format!("{id}/{}", bin.tradingFeeRate);
            written += self.save(Record::LiquidityBinStatus(LiquidityBinStatusEntity {
                id: bin_id.clone(),
                status: id.clone(),
                trading_fee_rate: bin.tradingFeeRate,
                liquidity: bin.liquidity,
                free_liquidity: bin.freeLiquidity,
                bin_value: bin.binValue,
            }));
            children.push(bin_id);
        }
        written += self.save(Record::ChromaticMarketBinStatus(ChromaticMarketBinStatusEntity {
            id,
            market,
            long_liquidity: totals.long_liquidity,
            long_free_liquidity: totals.long_free_liquidity,
            short_liquidity: totals.short_liquidity,
            short_free_liquidity: totals.short_free_liquidity,
            bins: children,
            provenance: provenance(meta),
        }));
        Ok(written)
    }

    async fn oracle_version(&self, meta: &LogMeta) -> Result<usize> {
        let market = meta.address;
        let oracle_provider = match self
            .store
            .load(EntityKind::ChromaticMarket, &address_key(market))
            .as_ref()
            .and_then(Record::as_market)
        {
            Some(entity) => entity.oracle_provider,
            None => {
                self.reader
                    .market_info(market, meta.block_number)
                    .await?
                    .oracle_provider
            }
        };

        let version = self
            .reader
            .oracle_version(oracle_provider, meta.block_number)
            .await
            .with_context(|| format!("oracle version for market {market}"))?;
        Ok(self.save(Record::OracleVersion(OracleVersionEntity {
            id: oracle_version_id(oracle_provider, version.version),
            oracle_provider,
            version: version.version,
            timestamp: version.timestamp,
            price: version.price,
            provenance: provenance(meta),
        })))
    }

    /// Supply snapshots for mints and burns only.
    async fn clb_supply(
        &self,
        from: Address,
        to: Address,
        ids: &[U256],
        meta: &LogMeta,
    ) -> Result<usize> {
        if from != Address::ZERO && to != Address::ZERO {
            return Ok(0);
        }
        let token = meta.address;
        let block = meta.block_number;
        let missing: Vec<U256> = ids
            .iter()
            .copied()
            .filter(|id| !self.exists(EntityKind::ClbTokenTotalSupply, &clb_supply_id(token, *id, block)))
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let supplies = self.reader.clb_total_supply(token, &missing, block).await?;
        if supplies.len() != missing.len() {
            anyhow::bail!(
                "CLB supply of {token} at {block}: {} values for {} ids",
                supplies.len(),
                missing.len()
            );
        }
        Ok(missing
            .into_iter()
            .zip(supplies)
            .map(|(token_id, amount)| {
                self.save(Record::ClbTokenTotalSupply(ClbTokenTotalSupplyEntity {
                    id: clb_supply_id(token, token_id, block),
                    token,
                    token_id,
                    amount,
                    provenance: provenance(meta),
                }))
            })
            .sum())
    }
}
