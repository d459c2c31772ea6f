//! Indexed entities and their composite ids.
//!
//! Every entity is written once per id and never updated afterwards.

use alloy::primitives::{Address, B256, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowercase `0x…` form used inside ids.
pub fn address_key(address: Address) -> String {
    address.to_string().to_lowercase()
}

/// `<market>-<positionId>`, shared by [`PositionEntity`], [`ClosedPositionEntity`]
/// and [`ClaimedPositionEntity`].
pub fn position_id(market: Address, position_id: U256) -> String {
    format!("{}-{position_id}", address_key(market))
}

/// `<address>@<block>`
pub fn at_block(address: Address, block: u64) -> String {
    format!("{}@{block}", address_key(address))
}

/// `<token>/<tokenId>@<block>`
pub fn clb_supply_id(token: Address, token_id: U256, block: u64) -> String {
    format!("{}/{token_id}@{block}", address_key(token))
}

/// `<provider>@<version>`
pub fn oracle_version_id(provider: Address, version: U256) -> String {
    format!("{}@{version}", address_key(provider))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Position,
    ClosedPosition,
    ClaimedPosition,
    ChromaticMarket,
    OracleProviderProperty,
    InterestRatesSnapshot,
    InterestRate,
    ChromaticMarketBinStatus,
    LiquidityBinStatus,
    #[serde(rename = "clbTokenTotalSupply")]
    ClbTokenTotalSupply,
    OracleVersion,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        Self::Position,
        Self::ClosedPosition,
        Self::ClaimedPosition,
        Self::ChromaticMarket,
        Self::OracleProviderProperty,
        Self::InterestRatesSnapshot,
        Self::InterestRate,
        Self::ChromaticMarketBinStatus,
        Self::LiquidityBinStatus,
        Self::ClbTokenTotalSupply,
        Self::OracleVersion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Position => "Position",
            Self::ClosedPosition => "ClosedPosition",
            Self::ClaimedPosition => "ClaimedPosition",
            Self::ChromaticMarket => "ChromaticMarket",
            Self::OracleProviderProperty => "OracleProviderProperty",
            Self::InterestRatesSnapshot => "InterestRatesSnapshot",
            Self::InterestRate => "InterestRate",
            Self::ChromaticMarketBinStatus => "ChromaticMarketBinStatus",
            Self::LiquidityBinStatus => "LiquidityBinStatus",
            Self::ClbTokenTotalSupply => "CLBTokenTotalSupply",
            Self::OracleVersion => "OracleVersion",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block and transaction an entity was first seen in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub tx_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionEntity {
    pub id: String,
    pub market: Address,
    pub position_id: U256,
    pub account: Address,
    pub qty: I256,
    pub taker_margin: U256,
    /// Sum of the per-bin maker margins
    pub maker_margin: U256,
    pub open_version: U256,
    pub open_timestamp: U256,
    pub provenance: Provenance,
}

/// How a position left the open set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseKind {
    Closed,
    Liquidated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPositionEntity {
    /// Same id as the parent position
    pub id: String,
    pub kind: CloseKind,
    pub close_version: U256,
    pub close_timestamp: U256,
    pub provenance: Provenance,
}

/// Settlement of a position: a claim after close, or a liquidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedPositionEntity {
    /// Same id as the parent position
    pub id: String,
    pub liquidated: bool,
    pub pnl: I256,
    pub interest: U256,
    /// Keeper fee taken by a liquidation
    pub used_keeper_fee: Option<U256>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromaticMarketEntity {
    pub id: String,
    pub address: Address,
    pub oracle_provider: Address,
    pub oracle_description: String,
    pub settlement_token: Address,
    pub settlement_token_symbol: String,
    pub settlement_token_decimals: u8,
    pub clb_token: Address,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleProviderPropertyEntity {
    pub id: String,
    pub oracle_provider: Address,
    pub min_take_profit_bps: u32,
    pub max_take_profit_bps: u32,
    pub leverage_level: u8,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestRatesSnapshotEntity {
    pub id: String,
    pub settlement_token: Address,
    /// Child [`InterestRateEntity`] ids in record order
    pub rates: Vec<String>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestRateEntity {
    /// `<snapshot id>/<beginTimestamp>`
    pub id: String,
    pub snapshot: String,
    pub annual_rate_bps: U256,
    pub begin_timestamp: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromaticMarketBinStatusEntity {
    pub id: String,
    pub market: Address,
    pub long_liquidity: U256,
    pub long_free_liquidity: U256,
    pub short_liquidity: U256,
    pub short_free_liquidity: U256,
    /// Child [`LiquidityBinStatusEntity`] ids, ascending fee rate
    pub bins: Vec<String>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityBinStatusEntity {
    /// `<status id>/<feeRate>`
    pub id: String,
    pub status: String,
    pub trading_fee_rate: i16,
    pub liquidity: U256,
    pub free_liquidity: U256,
    pub bin_value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClbTokenTotalSupplyEntity {
    pub id: String,
    pub token: Address,
    pub token_id: U256,
    pub amount: U256,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleVersionEntity {
    pub id: String,
    pub oracle_provider: Address,
    pub version: U256,
    pub timestamp: U256,
    pub price: I256,
    pub provenance: Provenance,
}

/// Any stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "camelCase")]
pub enum Record {
    Position(PositionEntity),
    ClosedPosition(ClosedPositionEntity),
    ClaimedPosition(ClaimedPositionEntity),
    ChromaticMarket(ChromaticMarketEntity),
    OracleProviderProperty(OracleProviderPropertyEntity),
    InterestRatesSnapshot(InterestRatesSnapshotEntity),
    InterestRate(InterestRateEntity),
    ChromaticMarketBinStatus(ChromaticMarketBinStatusEntity),
    LiquidityBinStatus(LiquidityBinStatusEntity),
    #[serde(rename = "clbTokenTotalSupply")]
    ClbTokenTotalSupply(ClbTokenTotalSupplyEntity),
    OracleVersion(OracleVersionEntity),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Position(_) => EntityKind::Position,
            Self::ClosedPosition(_) => EntityKind::ClosedPosition,
            Self::ClaimedPosition(_) => EntityKind::ClaimedPosition,
            Self::ChromaticMarket(_) => EntityKind::ChromaticMarket,
            Self::OracleProviderProperty(_) => EntityKind::OracleProviderProperty,
            Self::InterestRatesSnapshot(_) => EntityKind::InterestRatesSnapshot,
            Self::InterestRate(_) => EntityKind::InterestRate,
            Self::ChromaticMarketBinStatus(_) => EntityKind::ChromaticMarketBinStatus,
            Self::LiquidityBinStatus(_) => EntityKind::LiquidityBinStatus,
            Self::ClbTokenTotalSupply(_) => EntityKind::ClbTokenTotalSupply,
            Self::OracleVersion(_) => EntityKind::OracleVersion,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Position(e) => &e.id,
            Self::ClosedPosition(e) => &e.id,
            Self::ClaimedPosition(e) => &e.id,
            Self::ChromaticMarket(e) => &e.id,
            Self::OracleProviderProperty(e) => &e.id,
            Self::InterestRatesSnapshot(e) => &e.id,
            Self::InterestRate(e) => &e.id,
            Self::ChromaticMarketBinStatus(e) => &e.id,
            Self::LiquidityBinStatus(e) => &e.id,
            Self::ClbTokenTotalSupply(e) => &e.id,
            Self::OracleVersion(e) => &e.id,
        }
    }

    pub fn as_market(&self) -> Option<&ChromaticMarketEntity> {
        match self {
            Self::ChromaticMarket(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<&PositionEntity> {
        match self {
            Self::Position(e) => Some(e),
            _ => None,
        }
    }
}
