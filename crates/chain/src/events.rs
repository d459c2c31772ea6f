//! Decoding of factory, market and CLB token logs.
//!
//! Logs are turned into [`ChromaticEvent`] values with owned fields so the
//! indexer can hold them without borrowing the RPC response.

use alloy::primitives::{Address, B256, I256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

use crate::contracts::{
    ICLBToken, IChromaticMarket, IChromaticMarketFactory, LpReceipt, OracleProviderProperties,
    Position,
};

/// Where a log came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMeta {
    /// Emitting contract
    pub address: Address,
    /// Block number
    pub block_number: u64,
    /// Block timestamp (0 when the node omits it)
    pub block_timestamp: u64,
    /// Transaction hash
    pub tx_hash: B256,
    /// Log index within the block
    pub log_index: u64,
}

impl LogMeta {
    fn from_log(log: &Log) -> Option<Self> {
        Some(Self {
            address: log.address(),
            block_number: log.block_number?,
            block_timestamp: log.block_timestamp.unwrap_or(0),
            tx_hash: log.transaction_hash.unwrap_or_default(),
            log_index: log.log_index.unwrap_or(0),
        })
    }
}

/// Decoded protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChromaticEvent {
    MarketCreated {
        oracle_provider: Address,
        settlement_token: Address,
        market: Address,
    },
    OracleProviderRegistered {
        oracle_provider: Address,
        properties: OracleProviderProperties,
    },
    TakeProfitBpsRangeUpdated {
        oracle_provider: Address,
        min_take_profit_bps: u32,
        max_take_profit_bps: u32,
    },
    LeverageLevelUpdated {
        oracle_provider: Address,
        level: u8,
    },
    SettlementTokenRegistered {
        token: Address,
        oracle_provider: Address,
        minimum_margin: U256,
        interest_rate: U256,
        flash_loan_fee_rate: U256,
        earning_distribution_threshold: U256,
        uniswap_fee_tier: u32,
    },
    InterestRateRecordAppended {
        token: Address,
        annual_rate_bps: U256,
        begin_timestamp: U256,
    },
    LastInterestRateRecordRemoved {
        token: Address,
        annual_rate_bps: U256,
        begin_timestamp: U256,
    },
    OpenPosition {
        account: Address,
        position: Position,
    },
    ClosePosition {
        account: Address,
        position: Position,
    },
    ClaimPosition {
        account: Address,
        pnl: I256,
        interest: U256,
        position: Position,
    },
    Liquidate {
        account: Address,
        pnl: I256,
        interest: U256,
        used_keeper_fee: U256,
        position: Position,
    },
    AddLiquidity {
        receipt: LpReceipt,
    },
    ClaimLiquidity {
        receipt: LpReceipt,
        clb_token_amount: U256,
    },
    RemoveLiquidity {
        receipt: LpReceipt,
    },
    WithdrawLiquidity {
        receipt: LpReceipt,
        amount: U256,
        burned_clb_token_amount: U256,
    },
    ClbTransferSingle {
        from: Address,
        to: Address,
        id: U256,
        value: U256,
    },
    ClbTransferBatch {
        from: Address,
        to: Address,
        ids: Vec<U256>,
        values: Vec<U256>,
    },
}

impl ChromaticEvent {
    /// Event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MarketCreated { .. } => "MarketCreated",
            Self::OracleProviderRegistered { .. } => "OracleProviderRegistered",
            Self::TakeProfitBpsRangeUpdated { .. } => "UpdateTakeProfitBPSRange",
            Self::LeverageLevelUpdated { .. } => "UpdateLeverageLevel",
            Self::SettlementTokenRegistered { .. } => "SettlementTokenRegistered",
            Self::InterestRateRecordAppended { .. } => "InterestRateRecordAppended",
            Self::LastInterestRateRecordRemoved { .. } => "LastInterestRateRecordRemoved",
            Self::OpenPosition { .. } => "OpenPosition",
            Self::ClosePosition { .. } => "ClosePosition",
            Self::ClaimPosition { .. } => "ClaimPosition",
            Self::Liquidate { .. } => "Liquidate",
            Self::AddLiquidity { .. } => "AddLiquidity",
            Self::ClaimLiquidity { .. } => "ClaimLiquidity",
            Self::RemoveLiquidity { .. } => "RemoveLiquidity",
            Self::WithdrawLiquidity { .. } => "WithdrawLiquidity",
            Self::ClbTransferSingle { .. } => "TransferSingle",
            Self::ClbTransferBatch { .. } => "TransferBatch",
        }
    }
}

/// Topics emitted by the market factory.
pub fn factory_topics() -> Vec<B256> {
    use IChromaticMarketFactory as F;
    vec![
        F::MarketCreated::SIGNATURE_HASH,
        F::OracleProviderRegistered::SIGNATURE_HASH,
        F::UpdateTakeProfitBPSRange::SIGNATURE_HASH,
        F::UpdateLeverageLevel::SIGNATURE_HASH,
        F::SettlementTokenRegistered::SIGNATURE_HASH,
        F::InterestRateRecordAppended::SIGNATURE_HASH,
        F::LastInterestRateRecordRemoved::SIGNATURE_HASH,
    ]
}

/// Topics emitted by market diamonds.
pub fn market_topics() -> Vec<B256> {
    use IChromaticMarket as M;
    vec![
        M::OpenPosition::SIGNATURE_HASH,
        M::ClosePosition::SIGNATURE_HASH,
        M::ClaimPosition::SIGNATURE_HASH,
        M::Liquidate::SIGNATURE_HASH,
        M::AddLiquidity::SIGNATURE_HASH,
        M::ClaimLiquidity::SIGNATURE_HASH,
        M::RemoveLiquidity::SIGNATURE_HASH,
        M::WithdrawLiquidity::SIGNATURE_HASH,
    ]
}

/// Topics emitted by CLB tokens (ERC1155 transfers).
pub fn clb_topics() -> Vec<B256> {
    vec![
        ICLBToken::TransferSingle::SIGNATURE_HASH,
        ICLBToken::TransferBatch::SIGNATURE_HASH,
    ]
}

/// Decode a log into a protocol event.
///
/// Returns `None` for pending logs, unknown topics and malformed data.
pub fn decode(log: &Log) -> Option<(ChromaticEvent, LogMeta)> {
    use IChromaticMarket as M;
    use IChromaticMarketFactory as F;

    let meta = LogMeta::from_log(log)?;
    let topic0 = *log.topic0()?;
    let data = &log.inner.data;

    let event = match topic0 {
        t if t == F::MarketCreated::SIGNATURE_HASH => {
            let e = F::MarketCreated::decode_log_data(data, true).ok()?;
            ChromaticEvent::MarketCreated {
                oracle_provider: e.oracleProvider,
                settlement_token: e.settlementToken,
                market: e.market,
            }
        }
        t if t == F::OracleProviderRegistered::SIGNATURE_HASH => {
            let e = F::OracleProviderRegistered::decode_log_data(data, true).ok()?;
            ChromaticEvent::OracleProviderRegistered {
                oracle_provider: e.oracleProvider,
                properties: e.properties,
            }
        }
        t if t == F::UpdateTakeProfitBPSRange::SIGNATURE_HASH => {
            let e = F::UpdateTakeProfitBPSRange::decode_log_data(data, true).ok()?;
            ChromaticEvent::TakeProfitBpsRangeUpdated {
                oracle_provider: e.oracleProvider,
                min_take_profit_bps: e.minTakeProfitBPS,
                max_take_profit_bps: e.maxTakeProfitBPS,
            }
        }
        t if t == F::UpdateLeverageLevel::SIGNATURE_HASH => {
            let e = F::UpdateLeverageLevel::decode_log_data(data, true).ok()?;
            ChromaticEvent::LeverageLevelUpdated {
                oracle_provider: e.oracleProvider,
                level: e.level,
            }
        }
        t if t == F::SettlementTokenRegistered::SIGNATURE_HASH => {
            let e = F::SettlementTokenRegistered::decode_log_data(data, true).ok()?;
            ChromaticEvent::SettlementTokenRegistered {
                token: e.token,
                oracle_provider: e.oracleProvider,
                minimum_margin: e.minimumMargin,
                interest_rate: e.interestRate,
                flash_loan_fee_rate: e.flashLoanFeeRate,
                earning_distribution_threshold: e.earningDistributionThreshold,
                uniswap_fee_tier: e.uniswapFeeTier.to::<u32>(),
            }
        }
        t if t == F::InterestRateRecordAppended::SIGNATURE_HASH => {
            let e = F::InterestRateRecordAppended::decode_log_data(data, true).ok()?;
            ChromaticEvent::InterestRateRecordAppended {
                token: e.token,
                annual_rate_bps: e.annualRateBPS,
                begin_timestamp: e.beginTimestamp,
            }
        }
        t if t == F::LastInterestRateRecordRemoved::SIGNATURE_HASH => {
            let e = F::LastInterestRateRecordRemoved::decode_log_data(data, true).ok()?;
            ChromaticEvent::LastInterestRateRecordRemoved {
                token: e.token,
                annual_rate_bps: e.annualRateBPS,
                begin_timestamp: e.beginTimestamp,
            }
        }
        t if t == M::OpenPosition::SIGNATURE_HASH => {
            let e = M::OpenPosition::decode_log_data(data, true).ok()?;
            ChromaticEvent::OpenPosition {
                account: e.account,
                position: e.position,
            }
        }
        t if t == M::ClosePosition::SIGNATURE_HASH => {
            let e = M::ClosePosition::decode_log_data(data, true).ok()?;
            ChromaticEvent::ClosePosition {
                account: e.account,
                position: e.position,
            }
        }
        t if t == M::ClaimPosition::SIGNATURE_HASH => {
            let e = M::ClaimPosition::decode_log_data(data, true).ok()?;
            ChromaticEvent::ClaimPosition {
                account: e.account,
                pnl: e.pnl,
                interest: e.interest,
                position: e.position,
            }
        }
        t if t == M::Liquidate::SIGNATURE_HASH => {
            let e = M::Liquidate::decode_log_data(data, true).ok()?;
            ChromaticEvent::Liquidate {
                account: e.account,
                pnl: e.pnl,
                interest: e.interest,
                used_keeper_fee: e.usedKeeperFee,
                position: e.position,
            }
        }
        t if t == M::AddLiquidity::SIGNATURE_HASH => {
            let e = M::AddLiquidity::decode_log_data(data, true).ok()?;
            ChromaticEvent::AddLiquidity { receipt: e.receipt }
        }
        t if t == M::ClaimLiquidity::SIGNATURE_HASH => {
            let e = M::ClaimLiquidity::decode_log_data(data, true).ok()?;
            ChromaticEvent::ClaimLiquidity {
                receipt: e.receipt,
                clb_token_amount: e.clbTokenAmount,
            }
        }
        t if t == M::RemoveLiquidity::SIGNATURE_HASH => {
            let e = M::RemoveLiquidity::decode_log_data(data, true).ok()?;
            ChromaticEvent::RemoveLiquidity { receipt: e.receipt }
        }
        t if t == M::WithdrawLiquidity::SIGNATURE_HASH => {
            let e = M::WithdrawLiquidity::decode_log_data(data, true).ok()?;
            ChromaticEvent::WithdrawLiquidity {
                receipt: e.receipt,
                amount: e.amount,
                burned_clb_token_amount: e.burnedCLBTokenAmount,
            }
        }
        t if t == ICLBToken::TransferSingle::SIGNATURE_HASH => {
            let e = ICLBToken::TransferSingle::decode_log_data(data, true).ok()?;
            ChromaticEvent::ClbTransferSingle {
                from: e.from,
                to: e.to,
                id: e.id,
                value: e.value,
            }
        }
        t if t == ICLBToken::TransferBatch::SIGNATURE_HASH => {
            let e = ICLBToken::TransferBatch::decode_log_data(data, true).ok()?;
            ChromaticEvent::ClbTransferBatch {
                from: e.from,
                to: e.to,
                ids: e.ids,
                values: e.values,
            }
        }
        _ => return None,
    };

    Some((event, meta))
}
