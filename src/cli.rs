//! Command line surface.
//!
//! Task subcommands keep their colon-separated names (`factory:set`,
//! `upkeep:vault:maker:clear`, ...).

use std::path::PathBuf;

use alloy::primitives::Address;
use chromatic_core::config::DEFAULT_NETWORK;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "chromatic",
    about = "Deploy, operate and index the Chromatic perpetual futures protocol",
    version
)]
pub struct Cli {
    /// Network name from <config-dir>/networks
    #[arg(long, global = true, env = "CHROMATIC_NETWORK", default_value = DEFAULT_NETWORK)]
    pub network: String,

    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,

    /// Root of the per-network deployment records
    #[arg(long, global = true, default_value = "deployments")]
    pub deployments_dir: PathBuf,

    /// Compiled contract artifacts
    #[arg(long, global = true, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the deployment steps
    Deploy {
        /// Only run steps carrying one of these tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Redeploy market facets and cut them into every market
    HotfixFacets,

    #[command(name = "factory:set")]
    FactorySet(FactorySetOpts),

    #[command(name = "market:create")]
    MarketCreate {
        #[arg(long)]
        oracle_provider: Address,
        #[arg(long)]
        settlement_token: Address,
    },

    #[command(name = "oracle-provider:register")]
    OracleProviderRegister {
        #[arg(long)]
        oracle_provider: Address,
        #[arg(long)]
        min_take_profit_bps: Option<u32>,
        #[arg(long)]
        max_take_profit_bps: Option<u32>,
        /// 0 for 10x, 1 for 20x
        #[arg(long)]
        leverage_level: Option<u8>,
    },

    /// List registered oracle providers with their properties
    #[command(name = "oracle-provider:list")]
    OracleProviderList,

    /// Report registered settlement tokens
    #[command(name = "settlement-token")]
    SettlementToken,

    #[command(name = "settlement-token:register")]
    SettlementTokenRegister(SettlementTokenRegisterOpts),

    #[command(name = "settlement-token:set")]
    SettlementTokenSet(SettlementTokenSetOpts),

    /// Report automation task registrations and treasury balances
    Upkeep,

    /// Cancel every registered automation task
    #[command(name = "upkeep:clear")]
    UpkeepClear,

    #[command(name = "upkeep:vault:maker")]
    UpkeepVaultMaker(TokenOpt),

    #[command(name = "upkeep:vault:maker:clear")]
    UpkeepVaultMakerClear(TokenOpt),

    #[command(name = "upkeep:vault:market")]
    UpkeepVaultMarket(MarketOpt),

    #[command(name = "upkeep:vault:market:clear")]
    UpkeepVaultMarketClear(MarketOpt),

    #[command(name = "upkeep:settlement")]
    UpkeepSettlement(MarketOpt),

    #[command(name = "upkeep:settlement:clear")]
    UpkeepSettlementClear(MarketOpt),

    #[command(name = "upkeep:settlement:balance")]
    UpkeepSettlementBalance,

    #[command(name = "upkeep:settlement:deposit")]
    UpkeepSettlementDeposit(AmountOpt),

    #[command(name = "upkeep:settlement:withdraw")]
    UpkeepSettlementWithdraw(AmountOpt),

    #[command(name = "verify:all")]
    VerifyAll,

    #[command(name = "verify:core")]
    VerifyCore,

    #[command(name = "verify:periphery")]
    VerifyPeriphery,

    #[command(name = "fixed-price-swap-router:price")]
    SwapRouterPrice {
        /// Defaults to every priced token
        #[arg(long)]
        token: Option<Address>,
    },

    #[command(name = "fixed-price-swap-router:set-price")]
    SwapRouterSetPrice {
        #[arg(long)]
        token: Address,
        /// Tokens per ETH, decimal
        #[arg(long)]
        price: String,
    },

    #[command(name = "fixed-price-swap-router:whitelist")]
    SwapRouterWhitelist {
        #[arg(long)]
        client: Address,
    },

    #[command(name = "fixed-price-swap-router:unwhitelist")]
    SwapRouterUnwhitelist {
        #[arg(long)]
        client: Address,
    },

    /// Project protocol events into entities
    Index {
        /// Defaults to the store cursor, then the network start block
        #[arg(long)]
        from_block: Option<u64>,
        /// Keep polling for new blocks
        #[arg(long)]
        follow: bool,
        /// JSON snapshot file; in-memory when omitted
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Drive the mock oracle through a price script and liquidate
    Keeper {
        /// Comma separated prices, e.g. 1500,1400,1200
        #[arg(long)]
        prices: String,
        /// Wallet names or addresses to watch
        #[arg(long, value_delimiter = ',')]
        accounts: Vec<String>,
        #[arg(long)]
        market: Option<Address>,
    },

    /// Interactive wallet session
    Repl {
        #[arg(long)]
        market: Option<Address>,
    },
}

#[derive(Args, Debug)]
pub struct FactorySetOpts {
    #[arg(long)]
    pub dao: Option<Address>,
    #[arg(long)]
    pub treasury: Option<Address>,
    #[arg(long)]
    pub vault: Option<Address>,
    #[arg(long)]
    pub liquidator: Option<Address>,
    #[arg(long)]
    pub keeper_fee_payer: Option<Address>,
    #[arg(long)]
    pub market_settlement: Option<Address>,
}

/// Token amounts are decimal strings in whole token units.
#[derive(Args, Debug)]
pub struct SettlementTokenRegisterOpts {
    #[arg(long)]
    pub token: Address,
    #[arg(long)]
    pub oracle_provider: Address,
    #[arg(long)]
    pub minimum_margin: Option<String>,
    #[arg(long)]
    pub interest_rate_bps: Option<u64>,
    #[arg(long)]
    pub flash_loan_fee_rate_bps: Option<u64>,
    #[arg(long)]
    pub earning_distribution_threshold: Option<String>,
    #[arg(long)]
    pub uniswap_fee_tier: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SettlementTokenSetOpts {
    #[arg(long)]
    pub token: Address,
    #[arg(long)]
    pub minimum_margin: Option<String>,
    #[arg(long)]
    pub flash_loan_fee_rate_bps: Option<u64>,
    #[arg(long)]
    pub earning_distribution_threshold: Option<String>,
    #[arg(long)]
    pub uniswap_fee_tier: Option<u32>,
    /// Append an interest rate record with this annual rate
    #[arg(long, requires = "interest_rate_begin")]
    pub interest_rate_bps: Option<u64>,
    /// Unix timestamp the appended rate takes effect
    #[arg(long, requires = "interest_rate_bps")]
    pub interest_rate_begin: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TokenOpt {
    /// Defaults to every registered settlement token
    #[arg(long)]
    pub token: Option<Address>,
}

#[derive(Args, Debug)]
pub struct MarketOpt {
    /// Defaults to every market
    #[arg(long)]
    pub market: Option<Address>,
}

#[derive(Args, Debug)]
pub struct AmountOpt {
    /// ETH, decimal
    #[arg(long)]
    pub amount: String,
}
