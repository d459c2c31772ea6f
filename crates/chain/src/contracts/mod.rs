//! Contract bindings for the Chromatic protocol and its external collaborators.
//!
//! - [`bindings`]: `sol!` interfaces for factory, market, vault, periphery,
//!   diamond loupe/cut and automation contracts
//! - [`common`]: ERC20, selector helpers and diamond cut actions
//!
//! Reads go through the generated `#[sol(rpc)]` instances; writes are encoded
//! with [`SolCall`](alloy::sol_types::SolCall) and sent through
//! [`TransactionSender`](crate::TransactionSender) so every transaction is
//! awaited to inclusion.

pub mod bindings;
pub mod common;

pub use bindings::{
    BinMargin, CLBBalance, ExactInputSingleParams, FacetCut, IAutomate, ICLBToken,
    IChromaticLens, IChromaticLiquidator, IChromaticMarket, IChromaticMarketFactory,
    IChromaticRouter, IChromaticVault, IDiamondCut, IDiamondLoupe, IFixedPriceSwapRouter,
    IMarketSettlement, IOracleProvider, IOracleProviderMock, ISwapRouter, ITaskTreasury,
    IVaultEarningDistributor, IWETH9, InterestRateRecord, LiquidityBinStatus, LoupeFacet,
    LpReceipt, OracleProviderProperties, OracleVersion, Position,
};
pub use common::{selector, FacetCutAction, IERC20, ETH_SENTINEL};
