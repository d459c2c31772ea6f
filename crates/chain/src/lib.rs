//! Chromatic chain interaction layer.
//!
//! This crate provides:
//! - `sol!` bindings for the factory, market diamond, vault, router, lens,
//!   oracle providers, CLB token and the Gelato automation contracts
//! - An erased HTTP provider wrapper with paged log queries
//! - Transaction signing and sending (private key or mnemonic index)
//! - Gas strategy abstraction (Legacy + EIP-1559)
//! - Event decoding for the indexer and revert-reason extraction

pub mod contracts;
pub mod events;
pub mod gas;
mod provider;
pub mod revert;
mod signer;

pub use contracts::{selector, FacetCut, FacetCutAction, ETH_SENTINEL};
pub use events::{ChromaticEvent, LogMeta};
pub use gas::{create_gas_strategy, GasParams, GasStrategy};
pub use provider::{redact, ChainClient, DEFAULT_LOG_PAGE};
pub use signer::{
    DeployedContract, NonceManager, TransactionSender, TransactionSenderBuilder,
    DEFAULT_GAS_MULTIPLIER, FALLBACK_GAS_LIMIT,
};
