//! Configuration for networks, protocol defaults and ambient environment.
//!
//! This module provides:
//! - Network configuration (RPC endpoint, gas, explorer, external contracts)
//! - Protocol defaults (registration parameters, keeper, indexer, verification)
//! - Network registry for loading every network file at startup
//! - Environment snapshot (API keys, mnemonic, default network)

mod env;
mod network;
mod protocol;
mod registry;

pub use env::{AmbientEnv, DEFAULT_NETWORK, DEV_MNEMONIC};
pub use network::{
    expand_env, ExplorerConfig, ExternalContracts, GasConfig, GasPricingModel, NetworkConfig,
    NetworkDetails, OracleProviderEntry, SettlementTokenEntry,
};
pub use protocol::{
    IndexerDefaults, KeeperDefaults, OracleProviderDefaults, ProtocolConfig,
    SettlementTokenDefaults, VerifyDefaults,
};
pub use registry::NetworkRegistry;
