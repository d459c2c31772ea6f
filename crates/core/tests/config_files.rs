//! The checked-in `config/` directory parses.

use chromatic_core::{NetworkRegistry, ProtocolConfig};

const CONFIG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config");

#[test]
fn test_every_network_loads() {
    let registry = NetworkRegistry::load_from_dir(CONFIG_DIR).unwrap();
    let names: Vec<_> = registry.names().collect();
    assert_eq!(
        names,
        vec!["anvil", "arbitrum_goerli", "arbitrum_one", "arbitrum_sepolia"]
    );

    let anvil = registry.require("anvil").unwrap();
    assert!(anvil.is_local() && anvil.is_mockup());
    assert_eq!(anvil.chain_id(), 31337);

    let one = registry.require("arbitrum_one").unwrap();
    assert!(one.is_mainnet() && !one.is_mockup());
    assert!(one.network.external.swap_router.is_some());
    assert_eq!(one.network.explorer.as_ref().unwrap().api_key_env, "ARBISCAN_API_KEY");

    assert_eq!(registry.by_chain_id(421614).unwrap().name(), "arbitrum_sepolia");
}

#[test]
fn test_protocol_defaults_match_file() {
    let file = ProtocolConfig::load_or_default(CONFIG_DIR).unwrap();
    let defaults = ProtocolConfig::default();
    assert_eq!(file.oracle_provider.max_take_profit_bps, defaults.oracle_provider.max_take_profit_bps);
    assert_eq!(file.settlement_token.minimum_margin, defaults.settlement_token.minimum_margin);
    assert_eq!(file.keeper.accounts, vec!["alice", "bob"]);
    assert_eq!(file.indexer.batch_size, 2_000);
    assert_eq!(file.verify.attempts, 5);
}
