//! Registry of network configurations loaded at startup.

use super::NetworkConfig;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Network configurations indexed by name.
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` in `<config_dir>/networks`.
    ///
    /// Expected structure:
    /// ```text
    /// config/
    ///   protocol.toml
    ///   networks/
    ///     anvil.toml
    ///     arbitrum_sepolia.toml
    /// ```
    pub fn load_from_dir(config_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = config_dir.as_ref().join("networks");
        info!(config_dir = %dir.display(), "Loading network registry");

        let mut registry = Self::new();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("reading {}", dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if !path.extension().is_some_and(|e| e == "toml") {
                continue;
            }

            match NetworkConfig::from_file(&path) {
                Ok(mut config) => {
                    config.expand_env_vars();
                    debug!(
                        network = %config.name(),
                        chain_id = config.chain_id(),
                        file = %path.display(),
                        "Loaded network config"
                    );
                    registry.insert(config);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to load network config");
                }
            }
        }

        info!(networks = registry.networks.len(), "Network registry loaded");
        Ok(registry)
    }

    pub fn insert(&mut self, config: NetworkConfig) {
        self.networks.insert(config.name().to_string(), config);
    }

    pub fn get(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.get(name)
    }

    /// Like [`get`](Self::get) but with an error listing known networks.
    pub fn require(&self, name: &str) -> Result<&NetworkConfig> {
        self.get(name).with_context(|| {
            format!(
                "unknown network '{name}' (known: {})",
                self.names().collect::<Vec<_>>().join(", ")
            )
        })
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.values().find(|n| n.chain_id() == chain_id)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.networks.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_network(dir: &Path, name: &str, chain_id: u64) {
        let body = format!(
            "[network]\nname = \"{name}\"\nchain_id = {chain_id}\nrpc_url = \"http://127.0.0.1:8545\"\ntags = [\"local\"]\n"
        );
        std::fs::write(dir.join(format!("{name}.toml")), body).unwrap();
    }

    #[test]
    fn test_empty_registry() {
        let registry = NetworkRegistry::new();
        assert!(registry.get("anvil").is_none());
        assert!(registry.require("anvil").is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let networks = tmp.path().join("networks");
        std::fs::create_dir(&networks).unwrap();
        write_network(&networks, "anvil", 31337);
        write_network(&networks, "fork", 42161);
        std::fs::write(networks.join("README.md"), "ignored").unwrap();
        std::fs::write(networks.join("broken.toml"), "not = [valid").unwrap();

        let registry = NetworkRegistry::load_from_dir(tmp.path()).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["anvil", "fork"]);
        assert!(registry.require("anvil").unwrap().is_local());
        assert_eq!(registry.by_chain_id(42161).unwrap().name(), "fork");
    }
}
