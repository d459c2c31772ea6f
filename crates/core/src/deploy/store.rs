//! Persisted deployment records (`deployments/<network>/<Name>.json`).

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const MIGRATIONS_FILE: &str = ".migrations.json";

/// Failures in the deployment flow.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("no deployment recorded for {0}")]
    MissingDeployment(String),
    #[error("deploy of {0} returned a receipt without a contract address")]
    NoContractAddress(String),
}

/// What was deployed, where, and from which bytecode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub address: Address,
    #[serde(default)]
    pub abi: serde_json::Value,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    /// ABI-encoded constructor arguments, `0x`-prefixed hex
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub libraries: BTreeMap<String, Address>,
    /// keccak256 of the init code (linked bytecode + args)
    pub bytecode_hash: B256,
    pub deployed_at: DateTime<Utc>,
}

/// Deployment records and executed migration ids for one network.
#[derive(Debug)]
pub struct DeploymentStore {
    dir: PathBuf,
    network: String,
    records: RwLock<BTreeMap<String, DeploymentRecord>>,
    migrations: RwLock<BTreeMap<String, i64>>,
}

impl DeploymentStore {
    /// Open (creating if needed) `<root>/<network>`.
    pub fn open(root: impl AsRef<Path>, network: &str) -> Result<Self> {
        let dir = root.as_ref().join(network);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;

        let mut records = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            let record: DeploymentRecord = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            records.insert(name.to_string(), record);
        }

        let migrations_path = dir.join(MIGRATIONS_FILE);
        let migrations = if migrations_path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&migrations_path)?)
                .with_context(|| format!("parsing {}", migrations_path.display()))?
        } else {
            BTreeMap::new()
        };

        debug!(
            network = %network,
            records = records.len(),
            migrations = migrations.len(),
            "Deployment store opened"
        );

        Ok(Self {
            dir,
            network: network.to_string(),
            records: RwLock::new(records),
            migrations: RwLock::new(migrations),
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, name: &str) -> Option<DeploymentRecord> {
        self.records.read().get(name).cloned()
    }

    pub fn address(&self, name: &str) -> Option<Address> {
        self.records.read().get(name).map(|r| r.address)
    }

    /// Address of a deployment the caller depends on.
    pub fn require(&self, name: &str) -> Result<Address, DeployError> {
        self.address(name)
            .ok_or_else(|| DeployError::MissingDeployment(name.to_string()))
    }

    /// Persist a record and make it visible to later lookups.
    pub fn save(&self, name: &str, record: DeploymentRecord) -> Result<()> {
        let path = self.dir.join(format!("{name}.json"));
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        self.records.write().insert(name.to_string(), record);
        Ok(())
    }

    /// All records sorted by name.
    pub fn all(&self) -> Vec<(String, DeploymentRecord)> {
        self.records
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_migrated(&self, id: &str) -> bool {
        self.migrations.read().contains_key(id)
    }

    /// Record a completed step id with the current unix timestamp.
    pub fn mark_migrated(&self, id: &str) -> Result<()> {
        let snapshot = {
            let mut migrations = self.migrations.write();
            migrations.insert(id.to_string(), Utc::now().timestamp());
            migrations.clone()
        };
        let path = self.dir.join(MIGRATIONS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(byte: u8) -> DeploymentRecord {
        DeploymentRecord {
            address: Address::repeat_byte(byte),
            abi: serde_json::json!([]),
            transaction_hash: Some(B256::repeat_byte(byte)),
            args: "0x".to_string(),
            libraries: BTreeMap::new(),
            bytecode_hash: B256::repeat_byte(0xaa),
            deployed_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::open(tmp.path(), "anvil").unwrap();
        assert!(store.get("ChromaticVault").is_none());
        assert!(store.require("ChromaticVault").is_err());

        store.save("ChromaticVault", record(1)).unwrap();
        store.save("ChromaticRouter", record(2)).unwrap();
        store.mark_migrated("2_deploy_core").unwrap();

        let reopened = DeploymentStore::open(tmp.path(), "anvil").unwrap();
        assert_eq!(
            reopened.address("ChromaticVault"),
            Some(Address::repeat_byte(1))
        );
        let names: Vec<_> = reopened.all().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ChromaticRouter", "ChromaticVault"]);
        assert!(reopened.is_migrated("2_deploy_core"));
        assert!(!reopened.is_migrated("3_deploy_periphery"));
    }

    #[test]
    fn test_networks_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let anvil = DeploymentStore::open(tmp.path(), "anvil").unwrap();
        anvil.save("ChromaticVault", record(1)).unwrap();

        let sepolia = DeploymentStore::open(tmp.path(), "arbitrum_sepolia").unwrap();
        assert!(sepolia.get("ChromaticVault").is_none());
    }

    #[test]
    fn test_record_json_layout() {
        let json = serde_json::to_value(record(3)).unwrap();
        assert!(json.get("transactionHash").is_some());
        assert!(json.get("bytecodeHash").is_some());
        assert!(json.get("deployedAt").is_some());
    }
}
