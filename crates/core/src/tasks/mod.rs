//! Operational tasks against a deployed protocol.
//!
//! Every task resolves the factory from the deployment store, checks its
//! precondition, and then issues at most one state-changing call (or
//! prints a report). A failed precondition is not an error: the task logs a
//! warning and returns [`TaskOutcome::Skipped`].

pub mod factory;
pub mod oracle_provider;
pub mod settlement_token;
pub mod swap_router;
pub mod upkeep;
pub mod verify;

use crate::config::{AmbientEnv, NetworkConfig, ProtocolConfig};
use crate::deploy::{ArtifactStore, DeploymentStore};
use alloy::primitives::{Address, U256};
use alloy::providers::DynProvider;
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use chromatic_chain::{revert, ChainClient, TransactionSender, TransactionSenderBuilder};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Factory deployment name.
pub const FACTORY: &str = "ChromaticMarketFactory";

/// Result of a task whose precondition may not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Skipped(String),
}

impl TaskOutcome {
    /// Log and return a skipped outcome.
    pub fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(reason = %reason, "Task skipped");
        Self::Skipped(reason)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Everything a task needs: chain access, signer, deployments and config.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub client: ChainClient,
    pub sender: Arc<TransactionSender>,
    pub deployments: Arc<DeploymentStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
}

/// Build a sender for mnemonic account `index`.
///
/// Account 0 uses `PRIVATE_KEY` when set.
pub async fn build_sender(
    network: &NetworkConfig,
    env: &AmbientEnv,
    index: u32,
) -> Result<TransactionSender> {
    let gas = &network.network.gas;
    let builder = TransactionSenderBuilder::new(&network.network.rpc_url, network.chain_id())
        .gas_from_config(
            gas.pricing.as_str(),
            gas.default_gas_price_gwei,
            gas.max_gas_price_gwei,
            gas.priority_fee_gwei,
            gas.limit_multiplier,
        );

    if index == 0 {
        if let Some(key) = env.private_key.as_deref() {
            return builder.build(key).await;
        }
    }

    let mnemonic = env.mnemonic_for(network.is_local()).with_context(|| {
        format!("MNEMONIC is not set for network {}", network.name())
    })?;
    builder.build_from_mnemonic(mnemonic, index).await
}

impl TaskContext {
    /// Connect to a network with the deployer account.
    pub async fn connect(
        network: NetworkConfig,
        protocol: ProtocolConfig,
        deployments_root: impl AsRef<Path>,
        artifacts_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let client = ChainClient::connect(&network.network.rpc_url)
            .await
            .with_context(|| format!("connecting to {}", network.name()))?;

        if client.chain_id() != network.chain_id() {
            anyhow::bail!(
                "chain id mismatch for {}: config {} != node {}",
                network.name(),
                network.chain_id(),
                client.chain_id()
            );
        }

        let sender = build_sender(&network, AmbientEnv::get(), 0).await?;
        let deployments = DeploymentStore::open(deployments_root, network.name())?;
        let artifacts = ArtifactStore::load(artifacts_dir)?;

        info!(
            network = %network.name(),
            chain_id = network.chain_id(),
            deployer = %sender.address,
            gas_strategy = sender.gas_strategy_name(),
            "Task context ready"
        );

        Ok(Self {
            client,
            sender: Arc::new(sender),
            deployments: Arc::new(deployments),
            artifacts: Arc::new(artifacts),
            network,
            protocol,
        })
    }

    /// Read-only provider.
    pub fn provider(&self) -> &DynProvider {
        self.client.provider()
    }

    /// Signer address.
    pub fn deployer(&self) -> Address {
        self.sender.address
    }

    pub fn factory_address(&self) -> Result<Address> {
        Ok(self.deployments.require(FACTORY)?)
    }

    /// Send one state-changing call and wait for inclusion.
    ///
    /// Reverts are logged with their reason and propagated.
    pub async fn send<C: SolCall>(
        &self,
        label: &str,
        to: Address,
        call: C,
    ) -> Result<TransactionReceipt> {
        self.send_with_value(label, to, call, U256::ZERO).await
    }

    /// [`send`](Self::send) with attached native value.
    pub async fn send_with_value<C: SolCall>(
        &self,
        label: &str,
        to: Address,
        call: C,
        value: U256,
    ) -> Result<TransactionReceipt> {
        info!(action = %label, to = %to, "Sending transaction");
        match self.sender.send_call(to, &call, value).await {
            Ok(receipt) => {
                info!(
                    action = %label,
                    tx_hash = %receipt.transaction_hash,
                    gas_used = receipt.gas_used,
                    "Transaction confirmed"
                );
                Ok(receipt)
            }
            Err(e) => {
                let e = e.context(label.to_string());
                error!(error = %revert::describe(&e), "Transaction failed");
                Err(e)
            }
        }
    }
}

/// Parse `0x…` or fail with the flag name in the message.
pub fn parse_address(flag: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .with_context(|| format!("--{flag}: invalid address '{value}'"))
}
