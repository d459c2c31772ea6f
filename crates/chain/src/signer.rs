//! Transaction signer and sender.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! Every transaction is awaited to inclusion before the call returns, so
//! deploy steps and tasks observe strictly sequential ordering.

use crate::gas::{buffered_gas_limit, create_gas_strategy, GasParams, GasStrategy, LegacyGasStrategy};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256, U64};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Gas limit used when `eth_estimateGas` fails (e.g. a deploy that would revert
/// is still sent so the revert reason lands on-chain).
pub const FALLBACK_GAS_LIMIT: u64 = 8_000_000;

/// Default headroom over the node's gas estimate.
pub const DEFAULT_GAS_MULTIPLIER: f64 = 1.2;

/// Locally tracked nonce.
pub struct NonceManager {
    current: AtomicU64,
}

impl NonceManager {
    pub fn new(initial_nonce: u64) -> Self {
        Self {
            current: AtomicU64::new(initial_nonce),
        }
    }

    /// Get next nonce and increment counter.
    #[inline]
    pub fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst)
    }

    /// Get current nonce without incrementing.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Reset nonce to chain value (use after tx failure).
    pub fn reset(&self, chain_nonce: u64) {
        self.current.store(chain_nonce, Ordering::SeqCst);
    }
}

/// A contract created by [`TransactionSender::deploy`].
#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub address: Address,
    pub receipt: TransactionReceipt,
}

/// Signs, sends and confirms transactions for one account.
pub struct TransactionSender {
    /// Provider with the signing wallet attached
    provider: DynProvider,
    /// Signer address
    pub address: Address,
    /// Chain ID
    chain_id: u64,
    /// Cached nonce manager
    nonce_manager: NonceManager,
    /// Multiplier applied to gas estimates
    gas_multiplier: f64,
    /// Gas pricing strategy
    gas_strategy: Box<dyn GasStrategy>,
}

/// Builder for TransactionSender.
pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: u64,
    gas_strategy: Option<Box<dyn GasStrategy>>,
    gas_multiplier: f64,
}

impl TransactionSenderBuilder {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            gas_strategy: None,
            gas_multiplier: DEFAULT_GAS_MULTIPLIER,
        }
    }

    /// Set the gas strategy.
    pub fn gas_strategy(mut self, strategy: Box<dyn GasStrategy>) -> Self {
        self.gas_strategy = Some(strategy);
        self
    }

    /// Set the gas estimate multiplier.
    pub fn gas_multiplier(mut self, multiplier: f64) -> Self {
        self.gas_multiplier = multiplier;
        self
    }

    /// Set gas strategy from network config parameters.
    pub fn gas_from_config(
        mut self,
        pricing_model: &str,
        default_gas_price_gwei: f64,
        max_gas_price_gwei: f64,
        priority_fee_gwei: Option<f64>,
        limit_multiplier: f64,
    ) -> Self {
        self.gas_strategy = Some(create_gas_strategy(
            pricing_model,
            default_gas_price_gwei,
            max_gas_price_gwei,
            priority_fee_gwei,
        ));
        self.gas_multiplier = limit_multiplier;
        self
    }

    /// Build from a hex private key (with or without 0x prefix).
    pub async fn build(self, private_key: &str) -> Result<TransactionSender> {
        let signer: PrivateKeySigner = private_key
            .trim_start_matches("0x")
            .parse()
            .context("Invalid private key")?;
        self.build_with_signer(signer).await
    }

    /// Build from a BIP-39 mnemonic at the given account index
    /// (`m/44'/60'/0'/0/{index}`).
    pub async fn build_from_mnemonic(self, phrase: &str, index: u32) -> Result<TransactionSender> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase)
            .index(index)?
            .build()
            .context("Invalid mnemonic")?;
        self.build_with_signer(signer).await
    }

    async fn build_with_signer(self, signer: PrivateKeySigner) -> Result<TransactionSender> {
        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .on_http(self.rpc_url.parse()?)
            .erased();

        let initial_nonce = provider.get_transaction_count(address).await?;

        let gas_strategy = self.gas_strategy.unwrap_or_else(|| {
            Box::new(LegacyGasStrategy::new(
                100_000_000,   // 0.1 gwei
                2_000_000_000, // 2 gwei
            ))
        });

        debug!(
            address = %address,
            chain_id = self.chain_id,
            initial_nonce = initial_nonce,
            gas_strategy = gas_strategy.strategy_name(),
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            provider,
            address,
            chain_id: self.chain_id,
            nonce_manager: NonceManager::new(initial_nonce),
            gas_multiplier: self.gas_multiplier,
            gas_strategy,
        })
    }
}

impl TransactionSender {
    /// Create a sender from a private key with default Legacy pricing.
    pub async fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        TransactionSenderBuilder::new(rpc_url, chain_id)
            .build(private_key)
            .await
    }

    /// Get the current gas strategy name.
    pub fn gas_strategy_name(&self) -> &'static str {
        self.gas_strategy.strategy_name()
    }

    /// Get the signing provider.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Encode and send a typed contract call.
    pub async fn send_call<C: SolCall>(
        &self,
        to: Address,
        call: &C,
        value: U256,
    ) -> Result<TransactionReceipt> {
        self.send_transaction(to, Bytes::from(call.abi_encode()), value)
            .await
    }

    /// Send a transaction and wait for confirmation.
    pub async fn send_transaction(
        &self,
        to: Address,
        calldata: Bytes,
        value: U256,
    ) -> Result<TransactionReceipt> {
        let tx = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata)
            .with_value(value);
        self.submit(tx).await
    }

    /// Deploy a contract from init code (creation bytecode + encoded constructor args).
    pub async fn deploy(&self, init_code: Bytes) -> Result<DeployedContract> {
        let tx = TransactionRequest::default().with_deploy_code(init_code);
        let receipt = self.submit(tx).await?;
        let address = receipt
            .contract_address
            .ok_or_else(|| anyhow::anyhow!("Deploy receipt has no contract address"))?;
        Ok(DeployedContract { address, receipt })
    }

    async fn submit(&self, tx: TransactionRequest) -> Result<TransactionReceipt> {
        let start = Instant::now();
        let nonce = self.nonce_manager.next();

        let mut tx = tx
            .with_from(self.address)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);

        let gas_limit = match self.estimate_gas(&tx).await {
            Ok(estimate) => buffered_gas_limit(estimate, self.gas_multiplier),
            Err(e) => {
                warn!(error = %e, "Gas estimation failed, using fallback limit");
                FALLBACK_GAS_LIMIT
            }
        };
        tx.set_gas_limit(gas_limit);

        let gas_params = self.gas_strategy.fetch_params(&self.provider).await?;
        self.gas_strategy.apply_gas(&mut tx, &gas_params);

        debug!(
            to = ?tx.to,
            nonce = nonce,
            gas_limit = gas_limit,
            gas_strategy = self.gas_strategy.strategy_name(),
            gas_price = gas_params.effective_gas_price(),
            "Sending transaction"
        );

        let pending = match self.provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                self.sync_nonce().await;
                return Err(e.into());
            }
        };
        let tx_hash = *pending.tx_hash();
        let receipt = pending.get_receipt().await?;

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                elapsed_ms = start.elapsed().as_millis(),
                "Transaction confirmed"
            );
            Ok(receipt)
        } else {
            warn!(tx_hash = %tx_hash, "Transaction reverted, syncing nonce");
            self.sync_nonce().await;
            anyhow::bail!("Transaction reverted: {tx_hash}")
        }
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let estimate: U64 = self
            .provider
            .raw_request("eth_estimateGas".into(), (tx.clone(),))
            .await?;
        Ok(estimate.to::<u64>())
    }

    /// Resync the local nonce from chain.
    pub async fn sync_nonce(&self) {
        match self.provider.get_transaction_count(self.address).await {
            Ok(chain_nonce) => {
                self.nonce_manager.reset(chain_nonce);
                debug!(nonce = chain_nonce, "Nonce synced from chain");
            }
            Err(e) => {
                warn!(error = %e, "Failed to sync nonce from chain");
            }
        }
    }

    /// Get current cached nonce.
    pub fn current_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }

    /// Get native balance of the signer.
    pub async fn get_balance(&self) -> Result<U256> {
        Ok(self.provider.get_balance(self.address).await?)
    }

    /// Fetch gas params without sending (used by reports).
    pub async fn gas_params(&self) -> Result<GasParams> {
        self.gas_strategy.fetch_params(&self.provider).await
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("gas_strategy", &self.gas_strategy.strategy_name())
            .finish_non_exhaustive()
    }
}
