//! Interactive session over a deployed market.
//!
//! - [`command`]: REPL line parsing
//! - [`wallet`]: named signers with bound contract handles
//!
//! Wallets are derived from the mnemonic the first time any of them is used
//! and shared for the rest of the session.

pub mod command;
pub mod wallet;

pub use command::{ReplCommand, WalletAction, HELP};
pub use wallet::{Balances, SessionContracts, Wallet};

use crate::config::AmbientEnv;
use crate::deploy::steps::{FIXED_PRICE_SWAP_ROUTER, LENS, ROUTER, WETH9};
use crate::math::format_amount;
use crate::tasks::{build_sender, TaskContext};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use chromatic_chain::contracts::{IChromaticMarket, IChromaticMarketFactory, IERC20};
use colored::Colorize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Wallet names in mnemonic index order.
pub const WALLET_NAMES: [&str; 8] = [
    "deployer", "alice", "bob", "charlie", "david", "eve", "frank", "grace",
];

/// Session state shared by every REPL command.
pub struct Session {
    tasks: TaskContext,
    market: Option<Address>,
    contracts: OnceCell<SessionContracts>,
    wallets: OnceCell<BTreeMap<&'static str, Arc<Wallet>>>,
}

impl Session {
    /// `market` selects a market; the factory's first market otherwise.
    pub fn new(tasks: TaskContext, market: Option<Address>) -> Self {
        Self {
            tasks,
            market,
            contracts: OnceCell::new(),
            wallets: OnceCell::new(),
        }
    }

    /// Resolve the contract handles once.
    pub async fn contracts(&self) -> Result<&SessionContracts> {
        self.contracts
            .get_or_try_init(|| resolve_contracts(&self.tasks, self.market))
            .await
    }

    /// Every named wallet, built on first use.
    pub async fn wallets(&self) -> Result<&BTreeMap<&'static str, Arc<Wallet>>> {
        self.wallets
            .get_or_try_init(|| async {
                let contracts = *self.contracts().await?;
                let count = self
                    .tasks
                    .network
                    .network
                    .mnemonic_accounts
                    .min(WALLET_NAMES.len() as u32);

                let mut wallets = BTreeMap::new();
                for (index, name) in WALLET_NAMES.iter().take(count as usize).enumerate() {
                    let index = index as u32;
                    let sender = if index == 0 {
                        self.tasks.sender.clone()
                    } else {
                        Arc::new(build_sender(&self.tasks.network, AmbientEnv::get(), index).await?)
                    };
                    debug!(wallet = %name, address = %sender.address, "Wallet ready");
                    wallets.insert(*name, Arc::new(Wallet::new(*name, index, sender, contracts)));
                }
                info!(wallets = wallets.len(), market = %contracts.market, "Session wallets ready");
                Ok::<_, anyhow::Error>(wallets)
            })
            .await
    }

    pub async fn wallet(&self, name: &str) -> Result<Arc<Wallet>> {
        self.wallets()
            .await?
            .get(name)
            .cloned()
            .with_context(|| format!("unknown wallet '{name}', try 'wallets'"))
    }

    /// Run one command. Returns `false` when the session should end.
    pub async fn execute(&self, command: ReplCommand) -> Result<bool> {
        match command {
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Exit => return Ok(false),
            ReplCommand::Wallets => {
                for (name, wallet) in self.wallets().await? {
                    println!(
                        "{:<10}{} (#{})",
                        name.bright_cyan(),
                        wallet.address(),
                        wallet.index
                    );
                }
            }
            ReplCommand::Wallet { wallet, action } => {
                let wallet = self.wallet(&wallet).await?;
                run_action(&wallet, action).await?;
            }
        }
        Ok(true)
    }
}

async fn resolve_contracts(tasks: &TaskContext, market: Option<Address>) -> Result<SessionContracts> {
    let factory_address = tasks.factory_address()?;
    let factory = IChromaticMarketFactory::new(factory_address, tasks.provider());

    let market = match market {
        Some(market) => market,
        None => factory
            .getMarkets()
            .call()
            .await?
            ._0
            .first()
            .copied()
            .context("factory has no markets, run `deploy` first")?,
    };
    let instance = IChromaticMarket::new(market, tasks.provider());
    let settlement_token = instance.settlementToken().call().await?._0;
    let oracle_provider = instance.oracleProvider().call().await?._0;
    let clb_token = instance.clbToken().call().await?._0;
    let settlement_decimals = IERC20::new(settlement_token, tasks.provider())
        .decimals()
        .call()
        .await?
        ._0;
    let uniswap_fee_tier = factory
        .getUniswapFeeTier(settlement_token)
        .call()
        .await?
        ._0
        .to::<u32>();

    let external = &tasks.network.network.external;
    let swap_router = if tasks.network.is_mockup() {
        external
            .fixed_price_swap_router
            .or_else(|| tasks.deployments.address(FIXED_PRICE_SWAP_ROUTER))
    } else {
        external.swap_router
    };

    Ok(SessionContracts {
        factory: factory_address,
        market,
        settlement_token,
        settlement_decimals,
        oracle_provider,
        clb_token,
        router: tasks.deployments.require(ROUTER)?,
        lens: tasks.deployments.require(LENS)?,
        weth: external.weth.or_else(|| tasks.deployments.address(WETH9)),
        swap_router,
        uniswap_fee_tier,
    })
}

async fn run_action(wallet: &Wallet, action: WalletAction) -> Result<()> {
    match action {
        WalletAction::Balances => {
            let b = wallet.balances().await?;
            println!("{} {}", wallet.name.bright_green().bold(), wallet.address());
            println!("  ETH      {}", format_amount(b.eth, 18));
            println!("  WETH     {}", format_amount(b.weth, 18));
            println!("  token    {}", wallet.format_token(b.settlement_token));
            if let Some((account, balance)) = b.account {
                println!("  account  {account} holds {}", wallet.format_token(balance));
            }
            for clb in b.clb.iter().filter(|c| !c.balance.is_zero()) {
                println!(
                    "  CLB #{}  {} of {}  (bin value {})",
                    clb.tokenId,
                    wallet.format_token(clb.balance),
                    wallet.format_token(clb.totalSupply),
                    wallet.format_token(clb.binValue)
                );
            }
        }
        WalletAction::Wrap { amount } => {
            wallet.wrap_eth(&amount).await?;
            println!("{} wrapped {amount} ETH", "ok".green());
        }
        WalletAction::Swap { amount } => {
            let received = wallet.swap_eth_for_settlement_token(&amount).await?;
            println!(
                "{} swapped {amount} ETH for {}",
                "ok".green(),
                wallet.format_token(received)
            );
        }
        WalletAction::UpdatePrice { price } => {
            wallet.update_price(&price).await?;
            println!("{} oracle price {price}", "ok".green());
        }
        WalletAction::Open {
            qty,
            taker_margin,
            maker_margin,
            max_fee,
        } => {
            wallet
                .open_position(&qty, &taker_margin, &maker_margin, max_fee.as_deref())
                .await?;
            println!("{} opened qty {qty}", "ok".green());
        }
        WalletAction::Close { position_id } => {
            wallet.close_position(position_id).await?;
            println!("{} closed #{position_id}", "ok".green());
        }
        WalletAction::Claim { position_id } => {
            wallet.claim_position(position_id).await?;
            println!("{} claimed #{position_id}", "ok".green());
        }
        WalletAction::Positions => {
            let ids = wallet.position_ids().await?;
            println!("{} positions: {ids:?}", wallet.name.bright_green());
        }
        WalletAction::AddLiquidity { fee_rate, amount } => {
            wallet.add_liquidity(fee_rate, &amount).await?;
            println!("{} added {amount} at fee rate {fee_rate}", "ok".green());
        }
        WalletAction::ClaimLiquidity { receipt_id } => {
            wallet.claim_liquidity(receipt_id).await?;
            println!("{} claimed receipt #{receipt_id}", "ok".green());
        }
        WalletAction::RemoveLiquidity { fee_rate, amount } => {
            wallet.remove_liquidity(fee_rate, &amount).await?;
            println!("{} removed {amount} CLB at fee rate {fee_rate}", "ok".green());
        }
        WalletAction::WithdrawLiquidity { receipt_id } => {
            wallet.withdraw_liquidity(receipt_id).await?;
            println!("{} withdrew receipt #{receipt_id}", "ok".green());
        }
        WalletAction::Receipts => {
            let ids = wallet.lp_receipt_ids().await?;
            println!("{} receipts: {ids:?}", wallet.name.bright_green());
        }
    }
    Ok(())
}
