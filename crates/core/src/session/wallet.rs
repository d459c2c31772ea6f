//! A named signer with the session's contract handles.

use crate::math::{format_amount, parse_amount, parse_signed_amount, PRICE_DECIMALS};
use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, I256, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use chromatic_chain::contracts::{
    CLBBalance, ExactInputSingleParams, ICLBToken, IChromaticLens, IChromaticRouter,
    IOracleProviderMock, ISwapRouter, IWETH9, IERC20,
};
use chromatic_chain::{revert, TransactionSender};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

/// Deadline slack for swaps.
const SWAP_DEADLINE_SECS: u64 = 300;

/// Contract addresses every wallet is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionContracts {
    pub factory: Address,
    pub market: Address,
    pub settlement_token: Address,
    pub settlement_decimals: u8,
    pub oracle_provider: Address,
    pub clb_token: Address,
    pub router: Address,
    pub lens: Address,
    pub weth: Option<Address>,
    pub swap_router: Option<Address>,
    pub uniswap_fee_tier: u32,
}

/// Balances shown by `balances`.
#[derive(Debug, Clone)]
pub struct Balances {
    pub eth: U256,
    pub weth: U256,
    pub settlement_token: U256,
    pub account: Option<(Address, U256)>,
    pub clb: Vec<CLBBalance>,
}

/// Signer plus handles; amounts are decimal strings in token units.
#[derive(Debug)]
pub struct Wallet {
    pub name: &'static str,
    pub index: u32,
    pub sender: Arc<TransactionSender>,
    pub contracts: SessionContracts,
}

impl Wallet {
    pub fn new(
        name: &'static str,
        index: u32,
        sender: Arc<TransactionSender>,
        contracts: SessionContracts,
    ) -> Self {
        Self {
            name,
            index,
            sender,
            contracts,
        }
    }

    pub fn address(&self) -> Address {
        self.sender.address
    }

    fn provider(&self) -> &DynProvider {
        self.sender.provider()
    }

    fn token_units(&self, amount: &str) -> Result<U256> {
        parse_amount(amount, self.contracts.settlement_decimals)
    }

    pub fn format_token(&self, amount: U256) -> String {
        format_amount(amount, self.contracts.settlement_decimals)
    }

    async fn send<C: SolCall>(&self, label: &str, to: Address, call: C, value: U256) -> Result<TransactionReceipt> {
        match self.sender.send_call(to, &call, value).await {
            Ok(receipt) => {
                info!(
                    wallet = self.name,
                    action = %label,
                    tx_hash = %receipt.transaction_hash,
                    "Transaction confirmed"
                );
                Ok(receipt)
            }
            Err(e) => {
                let e = e.context(label.to_string());
                error!(wallet = self.name, error = %revert::describe(&e), "Transaction failed");
                Err(e)
            }
        }
    }

    fn weth(&self) -> Result<Address> {
        self.contracts
            .weth
            .context("no WETH configured or deployed on this network")
    }

    /// Wrap `amount` ETH into WETH.
    pub async fn wrap_eth(&self, amount: &str) -> Result<U256> {
        let value = parse_amount(amount, 18)?;
        self.send("weth.deposit", self.weth()?, IWETH9::depositCall {}, value)
            .await?;
        Ok(value)
    }

    /// Wrap `amount` ETH and swap it for the settlement token.
    pub async fn swap_eth_for_settlement_token(&self, amount: &str) -> Result<U256> {
        let router = self
            .contracts
            .swap_router
            .context("no swap router configured or deployed on this network")?;
        let weth = self.weth()?;
        let amount_in = self.wrap_eth(amount).await?;

        let approve = IWETH9::approveCall {
            spender: router,
            amount: amount_in,
        };
        self.send("weth.approve", weth, approve, U256::ZERO).await?;

        let token = IERC20::new(self.contracts.settlement_token, self.provider());
        let before = token.balanceOf(self.address()).call().await?._0;

        let deadline = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            + SWAP_DEADLINE_SECS;
        let params = ExactInputSingleParams {
            tokenIn: weth,
            tokenOut: self.contracts.settlement_token,
            fee: U24::try_from(self.contracts.uniswap_fee_tier).context("uniswap fee tier")?,
            recipient: self.address(),
            deadline: U256::from(deadline),
            amountIn: amount_in,
            amountOutMinimum: U256::ZERO,
            sqrtPriceLimitX96: U160::ZERO,
        };
        self.send(
            "swapRouter.exactInputSingle",
            router,
            ISwapRouter::exactInputSingleCall { params },
            U256::ZERO,
        )
        .await?;

        let after = token.balanceOf(self.address()).call().await?._0;
        Ok(after.saturating_sub(before))
    }

    /// Push a new oracle version at `price` (18 decimals). Mock provider only.
    pub async fn update_price(&self, price: &str) -> Result<()> {
        let price = parse_signed_amount(price, PRICE_DECIMALS)?;
        let call = IOracleProviderMock::increaseVersionCall { price };
        self.send("oracleProvider.increaseVersion", self.contracts.oracle_provider, call, U256::ZERO)
            .await?;
        Ok(())
    }

    /// The wallet's router account, created on first use.
    pub async fn account(&self) -> Result<Address> {
        let router = IChromaticRouter::new(self.contracts.router, self.provider());
        let existing = router.getAccount().from(self.address()).call().await?._0;
        if existing != Address::ZERO {
            return Ok(existing);
        }
        self.send(
            "router.createAccount",
            self.contracts.router,
            IChromaticRouter::createAccountCall {},
            U256::ZERO,
        )
        .await?;
        let account = router.getAccount().from(self.address()).call().await?._0;
        info!(wallet = self.name, account = %account, "Account created");
        Ok(account)
    }

    /// Open a position; the account is topped up to cover the taker margin and fee.
    pub async fn open_position(
        &self,
        qty: &str,
        taker_margin: &str,
        maker_margin: &str,
        max_fee: Option<&str>,
    ) -> Result<()> {
        let decimals = self.contracts.settlement_decimals;
        let qty: I256 = parse_signed_amount(qty, decimals)?;
        let taker_margin = self.token_units(taker_margin)?;
        let maker_margin = self.token_units(maker_margin)?;
        // Worst case every bin charges 1%
        let max_fee = match max_fee {
            Some(fee) => self.token_units(fee)?,
            None => maker_margin / U256::from(100u64),
        };

        let account = self.account().await?;
        let token = IERC20::new(self.contracts.settlement_token, self.provider());
        let held = token.balanceOf(account).call().await?._0;
        let needed = taker_margin + max_fee;
        if held < needed {
            let call = IERC20::transferCall {
                to: account,
                amount: needed - held,
            };
            self.send("token.transfer", self.contracts.settlement_token, call, U256::ZERO)
                .await?;
        }

        let call = IChromaticRouter::openPositionCall {
            market: self.contracts.market,
            qty,
            takerMargin: taker_margin,
            makerMargin: maker_margin,
            maxAllowableTradingFee: max_fee,
        };
        self.send("router.openPosition", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    pub async fn close_position(&self, position_id: u64) -> Result<()> {
        let call = IChromaticRouter::closePositionCall {
            market: self.contracts.market,
            positionId: U256::from(position_id),
        };
        self.send("router.closePosition", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    pub async fn claim_position(&self, position_id: u64) -> Result<()> {
        let call = IChromaticRouter::claimPositionCall {
            market: self.contracts.market,
            positionId: U256::from(position_id),
        };
        self.send("router.claimPosition", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    pub async fn position_ids(&self) -> Result<Vec<U256>> {
        Ok(IChromaticRouter::new(self.contracts.router, self.provider())
            .getPositionIds(self.contracts.market)
            .from(self.address())
            .call()
            .await?
            ._0)
    }

    /// Deposit `amount` into the `fee_rate` bin, approving the router first if needed.
    pub async fn add_liquidity(&self, fee_rate: i16, amount: &str) -> Result<()> {
        let amount = self.token_units(amount)?;
        let token = IERC20::new(self.contracts.settlement_token, self.provider());
        let allowance = token
            .allowance(self.address(), self.contracts.router)
            .call()
            .await?
            ._0;
        if allowance < amount {
            let call = IERC20::approveCall {
                spender: self.contracts.router,
                amount: U256::MAX,
            };
            self.send("token.approve", self.contracts.settlement_token, call, U256::ZERO)
                .await?;
        }

        let call = IChromaticRouter::addLiquidityCall {
            market: self.contracts.market,
            feeRate: fee_rate,
            amount,
            recipient: self.address(),
        };
        self.send("router.addLiquidity", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    pub async fn claim_liquidity(&self, receipt_id: u64) -> Result<()> {
        let call = IChromaticRouter::claimLiquidityCall {
            market: self.contracts.market,
            receiptId: U256::from(receipt_id),
        };
        self.send("router.claimLiquidity", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    /// Return `amount` CLB tokens of the `fee_rate` bin.
    pub async fn remove_liquidity(&self, fee_rate: i16, amount: &str) -> Result<()> {
        let amount = self.token_units(amount)?;
        let clb = ICLBToken::new(self.contracts.clb_token, self.provider());
        if !clb
            .isApprovedForAll(self.address(), self.contracts.router)
            .call()
            .await?
            ._0
        {
            let call = ICLBToken::setApprovalForAllCall {
                operator: self.contracts.router,
                approved: true,
            };
            self.send("clbToken.setApprovalForAll", self.contracts.clb_token, call, U256::ZERO)
                .await?;
        }

        let call = IChromaticRouter::removeLiquidityCall {
            market: self.contracts.market,
            feeRate: fee_rate,
            clbTokenAmount: amount,
            recipient: self.address(),
        };
        self.send("router.removeLiquidity", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    pub async fn withdraw_liquidity(&self, receipt_id: u64) -> Result<()> {
        let call = IChromaticRouter::withdrawLiquidityCall {
            market: self.contracts.market,
            receiptId: U256::from(receipt_id),
        };
        self.send("router.withdrawLiquidity", self.contracts.router, call, U256::ZERO)
            .await?;
        Ok(())
    }

    pub async fn lp_receipt_ids(&self) -> Result<Vec<U256>> {
        Ok(IChromaticRouter::new(self.contracts.router, self.provider())
            .getLpReceiptIds(self.contracts.market)
            .from(self.address())
            .call()
            .await?
            ._0)
    }

    pub async fn balances(&self) -> Result<Balances> {
        let provider = self.provider();
        let address = self.address();
        let eth = provider.get_balance(address).await?;
        let weth = match self.contracts.weth {
            Some(weth) => IWETH9::new(weth, provider).balanceOf(address).call().await?._0,
            None => U256::ZERO,
        };
        let token = IERC20::new(self.contracts.settlement_token, provider);
        let settlement_token = token.balanceOf(address).call().await?._0;

        let account = IChromaticRouter::new(self.contracts.router, provider)
            .getAccount()
            .from(address)
            .call()
            .await?
            ._0;
        let account = if account == Address::ZERO {
            None
        } else {
            Some((account, token.balanceOf(account).call().await?._0))
        };

        let clb = IChromaticLens::new(self.contracts.lens, provider)
            .clbBalanceOf(self.contracts.market, address)
            .call()
            .await?
            ._0;

        Ok(Balances {
            eth,
            weth,
            settlement_token,
            account,
            clb,
        })
    }
}
