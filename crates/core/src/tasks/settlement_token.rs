//! `settlement-token`, `settlement-token:register` and `settlement-token:set`.

use super::{TaskContext, TaskOutcome};
use crate::config::SettlementTokenDefaults;
use crate::math::{format_amount, parse_amount, BPS};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use chromatic_chain::contracts::{IChromaticMarketFactory, InterestRateRecord, IERC20};
use colored::Colorize;
use futures::future::try_join_all;
use tracing::{info, instrument};

/// Uniswap v3 pool fee tiers.
pub const UNISWAP_FEE_TIERS: [u32; 4] = [100, 500, 3_000, 10_000];

fn fee_tier(value: u32) -> Result<U24> {
    if !UNISWAP_FEE_TIERS.contains(&value) {
        anyhow::bail!("unsupported uniswap fee tier {value}, expected one of {UNISWAP_FEE_TIERS:?}");
    }
    U24::try_from(value).context("uniswap fee tier")
}

/// Registration parameters; unset fields fall back to protocol defaults.
///
/// Token amounts are decimal strings in whole token units.
#[derive(Debug, Clone, Default)]
pub struct RegisterArgs {
    pub token: Address,
    pub oracle_provider: Address,
    pub minimum_margin: Option<String>,
    pub interest_rate_bps: Option<u64>,
    pub flash_loan_fee_rate_bps: Option<u64>,
    pub earning_distribution_threshold: Option<String>,
    pub uniswap_fee_tier: Option<u32>,
}

impl RegisterArgs {
    pub fn new(token: Address, oracle_provider: Address) -> Self {
        Self {
            token,
            oracle_provider,
            ..Default::default()
        }
    }
}

/// Fully resolved registration values in token units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub minimum_margin: U256,
    pub interest_rate_bps: U256,
    pub flash_loan_fee_rate_bps: U256,
    pub earning_distribution_threshold: U256,
    pub uniswap_fee_tier: U24,
}

impl Registration {
    pub fn resolve(
        args: &RegisterArgs,
        defaults: &SettlementTokenDefaults,
        decimals: u8,
    ) -> Result<Self> {
        let minimum_margin = args
            .minimum_margin
            .as_deref()
            .unwrap_or(&defaults.minimum_margin);
        let threshold = args
            .earning_distribution_threshold
            .as_deref()
            .unwrap_or(&defaults.earning_distribution_threshold);
        let interest_rate = args.interest_rate_bps.unwrap_or(defaults.interest_rate_bps);
        let flash_loan_fee = args
            .flash_loan_fee_rate_bps
            .unwrap_or(defaults.flash_loan_fee_rate_bps);

        if U256::from(interest_rate) > BPS {
            anyhow::bail!("interest rate {interest_rate} bps exceeds 100%");
        }
        if U256::from(flash_loan_fee) > BPS {
            anyhow::bail!("flash loan fee {flash_loan_fee} bps exceeds 100%");
        }

        Ok(Self {
            minimum_margin: parse_amount(minimum_margin, decimals).context("minimum margin")?,
            interest_rate_bps: U256::from(interest_rate),
            flash_loan_fee_rate_bps: U256::from(flash_loan_fee),
            earning_distribution_threshold: parse_amount(threshold, decimals)
                .context("earning distribution threshold")?,
            uniswap_fee_tier: fee_tier(args.uniswap_fee_tier.unwrap_or(defaults.uniswap_fee_tier))?,
        })
    }
}

/// Register a settlement token against an already registered oracle provider.
#[instrument(skip(tasks, args), fields(token = %args.token), name = "settlement-token:register")]
pub async fn register(tasks: &TaskContext, args: RegisterArgs) -> Result<TaskOutcome> {
    let address = tasks.factory_address()?;
    let factory = IChromaticMarketFactory::new(address, tasks.provider());

    if factory
        .isRegisteredSettlementToken(args.token)
        .call()
        .await?
        ._0
    {
        return Ok(TaskOutcome::skipped(format!(
            "settlement token {} already registered",
            args.token
        )));
    }
    if !factory
        .isRegisteredOracleProvider(args.oracle_provider)
        .call()
        .await?
        ._0
    {
        return Ok(TaskOutcome::skipped(format!(
            "oracle provider {} is not registered",
            args.oracle_provider
        )));
    }

    let decimals = IERC20::new(args.token, tasks.provider())
        .decimals()
        .call()
        .await
        .with_context(|| format!("decimals of {}", args.token))?
        ._0;
    let registration = Registration::resolve(&args, &tasks.protocol.settlement_token, decimals)?;

    let call = IChromaticMarketFactory::registerSettlementTokenCall {
        token: args.token,
        oracleProvider: args.oracle_provider,
        minimumMargin: registration.minimum_margin,
        interestRate: registration.interest_rate_bps,
        flashLoanFeeRate: registration.flash_loan_fee_rate_bps,
        earningDistributionThreshold: registration.earning_distribution_threshold,
        uniswapFeeTier: registration.uniswap_fee_tier,
    };
    tasks
        .send("factory.registerSettlementToken", address, call)
        .await?;
    info!(
        oracle_provider = %args.oracle_provider,
        minimum_margin = %format_amount(registration.minimum_margin, decimals),
        interest_rate_bps = %registration.interest_rate_bps,
        "Settlement token registered"
    );
    Ok(TaskOutcome::Done)
}

/// Parameter changes for a registered token; `None` leaves a value alone.
#[derive(Debug, Clone, Default)]
pub struct SetArgs {
    pub token: Address,
    pub minimum_margin: Option<String>,
    pub flash_loan_fee_rate_bps: Option<u64>,
    pub earning_distribution_threshold: Option<String>,
    pub uniswap_fee_tier: Option<u32>,
    /// Annual rate in bps and the unix timestamp it starts at
    pub interest_rate_record: Option<(u64, u64)>,
}

impl SetArgs {
    pub fn is_empty(&self) -> bool {
        self.minimum_margin.is_none()
            && self.flash_loan_fee_rate_bps.is_none()
            && self.earning_distribution_threshold.is_none()
            && self.uniswap_fee_tier.is_none()
            && self.interest_rate_record.is_none()
    }
}

/// Apply each provided parameter whose on-chain value differs.
#[instrument(skip(tasks, args), fields(token = %args.token), name = "settlement-token:set")]
pub async fn set(tasks: &TaskContext, args: &SetArgs) -> Result<TaskOutcome> {
    if args.is_empty() {
        return Ok(TaskOutcome::skipped("no settlement token parameter given"));
    }

    let address = tasks.factory_address()?;
    let factory = IChromaticMarketFactory::new(address, tasks.provider());
    let token = args.token;
    if !factory.isRegisteredSettlementToken(token).call().await?._0 {
        return Ok(TaskOutcome::skipped(format!(
            "settlement token {token} is not registered"
        )));
    }

    let decimals = IERC20::new(token, tasks.provider())
        .decimals()
        .call()
        .await?
        ._0;
    let mut changed = 0usize;

    if let Some(text) = &args.minimum_margin {
        let value = parse_amount(text, decimals).context("minimum margin")?;
        if factory.getMinimumMargin(token).call().await?._0 != value {
            let call = IChromaticMarketFactory::setMinimumMarginCall {
                token,
                minimumMargin: value,
            };
            tasks.send("factory.setMinimumMargin", address, call).await?;
            changed += 1;
        }
    }

    if let Some(bps) = args.flash_loan_fee_rate_bps {
        if U256::from(bps) > BPS {
            anyhow::bail!("flash loan fee {bps} bps exceeds 100%");
        }
        let value = U256::from(bps);
        if factory.getFlashLoanFeeRate(token).call().await?._0 != value {
            let call = IChromaticMarketFactory::setFlashLoanFeeRateCall {
                token,
                flashLoanFeeRate: value,
            };
            tasks.send("factory.setFlashLoanFeeRate", address, call).await?;
            changed += 1;
        }
    }

    if let Some(text) = &args.earning_distribution_threshold {
        let value = parse_amount(text, decimals).context("earning distribution threshold")?;
        if factory
            .getEarningDistributionThreshold(token)
            .call()
            .await?
            ._0
            != value
        {
            let call = IChromaticMarketFactory::setEarningDistributionThresholdCall {
                token,
                threshold: value,
            };
            tasks
                .send("factory.setEarningDistributionThreshold", address, call)
                .await?;
            changed += 1;
        }
    }

    if let Some(tier) = args.uniswap_fee_tier {
        let value = fee_tier(tier)?;
        if factory.getUniswapFeeTier(token).call().await?._0 != value {
            let call = IChromaticMarketFactory::setUniswapFeeTierCall {
                token,
                uniswapFeeTier: value,
            };
            tasks.send("factory.setUniswapFeeTier", address, call).await?;
            changed += 1;
        }
    }

    if let Some((rate_bps, begin)) = args.interest_rate_record {
        if U256::from(rate_bps) > BPS {
            anyhow::bail!("interest rate {rate_bps} bps exceeds 100%");
        }
        let records = factory.getInterestRateRecords(token).call().await?._0;
        if let Some(last) = records.last() {
            if U256::from(begin) <= last.beginTimestamp {
                return Ok(TaskOutcome::skipped(format!(
                    "interest rate record must begin after {}",
                    last.beginTimestamp
                )));
            }
        }
        let call = IChromaticMarketFactory::appendInterestRateRecordCall {
            token,
            annualRateBPS: U256::from(rate_bps),
            beginTimestamp: U256::from(begin),
        };
        tasks
            .send("factory.appendInterestRateRecord", address, call)
            .await?;
        changed += 1;
    }

    if changed == 0 {
        return Ok(TaskOutcome::skipped("settlement token already configured"));
    }
    info!(changed, "Settlement token updated");
    Ok(TaskOutcome::Done)
}

/// Registered settlement token and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementTokenReport {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub oracle_provider: Address,
    pub minimum_margin: U256,
    pub flash_loan_fee_rate_bps: U256,
    pub earning_distribution_threshold: U256,
    pub uniswap_fee_tier: u32,
    pub current_interest_rate_bps: U256,
    pub interest_rate_records: Vec<InterestRateRecord>,
}

/// Every registered token with its parameters.
#[instrument(skip_all, name = "settlement-token")]
pub async fn report(tasks: &TaskContext) -> Result<Vec<SettlementTokenReport>> {
    let factory = IChromaticMarketFactory::new(tasks.factory_address()?, tasks.provider());
    let tokens = factory.registeredSettlementTokens().call().await?._0;

    let metadata = try_join_all(tokens.iter().map(|&token| async move {
        let erc20 = IERC20::new(token, tasks.provider());
        let (symbol, decimals) = futures::try_join!(
            async { erc20.symbol().call().await.map(|r| r._0) },
            async { erc20.decimals().call().await.map(|r| r._0) },
        )
        .with_context(|| format!("metadata of {token}"))?;
        Ok::<_, anyhow::Error>((symbol, decimals))
    }))
    .await?;

    let mut reports = Vec::with_capacity(tokens.len());
    for (token, (symbol, decimals)) in tokens.into_iter().zip(metadata) {
        reports.push(SettlementTokenReport {
            address: token,
            symbol,
            decimals,
            oracle_provider: factory.getSettlementTokenOracleProvider(token).call().await?._0,
            minimum_margin: factory.getMinimumMargin(token).call().await?._0,
            flash_loan_fee_rate_bps: factory.getFlashLoanFeeRate(token).call().await?._0,
            earning_distribution_threshold: factory
                .getEarningDistributionThreshold(token)
                .call()
                .await?
                ._0,
            uniswap_fee_tier: factory.getUniswapFeeTier(token).call().await?._0.to::<u32>(),
            current_interest_rate_bps: factory.currentInterestRate(token).call().await?._0,
            interest_rate_records: factory.getInterestRateRecords(token).call().await?._0,
        });
    }
    Ok(reports)
}

pub fn print_report(reports: &[SettlementTokenReport]) {
    if reports.is_empty() {
        println!("{}", "No settlement tokens registered".yellow());
        return;
    }
    for r in reports {
        println!(
            "{} {}",
            r.symbol.bright_green().bold(),
            r.address.to_string().bright_white()
        );
        println!("  {:<32}{}", "oracle provider".bright_cyan(), r.oracle_provider);
        println!(
            "  {:<32}{}",
            "minimum margin".bright_cyan(),
            format_amount(r.minimum_margin, r.decimals)
        );
        println!(
            "  {:<32}{} bps",
            "flash loan fee".bright_cyan(),
            r.flash_loan_fee_rate_bps
        );
        println!(
            "  {:<32}{}",
            "earning distribution threshold".bright_cyan(),
            format_amount(r.earning_distribution_threshold, r.decimals)
        );
        println!("  {:<32}{}", "uniswap fee tier".bright_cyan(), r.uniswap_fee_tier);
        println!(
            "  {:<32}{} bps",
            "current interest rate".bright_cyan(),
            r.current_interest_rate_bps
        );
        for record in &r.interest_rate_records {
            println!(
                "    {} bps from {}",
                record.annualRateBPS, record.beginTimestamp
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let args = RegisterArgs::new(Address::repeat_byte(1), Address::repeat_byte(2));
        let reg = Registration::resolve(&args, &SettlementTokenDefaults::default(), 6).unwrap();
        assert_eq!(reg.minimum_margin, U256::from(10_000_000u64));
        assert_eq!(reg.interest_rate_bps, U256::from(1_000u64));
        assert_eq!(reg.flash_loan_fee_rate_bps, U256::from(5_000u64));
        assert_eq!(reg.earning_distribution_threshold, U256::from(1_000_000_000u64));
        assert_eq!(reg.uniswap_fee_tier, U24::from(3_000u32));
    }

    #[test]
    fn test_resolve_overrides() {
        let mut args = RegisterArgs::new(Address::repeat_byte(1), Address::repeat_byte(2));
        args.minimum_margin = Some("2.5".to_string());
        args.uniswap_fee_tier = Some(500);
        let reg = Registration::resolve(&args, &SettlementTokenDefaults::default(), 18).unwrap();
        assert_eq!(reg.minimum_margin, U256::from(2_500_000_000_000_000_000u128));
        assert_eq!(reg.uniswap_fee_tier, U24::from(500u32));
    }

    #[test]
    fn test_resolve_rejects_bad_values() {
        let defaults = SettlementTokenDefaults::default();
        let mut args = RegisterArgs::new(Address::ZERO, Address::ZERO);
        args.uniswap_fee_tier = Some(2_500);
        assert!(Registration::resolve(&args, &defaults, 18).is_err());

        let mut args = RegisterArgs::new(Address::ZERO, Address::ZERO);
        args.interest_rate_bps = Some(20_000);
        assert!(Registration::resolve(&args, &defaults, 18).is_err());
    }

    #[test]
    fn test_set_args_empty() {
        assert!(SetArgs::default().is_empty());
        let args = SetArgs {
            interest_rate_record: Some((1_500, 1_700_000_000)),
            ..Default::default()
        };
        assert!(!args.is_empty());
    }
}
