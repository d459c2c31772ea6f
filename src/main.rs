//! Chromatic protocol tooling
//!
//! Deployment, operational tasks, an interactive wallet session, a keeper
//! simulation and an event indexer, all driven from one binary:
//! - `deploy`, `hotfix-facets`: idempotent deployment steps and facet upgrades
//! - `factory:*`, `oracle-provider:*`, `settlement-token:*`, `upkeep:*`,
//!   `verify:*`, `fixed-price-swap-router:*`: operational tasks
//! - `repl`, `keeper`, `index`

mod cli;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chromatic_core::config::{AmbientEnv, NetworkRegistry, ProtocolConfig};
use chromatic_core::deploy::{default_orchestrator, DeployContext};
use chromatic_core::facets::HotfixFacets;
use chromatic_core::indexer::{self, IndexOptions};
use chromatic_core::keeper;
use chromatic_core::math::parse_amount;
use chromatic_core::tasks::{
    factory, oracle_provider, settlement_token, swap_router, upkeep, verify, TaskContext,
    TaskOutcome,
};
use chromatic_core::Session;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before clap reads CHROMATIC_NETWORK
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chromatic_core=debug,chromatic_chain=debug"));
    tracing_subscriber::registry()
        .with(cli.json.then(|| fmt::layer().json()))
        .with((!cli.json).then(fmt::layer))
        .with(filter)
        .init();

    AmbientEnv::init(AmbientEnv::from_env());

    let registry = NetworkRegistry::load_from_dir(&cli.config_dir)?;
    let network = registry.require(&cli.network)?.clone();
    let protocol = ProtocolConfig::load_or_default(&cli.config_dir)?;
    protocol.log_config();

    info!(network = %cli.network, "Starting chromatic");

    let tasks = TaskContext::connect(network, protocol, &cli.deployments_dir, &cli.artifacts_dir)
        .await?;

    tokio::select! {
        result = dispatch(cli.command, tasks) => result,
        _ = signal::ctrl_c() => {
            warn!("Interrupted");
            Ok(())
        }
    }
}

async fn dispatch(command: Command, tasks: TaskContext) -> Result<()> {
    match command {
        Command::Deploy { tags } => {
            let ctx = DeployContext::new(tasks);
            let summary = default_orchestrator()
                .run(&ctx, ctx.deployments(), &tags)
                .await?;
            for id in &summary.executed {
                println!("{} {id}", "executed".green());
            }
            for (id, reason) in &summary.skipped {
                println!("{} {id} ({reason:?})", "skipped".yellow());
            }
        }
        Command::HotfixFacets => {
            let report = HotfixFacets::apply(&DeployContext::new(tasks)).await?;
            for market in &report.markets_cut {
                println!("{} {market}", "cut".green());
            }
            for market in &report.markets_unchanged {
                println!("{} {market}", "unchanged".dimmed());
            }
        }

        Command::FactorySet(opts) => {
            let args = factory::FactorySetArgs {
                dao: opts.dao,
                treasury: opts.treasury,
                vault: opts.vault,
                liquidator: opts.liquidator,
                keeper_fee_payer: opts.keeper_fee_payer,
                market_settlement: opts.market_settlement,
            };
            report(factory::set(&tasks, &args).await?);
        }
        Command::MarketCreate {
            oracle_provider,
            settlement_token,
        } => report(factory::create_market(&tasks, oracle_provider, settlement_token).await?),

        Command::OracleProviderRegister {
            oracle_provider,
            min_take_profit_bps,
            max_take_profit_bps,
            leverage_level,
        } => {
            let mut args =
                oracle_provider::RegisterArgs::from_defaults(&tasks.protocol.oracle_provider);
            if let Some(bps) = min_take_profit_bps {
                args.min_take_profit_bps = bps;
            }
            if let Some(bps) = max_take_profit_bps {
                args.max_take_profit_bps = bps;
            }
            if let Some(level) = leverage_level {
                args.leverage_level = level;
            }
            report(oracle_provider::register(&tasks, oracle_provider, args).await?);
        }
        Command::OracleProviderList => {
            oracle_provider::print_report(&oracle_provider::list(&tasks).await?);
        }

        Command::SettlementToken => {
            settlement_token::print_report(&settlement_token::report(&tasks).await?);
        }
        Command::SettlementTokenRegister(opts) => {
            let args = settlement_token::RegisterArgs {
                minimum_margin: opts.minimum_margin,
                interest_rate_bps: opts.interest_rate_bps,
                flash_loan_fee_rate_bps: opts.flash_loan_fee_rate_bps,
                earning_distribution_threshold: opts.earning_distribution_threshold,
                uniswap_fee_tier: opts.uniswap_fee_tier,
                ..settlement_token::RegisterArgs::new(opts.token, opts.oracle_provider)
            };
            report(settlement_token::register(&tasks, args).await?);
        }
        Command::SettlementTokenSet(opts) => {
            let args = settlement_token::SetArgs {
                token: opts.token,
                minimum_margin: opts.minimum_margin,
                flash_loan_fee_rate_bps: opts.flash_loan_fee_rate_bps,
                earning_distribution_threshold: opts.earning_distribution_threshold,
                uniswap_fee_tier: opts.uniswap_fee_tier,
                interest_rate_record: opts.interest_rate_bps.zip(opts.interest_rate_begin),
            };
            report(settlement_token::set(&tasks, &args).await?);
        }

        Command::Upkeep => upkeep::print_report(&upkeep::report(&tasks).await?),
        Command::UpkeepClear => report(upkeep::clear_all(&tasks).await?),
        Command::UpkeepVaultMaker(opt) => {
            report(upkeep::maker_tasks(&tasks, opt.token, false).await?)
        }
        Command::UpkeepVaultMakerClear(opt) => {
            report(upkeep::maker_tasks(&tasks, opt.token, true).await?)
        }
        Command::UpkeepVaultMarket(opt) => {
            report(upkeep::market_tasks(&tasks, opt.market, false).await?)
        }
        Command::UpkeepVaultMarketClear(opt) => {
            report(upkeep::market_tasks(&tasks, opt.market, true).await?)
        }
        Command::UpkeepSettlement(opt) => {
            report(upkeep::settlement_tasks(&tasks, opt.market, false).await?)
        }
        Command::UpkeepSettlementClear(opt) => {
            report(upkeep::settlement_tasks(&tasks, opt.market, true).await?)
        }
        Command::UpkeepSettlementBalance => {
            upkeep::settlement_balance(&tasks).await?;
        }
        Command::UpkeepSettlementDeposit(opt) => {
            let amount = parse_amount(&opt.amount, 18).context("--amount")?;
            report(upkeep::settlement_deposit(&tasks, amount).await?);
        }
        Command::UpkeepSettlementWithdraw(opt) => {
            let amount = parse_amount(&opt.amount, 18).context("--amount")?;
            report(upkeep::settlement_withdraw(&tasks, amount).await?);
        }

        Command::VerifyAll => report(verify::run(&tasks, verify::VerifyScope::All).await?),
        Command::VerifyCore => report(verify::run(&tasks, verify::VerifyScope::Core).await?),
        Command::VerifyPeriphery => {
            report(verify::run(&tasks, verify::VerifyScope::Periphery).await?)
        }

        Command::SwapRouterPrice { token } => {
            swap_router::price(&tasks, token).await?;
        }
        Command::SwapRouterSetPrice { token, price } => {
            report(swap_router::set_price(&tasks, token, &price).await?)
        }
        Command::SwapRouterWhitelist { client } => {
            report(swap_router::set_whitelisted(&tasks, client, true).await?)
        }
        Command::SwapRouterUnwhitelist { client } => {
            report(swap_router::set_whitelisted(&tasks, client, false).await?)
        }

        Command::Index {
            from_block,
            follow,
            store,
        } => {
            let options = IndexOptions {
                from_block,
                follow,
                store,
            };
            indexer::run(&tasks, &options).await?;
        }
        Command::Keeper {
            prices,
            accounts,
            market,
        } => {
            let prices = keeper::parse_prices(&prices)?;
            keeper::run(&tasks, market, &prices, &accounts).await?;
        }
        Command::Repl { market } => repl::run(Session::new(tasks, market)).await?,
    }
    Ok(())
}

fn report(outcome: TaskOutcome) {
    match outcome {
        TaskOutcome::Done => println!("{}", "done".green().bold()),
        TaskOutcome::Skipped(reason) => println!("{} {reason}", "skipped:".yellow().bold()),
    }
}
