//! Trading, interest and liquidity accounting scenarios.

use alloy::primitives::{I256, U256};
use chromatic_chain::contracts::InterestRateRecord;
use chromatic_core::fees::{clb_burn_value, clb_mint_amount, fill_bins, interest_fee, pnl, trading_fee};
use chromatic_core::math::{parse_amount, parse_signed_amount, BPS};

const DAY: u64 = 24 * 3600;
const YEAR: u64 = 365 * DAY;

fn units(text: &str) -> U256 {
    parse_amount(text, 18).unwrap()
}

fn signed(text: &str) -> I256 {
    parse_signed_amount(text, 18).unwrap()
}

fn record(rate_bps: u64, begin: u64) -> InterestRateRecord {
    InterestRateRecord {
        annualRateBPS: U256::from(rate_bps),
        beginTimestamp: U256::from(begin),
    }
}

#[test]
fn test_first_deposit_mints_one_to_one() {
    // 100 tokens into an empty bin at fee rate 1
    let minted = clb_mint_amount(units("100"), U256::ZERO, U256::ZERO);
    assert_eq!(minted, units("100"));
}

#[test]
fn test_mint_and_burn_follow_bin_value() {
    // bin earned 10% since the first deposit
    let supply = units("100");
    let value = units("110");

    let minted = clb_mint_amount(units("11"), value, supply);
    assert_eq!(minted, units("10"));

    let supply = supply + minted;
    let value = value + units("11");
    assert_eq!(clb_burn_value(units("10"), value, supply), units("11"));
    assert_eq!(clb_burn_value(supply, value, supply), value);
}

#[test]
fn test_interest_across_rate_change() {
    let open = 1_000_000;
    let change = open + 30 * DAY;
    let close = change + 30 * DAY;
    let records = [record(1_000, 0), record(2_000, change)];
    let margin = units("1000");

    let fee = interest_fee(margin, open, close, &records);
    let first = interest_fee(margin, open, change, &records);
    let second = interest_fee(margin, change, close, &records);
    assert_eq!(fee, first + second);
    // the second month costs twice the first, up to rounding
    assert!(second >= first * U256::from(2u64) - U256::from(1u64));
    assert!(second <= first * U256::from(2u64) + U256::from(1u64));
}

#[test]
fn test_full_year_interest() {
    let fee = interest_fee(units("1000"), 0, YEAR, &[record(1_000, 0)]);
    assert_eq!(fee, units("100"));
}

#[test]
fn test_trading_fee_over_filled_bins() {
    // 150 maker margin across bins at 0.01% and 0.02%; the 0.03% bin is full
    let bins = [
        (3u16, U256::ZERO),
        (1u16, units("100")),
        (2u16, units("30")),
    ];
    let margins = fill_bins(units("150"), &bins);
    assert_eq!(margins.len(), 2);
    assert_eq!(margins[0].tradingFeeRate, 1);
    assert_eq!(margins[0].amount, units("100"));
    assert_eq!(margins[1].tradingFeeRate, 2);
    assert_eq!(margins[1].amount, units("30"));

    let leftover = units("150") - margins.iter().map(|m| m.amount).fold(U256::ZERO, |a, b| a + b);
    assert_eq!(leftover, units("20"));

    // 100 * 1 / 10000 + 30 * 2 / 10000
    let expected = units("100") / BPS + units("30") * U256::from(2u64) / BPS;
    assert_eq!(trading_fee(&margins), expected);
}

#[test]
fn test_close_position_balance() {
    // long 10 ETH worth at 2000, closed at 2100
    let qty = signed("10");
    let profit = pnl(qty, signed("2000"), signed("2100")).unwrap();
    assert_eq!(profit, signed("0.5"));

    let taker_margin = units("100");
    let interest = interest_fee(units("50"), 0, DAY, &[record(1_000, 0)]);
    let returned = taker_margin + profit.into_raw() - interest;
    assert_eq!(returned, units("100.5") - interest);
    assert!(interest > U256::ZERO);

    let loss = pnl(qty, signed("2000"), signed("1900")).unwrap();
    assert_eq!(loss, -signed("0.5"));
}
