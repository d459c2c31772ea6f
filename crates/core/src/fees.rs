//! Protocol fee and accounting rules as observed through the contracts.
//!
//! These mirror what the market facets compute on-chain so scenario tests
//! and reports can predict balances before a transaction is sent.

use crate::math::{mul_div, mul_div_up, BPS, YEAR_SECONDS};
use alloy::primitives::{I256, U256};
use chromatic_chain::contracts::{BinMargin, InterestRateRecord};

/// Interest accrued by `margin` over `[from, to)`.
///
/// Each rate period contributes
/// `ceil(margin * rateBPS * periodSeconds / (YEAR_SECONDS * BPS))`.
/// Time before the first record accrues nothing.
pub fn interest_fee(margin: U256, from: u64, to: u64, records: &[InterestRateRecord]) -> U256 {
    if to <= from || margin.is_zero() {
        return U256::ZERO;
    }

    let mut sorted: Vec<&InterestRateRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.beginTimestamp);

    let from = U256::from(from);
    let to = U256::from(to);
    let denominator = YEAR_SECONDS * BPS;
    let mut total = U256::ZERO;

    for (i, record) in sorted.iter().enumerate() {
        let period_end = sorted
            .get(i + 1)
            .map(|next| next.beginTimestamp.min(to))
            .unwrap_or(to);
        let period_start = record.beginTimestamp.max(from);
        if period_end <= period_start {
            continue;
        }

        let period = period_end - period_start;
        let fee = mul_div_up(margin, record.annualRateBPS * period, denominator)
            .unwrap_or(U256::MAX);
        total = total.saturating_add(fee);
    }

    total
}

/// CLB tokens minted for `amount` deposited into a bin.
///
/// An empty bin (no supply or no value) mints 1:1.
pub fn clb_mint_amount(amount: U256, bin_value: U256, total_supply: U256) -> U256 {
    if total_supply.is_zero() || bin_value.is_zero() {
        return amount;
    }
    mul_div(amount, total_supply, bin_value).unwrap_or(U256::MAX)
}

/// Settlement tokens returned for burning `clb_amount` of a bin's CLB token.
pub fn clb_burn_value(clb_amount: U256, bin_value: U256, total_supply: U256) -> U256 {
    if total_supply.is_zero() {
        return U256::ZERO;
    }
    mul_div(clb_amount, bin_value, total_supply).unwrap_or(U256::MAX)
}

/// Trading fee paid on a position's bin margins, rounded up per bin.
pub fn trading_fee(bin_margins: &[BinMargin]) -> U256 {
    bin_margins
        .iter()
        .map(|m| {
            mul_div_up(m.amount, U256::from(m.tradingFeeRate), BPS).unwrap_or(U256::MAX)
        })
        .fold(U256::ZERO, |acc, fee| acc.saturating_add(fee))
}

/// Profit and loss of `qty` moved from `entry_price` to `exit_price`.
///
/// Positive `qty` is long, negative is short. Returns `None` for a zero
/// entry price or on overflow.
pub fn pnl(qty: I256, entry_price: I256, exit_price: I256) -> Option<I256> {
    if entry_price.is_zero() {
        return None;
    }
    let delta = exit_price.checked_sub(entry_price)?;
    qty.checked_mul(delta)?.checked_div(entry_price)
}

/// Maker margin locked per bin when a position of `maker_margin` is spread
/// over bins with the given free liquidity, filled lowest fee rate first.
pub fn fill_bins(maker_margin: U256, bins: &[(u16, U256)]) -> Vec<BinMargin> {
    let mut remaining = maker_margin;
    let mut sorted = bins.to_vec();
    sorted.sort_by_key(|(rate, _)| *rate);

    let mut margins = Vec::new();
    for (rate, free) in sorted {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(free);
        if take.is_zero() {
            continue;
        }
        margins.push(BinMargin {
            tradingFeeRate: rate,
            amount: take,
        });
        remaining -= take;
    }
    margins
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rate: u64, begin: u64) -> InterestRateRecord {
        InterestRateRecord {
            annualRateBPS: U256::from(rate),
            beginTimestamp: U256::from(begin),
        }
    }

    fn i(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    #[test]
    fn test_interest_single_period() {
        // 10% APR on 1_000_000 for a full year
        let records = [record(1_000, 0)];
        let year = 365 * 24 * 3600;
        assert_eq!(
            interest_fee(U256::from(1_000_000u64), 0, year, &records),
            U256::from(100_000u64)
        );
    }

    #[test]
    fn test_interest_rounds_up_per_period() {
        let records = [record(1_000, 0), record(2_000, 100)];
        // 1 second in each period: both periods round up to 1
        assert_eq!(interest_fee(U256::from(1_000u64), 99, 101, &records), U256::from(2u64));
    }

    #[test]
    fn test_interest_before_first_record_is_free() {
        let records = [record(1_000, 1_000)];
        assert_eq!(interest_fee(U256::from(1_000u64), 0, 1_000, &records), U256::ZERO);
        assert_eq!(interest_fee(U256::from(1_000u64), 10, 5, &records), U256::ZERO);
    }

    #[test]
    fn test_interest_unsorted_records() {
        let year = 365 * 24 * 3600;
        let sorted = [record(1_000, 0), record(3_000, year / 2)];
        let reversed = [record(3_000, year / 2), record(1_000, 0)];
        assert_eq!(
            interest_fee(U256::from(10_000u64), 0, year, &sorted),
            interest_fee(U256::from(10_000u64), 0, year, &reversed)
        );
        // half a year at 10% + half a year at 30%
        assert_eq!(
            interest_fee(U256::from(10_000u64), 0, year, &sorted),
            U256::from(2_000u64)
        );
    }

    #[test]
    fn test_clb_mint_and_burn() {
        let amount = U256::from(100u64);
        assert_eq!(clb_mint_amount(amount, U256::ZERO, U256::ZERO), amount);
        assert_eq!(
            clb_mint_amount(amount, U256::from(200u64), U256::from(100u64)),
            U256::from(50u64)
        );
        assert_eq!(clb_burn_value(amount, U256::from(200u64), U256::ZERO), U256::ZERO);
        assert_eq!(
            clb_burn_value(U256::from(50u64), U256::from(200u64), U256::from(100u64)),
            U256::from(100u64)
        );
    }

    #[test]
    fn test_trading_fee() {
        let margins = [
            BinMargin { tradingFeeRate: 1, amount: U256::from(10_000u64) },
            BinMargin { tradingFeeRate: 10, amount: U256::from(15u64) },
        ];
        // 1 + ceil(0.015)
        assert_eq!(trading_fee(&margins), U256::from(2u64));
    }

    #[test]
    fn test_pnl() {
        assert_eq!(pnl(i(10), i(100), i(110)), Some(i(1)));
        assert_eq!(pnl(i(-10), i(100), i(110)), Some(i(-1)));
        assert_eq!(pnl(i(10), i(0), i(110)), None);
    }

    #[test]
    fn test_fill_bins() {
        let bins = [(10u16, U256::from(5u64)), (1u16, U256::from(3u64)), (5u16, U256::ZERO)];
        let filled = fill_bins(U256::from(6u64), &bins);
        assert_eq!(filled.len(), 2);
        assert_eq!(filled[0].tradingFeeRate, 1);
        assert_eq!(filled[0].amount, U256::from(3u64));
        assert_eq!(filled[1].tradingFeeRate, 10);
        assert_eq!(filled[1].amount, U256::from(3u64));
    }
}
