//! Fixed-point helpers for token amounts, basis points and oracle prices.
//!
//! Intermediate products are widened to 512 bits so `a * b / c` never
//! overflows before the division.

use alloy::primitives::{I256, U256, U512};
use alloy::primitives::utils::{format_units, parse_units, ParseUnits};
use anyhow::{bail, Context, Result};

/// Basis points denominator (10000 = 100%)
pub const BPS: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// Seconds in the 365-day year used for interest accrual.
pub const YEAR_SECONDS: U256 = U256::from_limbs([365 * 24 * 3600u64, 0, 0, 0]);

/// Oracle price decimals (18)
pub const PRICE_DECIMALS: u8 = 18;

/// 10^exp
#[inline]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

fn widen(x: U256) -> U512 {
    let l = x.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(x: U512) -> Option<U256> {
    let l = x.as_limbs();
    if l[4..].iter().any(|&limb| limb != 0) {
        return None;
    }
    Some(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

/// `a * b / c` rounded down. `None` on division by zero or overflow.
pub fn mul_div(a: U256, b: U256, c: U256) -> Option<U256> {
    if c.is_zero() {
        return None;
    }
    narrow(widen(a) * widen(b) / widen(c))
}

/// `a * b / c` rounded up. `None` on division by zero or overflow.
pub fn mul_div_up(a: U256, b: U256, c: U256) -> Option<U256> {
    if c.is_zero() {
        return None;
    }
    let product = widen(a) * widen(b);
    let divisor = widen(c);
    let mut quotient = product / divisor;
    if !(product % divisor).is_zero() {
        quotient += U512::from(1u64);
    }
    narrow(quotient)
}

/// Token amount in base units, e.g. `parse_amount("1.5", 6)` = 1_500_000.
///
/// Digits past `decimals` are truncated. Negative amounts are rejected.
pub fn parse_amount(text: &str, decimals: u8) -> Result<U256> {
    let text = text.trim();
    match parse_units(text, decimals).with_context(|| format!("invalid amount '{text}'"))? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => bail!("amount '{text}' is negative"),
    }
}

/// Signed amount in base units; a leading `-` denotes a short quantity.
pub fn parse_signed_amount(text: &str, decimals: u8) -> Result<I256> {
    let text = text.trim();
    let parsed = parse_units(text, decimals).with_context(|| format!("invalid amount '{text}'"))?;
    Ok(parsed.get_signed())
}

/// Render base units as a decimal string without trailing zeros.
pub fn format_amount(value: impl Into<ParseUnits>, decimals: u8) -> String {
    let value = value.into();
    match format_units(value, decimals) {
        Ok(text) if text.contains('.') => {
            text.trim_end_matches('0').trim_end_matches('.').to_string()
        }
        Ok(text) => text,
        Err(_) => match value {
            ParseUnits::U256(v) => v.to_string(),
            ParseUnits::I256(v) => v.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0), U256::from(1u64));
        assert_eq!(pow10(6), U256::from(1_000_000u64));
        assert_eq!(pow10(18), U256::from(1_000_000_000_000_000_000u128));
    }

    #[test]
    fn test_mul_div() {
        let a = U256::from(10u64);
        assert_eq!(mul_div(a, U256::from(3u64), U256::from(4u64)), Some(U256::from(7u64)));
        assert_eq!(mul_div_up(a, U256::from(3u64), U256::from(4u64)), Some(U256::from(8u64)));
        assert_eq!(mul_div_up(a, U256::from(2u64), U256::from(4u64)), Some(U256::from(5u64)));
        assert_eq!(mul_div(a, a, U256::ZERO), None);
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // MAX * 2 overflows 256 bits but the quotient fits
        let r = mul_div(U256::MAX, U256::from(2u64), U256::from(4u64)).unwrap();
        assert_eq!(r, U256::MAX / U256::from(2u64));
        assert_eq!(mul_div(U256::MAX, U256::from(2u64), U256::from(1u64)), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.5", 6).unwrap(), U256::from(1_500_000u64));
        assert_eq!(parse_amount(" 100 ", 18).unwrap(), U256::from(100u64) * pow10(18));
        assert_eq!(parse_amount("0", 6).unwrap(), U256::ZERO);
        assert!(parse_amount("-1", 6).is_err());
        assert!(parse_amount("abc", 6).is_err());
    }

    #[test]
    fn test_parse_signed_amount() {
        assert_eq!(
            parse_signed_amount("-2", 4).unwrap(),
            I256::try_from(-20_000i64).unwrap()
        );
        assert_eq!(
            parse_signed_amount("0.5", 1).unwrap(),
            I256::try_from(5i64).unwrap()
        );
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_amount(U256::from(100u64) * pow10(18), 18), "100");
        assert_eq!(format_amount(U256::from(1u64), 6), "0.000001");
        assert_eq!(
            format_amount(I256::try_from(-1_500_000i64).unwrap(), 6),
            "-1.5"
        );
    }
}
