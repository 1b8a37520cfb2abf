//! Decimal parsing, rounding and guarded arithmetic.
//!
//! Every computation in this crate runs on [`rust_decimal::Decimal`]: 96-bit
//! mantissa, 28 significant digits, no binary floating point anywhere. This
//! module holds the few operations the plain operators do not cover: parsing
//! caller text, dividing without panicking on zero, and rounding to a fixed
//! scale with an explicit midpoint rule.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::CorpFinanceError;
use crate::CorpFinanceResult;

/// Midpoint rule applied when a value is rounded to a fixed scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    /// 2.345 -> 2.35, -2.345 -> -2.35
    #[default]
    HalfUp,
    /// Banker's rounding: 2.345 -> 2.34, 2.355 -> 2.36
    HalfEven,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingMode::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingMode::HalfEven => RoundingStrategy::MidpointNearestEven,
        }
    }
}

/// Scale and midpoint rule for values that leave the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    pub scale: u32,
    #[serde(default)]
    pub mode: RoundingMode,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        RoundingPolicy {
            scale: 10,
            mode: RoundingMode::HalfUp,
        }
    }
}

impl RoundingPolicy {
    pub fn new(scale: u32, mode: RoundingMode) -> Self {
        RoundingPolicy { scale, mode }
    }

    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.scale, self.mode.strategy())
    }

    /// Divide and round the quotient to the policy scale.
    pub fn div(&self, numerator: Decimal, denominator: Decimal) -> CorpFinanceResult<Decimal> {
        checked_div(numerator, denominator, "rounded division").map(|q| self.round(q))
    }
}

/// Parse decimal text such as `"12.50"`, `"-3"` or `"1e-6"`.
pub fn parse_decimal(field: &str, text: &str) -> CorpFinanceResult<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CorpFinanceError::invalid(field, "Empty numeric value"));
    }

    let (mantissa, exponent) = match trimmed.find(['e', 'E']) {
        Some(pos) => (&trimmed[..pos], Some(&trimmed[pos + 1..])),
        None => (trimmed, None),
    };

    let digits = mantissa.strip_prefix(['-', '+']).unwrap_or(mantissa);
    if digits.is_empty() || digits == "." {
        return Err(CorpFinanceError::invalid(
            field,
            format!("'{trimmed}' is not a number"),
        ));
    }
    if digits.matches('.').count() > 1 {
        return Err(CorpFinanceError::invalid(
            field,
            format!("'{trimmed}' has more than one decimal point"),
        ));
    }
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        return Err(CorpFinanceError::invalid(
            field,
            format!("'{trimmed}' contains non-numeric character '{bad}'"),
        ));
    }

    let parsed = match exponent {
        None => Decimal::from_str(trimmed),
        Some(exp) => {
            let exp_digits = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            if exp_digits.is_empty() || !exp_digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(CorpFinanceError::invalid(
                    field,
                    format!("'{trimmed}' has a malformed exponent"),
                ));
            }
            Decimal::from_scientific(trimmed)
        }
    };

    parsed.map_err(|e| CorpFinanceError::invalid(field, format!("'{trimmed}': {e}")))
}

/// Division that fails instead of panicking.
pub fn checked_div(
    numerator: Decimal,
    denominator: Decimal,
    context: &str,
) -> CorpFinanceResult<Decimal> {
    if denominator.is_zero() {
        return Err(CorpFinanceError::DivisionByZero {
            context: context.to_string(),
        });
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| CorpFinanceError::invalid(context, "Division overflowed"))
}

/// `value × percentage / 100`, e.g. `percent_of(200, 12.5) = 25`.
pub fn percent_of(value: Decimal, percentage: Decimal) -> Decimal {
    value * percentage / dec!(100)
}

/// Render at exactly `scale` fractional digits, keeping trailing zeros.
pub fn format_fixed(value: Decimal, scale: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(scale);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_plain_and_signed() {
        assert_eq!(parse_decimal("x", "12.50").unwrap(), dec!(12.50));
        assert_eq!(parse_decimal("x", " -3 ").unwrap(), dec!(-3));
        assert_eq!(parse_decimal("x", "+0.1").unwrap(), dec!(0.1));
    }

    #[test]
    fn test_parse_scientific() {
        assert_eq!(parse_decimal("tol", "1e-6").unwrap(), dec!(0.000001));
        assert_eq!(parse_decimal("tol", "2.5E2").unwrap(), dec!(250));
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        for text in ["", "abc", "1.2.3", "12a", "--1", ".", "1e", "1e+x"] {
            let err = parse_decimal("amount", text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "text {text:?}");
        }
    }

    #[test]
    fn test_checked_div_zero() {
        let err = checked_div(dec!(1), Decimal::ZERO, "ratio").unwrap_err();
        assert_eq!(err.reason_code(), "DivisionByZero");
        assert_eq!(checked_div(dec!(5), dec!(2), "ratio").unwrap(), dec!(2.5));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(dec!(200), dec!(12.5)), dec!(25));
    }

    #[test]
    fn test_half_up_vs_half_even() {
        let up = RoundingPolicy::new(2, RoundingMode::HalfUp);
        let even = RoundingPolicy::new(2, RoundingMode::HalfEven);
        assert_eq!(up.round(dec!(2.345)), dec!(2.35));
        assert_eq!(even.round(dec!(2.345)), dec!(2.34));
        assert_eq!(up.round(dec!(-2.345)), dec!(-2.35));
        assert_eq!(even.round(dec!(2.355)), dec!(2.36));
    }

    #[test]
    fn test_policy_div_rounds_to_scale() {
        let policy = RoundingPolicy::new(4, RoundingMode::HalfUp);
        assert_eq!(policy.div(dec!(2), dec!(3)).unwrap(), dec!(0.6667));
        assert!(policy.div(dec!(2), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_format_fixed_keeps_trailing_zeros() {
        assert_eq!(format_fixed(dec!(10.1), 3), "10.100");
        assert_eq!(format_fixed(dec!(2.5), 0), "3");
        assert_eq!(format_fixed(dec!(-0.125), 2), "-0.13");
    }
}
